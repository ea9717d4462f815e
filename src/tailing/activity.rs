use crate::events::Timestamp;
use chrono::Duration;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Last time each watched file was seen growing
///
/// Written by the tail workers, read (and reset after a restart) by the
/// inactivity watchdog.
#[derive(Debug, Default)]
pub struct ActivityTracker {
    last_seen: Mutex<HashMap<PathBuf, Timestamp>>,
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<PathBuf, Timestamp>> {
        self.last_seen.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record that `path` grew at `timestamp`
    pub fn record_activity(&self, path: &Path, timestamp: Timestamp) {
        self.entries().insert(path.to_path_buf(), timestamp);
    }

    /// Restart the inactivity window for `path` at `now`
    pub fn reset(&self, path: &Path, now: Timestamp) {
        self.record_activity(path, now);
    }

    pub fn last_seen(&self, path: &Path) -> Option<Timestamp> {
        self.entries().get(path).copied()
    }

    /// Time elapsed since `path` last grew, or `None` if never recorded
    pub fn stale_since(&self, path: &Path, now: Timestamp) -> Option<Duration> {
        self.last_seen(path).map(|seen| now - seen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_unknown_path_has_no_staleness() {
        let tracker = ActivityTracker::new();
        assert_eq!(tracker.stale_since(Path::new("/a.log"), Utc::now()), None);
    }

    #[test]
    fn test_record_overwrites_previous_timestamp() {
        let tracker = ActivityTracker::new();
        let path = Path::new("/a.log");
        let t0 = Utc::now();

        tracker.record_activity(path, t0);
        tracker.record_activity(path, t0 + Duration::seconds(10));

        assert_eq!(tracker.last_seen(path), Some(t0 + Duration::seconds(10)));
        assert_eq!(
            tracker.stale_since(path, t0 + Duration::seconds(70)),
            Some(Duration::seconds(60))
        );
    }

    #[test]
    fn test_reset_restarts_window() {
        let tracker = ActivityTracker::new();
        let path = Path::new("/a.log");
        let t0 = Utc::now();

        tracker.record_activity(path, t0);
        let later = t0 + Duration::seconds(400);
        tracker.reset(path, later);

        assert_eq!(tracker.stale_since(path, later), Some(Duration::zero()));
    }

    #[test]
    fn test_paths_are_tracked_independently() {
        let tracker = ActivityTracker::new();
        let t0 = Utc::now();

        tracker.record_activity(Path::new("/a.log"), t0);
        tracker.record_activity(Path::new("/b.log"), t0 + Duration::seconds(5));

        let now = t0 + Duration::seconds(10);
        assert_eq!(
            tracker.stale_since(Path::new("/a.log"), now),
            Some(Duration::seconds(10))
        );
        assert_eq!(
            tracker.stale_since(Path::new("/b.log"), now),
            Some(Duration::seconds(5))
        );
    }
}
