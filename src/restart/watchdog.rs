use crate::control::TargetController;
use crate::events::{Timestamp, WatchTarget};
use crate::shutdown::ShutdownSignal;
use crate::status::StatusSink;
use crate::tailing::ActivityTracker;
use chrono::Utc;
use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;

/// Restarts processes whose log files have gone quiet
///
/// Only targets with `restart_on_inactivity` are considered. After a
/// successful restart the target's activity clock is reset so the same
/// silence cannot trigger again; after a failure it is left alone so the
/// next sweep retries.
pub struct InactivityWatchdog {
    targets: Vec<WatchTarget>,
    activity: Arc<ActivityTracker>,
    controller: Arc<TargetController>,
    sink: Arc<dyn StatusSink>,
    timeout: chrono::Duration,
}

impl InactivityWatchdog {
    pub fn new(
        targets: &[WatchTarget],
        activity: Arc<ActivityTracker>,
        controller: Arc<TargetController>,
        sink: Arc<dyn StatusSink>,
        timeout: Duration,
    ) -> Self {
        let targets = targets
            .iter()
            .filter(|target| target.restart_on_inactivity)
            .cloned()
            .collect();

        Self {
            targets,
            activity,
            controller,
            sink,
            timeout: chrono::Duration::from_std(timeout)
                .unwrap_or_else(|_| chrono::Duration::days(36_500)),
        }
    }

    /// Targets this watchdog is responsible for
    pub fn targets(&self) -> &[WatchTarget] {
        &self.targets
    }

    pub fn sweep(&self) -> Vec<String> {
        self.sweep_at(Utc::now())
    }

    /// Restart every target stale for at least the timeout at `now`
    ///
    /// Returns the process names restarted successfully.
    pub fn sweep_at(&self, now: Timestamp) -> Vec<String> {
        let mut restarted = Vec::new();

        for target in &self.targets {
            let stale = match self.activity.stale_since(&target.path, now) {
                Some(stale) => stale,
                None => {
                    debug!("No activity recorded yet for {}", target.path.display());
                    continue;
                }
            };

            if stale < self.timeout {
                continue;
            }

            self.sink.warning(&format!(
                "No new entries in {} for {} seconds, restarting {}",
                target.path.display(),
                stale.num_seconds(),
                target.display_name
            ));

            if self
                .controller
                .restart(&target.process_name, &target.display_name)
                .is_ok()
            {
                self.activity.reset(&target.path, now);
                restarted.push(target.process_name.clone());
            }
        }

        restarted
    }

    /// Sweep every `interval` until shutdown
    pub fn run(&self, shutdown: &ShutdownSignal, interval: Duration) {
        info!(
            "Inactivity watchdog started for {} target(s) (timeout {}s, sweep every {:?})",
            self.targets.len(),
            self.timeout.num_seconds(),
            interval
        );
        while shutdown.sleep(interval) {
            self.sweep();
        }
        info!("Inactivity watchdog stopped");
    }
}
