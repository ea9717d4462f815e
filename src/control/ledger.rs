use crate::events::Timestamp;
use chrono::Utc;
use std::sync::{Mutex, MutexGuard};

/// One successful error-triggered stop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoppedApp {
    pub display_name: String,
    pub process_name: String,
    pub stopped_at: Timestamp,
}

/// Append-only record of stopped apps, kept for the shutdown summary
#[derive(Debug, Default)]
pub struct StoppedAppsLedger {
    entries: Mutex<Vec<StoppedApp>>,
}

impl StoppedAppsLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<StoppedApp>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn record(&self, display_name: &str, process_name: &str) {
        self.record_at(display_name, process_name, Utc::now());
    }

    pub fn record_at(&self, display_name: &str, process_name: &str, stopped_at: Timestamp) {
        self.lock().push(StoppedApp {
            display_name: display_name.to_string(),
            process_name: process_name.to_string(),
            stopped_at,
        });
    }

    /// Snapshot of all entries in the order they were recorded
    pub fn entries(&self) -> Vec<StoppedApp> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
