//! Core types shared across the log guard
//!
//! This module defines the watch targets loaded from configuration and the
//! actions that can be issued against the external process manager.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Timestamp type for consistent time handling across the application
pub type Timestamp = DateTime<Utc>;

/// One monitored (file, managed process) pairing
///
/// Built once from configuration at startup and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchTarget {
    /// Name the process manager knows the process by
    pub process_name: String,
    /// Human-readable name used in status messages
    pub display_name: String,
    /// Append-only log file written by the managed process
    pub path: PathBuf,
    /// Schedule a restart after an error-triggered stop succeeds
    pub restart_after_stop: bool,
    /// Restart the process when its log file goes quiet for too long
    pub restart_on_inactivity: bool,
    /// Delay before the restart scheduled after a stop
    pub restart_delay: std::time::Duration,
}

/// Action issued against the external process manager
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProcessAction {
    Stop,
    Start,
    Restart,
}

impl ProcessAction {
    /// Sub-command name passed to the process manager
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessAction::Stop => "stop",
            ProcessAction::Start => "start",
            ProcessAction::Restart => "restart",
        }
    }
}

impl fmt::Display for ProcessAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
