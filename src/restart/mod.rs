/// Deferred restarts with retry on failure
pub mod scheduler;

/// Restart on prolonged log inactivity
pub mod watchdog;

pub use scheduler::{RestartObligation, RestartScheduler, SweepReport};
pub use watchdog::InactivityWatchdog;
