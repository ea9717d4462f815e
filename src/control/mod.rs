/// Stop/start/restart orchestration over the process manager
pub mod controller;

/// Record of apps stopped because of detected errors
pub mod ledger;

/// External process manager interface and its command-line adapter
pub mod process_manager;

pub use controller::{ActionReport, TargetController};
pub use ledger::{StoppedApp, StoppedAppsLedger};
pub use process_manager::{CommandProcessManager, ExecutionResult, ProcessManager};
