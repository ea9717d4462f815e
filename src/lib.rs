/// Error types for the log guard
pub mod error;

/// Core shared types (watch targets, process actions)
pub mod events;

/// Structured error-signature matching
pub mod matcher;

/// Incremental file tailing and activity tracking
pub mod tailing;

/// Process manager access and stop/restart orchestration
pub mod control;

/// Restart scheduling and inactivity watchdog
pub mod restart;

/// Operator-facing status messages
pub mod status;

/// Cooperative shutdown signal
pub mod shutdown;

/// Worker orchestration
pub mod supervisor;

/// Configuration management
pub mod config;

// Re-export commonly used types
pub use error::{ConfigError, ControlError, TailError};
pub use supervisor::{ShutdownSummary, Supervisor};
