/// Incremental reader for one append-only file
pub mod file_tailer;

/// Last-growth timestamps per watched file
pub mod activity;

/// Per-file polling loop tying the tailer to the matcher and controller
pub mod worker;

pub use activity::ActivityTracker;
pub use file_tailer::{FileTailer, PollOutcome, ResetReason, TailCursor, TailState};
pub use worker::TailWorker;
