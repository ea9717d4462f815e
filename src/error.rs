use crate::events::ProcessAction;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while tailing a watched file
///
/// Every variant is transient once monitoring is under way: the tail worker
/// logs it, backs off and polls again.
#[derive(Error, Debug)]
pub enum TailError {
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Permission denied: {}", .0.display())]
    PermissionDenied(PathBuf),

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TailError {
    /// Classify an I/O error raised while touching `path`
    pub fn from_io(path: &std::path::Path, source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::NotFound => TailError::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => {
                TailError::PermissionDenied(path.to_path_buf())
            }
            _ => TailError::Io {
                path: path.to_path_buf(),
                source,
            },
        }
    }

    /// Whether the error means the file is (temporarily) absent
    pub fn is_missing(&self) -> bool {
        matches!(self, TailError::NotFound(_))
    }
}

/// Errors returned by the process manager or the target controller
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    #[error("Process manager unavailable for {action} {process}: {reason}")]
    Unavailable {
        action: ProcessAction,
        process: String,
        reason: String,
    },

    #[error("Failed to {action} {process}: {diagnostics}")]
    ActionFailed {
        action: ProcessAction,
        process: String,
        diagnostics: String,
    },
}

/// Errors that can occur during configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),

    #[error("Invalid configuration value: {0}")]
    ValidationError(String),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}
