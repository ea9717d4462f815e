//! Operator-facing status reporting
//!
//! Components report what they did (stops, restarts, missing files) through a
//! [`StatusSink`]. Sinks must never block the caller on I/O.

use chrono::Local;
use log::{error, info, warn};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

/// Severity of a status message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StatusLevel {
    Info,
    Warning,
    Error,
}

/// Destination for textual status messages
pub trait StatusSink: Send + Sync {
    /// Deliver one message; must return promptly
    fn report(&self, level: StatusLevel, message: &str);

    fn info(&self, message: &str) {
        self.report(StatusLevel::Info, message);
    }

    fn warning(&self, message: &str) {
        self.report(StatusLevel::Warning, message);
    }

    fn error(&self, message: &str) {
        self.report(StatusLevel::Error, message);
    }
}

/// Sink that forwards every message to the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl StatusSink for LogSink {
    fn report(&self, level: StatusLevel, message: &str) {
        match level {
            StatusLevel::Info => info!("{}", message),
            StatusLevel::Warning => warn!("{}", message),
            StatusLevel::Error => error!("{}", message),
        }
    }
}

/// Sink that appends timestamped lines to a status file
///
/// Lines are handed to a dedicated writer thread over a channel, so
/// `report` never waits on the disk. Every message is also echoed through
/// [`LogSink`].
pub struct FileSink {
    path: PathBuf,
    sender: Option<Sender<String>>,
    writer: Option<JoinHandle<()>>,
}

impl FileSink {
    /// Open (or create) the status file and start the writer thread
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the parent directory cannot be created or the
    /// file cannot be opened for appending.
    pub fn open(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        let (sender, receiver) = mpsc::channel::<String>();
        let thread_path = path.to_path_buf();

        let writer = thread::spawn(move || {
            // Ends once every sender is dropped and the queue is drained
            for entry in receiver {
                if let Err(e) = file.write_all(entry.as_bytes()) {
                    error!(
                        "Failed to write status line to {}: {}",
                        thread_path.display(),
                        e
                    );
                }
            }
            let _ = file.flush();
        });

        Ok(Self {
            path: path.to_path_buf(),
            sender: Some(sender),
            writer: Some(writer),
        })
    }

    fn format_entry(message: &str) -> String {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        format!("[{}] {}\n", timestamp, message)
    }
}

impl StatusSink for FileSink {
    fn report(&self, level: StatusLevel, message: &str) {
        LogSink.report(level, message);
        if let Some(ref sender) = self.sender {
            if sender.send(Self::format_entry(message)).is_err() {
                warn!("Status writer for {} has stopped", self.path.display());
            }
        }
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        // Closing the channel lets the writer drain and exit
        self.sender.take();
        if let Some(handle) = self.writer.take() {
            let _ = handle.join();
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingSink;
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_sink_appends_timestamped_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("status.log");

        {
            let sink = FileSink::open(&path).unwrap();
            sink.info("first message");
            sink.error("second message");
        } // drop flushes the writer

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("] first message"));
        assert!(lines[1].ends_with("] second message"));
    }

    #[test]
    fn test_file_sink_appends_to_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("status.log");
        std::fs::write(&path, "existing\n").unwrap();

        {
            let sink = FileSink::open(&path).unwrap();
            sink.warning("appended");
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("existing\n"));
        assert!(contents.contains("] appended"));
    }

    #[test]
    fn test_recording_sink_levels() {
        let sink = RecordingSink::default();
        sink.info("a");
        sink.warning("b");
        sink.error("c");

        let levels: Vec<StatusLevel> = sink.messages().into_iter().map(|(l, _)| l).collect();
        assert_eq!(
            levels,
            vec![StatusLevel::Info, StatusLevel::Warning, StatusLevel::Error]
        );
        assert!(sink.contains("b"));
        assert_eq!(sink.count_containing("d"), 0);
    }
}
