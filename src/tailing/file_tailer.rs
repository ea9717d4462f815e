use crate::error::TailError;
use log::debug;
use std::fs::{self, File, Metadata};
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;

/// Upper bound on bytes read from a file in a single poll
const MAX_READ_BYTES: u64 = 8 * 1024 * 1024;

/// Read position within a watched file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailCursor {
    pub path: PathBuf,
    /// Offset just past the last complete line handed out
    pub byte_offset: u64,
}

/// Lifecycle of a tailer once the file has been opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailState {
    /// File exists and is being polled at the normal interval
    Steady,
    /// File disappeared; polled at the backoff interval until it returns
    Missing,
    /// Monitoring ended; polls are no-ops
    Stopped,
}

/// Why the cursor was moved back to the start of the file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetReason {
    /// File shrank below the largest size seen so far
    Truncated,
    /// A different file now lives at the watched path
    Replaced,
}

/// Result of one successful poll
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollOutcome {
    /// Complete new lines in file order, without line terminators
    pub lines: Vec<String>,
    /// Number of bytes the cursor advanced by
    pub bytes_consumed: u64,
    /// File grew beyond the largest size seen so far
    pub grew: bool,
    /// Cursor was reset before reading
    pub reset: Option<ResetReason>,
    /// File came back after being missing
    pub recovered: bool,
}

/// Identity of the file behind a path, used to spot replacement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileIdentity {
    device: u64,
    inode: u64,
}

#[cfg(unix)]
fn identity_of(metadata: &Metadata) -> Option<FileIdentity> {
    use std::os::unix::fs::MetadataExt;
    Some(FileIdentity {
        device: metadata.dev(),
        inode: metadata.ino(),
    })
}

#[cfg(not(unix))]
fn identity_of(_metadata: &Metadata) -> Option<FileIdentity> {
    None
}

/// Incremental reader for one append-only file
///
/// Starts at the current end of the file so history is never replayed,
/// then hands out only complete lines appended since the previous poll.
/// Truncation, replacement and temporary disappearance are handled by
/// moving the cursor rather than by failing.
#[derive(Debug)]
pub struct FileTailer {
    cursor: TailCursor,
    state: TailState,
    /// Largest file size observed since the last reset
    high_water: u64,
    identity: Option<FileIdentity>,
}

impl FileTailer {
    /// Start tailing `path` from its current end
    ///
    /// # Errors
    ///
    /// Returns `TailError::NotFound` if the file does not exist, or another
    /// `TailError` if it cannot be inspected.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, TailError> {
        let path = path.into();
        let metadata = fs::metadata(&path).map_err(|e| TailError::from_io(&path, e))?;
        let size = metadata.len();

        debug!("Tailing {} from offset {}", path.display(), size);

        Ok(Self {
            cursor: TailCursor {
                path,
                byte_offset: size,
            },
            state: TailState::Steady,
            high_water: size,
            identity: identity_of(&metadata),
        })
    }

    pub fn cursor(&self) -> &TailCursor {
        &self.cursor
    }

    pub fn state(&self) -> TailState {
        self.state
    }

    /// End monitoring; later polls return an empty outcome
    pub fn stop(&mut self) {
        self.state = TailState::Stopped;
    }

    /// Check the file once and collect any newly completed lines
    ///
    /// # Errors
    ///
    /// Returns `TailError::NotFound` (and enters `Missing`) when the file is
    /// gone, or another `TailError` for any other I/O failure. All of these
    /// are transient: the next poll tries again.
    pub fn poll(&mut self) -> Result<PollOutcome, TailError> {
        if self.state == TailState::Stopped {
            return Ok(PollOutcome::default());
        }

        let metadata = match fs::metadata(&self.cursor.path) {
            Ok(metadata) => metadata,
            Err(e) => {
                let err = TailError::from_io(&self.cursor.path, e);
                if err.is_missing() {
                    self.state = TailState::Missing;
                }
                return Err(err);
            }
        };

        let size = metadata.len();
        let identity = identity_of(&metadata);
        let mut outcome = PollOutcome::default();

        if self.state == TailState::Missing {
            // Back again: pick up from its current end
            debug!(
                "{} reappeared with {} bytes",
                self.cursor.path.display(),
                size
            );
            self.state = TailState::Steady;
            self.cursor.byte_offset = size;
            self.high_water = size;
            self.identity = identity;
            outcome.recovered = true;
            return Ok(outcome);
        }

        if identity.is_some() && self.identity.is_some() && identity != self.identity {
            debug!("{} was replaced", self.cursor.path.display());
            self.identity = identity;
            self.reset_cursor();
            outcome.reset = Some(ResetReason::Replaced);
        } else if size < self.high_water {
            debug!(
                "{} truncated from {} to {} bytes",
                self.cursor.path.display(),
                self.high_water,
                size
            );
            self.reset_cursor();
            outcome.reset = Some(ResetReason::Truncated);
        }

        if size > self.high_water {
            self.high_water = size;
            outcome.grew = true;
        }

        if size > self.cursor.byte_offset {
            let (lines, consumed) = self.read_complete_lines(size)?;
            outcome.lines = lines;
            outcome.bytes_consumed = consumed;
        }

        Ok(outcome)
    }

    fn reset_cursor(&mut self) {
        self.cursor.byte_offset = 0;
        self.high_water = 0;
    }

    /// Read complete lines between the cursor and `size`
    fn read_complete_lines(&mut self, size: u64) -> Result<(Vec<String>, u64), TailError> {
        let path = &self.cursor.path;
        let start = self.cursor.byte_offset;
        let wanted = (size - start).min(MAX_READ_BYTES);

        // The file can vanish between the stat and the open
        let mut file = match File::open(path) {
            Ok(file) => file,
            Err(e) => {
                let err = TailError::from_io(path, e);
                if err.is_missing() {
                    self.state = TailState::Missing;
                }
                return Err(err);
            }
        };
        file.seek(SeekFrom::Start(start))
            .map_err(|e| TailError::from_io(path, e))?;

        let mut buffer = Vec::with_capacity(wanted as usize);
        file.take(wanted)
            .read_to_end(&mut buffer)
            .map_err(|e| TailError::from_io(path, e))?;

        let complete = match buffer.iter().rposition(|&b| b == b'\n') {
            Some(pos) => pos + 1,
            // A single line longer than the read bound is handed out as is
            None if buffer.len() as u64 == MAX_READ_BYTES => buffer.len(),
            None => 0,
        };

        let lines = buffer[..complete]
            .split_inclusive(|&b| b == b'\n')
            .map(|raw| {
                let line = raw.strip_suffix(b"\n").unwrap_or(raw);
                let line = line.strip_suffix(b"\r").unwrap_or(line);
                String::from_utf8_lossy(line).into_owned()
            })
            .collect();

        self.cursor.byte_offset = start + complete as u64;
        Ok((lines, complete as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use std::io::Write;
    use std::path::Path;
    use tempfile::TempDir;

    fn append(path: &Path, content: &str) {
        let mut file = OpenOptions::new().append(true).open(path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
    }

    fn setup(initial: &str) -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.error.log");
        fs::write(&path, initial).unwrap();
        (dir, path)
    }

    #[test]
    fn test_open_starts_at_end_of_file() {
        let (_dir, path) = setup("old line 1\nold line 2\n");
        let mut tailer = FileTailer::open(&path).unwrap();

        assert_eq!(tailer.cursor().byte_offset, 22);
        assert_eq!(tailer.state(), TailState::Steady);

        let outcome = tailer.poll().unwrap();
        assert!(outcome.lines.is_empty());
        assert!(!outcome.grew);
    }

    #[test]
    fn test_open_missing_file_fails() {
        let dir = TempDir::new().unwrap();
        let err = FileTailer::open(dir.path().join("nope.log")).unwrap_err();
        assert!(err.is_missing());
    }

    #[test]
    fn test_poll_returns_appended_lines_in_order() {
        let (_dir, path) = setup("history\n");
        let mut tailer = FileTailer::open(&path).unwrap();

        append(&path, "first\nsecond\n");
        let outcome = tailer.poll().unwrap();
        assert_eq!(outcome.lines, vec!["first", "second"]);
        assert_eq!(outcome.bytes_consumed, 13);
        assert!(outcome.grew);
        assert_eq!(tailer.cursor().byte_offset, 8 + 13);

        append(&path, "third\n");
        let outcome = tailer.poll().unwrap();
        assert_eq!(outcome.lines, vec!["third"]);
    }

    #[test]
    fn test_partial_line_waits_for_completion() {
        let (_dir, path) = setup("");
        let mut tailer = FileTailer::open(&path).unwrap();

        append(&path, "{\"level\":\"err");
        let outcome = tailer.poll().unwrap();
        assert!(outcome.lines.is_empty());
        assert!(outcome.grew);
        assert_eq!(tailer.cursor().byte_offset, 0);

        // No further growth: not reported as activity again
        let outcome = tailer.poll().unwrap();
        assert!(!outcome.grew);

        append(&path, "or\"}\nnext");
        let outcome = tailer.poll().unwrap();
        assert_eq!(outcome.lines, vec!["{\"level\":\"error\"}"]);
        assert_eq!(tailer.cursor().byte_offset, 18);
    }

    #[test]
    fn test_crlf_and_empty_lines() {
        let (_dir, path) = setup("");
        let mut tailer = FileTailer::open(&path).unwrap();

        append(&path, "a\r\n\nb\n");
        let outcome = tailer.poll().unwrap();
        assert_eq!(outcome.lines, vec!["a", "", "b"]);
    }

    #[test]
    fn test_truncation_resets_cursor_to_start() {
        let (_dir, path) = setup("0123456789\nabcdefghij\n");
        let mut tailer = FileTailer::open(&path).unwrap();

        fs::write(&path, "new\n").unwrap();
        let outcome = tailer.poll().unwrap();

        assert_eq!(outcome.reset, Some(ResetReason::Truncated));
        assert_eq!(outcome.lines, vec!["new"]);
        assert_eq!(tailer.cursor().byte_offset, 4);
    }

    #[test]
    fn test_truncation_to_empty_then_growth() {
        let (_dir, path) = setup("some history\n");
        let mut tailer = FileTailer::open(&path).unwrap();

        fs::write(&path, "").unwrap();
        let outcome = tailer.poll().unwrap();
        assert_eq!(outcome.reset, Some(ResetReason::Truncated));
        assert!(outcome.lines.is_empty());
        assert_eq!(tailer.cursor().byte_offset, 0);

        append(&path, "fresh\n");
        let outcome = tailer.poll().unwrap();
        assert_eq!(outcome.reset, None);
        assert_eq!(outcome.lines, vec!["fresh"]);
    }

    #[test]
    #[cfg(unix)]
    fn test_replacement_reads_new_file_from_start() {
        let (dir, path) = setup("old content that is long\n");
        let mut tailer = FileTailer::open(&path).unwrap();

        // Rotate: move the old file away and create a larger new one
        fs::rename(&path, dir.path().join("app.error.log.1")).unwrap();
        fs::write(&path, "rotated line one is even longer\nline two\n").unwrap();

        let outcome = tailer.poll().unwrap();
        assert_eq!(outcome.reset, Some(ResetReason::Replaced));
        assert_eq!(
            outcome.lines,
            vec!["rotated line one is even longer", "line two"]
        );
    }

    #[test]
    fn test_missing_then_reappearing_file() {
        let (_dir, path) = setup("before\n");
        let mut tailer = FileTailer::open(&path).unwrap();

        fs::remove_file(&path).unwrap();
        let err = tailer.poll().unwrap_err();
        assert!(err.is_missing());
        assert_eq!(tailer.state(), TailState::Missing);

        // Still missing
        assert!(tailer.poll().unwrap_err().is_missing());

        fs::write(&path, "written while away\n").unwrap();
        let outcome = tailer.poll().unwrap();
        assert!(outcome.recovered);
        assert!(outcome.lines.is_empty());
        assert_eq!(tailer.state(), TailState::Steady);
        assert_eq!(tailer.cursor().byte_offset, 19);

        append(&path, "after\n");
        let outcome = tailer.poll().unwrap();
        assert_eq!(outcome.lines, vec!["after"]);
    }

    #[test]
    fn test_file_vanishing_before_read_enters_missing() {
        let (_dir, path) = setup("");
        let mut tailer = FileTailer::open(&path).unwrap();
        append(&path, "line\n");
        fs::remove_file(&path).unwrap();

        // Size as seen by a stat that ran before the removal
        let err = tailer.read_complete_lines(5).unwrap_err();
        assert!(err.is_missing());
        assert_eq!(tailer.state(), TailState::Missing);
        assert_eq!(tailer.cursor().byte_offset, 0);

        // The follow-up poll is still part of the same absence
        assert!(tailer.poll().unwrap_err().is_missing());
        assert_eq!(tailer.state(), TailState::Missing);

        fs::write(&path, "new\n").unwrap();
        assert!(tailer.poll().unwrap().recovered);
        assert_eq!(tailer.state(), TailState::Steady);
    }

    #[test]
    fn test_stopped_tailer_ignores_growth() {
        let (_dir, path) = setup("");
        let mut tailer = FileTailer::open(&path).unwrap();
        tailer.stop();

        append(&path, "ignored\n");
        let outcome = tailer.poll().unwrap();
        assert_eq!(outcome, PollOutcome::default());
        assert_eq!(tailer.state(), TailState::Stopped);
    }

    #[test]
    fn test_invalid_utf8_is_decoded_lossily() {
        let (_dir, path) = setup("");
        let mut tailer = FileTailer::open(&path).unwrap();

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[b'o', b'k', 0xff, b'\n']).unwrap();

        let outcome = tailer.poll().unwrap();
        assert_eq!(outcome.lines.len(), 1);
        assert!(outcome.lines[0].starts_with("ok"));
    }
}
