use crate::config::ProcessManagerConfig;
use crate::error::ControlError;
use crate::events::ProcessAction;
use log::{debug, warn};
use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

/// Fallback bound when the configured timeout cannot be represented
const MAX_TIMEOUT_SECS: u64 = 86_400;

/// Outcome reported by the external process manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub success: bool,
    /// Captured output, for status messages
    pub diagnostics: String,
}

/// External service able to stop, start and restart named processes
#[cfg_attr(test, mockall::automock)]
pub trait ProcessManager: Send + Sync {
    /// Run `action` against `process_name`
    ///
    /// Returns `Err(ControlError::Unavailable)` when the manager itself
    /// cannot be reached; a manager that runs but refuses the action
    /// returns `Ok` with `success == false`.
    fn execute(
        &self,
        action: ProcessAction,
        process_name: &str,
    ) -> Result<ExecutionResult, ControlError>;
}

/// Process manager driven through a command-line tool such as `pm2`
///
/// Runs `<program> <action> <process_name>` and waits up to `timeout` for
/// it to finish.
#[derive(Debug, Clone)]
pub struct CommandProcessManager {
    program: String,
    timeout: Duration,
}

impl CommandProcessManager {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn from_config(config: &ProcessManagerConfig) -> Self {
        Self::new(config.program.clone(), config.timeout())
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Drain a child pipe on its own thread so a chatty tool cannot fill
    /// the pipe and stall
    ///
    /// Output arrives in chunks so whatever was written before a deadline
    /// can be collected even if a background process keeps the pipe open.
    fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<Receiver<Vec<u8>>> {
        pipe.map(|mut pipe| {
            let (tx, rx) = mpsc::channel();
            thread::spawn(move || {
                let mut chunk = [0u8; 4096];
                loop {
                    match pipe.read(&mut chunk) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if tx.send(chunk[..n].to_vec()).is_err() {
                                break;
                            }
                        }
                    }
                }
            });
            rx
        })
    }

    /// Gather drained output until the pipe closes or `deadline` passes
    fn collect(receiver: Option<Receiver<Vec<u8>>>, deadline: Instant) -> String {
        let Some(receiver) = receiver else {
            return String::new();
        };

        let mut buf = Vec::new();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match receiver.recv_timeout(remaining) {
                Ok(chunk) => buf.extend_from_slice(&chunk),
                Err(RecvTimeoutError::Timeout) => {
                    debug!("Output pipe still open at deadline, leaving its reader detached");
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        String::from_utf8_lossy(&buf).trim().to_string()
    }

    fn deadline(&self) -> Instant {
        let now = Instant::now();
        now.checked_add(self.timeout)
            .unwrap_or_else(|| now + Duration::from_secs(MAX_TIMEOUT_SECS))
    }

    /// Poll the child until it exits or `deadline` passes
    fn wait_until(
        child: &mut Child,
        deadline: Instant,
    ) -> std::io::Result<Option<std::process::ExitStatus>> {
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(Some(status));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            thread::sleep(Duration::from_millis(25));
        }
    }
}

impl ProcessManager for CommandProcessManager {
    fn execute(
        &self,
        action: ProcessAction,
        process_name: &str,
    ) -> Result<ExecutionResult, ControlError> {
        let unavailable = |reason: String| ControlError::Unavailable {
            action,
            process: process_name.to_string(),
            reason,
        };

        debug!("Running {} {} {}", self.program, action, process_name);

        let mut child = Command::new(&self.program)
            .arg(action.as_str())
            .arg(process_name)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| unavailable(format!("failed to spawn {}: {}", self.program, e)))?;

        let deadline = self.deadline();
        let stdout = Self::drain(child.stdout.take());
        let stderr = Self::drain(child.stderr.take());

        let status = match Self::wait_until(&mut child, deadline) {
            Ok(Some(status)) => status,
            Ok(None) => {
                warn!(
                    "{} {} {} did not finish within {:?}, killing it",
                    self.program, action, process_name, self.timeout
                );
                let _ = child.kill();
                let _ = child.wait();
                return Err(unavailable(format!("timed out after {:?}", self.timeout)));
            }
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(unavailable(format!("failed to wait for {}: {}", self.program, e)));
            }
        };

        // A background process forked by the tool may hold the pipes open
        let out = Self::collect(stdout, deadline);
        let err = Self::collect(stderr, deadline);
        let diagnostics = match (out.is_empty(), err.is_empty()) {
            (false, false) => format!("{}\n{}", out, err),
            (false, true) => out,
            (true, false) => err,
            (true, true) => format!("exit status: {}", status),
        };

        Ok(ExecutionResult {
            success: status.success(),
            diagnostics,
        })
    }
}
