use crate::control::ledger::StoppedAppsLedger;
use crate::control::process_manager::ProcessManager;
use crate::error::ControlError;
use crate::events::ProcessAction;
use crate::status::StatusSink;
use log::debug;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Successful action against a managed process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionReport {
    pub action: ProcessAction,
    pub process_name: String,
    pub diagnostics: String,
}

/// Issues stop/start/restart calls and reports their outcome
///
/// Failures are returned to the caller, which owns the retry policy. Restarts
/// of the same process are serialized so the scheduler and the inactivity
/// watchdog can never restart one process concurrently.
pub struct TargetController {
    manager: Arc<dyn ProcessManager>,
    sink: Arc<dyn StatusSink>,
    ledger: Arc<StoppedAppsLedger>,
    restart_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TargetController {
    pub fn new(
        manager: Arc<dyn ProcessManager>,
        sink: Arc<dyn StatusSink>,
        ledger: Arc<StoppedAppsLedger>,
    ) -> Self {
        Self {
            manager,
            sink,
            ledger,
            restart_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn ledger(&self) -> &Arc<StoppedAppsLedger> {
        &self.ledger
    }

    /// Stop the process and record it in the stopped-apps ledger
    ///
    /// # Errors
    ///
    /// Returns the `ControlError` from the process manager; the stop is not
    /// retried.
    pub fn stop(&self, process_name: &str, display_name: &str) -> Result<ActionReport, ControlError> {
        let report = self.execute(ProcessAction::Stop, process_name, display_name)?;
        self.ledger.record(display_name, process_name);
        Ok(report)
    }

    pub fn start(&self, process_name: &str, display_name: &str) -> Result<ActionReport, ControlError> {
        self.execute(ProcessAction::Start, process_name, display_name)
    }

    /// Restart the process, waiting for any restart of the same process
    /// already in flight
    pub fn restart(
        &self,
        process_name: &str,
        display_name: &str,
    ) -> Result<ActionReport, ControlError> {
        let lock = self.restart_lock(process_name);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
        self.execute(ProcessAction::Restart, process_name, display_name)
    }

    fn restart_lock(&self, process_name: &str) -> Arc<Mutex<()>> {
        let mut locks = self.restart_locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            locks
                .entry(process_name.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    fn execute(
        &self,
        action: ProcessAction,
        process_name: &str,
        display_name: &str,
    ) -> Result<ActionReport, ControlError> {
        debug!("Issuing {} for {} ({})", action, display_name, process_name);

        let result = match self.manager.execute(action, process_name) {
            Ok(result) => result,
            Err(e) => {
                self.sink.error(&format!("Error during {} of {}: {}", action, display_name, e));
                return Err(e);
            }
        };

        if !result.success {
            let err = ControlError::ActionFailed {
                action,
                process: process_name.to_string(),
                diagnostics: result.diagnostics,
            };
            self.sink.error(&format!("Error during {} of {}: {}", action, display_name, err));
            return Err(err);
        }

        self.sink.info(&format!("{} {} successfully", past_tense(action), display_name));
        if !result.diagnostics.is_empty() {
            self.sink.info(&format!("Output: {}", result.diagnostics));
        }

        Ok(ActionReport {
            action,
            process_name: process_name.to_string(),
            diagnostics: result.diagnostics,
        })
    }
}

fn past_tense(action: ProcessAction) -> &'static str {
    match action {
        ProcessAction::Stop => "Stopped",
        ProcessAction::Start => "Started",
        ProcessAction::Restart => "Restarted",
    }
}
