use crate::control::TargetController;
use crate::events::WatchTarget;
use crate::matcher::LineMatcher;
use crate::restart::RestartScheduler;
use crate::shutdown::ShutdownSignal;
use crate::status::StatusSink;
use crate::tailing::{ActivityTracker, FileTailer, ResetReason, TailState};
use chrono::Utc;
use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;

/// Polling loop for one watch target
///
/// Owns the target's [`FileTailer`]; everything shared with other workers
/// goes through the activity tracker, controller and scheduler.
pub struct TailWorker {
    target: WatchTarget,
    matcher: Arc<LineMatcher>,
    activity: Arc<ActivityTracker>,
    controller: Arc<TargetController>,
    scheduler: Arc<RestartScheduler>,
    sink: Arc<dyn StatusSink>,
    shutdown: ShutdownSignal,
    poll_interval: Duration,
    backoff_interval: Duration,
}

impl TailWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        target: WatchTarget,
        matcher: Arc<LineMatcher>,
        activity: Arc<ActivityTracker>,
        controller: Arc<TargetController>,
        scheduler: Arc<RestartScheduler>,
        sink: Arc<dyn StatusSink>,
        shutdown: ShutdownSignal,
        poll_interval: Duration,
        backoff_interval: Duration,
    ) -> Self {
        Self {
            target,
            matcher,
            activity,
            controller,
            scheduler,
            sink,
            shutdown,
            poll_interval,
            backoff_interval,
        }
    }

    /// Tail the target's file until shutdown
    ///
    /// Returns early, without affecting other workers, if the file does not
    /// exist when monitoring begins.
    pub fn run(self) {
        self.sink.info(&format!(
            "Monitoring log file {} for {}",
            self.target.path.display(),
            self.target.display_name
        ));

        let mut tailer = match self.initialize() {
            Some(tailer) => tailer,
            None => return,
        };

        while self.shutdown.is_running() {
            let delay = self.poll_once(&mut tailer);
            if !self.shutdown.sleep(delay) {
                break;
            }
        }

        tailer.stop();
        info!("Stopped monitoring {}", self.target.path.display());
    }

    /// Open the tailer at the file's current end
    fn initialize(&self) -> Option<FileTailer> {
        loop {
            match FileTailer::open(&self.target.path) {
                Ok(tailer) => return Some(tailer),
                Err(e) if e.is_missing() => {
                    self.sink.error(&format!(
                        "Log file not found: {}; monitoring of {} ends",
                        self.target.path.display(),
                        self.target.display_name
                    ));
                    return None;
                }
                Err(e) => {
                    self.sink.error(&format!(
                        "Cannot open {} for {}: {}; retrying in {:?}",
                        self.target.path.display(),
                        self.target.display_name,
                        e,
                        self.backoff_interval
                    ));
                    if !self.shutdown.sleep(self.backoff_interval) {
                        return None;
                    }
                }
            }
        }
    }

    /// Run one poll and return how long to wait before the next
    pub(crate) fn poll_once(&self, tailer: &mut FileTailer) -> Duration {
        let was_missing = tailer.state() == TailState::Missing;

        match tailer.poll() {
            Ok(outcome) => {
                if outcome.recovered {
                    self.sink.info(&format!(
                        "Log file {} is available again, resuming monitoring of {}",
                        self.target.path.display(),
                        self.target.display_name
                    ));
                }
                match outcome.reset {
                    Some(ResetReason::Truncated) => self.sink.warning(&format!(
                        "Log file {} was truncated, reading from the start",
                        self.target.path.display()
                    )),
                    Some(ResetReason::Replaced) => self.sink.warning(&format!(
                        "Log file {} was replaced, reading from the start",
                        self.target.path.display()
                    )),
                    None => {}
                }
                if outcome.grew {
                    self.activity.record_activity(&self.target.path, Utc::now());
                }
                self.process_lines(&outcome.lines);
                self.poll_interval
            }
            Err(e) if e.is_missing() => {
                if !was_missing {
                    self.sink.warning(&format!(
                        "Log file temporarily missing: {}",
                        self.target.path.display()
                    ));
                }
                self.backoff_interval
            }
            Err(e) => {
                self.sink.error(&format!(
                    "Unexpected error while monitoring {}: {}",
                    self.target.display_name, e
                ));
                self.backoff_interval
            }
        }
    }

    /// Scan a batch in file order, stopping at the first match
    ///
    /// Lines after the first match in the same batch are discarded. Returns
    /// `true` if a match was acted on.
    pub(crate) fn process_lines(&self, lines: &[String]) -> bool {
        for line in lines {
            if !self.shutdown.is_running() {
                return false;
            }
            if self.matcher.matches(line) {
                debug!("Matched error line in {}: {}", self.target.path.display(), line);
                self.handle_match();
                return true;
            }
        }
        false
    }

    fn handle_match(&self) {
        let target = &self.target;
        self.sink.warning(&format!(
            "Error detected in {}, stopping the app",
            target.display_name
        ));

        // A failed stop is reported by the controller and left to the operator
        if self
            .controller
            .stop(&target.process_name, &target.display_name)
            .is_err()
        {
            return;
        }

        if target.restart_after_stop {
            self.scheduler.schedule(
                &target.process_name,
                &target.display_name,
                target.restart_delay,
            );
        } else {
            self.sink.warning(&format!(
                "{} stays stopped until it is restarted manually",
                target.display_name
            ));
        }
    }
}
