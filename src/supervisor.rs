//! Worker orchestration
//!
//! The supervisor spawns one tail worker per watch target plus the restart
//! scheduler and inactivity watchdog, and shuts them all down cooperatively.

use crate::config::{Config, TimingConfig};
use crate::control::{ProcessManager, StoppedApp, StoppedAppsLedger, TargetController};
use crate::error::ConfigError;
use crate::events::WatchTarget;
use crate::matcher::LineMatcher;
use crate::restart::{InactivityWatchdog, RestartObligation, RestartScheduler};
use crate::shutdown::ShutdownSignal;
use crate::status::StatusSink;
use crate::tailing::{ActivityTracker, TailWorker};
use chrono::Utc;
use log::{error, info};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// State reported when monitoring ends
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownSummary {
    /// Apps stopped because of detected errors, in stop order
    pub stopped: Vec<StoppedApp>,
    /// Restarts still owed when monitoring ended
    pub pending: Vec<RestartObligation>,
}

/// Owns every worker thread and the structures they share
pub struct Supervisor {
    targets: Arc<Vec<WatchTarget>>,
    timing: TimingConfig,
    matcher: Arc<LineMatcher>,
    activity: Arc<ActivityTracker>,
    ledger: Arc<StoppedAppsLedger>,
    controller: Arc<TargetController>,
    scheduler: Arc<RestartScheduler>,
    sink: Arc<dyn StatusSink>,
    shutdown: ShutdownSignal,
    thread_handles: Vec<JoinHandle<()>>,
}

impl Supervisor {
    /// Build a supervisor from validated configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if the configuration is not
    /// usable, e.g. when no targets are configured.
    pub fn new(
        config: &Config,
        manager: Arc<dyn ProcessManager>,
        sink: Arc<dyn StatusSink>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let ledger = Arc::new(StoppedAppsLedger::new());
        let controller = Arc::new(TargetController::new(
            manager,
            Arc::clone(&sink),
            Arc::clone(&ledger),
        ));
        let scheduler = Arc::new(RestartScheduler::new(
            Arc::clone(&controller),
            Arc::clone(&sink),
            config.timing.retry_delay(),
        ));

        Ok(Self {
            targets: Arc::new(config.watch_targets()),
            timing: config.timing.clone(),
            matcher: Arc::new(LineMatcher::new(config.signature.clone())),
            activity: Arc::new(ActivityTracker::new()),
            ledger,
            controller,
            scheduler,
            sink,
            shutdown: ShutdownSignal::new(),
            thread_handles: Vec::new(),
        })
    }

    /// Handle used to request shutdown, e.g. from a signal handler
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    pub fn targets(&self) -> &[WatchTarget] {
        &self.targets
    }

    pub fn scheduler(&self) -> &Arc<RestartScheduler> {
        &self.scheduler
    }

    pub fn ledger(&self) -> &Arc<StoppedAppsLedger> {
        &self.ledger
    }

    pub fn activity(&self) -> &Arc<ActivityTracker> {
        &self.activity
    }

    /// Spawn all worker threads and return immediately
    ///
    /// # Errors
    ///
    /// Returns an I/O error if a thread cannot be spawned; threads already
    /// started are left running and are joined by [`stop`](Self::stop).
    pub fn start(&mut self) -> std::io::Result<()> {
        self.sink.info("Starting log file monitoring");

        // Inactivity is measured from the moment monitoring begins
        let now = Utc::now();
        for target in self.targets.iter() {
            self.activity.record_activity(&target.path, now);
        }

        for target in self.targets.iter() {
            let worker = TailWorker::new(
                target.clone(),
                Arc::clone(&self.matcher),
                Arc::clone(&self.activity),
                Arc::clone(&self.controller),
                Arc::clone(&self.scheduler),
                Arc::clone(&self.sink),
                self.shutdown.clone(),
                self.timing.poll_interval(),
                self.timing.backoff_interval(),
            );
            let handle = thread::Builder::new()
                .name(format!("tail-{}", target.process_name))
                .spawn(move || worker.run())?;
            self.thread_handles.push(handle);
        }

        let scheduler = Arc::clone(&self.scheduler);
        let shutdown = self.shutdown.clone();
        let interval = self.timing.scheduler_interval();
        let handle = thread::Builder::new()
            .name("restart-scheduler".to_string())
            .spawn(move || scheduler.run(&shutdown, interval))?;
        self.thread_handles.push(handle);

        let watchdog = InactivityWatchdog::new(
            &self.targets,
            Arc::clone(&self.activity),
            Arc::clone(&self.controller),
            Arc::clone(&self.sink),
            self.timing.inactivity_timeout(),
        );
        let shutdown = self.shutdown.clone();
        let interval = self.timing.watchdog_interval();
        let handle = thread::Builder::new()
            .name("inactivity-watchdog".to_string())
            .spawn(move || watchdog.run(&shutdown, interval))?;
        self.thread_handles.push(handle);

        info!(
            "Started {} worker thread(s) for {} target(s)",
            self.thread_handles.len(),
            self.targets.len()
        );
        Ok(())
    }

    /// Request shutdown, join every worker and report the final summary
    ///
    /// Workers finish their current iteration; none is interrupted.
    pub fn stop(&mut self) -> ShutdownSummary {
        self.sink.info("Stopping log file monitoring");
        self.shutdown.trigger();

        for handle in self.thread_handles.drain(..) {
            let name = handle.thread().name().unwrap_or("worker").to_string();
            if handle.join().is_err() {
                error!("Worker thread {} panicked", name);
            }
        }

        let summary = ShutdownSummary {
            stopped: self.ledger.entries(),
            pending: self.scheduler.pending(),
        };
        self.report_summary(&summary);
        summary
    }

    fn report_summary(&self, summary: &ShutdownSummary) {
        if summary.stopped.is_empty() {
            self.sink.info("No apps were stopped during this session");
        } else {
            self.sink.info(&format!(
                "Apps stopped during this session: {}",
                summary.stopped.len()
            ));
            for app in &summary.stopped {
                self.sink.info(&format!(
                    "  {} ({}) stopped at {}",
                    app.display_name,
                    app.process_name,
                    app.stopped_at.format("%Y-%m-%d %H:%M:%S UTC")
                ));
            }
        }

        for obligation in &summary.pending {
            self.sink.warning(&format!(
                "Restart of {} ({}) still pending, was due at {}",
                obligation.display_name,
                obligation.process_name,
                obligation.due_at.format("%Y-%m-%d %H:%M:%S UTC")
            ));
        }

        self.sink.info("Log file monitoring stopped");
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        if !self.thread_handles.is_empty() {
            self.shutdown.trigger();
            for handle in self.thread_handles.drain(..) {
                let _ = handle.join();
            }
        }
    }
}
