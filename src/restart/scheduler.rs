use crate::control::TargetController;
use crate::events::Timestamp;
use crate::shutdown::ShutdownSignal;
use crate::status::StatusSink;
use chrono::{DateTime, Utc};
use log::{debug, info};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// A deferred restart owed to a stopped process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartObligation {
    pub process_name: String,
    pub display_name: String,
    pub due_at: Timestamp,
    pub scheduled_at: Timestamp,
    /// Failed restart attempts so far
    pub attempts: u32,
    /// Bumped on every (re)schedule so stale sweep results can be discarded
    generation: u64,
}

/// Processes acted on by one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub restarted: Vec<String>,
    pub failed: Vec<String>,
}

#[derive(Debug, Default)]
struct ObligationSet {
    by_process: HashMap<String, RestartObligation>,
    next_generation: u64,
}

/// Queue of pending restarts, at most one per process name
///
/// The obligation set is locked only while it is read or mutated. A sweep
/// copies due obligations out under the lock, calls the controller without
/// holding it, then reconciles each result under the lock. If the
/// obligation was rescheduled while its restart was in flight, the newer
/// schedule wins and the stale result is dropped.
pub struct RestartScheduler {
    obligations: Mutex<ObligationSet>,
    controller: Arc<TargetController>,
    sink: Arc<dyn StatusSink>,
    retry_delay: Duration,
}

/// `now + delay`, saturating at the latest representable instant
fn due_after(now: Timestamp, delay: Duration) -> Timestamp {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|delay| now.checked_add_signed(delay))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

impl RestartScheduler {
    pub fn new(
        controller: Arc<TargetController>,
        sink: Arc<dyn StatusSink>,
        retry_delay: Duration,
    ) -> Self {
        Self {
            obligations: Mutex::new(ObligationSet::default()),
            controller,
            sink,
            retry_delay,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ObligationSet> {
        self.obligations.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Owe a restart of `process_name` after `delay`
    ///
    /// Replaces any obligation already pending for the same process.
    /// Returns `true` if an existing obligation was refreshed.
    pub fn schedule(&self, process_name: &str, display_name: &str, delay: Duration) -> bool {
        self.schedule_at(process_name, display_name, delay, Utc::now())
    }

    pub fn schedule_at(
        &self,
        process_name: &str,
        display_name: &str,
        delay: Duration,
        now: Timestamp,
    ) -> bool {
        let due_at = due_after(now, delay);
        let refreshed = {
            let mut set = self.lock();
            set.next_generation += 1;
            let obligation = RestartObligation {
                process_name: process_name.to_string(),
                display_name: display_name.to_string(),
                due_at,
                scheduled_at: now,
                attempts: 0,
                generation: set.next_generation,
            };
            set.by_process
                .insert(process_name.to_string(), obligation)
                .is_some()
        };

        let verb = if refreshed { "Rescheduled" } else { "Scheduled" };
        self.sink.info(&format!(
            "{} restart of {} for {}",
            verb,
            display_name,
            due_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        refreshed
    }

    /// Pending obligations ordered by due time
    pub fn pending(&self) -> Vec<RestartObligation> {
        let mut pending: Vec<RestartObligation> = self.lock().by_process.values().cloned().collect();
        pending.sort_by(|a, b| {
            a.due_at
                .cmp(&b.due_at)
                .then_with(|| a.process_name.cmp(&b.process_name))
        });
        pending
    }

    pub fn pending_for(&self, process_name: &str) -> Option<RestartObligation> {
        self.lock().by_process.get(process_name).cloned()
    }

    pub fn sweep(&self) -> SweepReport {
        self.sweep_at(Utc::now())
    }

    /// Attempt every restart due at `now`
    ///
    /// Successful restarts consume their obligation; failed ones stay
    /// pending with `due_at` pushed to `now + retry_delay`.
    pub fn sweep_at(&self, now: Timestamp) -> SweepReport {
        let due: Vec<RestartObligation> = self
            .lock()
            .by_process
            .values()
            .filter(|obligation| obligation.due_at <= now)
            .cloned()
            .collect();

        let mut report = SweepReport::default();
        for obligation in due {
            debug!(
                "Restart of {} due since {}",
                obligation.display_name, obligation.due_at
            );
            let succeeded = self
                .controller
                .restart(&obligation.process_name, &obligation.display_name)
                .is_ok();

            let mut set = self.lock();
            let current = match set.by_process.get_mut(&obligation.process_name) {
                Some(current) if current.generation == obligation.generation => current,
                _ => {
                    debug!(
                        "Obligation for {} changed during restart, keeping the newer one",
                        obligation.process_name
                    );
                    continue;
                }
            };

            if succeeded {
                set.by_process.remove(&obligation.process_name);
                report.restarted.push(obligation.process_name);
            } else {
                current.attempts += 1;
                current.due_at = due_after(now, self.retry_delay);
                let retry_at = current.due_at;
                drop(set);

                self.sink.warning(&format!(
                    "Restart of {} failed, retrying at {}",
                    obligation.display_name,
                    retry_at.format("%Y-%m-%d %H:%M:%S UTC")
                ));
                report.failed.push(obligation.process_name);
            }
        }

        report
    }

    /// Sweep every `interval` until shutdown
    pub fn run(&self, shutdown: &ShutdownSignal, interval: Duration) {
        info!("Restart scheduler started (sweep every {:?})", interval);
        while shutdown.sleep(interval) {
            self.sweep();
        }
        info!("Restart scheduler stopped");
    }
}
