use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Shared cooperative shutdown flag
///
/// Workers check [`is_running`](Self::is_running) at the top of each loop
/// iteration and sleep through [`sleep`](Self::sleep), which wakes as soon
/// as shutdown is requested instead of waiting out the full interval.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    /// Create a signal in the running state
    pub fn new() -> Self {
        Self {
            inner: Arc::new((Mutex::new(true), Condvar::new())),
        }
    }

    fn running(&self) -> MutexGuard<'_, bool> {
        self.inner.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_running(&self) -> bool {
        *self.running()
    }

    /// Request shutdown and wake every sleeping worker
    pub fn trigger(&self) {
        let mut running = self.running();
        *running = false;
        self.inner.1.notify_all();
    }

    /// Sleep for up to `duration`
    ///
    /// Returns `true` if still running afterwards, `false` if shutdown was
    /// requested before or during the sleep.
    pub fn sleep(&self, duration: Duration) -> bool {
        let Some(deadline) = Instant::now().checked_add(duration) else {
            // Too far out to represent: wait for shutdown itself
            self.wait();
            return false;
        };
        let mut running = self.running();

        while *running {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            running = match self.inner.1.wait_timeout(running, deadline - now) {
                Ok((guard, _)) => guard,
                Err(e) => e.into_inner().0,
            };
        }

        *running
    }

    /// Block until shutdown is requested
    pub fn wait(&self) {
        let mut running = self.running();
        while *running {
            running = match self.inner.1.wait(running) {
                Ok(guard) => guard,
                Err(e) => e.into_inner(),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_new_signal_is_running() {
        let signal = ShutdownSignal::new();
        assert!(signal.is_running());
    }

    #[test]
    fn test_sleep_returns_true_when_not_triggered() {
        let signal = ShutdownSignal::new();
        let start = Instant::now();
        assert!(signal.sleep(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_trigger_wakes_sleepers_promptly() {
        let signal = ShutdownSignal::new();
        let sleeper = signal.clone();

        let handle = thread::spawn(move || {
            let start = Instant::now();
            let still_running = sleeper.sleep(Duration::from_secs(30));
            (still_running, start.elapsed())
        });

        thread::sleep(Duration::from_millis(50));
        signal.trigger();

        let (still_running, elapsed) = handle.join().unwrap();
        assert!(!still_running);
        assert!(elapsed < Duration::from_secs(5));
    }

    #[test]
    fn test_sleep_after_trigger_returns_immediately() {
        let signal = ShutdownSignal::new();
        signal.trigger();
        let start = Instant::now();
        assert!(!signal.sleep(Duration::from_secs(30)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_unbounded_sleep_ends_on_trigger() {
        let signal = ShutdownSignal::new();
        let sleeper = signal.clone();
        let handle = thread::spawn(move || sleeper.sleep(Duration::MAX));

        thread::sleep(Duration::from_millis(20));
        signal.trigger();
        assert!(!handle.join().unwrap());
    }

    #[test]
    fn test_wait_returns_after_trigger() {
        let signal = ShutdownSignal::new();
        let waiter = signal.clone();
        let handle = thread::spawn(move || waiter.wait());

        thread::sleep(Duration::from_millis(20));
        signal.trigger();
        handle.join().unwrap();
        assert!(!signal.is_running());
    }
}
