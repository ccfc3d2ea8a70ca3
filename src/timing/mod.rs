//! Interruptible sleeping for the background loops
//!
//! The supervisor and the picture tracker pace themselves with fixed
//! periods. Both sleep on a shared `StopSignal` so shutdown wakes them
//! immediately instead of waiting out a reconnect backoff.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request every sleeper to wake and exit
    pub fn stop(&self) {
        let (flag, cv) = &*self.inner;
        *flag.lock().unwrap_or_else(|e| e.into_inner()) = true;
        cv.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Sleep for `period` or until stopped. Returns true if stop was requested.
    pub fn sleep(&self, period: Duration) -> bool {
        let (flag, cv) = &*self.inner;
        let deadline = Instant::now() + period;
        let mut stopped = flag.lock().unwrap_or_else(|e| e.into_inner());
        while !*stopped {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            stopped = match cv.wait_timeout(stopped, deadline - now) {
                Ok((guard, _)) => guard,
                Err(e) => e.into_inner().0,
            };
        }
        true
    }
}
