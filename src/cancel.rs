//! Cooperative stop signal for long-running simulation threads.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Cloneable stop flag that sleeping threads can wait on.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new((Mutex::new(false), Condvar::new())),
        }
    }

    /// Request a stop and wake every thread blocked in `wait_timeout`.
    pub fn cancel(&self) {
        let (lock, cvar) = &*self.inner;
        let mut cancelled = lock.lock().expect("cancel token mutex poisoned");
        *cancelled = true;
        cvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        let (lock, _) = &*self.inner;
        *lock.lock().expect("cancel token mutex poisoned")
    }

    /// Sleep up to `timeout`, returning early if cancelled.
    ///
    /// Returns `true` when the token is cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let deadline = Instant::now() + timeout;
        let mut cancelled = lock.lock().expect("cancel token mutex poisoned");
        while !*cancelled {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let (guard, _) = cvar
                .wait_timeout(cancelled, deadline - now)
                .expect("condvar wait failed");
            cancelled = guard;
        }
        *cancelled
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
