//! Blocking hand-off queue: many senders, blocking receivers, one value per receiver.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

/// A synchronized FIFO where each sent value is taken by exactly one receiver.
pub struct PhaseChannel<T> {
    inner: Mutex<ChannelState<T>>,
    available: Condvar,
}

struct ChannelState<T> {
    queue: VecDeque<T>,
    closed: bool,
}

impl<T> PhaseChannel<T> {
    /// Create an empty, open channel.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ChannelState {
                queue: VecDeque::new(),
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Append a value and wake one receiver. Never blocks.
    ///
    /// Returns the value back if the channel has been closed.
    pub fn send(&self, value: T) -> Result<(), T> {
        let mut guard = self.inner.lock().expect("phase channel mutex poisoned");
        if guard.closed {
            return Err(value);
        }
        guard.queue.push_back(value);
        self.available.notify_one();
        Ok(())
    }

    /// Block until a value is available and take it.
    ///
    /// Waits forever if nothing is ever sent; closing does not wake this call.
    #[allow(dead_code)]
    pub fn receive(&self) -> T {
        let mut guard = self.inner.lock().expect("phase channel mutex poisoned");
        loop {
            if let Some(value) = guard.queue.pop_front() {
                return value;
            }
            // Wakeups may be spurious; the loop re-checks the queue.
            guard = self.available.wait(guard).expect("condvar wait failed");
        }
    }

    /// Block until a value is available or the channel is closed and drained.
    pub fn receive_or_closed(&self) -> Option<T> {
        let mut guard = self.inner.lock().expect("phase channel mutex poisoned");
        loop {
            if let Some(value) = guard.queue.pop_front() {
                return Some(value);
            }
            if guard.closed {
                return None;
            }
            guard = self.available.wait(guard).expect("condvar wait failed");
        }
    }

    /// Take the head value without blocking.
    #[allow(dead_code)]
    pub fn try_receive(&self) -> Option<T> {
        let mut guard = self.inner.lock().expect("phase channel mutex poisoned");
        guard.queue.pop_front()
    }

    /// Reject further sends and wake every shutdown-aware receiver.
    pub fn close(&self) {
        let mut guard = self.inner.lock().expect("phase channel mutex poisoned");
        guard.closed = true;
        self.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.inner
            .lock()
            .expect("phase channel mutex poisoned")
            .closed
    }

    /// Number of values waiting to be received.
    pub fn len(&self) -> usize {
        let guard = self.inner.lock().expect("phase channel mutex poisoned");
        guard.queue.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for PhaseChannel<T> {
    fn default() -> Self {
        Self::new()
    }
}
