//! Identifier assignment and thread bookkeeping for simulated entities.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;

use crate::types::EntityId;

/// What a simulated entity needs from the program hosting it.
pub trait SimulationHost: Send + Sync {
    /// Hand out a fresh, stable identifier.
    fn new_id(&self) -> EntityId;

    /// Keep a spawned thread so the host can join it at shutdown.
    fn register_task(&self, handle: JoinHandle<()>);
}

/// Default host: sequential ids and a list of join handles.
pub struct ThreadRegistry {
    next_id: AtomicU64,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Number of threads registered and not yet joined.
    pub fn task_count(&self) -> usize {
        self.tasks.lock().expect("registry mutex poisoned").len()
    }

    /// Join every registered thread; returns how many panicked.
    pub fn join_all(&self) -> usize {
        // Take the handles first so registration is not blocked while joining.
        let handles: Vec<_> = {
            let mut guard = self.tasks.lock().expect("registry mutex poisoned");
            guard.drain(..).collect()
        };
        handles
            .into_iter()
            .map(|handle| handle.join())
            .filter(|result| result.is_err())
            .count()
    }
}

impl Default for ThreadRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulationHost for ThreadRegistry {
    fn new_id(&self) -> EntityId {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn register_task(&self, handle: JoinHandle<()>) {
        let mut guard = self.tasks.lock().expect("registry mutex poisoned");
        guard.push(handle);
    }
}
