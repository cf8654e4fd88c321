//! Public face of a simulated traffic light.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use crate::cancel::CancelToken;
use crate::config::CycleConfig;
use crate::cycle::{CycleLoop, PhaseState};
use crate::error::LightError;
use crate::log_dev;
use crate::phase_channel::PhaseChannel;
use crate::registry::SimulationHost;
use crate::types::{EntityId, Phase};

/// A light that cycles red/green on its own thread and lets callers wait for green.
pub struct TrafficLightController {
    id: EntityId,
    state: Arc<Mutex<PhaseState>>,
    channel: Arc<PhaseChannel<Phase>>,
    started: AtomicBool,
    cancel: CancelToken,
    config: CycleConfig,
    seed: Option<u64>,
    host: Arc<dyn SimulationHost>,
}

impl TrafficLightController {
    /// Light with the default 4-6 second cycle and an OS-seeded random source.
    pub fn new(host: Arc<dyn SimulationHost>) -> Self {
        let id = host.new_id();
        Self {
            id,
            state: Arc::new(Mutex::new(PhaseState::new())),
            channel: Arc::new(PhaseChannel::new()),
            started: AtomicBool::new(false),
            cancel: CancelToken::new(),
            config: CycleConfig::default(),
            seed: None,
            host,
        }
    }

    pub fn with_config(
        host: Arc<dyn SimulationHost>,
        config: CycleConfig,
        seed: Option<u64>,
    ) -> Result<Self, LightError> {
        config.validate()?;
        let mut light = Self::new(host);
        light.config = config;
        light.seed = seed;
        Ok(light)
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Last phase set by the cycle task; may change right after it is read.
    pub fn current_phase(&self) -> Phase {
        self.state.lock().expect("phase state mutex poisoned").phase
    }

    /// Number of phase changes so far.
    pub fn transitions(&self) -> u64 {
        self.state
            .lock()
            .expect("phase state mutex poisoned")
            .transitions
    }

    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst) && !self.cancel.is_cancelled()
    }

    /// Start the cycle task on its own thread and return immediately.
    ///
    /// A light cycles at most once; later calls fail with `AlreadyStarted`.
    pub fn simulate(&self) -> Result<(), LightError> {
        if self
            .started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(LightError::AlreadyStarted { id: self.id });
        }

        let cycle = CycleLoop::new(
            self.id,
            self.config.clone(),
            self.seed,
            Arc::clone(&self.state),
            Arc::clone(&self.channel),
            self.cancel.clone(),
        );
        let handle = thread::Builder::new()
            .name(format!("light-{}", self.id))
            .spawn(move || {
                cycle.run();
            })
            .inspect_err(|_| {
                // Leave the light startable if the OS refused the thread.
                self.started.store(false, Ordering::SeqCst);
            })?;
        self.host.register_task(handle);
        log_dev!("[LIGHT] #{} simulation started", self.id);
        Ok(())
    }

    /// Block until this caller takes a green phase off the channel.
    ///
    /// Red phases taken along the way are discarded. If the light was never
    /// started this waits forever; after `shutdown` it returns `Stopped`.
    pub fn wait_for_green(&self) -> Result<(), LightError> {
        loop {
            match self.channel.receive_or_closed() {
                Some(Phase::Green) => {
                    log_dev!("[QUEUE] #{} handed out green", self.id);
                    return Ok(());
                }
                Some(Phase::Red) => {
                    log_dev!("[QUEUE] #{} handed out red, still waiting", self.id);
                }
                None => return Err(LightError::Stopped { id: self.id }),
            }
        }
    }

    /// Block until the next published phase and take it.
    pub fn next_phase(&self) -> Result<Phase, LightError> {
        self.channel
            .receive_or_closed()
            .ok_or(LightError::Stopped { id: self.id })
    }

    /// Stop the cycle task and release every blocked waiter. Idempotent.
    pub fn shutdown(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.cancel.cancel();
        self.channel.close();
        log_dev!(
            "[LIGHT] #{} shut down with {} phases unread",
            self.id,
            self.channel.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ThreadRegistry;
    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    fn fast_light(registry: &Arc<ThreadRegistry>, min_ms: u64, max_ms: u64) -> TrafficLightController {
        let host: Arc<dyn SimulationHost> = registry.clone();
        TrafficLightController::with_config(host, CycleConfig::with_range(min_ms, max_ms), Some(3))
            .expect("valid config")
    }

    #[test]
    fn starts_red_with_host_id() {
        let registry = Arc::new(ThreadRegistry::new());
        let first = TrafficLightController::new(registry.clone());
        let second = TrafficLightController::new(registry.clone());
        assert_eq!(first.current_phase(), Phase::Red);
        assert_eq!(first.transitions(), 0);
        assert!(!first.is_running());
        assert_ne!(first.id(), second.id());
    }

    #[test]
    fn rejects_invalid_config() {
        let registry: Arc<dyn SimulationHost> = Arc::new(ThreadRegistry::new());
        let result = TrafficLightController::with_config(registry, CycleConfig::with_range(9, 3), None);
        assert!(matches!(result, Err(LightError::Config(_))));
    }

    #[test]
    fn second_simulate_is_rejected() {
        let registry = Arc::new(ThreadRegistry::new());
        let light = fast_light(&registry, 5, 10);
        light.simulate().expect("first start");
        assert!(light.is_running());
        let err = light.simulate().expect_err("second start must fail");
        assert!(matches!(err, LightError::AlreadyStarted { id } if id == light.id()));
        // Only one cycle thread was spawned.
        assert_eq!(registry.task_count(), 1);

        light.shutdown();
        assert_eq!(registry.join_all(), 0);
    }

    #[test]
    fn wait_for_green_blocks_until_first_green() {
        let registry = Arc::new(ThreadRegistry::new());
        let light = fast_light(&registry, 200, 200);
        let start = Instant::now();
        light.simulate().expect("start");

        // Red is current, so the first change is to green.
        light.wait_for_green().expect("green");
        assert!(start.elapsed() >= Duration::from_millis(200));
        assert!(light.transitions() >= 1);

        light.shutdown();
        registry.join_all();
    }

    #[test]
    fn waiters_share_greens_one_each() {
        let registry = Arc::new(ThreadRegistry::new());
        let light = Arc::new(fast_light(&registry, 5, 10));
        let vehicles = 3;
        let (done_tx, done_rx) = mpsc::channel();

        let mut handles = Vec::new();
        for _ in 0..vehicles {
            let light = Arc::clone(&light);
            let done_tx = done_tx.clone();
            handles.push(thread::spawn(move || {
                light.wait_for_green().expect("green");
                done_tx.send(()).expect("done");
            }));
        }
        light.simulate().expect("start");

        for _ in 0..vehicles {
            done_rx
                .recv_timeout(Duration::from_secs(2))
                .expect("vehicle passed");
        }
        // Each vehicle consumed its own green, so at least that many were sent.
        assert!(light.transitions() >= 2 * vehicles as u64 - 1);

        for handle in handles {
            handle.join().expect("vehicle thread panicked");
        }
        light.shutdown();
        registry.join_all();
    }

    #[test]
    fn next_phase_observes_alternation() {
        let registry = Arc::new(ThreadRegistry::new());
        let light = fast_light(&registry, 2, 4);
        light.simulate().expect("start");
        let mut expected = Phase::Red;
        for _ in 0..10 {
            expected = expected.toggled();
            assert_eq!(light.next_phase().expect("phase"), expected);
        }
        light.shutdown();
        registry.join_all();
    }

    #[test]
    fn shutdown_releases_blocked_waiter() {
        let registry = Arc::new(ThreadRegistry::new());
        let light = Arc::new(TrafficLightController::new(registry.clone()));
        let (done_tx, done_rx) = mpsc::channel();

        // Never started: the waiter only returns because of shutdown.
        let waiter = {
            let light = Arc::clone(&light);
            thread::spawn(move || {
                let result = light.wait_for_green();
                done_tx.send(matches!(result, Err(LightError::Stopped { .. }))).expect("done");
            })
        };

        thread::sleep(Duration::from_millis(20));
        light.shutdown();
        light.shutdown();
        let stopped = done_rx
            .recv_timeout(Duration::from_secs(1))
            .expect("waiter released");
        assert!(stopped);
        assert!(!light.is_running());
        waiter.join().expect("waiter thread panicked");
    }

    #[test]
    fn end_to_end_with_default_timing() {
        let registry = Arc::new(ThreadRegistry::new());
        let light = Arc::new(TrafficLightController::new(registry.clone()));
        light.simulate().expect("start");
        let (done_tx, done_rx) = mpsc::channel();

        let start = Instant::now();
        let vehicle = {
            let light = Arc::clone(&light);
            thread::spawn(move || {
                light.wait_for_green().expect("green");
                done_tx.send(light.current_phase()).expect("done");
            })
        };

        let phase = done_rx
            .recv_timeout(Duration::from_millis(6500))
            .expect("green within one cycle");
        assert!(start.elapsed() <= Duration::from_millis(6500));
        assert_eq!(phase, Phase::Green);
        vehicle.join().expect("vehicle thread panicked");

        light.shutdown();
        assert_eq!(registry.join_all(), 0);
    }
}
