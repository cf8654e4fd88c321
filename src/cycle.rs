//! The timed task that flips a light between red and green.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::cancel::CancelToken;
use crate::config::{CycleConfig, TimingMode};
use crate::log_dev;
use crate::phase_channel::PhaseChannel;
use crate::types::{EntityId, Phase};

/// Phase plus the number of toggles that produced it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PhaseState {
    pub phase: Phase,
    pub transitions: u64,
}

impl PhaseState {
    pub fn new() -> Self {
        Self {
            phase: Phase::Red,
            transitions: 0,
        }
    }
}

impl Default for PhaseState {
    fn default() -> Self {
        Self::new()
    }
}

/// Owns the random source and timing for one light's phase changes.
pub struct CycleLoop {
    id: EntityId,
    config: CycleConfig,
    rng: StdRng,
    state: Arc<Mutex<PhaseState>>,
    channel: Arc<PhaseChannel<Phase>>,
    cancel: CancelToken,
}

impl CycleLoop {
    /// Build a loop; `seed` fixes the interval sequence, `None` seeds from the OS.
    pub fn new(
        id: EntityId,
        config: CycleConfig,
        seed: Option<u64>,
        state: Arc<Mutex<PhaseState>>,
        channel: Arc<PhaseChannel<Phase>>,
        cancel: CancelToken,
    ) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            id,
            config,
            rng,
            state,
            channel,
            cancel,
        }
    }

    /// Draw the length of the next phase, uniform over the configured range.
    pub fn next_cycle_duration(&mut self) -> Duration {
        Duration::from_millis(self.rng.random_range(self.config.cycle_range_ms()))
    }

    /// Toggle until cancelled or the channel closes; returns toggles published.
    pub fn run(mut self) -> u64 {
        let mut published = 0u64;
        let mut target = self.next_cycle_duration();
        let mut last_update = Instant::now();
        log_dev!(
            "[LIGHT] #{} cycling ({}), first change in {}ms",
            self.id,
            self.config.mode.as_str(),
            target.as_millis()
        );

        loop {
            let stop = match self.config.mode {
                TimingMode::Polling => {
                    thread::sleep(self.config.poll_slice());
                    self.cancel.is_cancelled()
                }
                TimingMode::Timed => {
                    let remaining = target.saturating_sub(last_update.elapsed());
                    self.cancel.wait_timeout(remaining)
                }
            };
            if stop {
                break;
            }

            if last_update.elapsed() < target {
                continue;
            }
            if !self.publish_toggle() {
                log_dev!("[LIGHT] #{} channel closed, stopping", self.id);
                break;
            }
            published += 1;
            last_update = Instant::now();
            target = self.next_cycle_duration();
        }

        log_dev!("[LIGHT] #{} stopped after {published} changes", self.id);
        published
    }

    /// Toggle and publish; the phase only stays changed if the send lands.
    fn publish_toggle(&self) -> bool {
        if self.channel.is_closed() {
            return false;
        }
        // Phase lock is released before the channel lock is taken.
        let next = {
            let mut guard = self.state.lock().expect("phase state mutex poisoned");
            guard.phase = guard.phase.toggled();
            guard.transitions += 1;
            guard.phase
        };
        if self.channel.send(next).is_err() {
            // Closed between the check and the send.
            let mut guard = self.state.lock().expect("phase state mutex poisoned");
            guard.phase = guard.phase.toggled();
            guard.transitions -= 1;
            return false;
        }
        log_dev!("[LIGHT] #{} changed to {next}", self.id);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    struct Rig {
        state: Arc<Mutex<PhaseState>>,
        channel: Arc<PhaseChannel<Phase>>,
        cancel: CancelToken,
    }

    impl Rig {
        fn new() -> Self {
            Self {
                state: Arc::new(Mutex::new(PhaseState::new())),
                channel: Arc::new(PhaseChannel::new()),
                cancel: CancelToken::new(),
            }
        }

        fn cycle(&self, config: CycleConfig, seed: Option<u64>) -> CycleLoop {
            CycleLoop::new(
                1,
                config,
                seed,
                Arc::clone(&self.state),
                Arc::clone(&self.channel),
                self.cancel.clone(),
            )
        }

        fn snapshot(&self) -> PhaseState {
            *self.state.lock().expect("phase state mutex poisoned")
        }
    }

    #[test]
    fn durations_stay_in_range_and_vary() {
        let rig = Rig::new();
        let mut cycle = rig.cycle(CycleConfig::default(), None);
        let draws: Vec<u128> = (0..500)
            .map(|_| cycle.next_cycle_duration().as_millis())
            .collect();
        assert!(draws.iter().all(|ms| (4000..=6000).contains(ms)));
        // Redrawn every cycle, not fixed for the task's lifetime.
        assert!(draws.iter().any(|ms| *ms != draws[0]));
        let mean = draws.iter().sum::<u128>() as f64 / draws.len() as f64;
        assert!((4800.0..=5200.0).contains(&mean), "mean {mean}");
    }

    #[test]
    fn fixed_seed_repeats_interval_sequence() {
        let rig = Rig::new();
        let mut first = rig.cycle(CycleConfig::default(), Some(7));
        let mut second = rig.cycle(CycleConfig::default(), Some(7));
        for _ in 0..20 {
            assert_eq!(first.next_cycle_duration(), second.next_cycle_duration());
        }
    }

    #[test]
    fn phases_alternate_with_transition_count() {
        let rig = Rig::new();
        let cycle = rig.cycle(CycleConfig::with_range(2, 4), Some(1));
        let handle = thread::spawn(move || cycle.run());

        let mut expected = Phase::Red;
        for _ in 0..20 {
            expected = expected.toggled();
            assert_eq!(rig.channel.receive(), expected);
        }
        rig.cancel.cancel();
        let published = handle.join().expect("cycle thread panicked");

        let state = rig.snapshot();
        assert_eq!(state.transitions, published);
        let even = state.transitions % 2 == 0;
        assert_eq!(state.phase, if even { Phase::Red } else { Phase::Green });
    }

    #[test]
    fn intervals_respect_bounds_in_both_modes() {
        for mode in [TimingMode::Polling, TimingMode::Timed] {
            let rig = Rig::new();
            let config = CycleConfig::with_range(2, 4).mode(mode);
            let cycle = rig.cycle(config, Some(99));
            let start = Instant::now();
            let handle = thread::spawn(move || cycle.run());

            let samples = 1000;
            let mut stamps = Vec::with_capacity(samples);
            for _ in 0..samples {
                rig.channel.receive();
                stamps.push(start.elapsed());
            }
            rig.cancel.cancel();
            handle.join().expect("cycle thread panicked");

            // Every gap is at least the minimum draw, so the span is too.
            let span = *stamps.last().expect("stamps") - stamps[0];
            assert!(
                span >= Duration::from_millis(2 * (samples as u64 - 1)),
                "{mode:?} span {span:?} shorter than the minimum cycles"
            );

            let intervals: Vec<f64> = stamps
                .windows(2)
                .map(|pair| (pair[1] - pair[0]).as_secs_f64() * 1000.0)
                .collect();
            let mean = intervals.iter().sum::<f64>() / intervals.len() as f64;
            // Uniform draws over 2..=4 average 3ms; allow at most one slice of overshoot.
            assert!(mean >= 2.85, "{mode:?} mean {mean}ms below range");
            assert!(mean <= 5.0, "{mode:?} mean {mean}ms above range");
        }
    }

    #[test]
    fn cancel_stops_loop_promptly() {
        for mode in [TimingMode::Polling, TimingMode::Timed] {
            let rig = Rig::new();
            let cycle = rig.cycle(CycleConfig::default().mode(mode), None);
            let (done_tx, done_rx) = mpsc::channel();
            let handle = thread::spawn(move || {
                let published = cycle.run();
                done_tx.send(published).expect("done");
            });

            thread::sleep(Duration::from_millis(20));
            rig.cancel.cancel();
            let published = done_rx
                .recv_timeout(Duration::from_secs(1))
                .expect("cycle loop exited");
            assert_eq!(published, 0);
            assert_eq!(rig.snapshot(), PhaseState::new());
            handle.join().expect("cycle thread panicked");
        }
    }

    #[test]
    fn closed_channel_ends_loop() {
        let rig = Rig::new();
        rig.channel.close();
        let cycle = rig.cycle(CycleConfig::with_range(1, 2), None);
        let (done_tx, done_rx) = mpsc::channel();
        let handle = thread::spawn(move || {
            done_tx.send(cycle.run()).expect("done");
        });

        let published = done_rx
            .recv_timeout(Duration::from_secs(1))
            .expect("cycle loop exited");
        assert_eq!(published, 0);
        // Nothing was published, so the light still reports its initial phase.
        assert_eq!(rig.snapshot(), PhaseState::new());
        handle.join().expect("cycle thread panicked");
    }
}
