//! Cycle timing settings for a traffic light.

use std::ops::RangeInclusive;
use std::time::Duration;

use crate::error::ConfigError;

// Default phase length bounds (inclusive), in milliseconds.
pub const DEFAULT_MIN_CYCLE_MS: u64 = 4000;
pub const DEFAULT_MAX_CYCLE_MS: u64 = 6000;
// Sleep slice between elapsed-time checks in polling mode.
pub const DEFAULT_POLL_SLICE_MS: u64 = 1;

/// How the cycle task waits between phase changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimingMode {
    /// Sleep a short fixed slice and re-check elapsed time.
    Polling,
    /// Block until the remaining cycle time elapses or a stop is requested.
    Timed,
}

impl TimingMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "poll" | "polling" => Some(TimingMode::Polling),
            "timed" => Some(TimingMode::Timed),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TimingMode::Polling => "polling",
            TimingMode::Timed => "timed",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CycleConfig {
    pub min_cycle_ms: u64,
    pub max_cycle_ms: u64,
    pub poll_slice_ms: u64,
    pub mode: TimingMode,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            min_cycle_ms: DEFAULT_MIN_CYCLE_MS,
            max_cycle_ms: DEFAULT_MAX_CYCLE_MS,
            poll_slice_ms: DEFAULT_POLL_SLICE_MS,
            mode: TimingMode::Polling,
        }
    }
}

impl CycleConfig {
    /// Config with custom cycle bounds and default polling.
    pub fn with_range(min_cycle_ms: u64, max_cycle_ms: u64) -> Self {
        Self {
            min_cycle_ms,
            max_cycle_ms,
            ..Self::default()
        }
    }

    pub fn mode(mut self, mode: TimingMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_cycle_ms > self.max_cycle_ms {
            return Err(ConfigError::EmptyRange {
                min_ms: self.min_cycle_ms,
                max_ms: self.max_cycle_ms,
            });
        }
        if self.min_cycle_ms == 0 {
            return Err(ConfigError::ZeroCycle);
        }
        if self.mode == TimingMode::Polling && self.poll_slice_ms == 0 {
            return Err(ConfigError::ZeroPollSlice);
        }
        Ok(())
    }

    /// Inclusive range the per-cycle duration is drawn from.
    pub fn cycle_range_ms(&self) -> RangeInclusive<u64> {
        self.min_cycle_ms..=self.max_cycle_ms
    }

    pub fn poll_slice(&self) -> Duration {
        Duration::from_millis(self.poll_slice_ms)
    }
}
