//! Error types for light configuration and lifecycle.

use std::io;

use thiserror::Error;

use crate::types::EntityId;

/// Rejected cycle timing settings.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("cycle range is empty: min {min_ms}ms > max {max_ms}ms")]
    EmptyRange { min_ms: u64, max_ms: u64 },

    #[error("minimum cycle duration must be > 0ms")]
    ZeroCycle,

    #[error("poll slice must be > 0ms")]
    ZeroPollSlice,
}

#[derive(Error, Debug)]
pub enum LightError {
    /// `simulate` was called on a light whose cycle task already runs.
    #[error("traffic light #{id} is already simulating")]
    AlreadyStarted { id: EntityId },

    /// The light was shut down while a caller was waiting on it.
    #[error("traffic light #{id} was stopped")]
    Stopped { id: EntityId },

    #[error("failed to spawn cycle thread: {0}")]
    Spawn(#[from] io::Error),

    #[error("invalid cycle config: {0}")]
    Config(#[from] ConfigError),
}
