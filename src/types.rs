//! Shared identifiers and the light phase model.

use std::fmt;

/// Stable identifier handed out by the simulation host.
pub type EntityId = u64;

/// The two phases a light can show.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Red,
    Green,
}

impl Phase {
    /// The phase that follows this one.
    pub fn toggled(self) -> Self {
        match self {
            Phase::Red => Phase::Green,
            Phase::Green => Phase::Red,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Red => f.write_str("red"),
            Phase::Green => f.write_str("green"),
        }
    }
}
