//! Type definitions and aliases

use serde::{Deserialize, Serialize};

// Re-export commonly used types
pub use crate::error::{AppError, Result};

/// Which probe stages run for every target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpeedTestMode {
    /// Ping first, then speed
    Normal,
    /// Skip the ping stage
    SpeedOnly,
    /// Stop after the ping stage
    PingOnly,
}

impl SpeedTestMode {
    pub const SPEED_ONLY: &'static str = "speedonly";
    pub const PING_ONLY: &'static str = "pingonly";

    /// Parse the wire value; anything unrecognized runs both stages
    pub fn from_wire(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            Self::SPEED_ONLY => Self::SpeedOnly,
            Self::PING_ONLY => Self::PingOnly,
            _ => Self::Normal,
        }
    }

    pub fn runs_ping(&self) -> bool {
        !matches!(self, Self::SpeedOnly)
    }

    pub fn runs_speed(&self) -> bool {
        !matches!(self, Self::PingOnly)
    }
}

impl Default for SpeedTestMode {
    fn default() -> Self {
        Self::Normal
    }
}

/// How the batch of targets was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestMode {
    /// Targets resolved from a subscription or raw link text
    Fresh,
    /// Explicit targets with remapped identities from a previous batch
    Retest,
}

impl TestMode {
    /// Wire value the client sends for a retest request
    pub const RETEST_WIRE: i64 = 3;

    pub fn from_wire(value: i64) -> Self {
        if value == Self::RETEST_WIRE {
            Self::Retest
        } else {
            Self::Fresh
        }
    }
}

impl Default for TestMode {
    fn default() -> Self {
        Self::Fresh
    }
}
