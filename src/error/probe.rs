//! Per-target probe failures
//!
//! These never abort a batch; they are captured into the failing
//! target's result and surface to the client as sentinel values.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProbeError {
    /// The endpoint could not be reached
    #[error("endpoint unreachable: {0}")]
    Unreachable(String),

    /// The probe exceeded its own deadline (seconds)
    #[error("probe timed out after {0}s")]
    Timeout(u64),

    /// The built-in probe cannot speak this scheme
    #[error("unsupported proxy scheme: {0}")]
    Unsupported(String),

    /// The transfer started but failed midway
    #[error("transfer failed: {0}")]
    Transfer(String),

    /// Server address could not be derived from the profile
    #[error("invalid profile: {0}")]
    InvalidProfile(String),
}

impl ProbeError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

impl From<reqwest::Error> for ProbeError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout(0)
        } else if error.is_connect() {
            Self::Unreachable(error.to_string())
        } else {
            Self::Transfer(error.to_string())
        }
    }
}
