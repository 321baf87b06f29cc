//! Error types for the vissim entropy layer.

use thiserror::Error;

/// Errors that can occur while setting up an entropy source.
#[derive(Debug, Error)]
pub enum EnvError {
    /// The system clock reported a time before the Unix epoch
    #[error("Clock error: {0}")]
    ClockError(String),
}

impl EnvError {
    /// Creates a clock error.
    pub fn clock(msg: impl Into<String>) -> Self {
        Self::ClockError(msg.into())
    }
}
