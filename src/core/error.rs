use std::io;
use thiserror::Error;

use super::types::BeaconId;

/// Error types for the beacon alarm core
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Unknown beacon: {0}")]
    UnknownBeacon(BeaconId),

    #[error("Unsupported parameter: {0}")]
    UnsupportedParameter(String),

    #[error("No acknowledgment for sequence {seq} after {attempts} attempts")]
    AckTimeout {
        /// Sequence number of the unacknowledged command
        seq: u8,
        /// Number of transmissions made
        attempts: u32,
    },

    #[error("All sequence numbers are awaiting acknowledgment")]
    SequenceExhausted,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates a new malformed payload error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Error::MalformedPayload(msg.into())
    }

    /// Creates a new unsupported parameter error
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Error::UnsupportedParameter(msg.into())
    }

    /// Creates a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Creates a new transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Error::Transport(msg.into())
    }
}
