//! Error types for the HAL crate.

use thiserror::Error;

/// Errors that can occur in HAL operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HalError {
    /// An event was scheduled behind the hardware counter.
    #[error("Timeline underflow: event at {at_mu} mu, hardware counter at {counter_mu} mu")]
    Underflow {
        /// Timestamp of the rejected event.
        at_mu: i64,
        /// Hardware counter when the event was submitted.
        counter_mu: i64,
    },

    /// A channel index outside the device array was addressed.
    #[error("Channel {channel} out of range (device has {num_channels} channels)")]
    ChannelOutOfRange {
        /// Requested channel.
        channel: usize,
        /// Number of channels available.
        num_channels: usize,
    },

    /// A detection was requested without any channels.
    #[error("Channel list can not be empty")]
    EmptyChannelList,

    /// The experiment scheduler asked the session to terminate.
    #[error("Termination requested")]
    TerminationRequested,

    /// Dataset access failed.
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Generic device error.
    #[error("Device error: {0}")]
    Device(String),
}

impl HalError {
    /// Whether this is a timeline underflow.
    pub fn is_underflow(&self) -> bool {
        matches!(self, HalError::Underflow { .. })
    }
}

/// Result type for HAL operations.
pub type HalResult<T> = Result<T, HalError>;
