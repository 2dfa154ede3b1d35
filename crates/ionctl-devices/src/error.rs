//! Error types for device modules.

use ionctl_hal::HalError;
use thiserror::Error;

/// Errors raised by device modules.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DeviceError {
    /// Error from the hardware layer, including timeline underflows.
    #[error(transparent)]
    Hal(#[from] HalError),

    /// Invalid build parameters or stored defaults.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A runtime argument was out of range.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The sub-switch registers of a master switch disagree.
    #[error("State of the master switch '{0}' is ambiguous")]
    AmbiguousState(String),
}

impl DeviceError {
    /// Whether this is a timeline underflow.
    pub fn is_underflow(&self) -> bool {
        matches!(self, DeviceError::Hal(e) if e.is_underflow())
    }

    /// Whether a PMT channel index was out of range.
    pub fn is_channel_out_of_range(&self) -> bool {
        matches!(self, DeviceError::Hal(HalError::ChannelOutOfRange { .. }))
    }
}

/// Result type for device operations.
pub type DeviceResult<T> = Result<T, DeviceError>;
