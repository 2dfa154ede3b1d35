//! Error types for services.

use ionctl_devices::DeviceError;
use ionctl_hal::HalError;
use thiserror::Error;

/// Errors raised by services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ServiceError {
    /// Error from a device module.
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// Error from the hardware layer or the scheduler.
    #[error(transparent)]
    Hal(#[from] HalError),

    /// Malformed input to the ion-count classifier.
    #[error("Invalid classification input: {0}")]
    ClassificationInput(String),

    /// A service call parameter was out of range.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Loading did not reach the requested number of ions.
    #[error("{}", ion_load_message(.loaded, .requested, .strict))]
    IonLoad {
        /// Ions present when loading stopped.
        loaded: usize,
        /// Ions requested.
        requested: usize,
        /// Exactly `requested` ions were required.
        strict: bool,
    },

    /// Surplus ions could not be released.
    #[error("Could not release ions: {remaining} ion(s) left, {requested} requested")]
    IonRelease {
        /// Ions still trapped.
        remaining: usize,
        /// Ions requested.
        requested: usize,
    },
}

fn ion_load_message(loaded: &usize, requested: &usize, strict: &bool) -> String {
    if *strict {
        format!(
            "Could not strictly load requested number of ions: \
             {loaded} ion(s) loaded instead of {requested} ion(s)"
        )
    } else {
        format!(
            "Could not load requested number of ions: \
             {loaded} out of {requested} ion(s) loaded"
        )
    }
}

impl ServiceError {
    /// Whether this is a timeline underflow.
    pub fn is_underflow(&self) -> bool {
        match self {
            ServiceError::Device(e) => e.is_underflow(),
            ServiceError::Hal(e) => e.is_underflow(),
            _ => false,
        }
    }

    /// Whether the scheduler asked the session to terminate.
    pub fn is_termination(&self) -> bool {
        matches!(
            self,
            ServiceError::Hal(HalError::TerminationRequested)
                | ServiceError::Device(DeviceError::Hal(HalError::TerminationRequested))
        )
    }
}

/// Result type for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;
