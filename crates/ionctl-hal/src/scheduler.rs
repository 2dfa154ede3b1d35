//! Experiment scheduler interface.
//!
//! A running experiment polls the scheduler between hardware sessions. When a
//! higher-priority experiment is waiting, the caller closes its connection to
//! the core and yields in [`ExperimentScheduler::pause`]. The scheduler either
//! resumes the caller or asks it to terminate.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::HalResult;

/// Experiment scheduler.
#[async_trait]
pub trait ExperimentScheduler: Send + Sync + std::fmt::Debug {
    /// Run identifier of the current experiment.
    fn rid(&self) -> i64;

    /// Whether the scheduler requests the current experiment to pause.
    fn check_pause(&self) -> bool;

    /// Yield to the scheduler.
    ///
    /// Returns [`HalError::TerminationRequested`](crate::HalError) when the
    /// experiment should stop instead of resuming.
    async fn pause(&self) -> HalResult<()>;
}

/// Shared scheduler handle.
pub type SchedulerHandle = Arc<dyn ExperimentScheduler>;
