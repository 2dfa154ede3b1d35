//! Simulated experiment scheduler.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tracing::debug;

use ionctl_hal::{ExperimentScheduler, HalError, HalResult};

/// Scheduler whose pause requests are scripted by the caller.
#[derive(Debug, Default)]
pub struct SimScheduler {
    rid: i64,
    pending_pauses: AtomicUsize,
    terminate: AtomicBool,
    pauses: AtomicUsize,
}

impl SimScheduler {
    /// Create a scheduler for run `rid`.
    pub fn new(rid: i64) -> Self {
        Self {
            rid,
            ..Self::default()
        }
    }

    /// Ask the experiment to pause once more.
    pub fn request_pause(&self) {
        self.pending_pauses.fetch_add(1, Ordering::SeqCst);
    }

    /// Ask the experiment to pause and then terminate it.
    pub fn request_termination(&self) {
        self.terminate.store(true, Ordering::SeqCst);
        self.request_pause();
    }

    /// Number of completed `pause` calls.
    pub fn pause_count(&self) -> usize {
        self.pauses.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExperimentScheduler for SimScheduler {
    fn rid(&self) -> i64 {
        self.rid
    }

    fn check_pause(&self) -> bool {
        self.pending_pauses.load(Ordering::SeqCst) > 0
    }

    async fn pause(&self) -> HalResult<()> {
        let _ = self
            .pending_pauses
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        self.pauses.fetch_add(1, Ordering::SeqCst);
        debug!(rid = self.rid, "Experiment paused");

        tokio::task::yield_now().await;

        if self.terminate.load(Ordering::SeqCst) {
            return Err(HalError::TerminationRequested);
        }
        Ok(())
    }
}
