//! Simulated edge counters and count sources.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use rustc_hash::FxHashMap;

use ionctl_hal::{Core, EdgeCounter, HalError, HalResult};

use crate::timeline::{SimCore, SimValue};

/// Produces photon counts for closed gate windows.
pub trait CountSource: Send + Sync {
    /// Count on PMT `channel` for a gate open from `begin_mu` to `end_mu`.
    fn count(&self, channel: usize, begin_mu: i64, end_mu: i64, ref_period: f64) -> i32;
}

/// Replays scripted counts per channel; zero once a script runs out.
#[derive(Debug, Default)]
pub struct ScriptedCounts {
    scripts: Mutex<FxHashMap<usize, VecDeque<i32>>>,
}

impl ScriptedCounts {
    /// Create an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a count vector, one entry per channel.
    pub fn push_vector(&self, counts: &[i32]) {
        let mut scripts = self
            .scripts
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        for (channel, &count) in counts.iter().enumerate() {
            scripts.entry(channel).or_default().push_back(count);
        }
    }

    /// Number of vectors still queued on `channel`.
    pub fn remaining(&self, channel: usize) -> usize {
        self.scripts
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&channel)
            .map_or(0, VecDeque::len)
    }
}

impl CountSource for ScriptedCounts {
    fn count(&self, channel: usize, _begin_mu: i64, _end_mu: i64, _ref_period: f64) -> i32 {
        self.scripts
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get_mut(&channel)
            .and_then(VecDeque::pop_front)
            .unwrap_or(0)
    }
}

#[derive(Debug, Default)]
struct GateState {
    open_at: Option<i64>,
    pending: VecDeque<(i64, i64)>,
}

/// Gated edge counter on the simulated timeline.
pub struct SimEdgeCounter {
    core: Arc<SimCore>,
    channel: String,
    index: usize,
    source: Arc<dyn CountSource>,
    gate: Mutex<GateState>,
}

impl SimEdgeCounter {
    /// Create the counter for PMT `index`, named `channel`.
    pub fn new(
        core: Arc<SimCore>,
        channel: impl Into<String>,
        index: usize,
        source: Arc<dyn CountSource>,
    ) -> Self {
        Self {
            core,
            channel: channel.into(),
            index,
            source,
            gate: Mutex::new(GateState::default()),
        }
    }

    /// Number of closed gates whose count was not fetched yet.
    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GateState> {
        self.gate
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl std::fmt::Debug for SimEdgeCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimEdgeCounter")
            .field("channel", &self.channel)
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

impl EdgeCounter for SimEdgeCounter {
    fn gate_begin(&self) -> HalResult<()> {
        self.core.submit(&self.channel, SimValue::GateOpen)?;
        self.lock().open_at = Some(self.core.now_mu());
        Ok(())
    }

    fn gate_end(&self) -> HalResult<()> {
        self.core.submit(&self.channel, SimValue::GateClose)?;
        let now = self.core.now_mu();
        let mut gate = self.lock();
        let begin = gate.open_at.take().unwrap_or(now);
        gate.pending.push_back((begin, now));
        Ok(())
    }

    fn fetch_count(&self) -> HalResult<i32> {
        let (begin, end) = self.lock().pending.pop_front().ok_or_else(|| {
            HalError::Device(format!("No gate pending on counter '{}'", self.channel))
        })?;
        self.core.wait_until_mu(end)?;
        Ok(self
            .source
            .count(self.index, begin, end, self.core.ref_period()))
    }
}
