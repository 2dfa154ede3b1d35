//! Programming latency of timed devices.
//!
//! Writing a DDS register takes a fixed time on the timeline. A write issued
//! with `realtime = true` is pre-issued by the stored latency so that the new
//! setting takes effect at the caller's cursor.

use std::fmt;

use serde::{Deserialize, Serialize};

use ionctl_hal::units::MS;
use ionctl_hal::{Core, SystemDatasets};

use crate::error::DeviceResult;

/// Signed latency in machine units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Latency(i64);

impl Latency {
    pub const ZERO: Latency = Latency(0);

    pub const fn from_mu(mu: i64) -> Self {
        Self(mu)
    }

    pub const fn mu(self) -> i64 {
        self.0
    }

    /// Read a stored latency, storing zero when absent.
    pub fn load(datasets: &SystemDatasets, key: &str) -> DeviceResult<Self> {
        Ok(datasets.get_or(key, Self::ZERO)?)
    }

    /// Persist the latency.
    pub fn store(self, datasets: &SystemDatasets, key: &str) -> DeviceResult<()> {
        Ok(datasets.set(key, &self)?)
    }
}

impl fmt::Display for Latency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} mu", self.0)
    }
}

/// Measure the latency of a reset operation.
///
/// `reset(false)` brings the device into a known state with slack.
/// `reset(true)` repeats the reset with latency compensation; the cursor
/// movement it causes is the latency. The device's own latency must be zero
/// while measuring.
pub fn measure(
    core: &dyn Core,
    mut reset: impl FnMut(bool) -> DeviceResult<()>,
) -> DeviceResult<Latency> {
    core.reset();
    reset(false)?;

    core.delay(1.0 * MS);
    let t_start = core.now_mu();
    reset(true)?;
    let t_end = core.now_mu();
    core.wait_until_mu(t_end)?;

    Ok(Latency(t_end - t_start))
}
