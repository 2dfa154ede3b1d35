//! Latency-compensated binary switch on a TTL output.

use tracing::debug;

use ionctl_hal::{CoreHandle, SystemDatasets, TtlHandle};

use crate::error::DeviceResult;
use crate::latency::Latency;

/// Build parameters of a [`Switch`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SwitchConfig {
    /// The output is inverted.
    pub active_low: bool,
    /// State applied by `reset`.
    pub default_state: bool,
}

/// A TTL-driven switch.
///
/// A TTL edge takes no time on the timeline, so realtime compensation is
/// symmetric: the cursor retreats by the latency, the edge is emitted and
/// the cursor advances again. The caller's cursor is unchanged.
#[derive(Debug)]
pub struct Switch {
    core: CoreHandle,
    ttl: TtlHandle,
    datasets: SystemDatasets,
    active_low: bool,
    default_state: bool,
    latency: Latency,
    current_state: bool,
}

impl Switch {
    pub const ACTIVE_LOW_KEY: &'static str = "active_low";
    pub const DEFAULT_STATE_KEY: &'static str = "default_state";
    pub const LATENCY_MU_KEY: &'static str = "latency";

    /// Create a switch. Stored dataset values override `config`.
    pub fn new(
        core: CoreHandle,
        ttl: TtlHandle,
        datasets: SystemDatasets,
        config: SwitchConfig,
    ) -> DeviceResult<Self> {
        let latency = Latency::load(&datasets, Self::LATENCY_MU_KEY)?;
        let active_low = datasets.get_or(Self::ACTIVE_LOW_KEY, config.active_low)?;
        let default_state = datasets.get_or(Self::DEFAULT_STATE_KEY, config.default_state)?;

        Ok(Self {
            core,
            ttl,
            datasets,
            active_low,
            default_state,
            latency,
            current_state: default_state,
        })
    }

    /// Bring the output into its default state.
    pub fn init_kernel(&mut self) -> DeviceResult<()> {
        self.core.reset();
        self.core.break_realtime();
        self.reset(false)?;
        self.core.wait_until_mu(self.core.now_mu())?;
        Ok(())
    }

    /// Set the logical state at the cursor.
    pub fn set(&mut self, state: bool, realtime: bool) -> DeviceResult<()> {
        if realtime {
            self.core.delay_mu(-self.latency.mu());
        }

        let result = self.ttl.set_o(state != self.active_low);

        if realtime {
            self.core.delay_mu(self.latency.mu());
        }

        result?;
        self.current_state = state;
        Ok(())
    }

    /// Return to the default state.
    pub fn reset(&mut self, realtime: bool) -> DeviceResult<()> {
        self.set(self.default_state, realtime)
    }

    /// Switch off with guaranteed slack.
    pub fn safety_off(&mut self) -> DeviceResult<()> {
        self.core.break_realtime();
        self.set(false, false)?;
        self.core.wait_until_mu(self.core.now_mu())?;
        Ok(())
    }

    /// Last logical state set.
    pub fn current_state(&self) -> bool {
        self.current_state
    }

    pub fn default_state(&self) -> bool {
        self.default_state
    }

    pub fn active_low(&self) -> bool {
        self.active_low
    }

    pub fn latency(&self) -> Latency {
        self.latency
    }

    /// Use `latency` for subsequent realtime sets.
    pub fn set_latency(&mut self, latency: Latency) {
        debug!(%latency, prefix = self.datasets.prefix(), "Switch latency set");
        self.latency = latency;
    }

    /// Persist `latency` without applying it.
    pub fn store_latency(&self, latency: Latency) -> DeviceResult<()> {
        latency.store(&self.datasets, Self::LATENCY_MU_KEY)
    }
}
