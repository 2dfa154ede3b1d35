//! Latency-compensated DDS modules.
//!
//! A DDS module wraps one synthesizer channel with an RF switch and an
//! attenuator. Three latencies are tracked per channel:
//!
//! | Operation | Key | Compensation |
//! |-----------|-----|--------------|
//! | RF switch | `sw_latency_mu` | symmetric, cursor unchanged |
//! | Tuning words | `dds_latency_mu` | cursor retreats, the write advances it |
//! | Attenuator | `att_latency_mu` | cursor retreats, the write advances it |
//!
//! Without realtime compensation, configuration writes are preceded by a
//! fixed slack delay.
//!
//! Chip-specific behaviour lives in [`Dds9910`] and [`Dds9912`]; both
//! implement [`DdsModule`], whose provided methods cover everything shared.

mod dds9910;
mod dds9912;
mod master;
pub mod tuning;

use std::sync::Arc;

use tracing::{error, info};

use ionctl_hal::units::{DB, MHZ, US};
use ionctl_hal::{CoreHandle, DdsHandle, SystemDatasets};

use crate::error::{DeviceError, DeviceResult};
use crate::latency::{self, Latency};

pub use dds9910::{Dds9910, Dds9910Settings};
pub use dds9912::Dds9912;
pub use master::{MasterSwitchDds, MasterSwitchState};
pub use tuning::Tuning;

/// Highest output frequency accepted as a default.
pub const MAX_FREQUENCY: f64 = 400.0 * MHZ;

/// Largest attenuator setting.
pub const MAX_ATT: f64 = 31.5 * DB;

/// Slack inserted before a configuration write without compensation.
pub const CONFIG_SLACK: f64 = 200.0 * US;

/// Build-time defaults shared by all DDS modules.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DdsSettings {
    pub freq: f64,
    pub phase: f64,
    pub att: f64,
    pub sw: bool,
    pub min_att: f64,
}

impl Default for DdsSettings {
    fn default() -> Self {
        Self {
            freq: 100.0 * MHZ,
            phase: 0.0,
            att: MAX_ATT,
            sw: false,
            min_att: 25.0 * DB,
        }
    }
}

impl DdsSettings {
    /// Check ranges of the defaults.
    pub fn validate(&self) -> DeviceResult<()> {
        if !(0.0..=MAX_FREQUENCY).contains(&self.freq) {
            return Err(DeviceError::Configuration(format!(
                "Frequency {} Hz out of range",
                self.freq
            )));
        }
        if !(0.0..=1.0).contains(&self.phase) {
            return Err(DeviceError::Configuration(format!(
                "Phase {} out of range",
                self.phase
            )));
        }
        if !(self.min_att <= self.att && self.att <= MAX_ATT) {
            return Err(DeviceError::Configuration(format!(
                "DDS attenuation {} dB out of range",
                self.att
            )));
        }
        if !(0.0..=MAX_ATT).contains(&self.min_att) {
            return Err(DeviceError::Configuration(format!(
                "DDS min attenuation {} dB out of range",
                self.min_att
            )));
        }
        Ok(())
    }
}

/// State and operations common to all DDS chips.
#[derive(Debug)]
pub struct DdsBase {
    core: CoreHandle,
    dds: DdsHandle,
    datasets: SystemDatasets,
    tuning: Tuning,
    defaults: DdsSettings,
    config_latency: Latency,
    sw_latency: Latency,
    att_latency: Latency,
    sw_state: bool,
}

impl DdsBase {
    pub const CONFIG_LATENCY_MU_KEY: &'static str = "dds_latency_mu";
    pub const SW_LATENCY_MU_KEY: &'static str = "sw_latency_mu";
    pub const ATT_LATENCY_MU_KEY: &'static str = "att_latency_mu";

    pub const FREQ_KEY: &'static str = "freq";
    pub const PHASE_KEY: &'static str = "phase";
    pub const ATT_KEY: &'static str = "att";
    pub const SW_KEY: &'static str = "sw";
    pub const MIN_ATT_KEY: &'static str = "min_att";

    /// Validate `settings`, overlay stored values and load latencies.
    pub(crate) fn new(
        core: CoreHandle,
        dds: DdsHandle,
        datasets: SystemDatasets,
        tuning: Tuning,
        settings: DdsSettings,
    ) -> DeviceResult<Self> {
        settings.validate()?;

        let config_latency = Latency::load(&datasets, Self::CONFIG_LATENCY_MU_KEY)?;
        let sw_latency = Latency::load(&datasets, Self::SW_LATENCY_MU_KEY)?;
        let att_latency = Latency::load(&datasets, Self::ATT_LATENCY_MU_KEY)?;

        let defaults = DdsSettings {
            freq: datasets.get_or(Self::FREQ_KEY, settings.freq)?,
            phase: datasets.get_or(Self::PHASE_KEY, settings.phase)?,
            att: datasets.get_or(Self::ATT_KEY, settings.att)?,
            sw: datasets.get_or(Self::SW_KEY, settings.sw)?,
            min_att: datasets.get_or(Self::MIN_ATT_KEY, settings.min_att)?,
        };
        defaults.validate()?;

        Ok(Self {
            core,
            dds,
            datasets,
            tuning,
            defaults,
            config_latency,
            sw_latency,
            att_latency,
            sw_state: defaults.sw,
        })
    }

    pub fn core(&self) -> &CoreHandle {
        &self.core
    }

    pub fn dds(&self) -> &DdsHandle {
        &self.dds
    }

    pub fn datasets(&self) -> &SystemDatasets {
        &self.datasets
    }

    pub fn tuning(&self) -> &Tuning {
        &self.tuning
    }

    pub fn defaults(&self) -> &DdsSettings {
        &self.defaults
    }

    pub(crate) fn defaults_mut(&mut self) -> &mut DdsSettings {
        &mut self.defaults
    }

    /// Last RF switch state set.
    pub fn sw_state(&self) -> bool {
        self.sw_state
    }

    /// Position the cursor for a configuration write.
    pub(crate) fn prepare_write(&self, latency: Latency, realtime: bool) {
        if realtime {
            self.core.delay_mu(-latency.mu());
        } else {
            self.core.delay(CONFIG_SLACK);
        }
    }

    /// Write the attenuator. Values below the minimum are rejected and logged.
    pub fn config_att(&mut self, att: f64, realtime: bool) -> DeviceResult<()> {
        self.prepare_write(self.att_latency, realtime);

        if att >= self.defaults.min_att {
            self.dds.set_att(att)?;
        } else {
            error!(
                att,
                min_att = self.defaults.min_att,
                prefix = self.datasets.prefix(),
                "Attenuation set out of range"
            );
        }
        Ok(())
    }

    pub fn reset_att(&mut self, realtime: bool) -> DeviceResult<()> {
        self.config_att(self.defaults.att, realtime)
    }

    /// Set the RF switch at the cursor.
    pub fn set(&mut self, state: bool, realtime: bool) -> DeviceResult<()> {
        if realtime {
            self.core.delay_mu(-self.sw_latency.mu());
        }

        let result = self.dds.set_sw(state);

        if realtime {
            self.core.delay_mu(self.sw_latency.mu());
        }

        result?;
        self.sw_state = state;
        Ok(())
    }

    pub fn reset_sw(&mut self, realtime: bool) -> DeviceResult<()> {
        self.set(self.defaults.sw, realtime)
    }

    /// Switch the output off with guaranteed slack.
    pub fn safety_off(&mut self) -> DeviceResult<()> {
        self.core.break_realtime();
        self.set(false, false)?;
        self.core.wait_until_mu(self.core.now_mu())?;
        Ok(())
    }

    pub fn config_latency(&self) -> Latency {
        self.config_latency
    }

    pub fn sw_latency(&self) -> Latency {
        self.sw_latency
    }

    pub fn att_latency(&self) -> Latency {
        self.att_latency
    }

    /// Use `latency` for realtime switch operations.
    pub fn set_sw_latency(&mut self, latency: Latency) {
        self.sw_latency = latency;
    }

    /// Persist a switch latency without applying it.
    pub fn store_sw_latency(&self, latency: Latency) -> DeviceResult<()> {
        latency.store(&self.datasets, Self::SW_LATENCY_MU_KEY)
    }

    pub fn clear_sw_latency(&mut self) -> DeviceResult<()> {
        self.sw_latency = Latency::ZERO;
        Latency::ZERO.store(&self.datasets, Self::SW_LATENCY_MU_KEY)
    }

    pub(crate) fn set_config_latency(&mut self, latency: Latency) -> DeviceResult<()> {
        self.config_latency = latency;
        latency.store(&self.datasets, Self::CONFIG_LATENCY_MU_KEY)
    }

    pub fn clear_config_latency(&mut self) -> DeviceResult<()> {
        self.set_config_latency(Latency::ZERO)
    }

    /// Measure and store the attenuator latency.
    pub fn update_att_latency(&mut self) -> DeviceResult<Latency> {
        self.att_latency = Latency::ZERO;
        let core = Arc::clone(&self.core);
        let latency = latency::measure(core.as_ref(), |realtime| self.reset_att(realtime))?;

        info!(
            %latency,
            seconds = core.mu_to_seconds(latency.mu()),
            prefix = self.datasets.prefix(),
            "Obtained attenuator latency"
        );
        self.att_latency = latency;
        latency.store(&self.datasets, Self::ATT_LATENCY_MU_KEY)?;
        Ok(latency)
    }

    pub fn clear_att_latency(&mut self) -> DeviceResult<()> {
        self.att_latency = Latency::ZERO;
        Latency::ZERO.store(&self.datasets, Self::ATT_LATENCY_MU_KEY)
    }
}

/// A DDS channel module.
///
/// Implementors provide access to their [`DdsBase`] and the chip-specific
/// configuration reset; every other operation is provided.
pub trait DdsModule: Send {
    fn base(&self) -> &DdsBase;

    fn base_mut(&mut self) -> &mut DdsBase;

    /// Write the default tuning words.
    fn reset_config(&mut self, realtime: bool) -> DeviceResult<()>;

    /// Initialize the chip and apply all defaults. With `debug`, the RF
    /// switch is left untouched.
    fn init_kernel(&mut self, debug: bool) -> DeviceResult<()> {
        let core = Arc::clone(self.base().core());
        core.reset();
        self.base().dds().init()?;
        core.break_realtime();
        self.reset_config(false)?;
        core.break_realtime();
        self.reset_att(false)?;
        if !debug {
            core.break_realtime();
            self.reset_sw(false)?;
        }
        core.wait_until_mu(core.now_mu())?;
        Ok(())
    }

    /// Set the RF switch.
    fn set(&mut self, state: bool, realtime: bool) -> DeviceResult<()> {
        self.base_mut().set(state, realtime)
    }

    fn reset_sw(&mut self, realtime: bool) -> DeviceResult<()> {
        self.base_mut().reset_sw(realtime)
    }

    fn config_att(&mut self, att: f64, realtime: bool) -> DeviceResult<()> {
        self.base_mut().config_att(att, realtime)
    }

    fn reset_att(&mut self, realtime: bool) -> DeviceResult<()> {
        self.base_mut().reset_att(realtime)
    }

    /// Apply all defaults: switch, tuning words and attenuator.
    fn reset(&mut self, realtime: bool) -> DeviceResult<()> {
        self.reset_sw(realtime)?;
        self.reset_config(realtime)?;
        self.reset_att(realtime)
    }

    fn safety_off(&mut self) -> DeviceResult<()> {
        self.base_mut().safety_off()
    }

    /// Measure and store the configuration latency.
    fn update_config_latency(&mut self) -> DeviceResult<Latency> {
        self.base_mut().config_latency = Latency::ZERO;
        let core = Arc::clone(self.base().core());
        let latency = latency::measure(core.as_ref(), |realtime| self.reset_config(realtime))?;

        info!(
            %latency,
            seconds = core.mu_to_seconds(latency.mu()),
            prefix = self.base().datasets().prefix(),
            "Obtained configuration latency"
        );
        self.base_mut().set_config_latency(latency)?;
        Ok(latency)
    }

    /// Measure and store all self-measurable latencies.
    fn update_latency(&mut self) -> DeviceResult<()> {
        self.update_att_latency()?;
        self.update_config_latency()?;
        Ok(())
    }

    fn update_att_latency(&mut self) -> DeviceResult<Latency> {
        self.base_mut().update_att_latency()
    }

    /// Zero and store all latencies.
    fn clear_latency(&mut self) -> DeviceResult<()> {
        let base = self.base_mut();
        base.clear_sw_latency()?;
        base.clear_att_latency()?;
        base.clear_config_latency()
    }
}
