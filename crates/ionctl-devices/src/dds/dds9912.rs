use ionctl_hal::{CoreHandle, DdsHandle, SystemDatasets};

use super::{DdsBase, DdsModule, DdsSettings, MAX_FREQUENCY, Tuning};
use crate::error::{DeviceError, DeviceResult};

/// AD9912 channel: frequency and phase control.
#[derive(Debug)]
pub struct Dds9912 {
    base: DdsBase,
    default_ftw: u64,
    default_pow: u32,
    current_ftw: u64,
    current_pow: u32,
}

impl Dds9912 {
    pub fn new(
        core: CoreHandle,
        dds: DdsHandle,
        datasets: SystemDatasets,
        settings: DdsSettings,
    ) -> DeviceResult<Self> {
        let tuning = Tuning::ad9912(Tuning::DEFAULT_SYSCLK);
        let base = DdsBase::new(core, dds, datasets, tuning, settings)?;
        let default_ftw = tuning.frequency_to_ftw(base.defaults().freq);
        let default_pow = tuning.turns_to_pow(base.defaults().phase);

        Ok(Self {
            base,
            default_ftw,
            default_pow,
            current_ftw: default_ftw,
            current_pow: default_pow,
        })
    }

    /// Configure frequency (Hz) and phase (turns).
    pub fn config(&mut self, freq: f64, phase: f64, realtime: bool) -> DeviceResult<()> {
        let ftw = self.freq_to_ftw(freq)?;
        let pow = self.phase_to_pow(phase)?;
        self.config_mu(ftw, pow, realtime)
    }

    pub fn config_mu(&mut self, ftw: u64, pow: u32, realtime: bool) -> DeviceResult<()> {
        self.base.prepare_write(self.base.config_latency(), realtime);
        self.base.dds().set_mu(ftw, pow, None)?;
        self.current_ftw = ftw;
        self.current_pow = pow;
        Ok(())
    }

    pub fn config_freq_mu(&mut self, ftw: u64, realtime: bool) -> DeviceResult<()> {
        self.config_mu(ftw, self.current_pow, realtime)
    }

    pub fn config_phase_mu(&mut self, pow: u32, realtime: bool) -> DeviceResult<()> {
        self.config_mu(self.current_ftw, pow, realtime)
    }

    pub fn config_freq(&mut self, freq: f64, realtime: bool) -> DeviceResult<()> {
        let ftw = self.freq_to_ftw(freq)?;
        self.config_freq_mu(ftw, realtime)
    }

    pub fn config_phase(&mut self, phase: f64, realtime: bool) -> DeviceResult<()> {
        let pow = self.phase_to_pow(phase)?;
        self.config_phase_mu(pow, realtime)
    }

    /// Current `(ftw, pow)` words.
    pub fn current_mu(&self) -> (u64, u32) {
        (self.current_ftw, self.current_pow)
    }

    fn freq_to_ftw(&self, freq: f64) -> DeviceResult<u64> {
        if !(0.0..=MAX_FREQUENCY).contains(&freq) {
            return Err(DeviceError::InvalidArgument(format!(
                "Frequency {freq} Hz out of range"
            )));
        }
        Ok(self.base.tuning().frequency_to_ftw(freq))
    }

    fn phase_to_pow(&self, phase: f64) -> DeviceResult<u32> {
        if !(0.0..=1.0).contains(&phase) {
            return Err(DeviceError::InvalidArgument(format!(
                "Phase {phase} out of range"
            )));
        }
        Ok(self.base.tuning().turns_to_pow(phase))
    }
}

impl DdsModule for Dds9912 {
    fn base(&self) -> &DdsBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut DdsBase {
        &mut self.base
    }

    fn reset_config(&mut self, realtime: bool) -> DeviceResult<()> {
        self.config_mu(self.default_ftw, self.default_pow, realtime)
    }
}
