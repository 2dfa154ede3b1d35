//! Microwave drive of the qubit transition.

use tracing::info;

use ionctl_hal::units::MHZ;
use ionctl_hal::{CoreHandle, DdsHandle, SystemDatasets};

use crate::dds::{Dds9910, Dds9910Settings, DdsModule, DdsSettings, MAX_FREQUENCY};
use crate::error::{DeviceError, DeviceResult};
use crate::state_controller::{BinaryStateController, PulseControl};

/// AD9910 channel driving the qubit, with pulses of a pi time by default.
#[derive(Debug)]
pub struct MicrowaveModule {
    core: CoreHandle,
    dds: Dds9910,
    pulse: PulseControl,
    datasets: SystemDatasets,
    qubit_freq: f64,
    rabi_freq: f64,
}

impl MicrowaveModule {
    pub const QUBIT_FREQ_KEY: &'static str = "qubit_freq";
    pub const RABI_FREQ_KEY: &'static str = "rabi_freq";

    pub const DEFAULT_QUBIT_FREQ: f64 = 120.034 * MHZ;
    pub const DEFAULT_RABI_FREQ: f64 = 5.0 * MHZ;

    pub fn new(core: CoreHandle, dds: DdsHandle, datasets: SystemDatasets) -> DeviceResult<Self> {
        let qubit_freq = datasets.get_or(Self::QUBIT_FREQ_KEY, Self::DEFAULT_QUBIT_FREQ)?;
        let rabi_freq = datasets.get_or(Self::RABI_FREQ_KEY, Self::DEFAULT_RABI_FREQ)?;
        validate_frequency(qubit_freq).map_err(to_configuration)?;
        validate_frequency(rabi_freq).map_err(to_configuration)?;

        let dds = Dds9910::new(
            core.clone(),
            dds,
            datasets.child("dds"),
            Dds9910Settings {
                dds: DdsSettings {
                    freq: qubit_freq,
                    att: 10.0,
                    min_att: 10.0,
                    sw: false,
                    ..DdsSettings::default()
                },
                amp: 0.5,
                ..Dds9910Settings::default()
            },
        )?;

        let pi_time = 0.5 / rabi_freq;
        let mut pulse = PulseControl::new(datasets.clone(), false, pi_time)?;
        pulse.set_duration(pi_time);

        Ok(Self {
            core,
            dds,
            pulse,
            datasets,
            qubit_freq,
            rabi_freq,
        })
    }

    pub fn init_kernel(&mut self) -> DeviceResult<()> {
        self.dds.init_kernel(false)
    }

    pub fn qubit_freq(&self) -> f64 {
        self.qubit_freq
    }

    pub fn rabi_freq(&self) -> f64 {
        self.rabi_freq
    }

    /// Duration of a pi pulse in seconds.
    pub fn pi_time(&self) -> f64 {
        0.5 / self.rabi_freq
    }

    /// Persist the qubit frequency. Takes effect on the next build.
    pub fn store_qubit_freq(&self, freq: f64) -> DeviceResult<()> {
        validate_frequency(freq)?;
        self.datasets.set(Self::QUBIT_FREQ_KEY, &freq)?;
        info!(freq, "Stored qubit frequency");
        Ok(())
    }

    /// Persist the Rabi frequency. Takes effect on the next build.
    pub fn store_rabi_freq(&self, freq: f64) -> DeviceResult<()> {
        validate_frequency(freq)?;
        self.datasets.set(Self::RABI_FREQ_KEY, &freq)?;
        info!(freq, "Stored Rabi frequency");
        Ok(())
    }

    pub fn dds(&self) -> &Dds9910 {
        &self.dds
    }

    pub fn dds_mut(&mut self) -> &mut Dds9910 {
        &mut self.dds
    }

    pub fn update_latency(&mut self) -> DeviceResult<()> {
        self.dds.update_latency()
    }

    pub fn clear_latency(&mut self) -> DeviceResult<()> {
        self.dds.clear_latency()
    }
}

impl BinaryStateController for MicrowaveModule {
    fn core(&self) -> &CoreHandle {
        &self.core
    }

    fn pulse_control(&self) -> &PulseControl {
        &self.pulse
    }

    fn pulse_control_mut(&mut self) -> &mut PulseControl {
        &mut self.pulse
    }

    fn set_state(&mut self, state: bool) -> DeviceResult<()> {
        self.dds.set(state, true)
    }

    fn safety_off(&mut self) -> DeviceResult<()> {
        self.dds.safety_off()
    }
}

fn validate_frequency(freq: f64) -> DeviceResult<()> {
    if freq > 0.0 && freq < MAX_FREQUENCY {
        Ok(())
    } else {
        Err(DeviceError::InvalidArgument(format!(
            "Frequency {freq} Hz out of range"
        )))
    }
}

fn to_configuration(e: DeviceError) -> DeviceError {
    DeviceError::Configuration(e.to_string())
}
