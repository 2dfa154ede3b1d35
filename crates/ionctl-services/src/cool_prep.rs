//! Doppler cooling and state preparation with the 370 nm laser.

use ionctl_devices::{BinaryStateController, DeviceResult, Laser370, Mode370, PulseControl};
use ionctl_hal::{CoreHandle, Shared, SystemDatasets};

use crate::error::ServiceResult;

/// Doppler cooling, on by default.
#[derive(Debug)]
pub struct Cooling {
    core: CoreHandle,
    l370: Shared<Laser370>,
    pulse: PulseControl,
}

impl Cooling {
    pub fn new(
        core: CoreHandle,
        l370: Shared<Laser370>,
        datasets: SystemDatasets,
    ) -> ServiceResult<Self> {
        let pulse = PulseControl::new(datasets, true, PulseControl::DEFAULT_PULSE_DURATION)?;
        Ok(Self { core, l370, pulse })
    }
}

impl BinaryStateController for Cooling {
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
        self.l370.lock().set_state(Mode370::Cool, state, true)
    }
}

/// Optical pumping into the qubit state, off by default.
#[derive(Debug)]
pub struct Preparing {
    core: CoreHandle,
    l370: Shared<Laser370>,
    pulse: PulseControl,
}

impl Preparing {
    pub fn new(
        core: CoreHandle,
        l370: Shared<Laser370>,
        datasets: SystemDatasets,
    ) -> ServiceResult<Self> {
        let pulse = PulseControl::new(datasets, false, PulseControl::DEFAULT_PULSE_DURATION)?;
        Ok(Self { core, l370, pulse })
    }
}

impl BinaryStateController for Preparing {
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
        self.l370.lock().set_state(Mode370::Prep, state, false)
    }
}

/// Cooling and preparation controllers sharing one 370 nm laser.
#[derive(Debug, Clone)]
pub struct CoolPrep {
    pub cool: Shared<Cooling>,
    pub prep: Shared<Preparing>,
}

impl CoolPrep {
    /// Build both controllers, with datasets under `doppler` and
    /// `initialization`.
    pub fn new(
        core: CoreHandle,
        l370: Shared<Laser370>,
        datasets: &SystemDatasets,
    ) -> ServiceResult<Self> {
        let cool = Cooling::new(core.clone(), l370.clone(), datasets.child("doppler"))?;
        let prep = Preparing::new(core, l370, datasets.child("initialization"))?;
        Ok(Self {
            cool: Shared::new(cool),
            prep: Shared::new(prep),
        })
    }
}
