use ionctl_hal::units::US;
use ionctl_hal::{CoreHandle, SystemDatasets, TtlHandle};

use crate::error::DeviceResult;
use crate::state_controller::{BinaryStateController, PulseControl};
use crate::switch::{Switch, SwitchConfig};

/// TTL trigger for external instruments, pulsed for 10 us by default.
#[derive(Debug)]
pub struct TriggerTtl {
    core: CoreHandle,
    switch: Switch,
    pulse: PulseControl,
}

impl TriggerTtl {
    pub const DEFAULT_PULSE_DURATION: f64 = 10.0 * US;

    pub fn new(core: CoreHandle, ttl: TtlHandle, datasets: SystemDatasets) -> DeviceResult<Self> {
        let switch = Switch::new(
            core.clone(),
            ttl,
            datasets.child("switch"),
            SwitchConfig::default(),
        )?;
        let pulse = PulseControl::new(datasets, false, Self::DEFAULT_PULSE_DURATION)?;
        Ok(Self {
            core,
            switch,
            pulse,
        })
    }

    pub fn init_kernel(&mut self) -> DeviceResult<()> {
        self.switch.init_kernel()
    }

    pub fn switch(&self) -> &Switch {
        &self.switch
    }

    pub fn switch_mut(&mut self) -> &mut Switch {
        &mut self.switch
    }
}

impl BinaryStateController for TriggerTtl {
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
        self.switch.set(state, true)
    }

    fn safety_off(&mut self) -> DeviceResult<()> {
        self.switch.safety_off()
    }
}
