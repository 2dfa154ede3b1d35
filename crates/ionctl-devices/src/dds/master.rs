//! DDS output shared by several logical switches.
//!
//! The output is on while any sub-switch is on. Each sub-switch starts in an
//! unknown state; turning the output off while another sub-switch is still
//! unknown would silently override it, so that case is an error unless the
//! call is flagged as initial.

use super::{DdsBase, DdsModule};
use crate::error::{DeviceError, DeviceResult};

/// State and "unknown" bit registers of a master switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MasterSwitchState {
    state: u32,
    unknown: u32,
}

impl MasterSwitchState {
    /// Registers for `num_switches` sub-switches, all unknown.
    pub fn new(num_switches: u32) -> Self {
        let unknown = if num_switches >= u32::BITS {
            u32::MAX
        } else {
            (1 << num_switches) - 1
        };
        Self { state: 0, unknown }
    }

    /// Record the state of sub-switch `switch` and return the combined
    /// output state, or `None` if turning off would override an unknown
    /// sub-switch.
    pub fn update(&mut self, switch: u32, on: bool, initial: bool) -> Option<bool> {
        let bit = 1_u32 << switch;
        self.unknown &= !bit;
        if on {
            self.state |= bit;
        } else {
            self.state &= !bit;
        }

        if self.state == 0 && self.unknown != 0 && !initial {
            return None;
        }
        Some(self.state != 0)
    }

    /// All sub-switches off and known.
    pub fn clear(&mut self) {
        self.state = 0;
        self.unknown = 0;
    }

    pub fn state_bits(&self) -> u32 {
        self.state
    }

    pub fn unknown_bits(&self) -> u32 {
        self.unknown
    }
}

impl Default for MasterSwitchState {
    fn default() -> Self {
        Self::new(2)
    }
}

/// A DDS module whose switch is shared by several sub-switches.
#[derive(Debug)]
pub struct MasterSwitchDds<D> {
    dds: D,
    registers: MasterSwitchState,
}

impl<D: DdsModule> MasterSwitchDds<D> {
    pub fn new(dds: D, num_switches: u32) -> Self {
        Self {
            dds,
            registers: MasterSwitchState::new(num_switches),
        }
    }

    /// The wrapped DDS module.
    pub fn inner(&self) -> &D {
        &self.dds
    }

    pub fn inner_mut(&mut self) -> &mut D {
        &mut self.dds
    }

    pub fn registers(&self) -> &MasterSwitchState {
        &self.registers
    }

    /// Set sub-switch `switch` and drive the output accordingly.
    pub fn switch_set(
        &mut self,
        switch: u32,
        on: bool,
        initial: bool,
        realtime: bool,
    ) -> DeviceResult<()> {
        if switch >= u32::BITS {
            return Err(DeviceError::InvalidArgument(format!(
                "Sub-switch {switch} out of range"
            )));
        }
        let output = self.registers.update(switch, on, initial).ok_or_else(|| {
            DeviceError::AmbiguousState(self.dds.base().datasets().prefix().to_string())
        })?;
        self.dds.set(output, realtime)
    }

    /// Turn every sub-switch off without consistency checks.
    pub fn ms_off(&mut self, realtime: bool) -> DeviceResult<()> {
        self.registers.clear();
        self.dds.set(false, realtime)
    }
}

impl<D: DdsModule> DdsModule for MasterSwitchDds<D> {
    fn base(&self) -> &DdsBase {
        self.dds.base()
    }

    fn base_mut(&mut self) -> &mut DdsBase {
        self.dds.base_mut()
    }

    fn reset_config(&mut self, realtime: bool) -> DeviceResult<()> {
        self.dds.reset_config(realtime)
    }

    fn safety_off(&mut self) -> DeviceResult<()> {
        let core = std::sync::Arc::clone(self.base().core());
        core.break_realtime();
        self.ms_off(false)?;
        core.wait_until_mu(core.now_mu())?;
        Ok(())
    }
}
