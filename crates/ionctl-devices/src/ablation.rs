//! Ablation laser used for ion loading.
//!
//! The laser only fires inside an [`AblationGuard`]. Leaving the guard, by
//! [`AblationGuard::exit`] or by dropping it, always turns the laser off.

use std::ops::{Deref, DerefMut};

use tracing::{error, warn};

use ionctl_hal::{Core, CoreHandle, TtlHandle};

use crate::error::DeviceResult;

/// Ablation laser trigger on a TTL output.
#[derive(Debug)]
pub struct Ablation {
    core: CoreHandle,
    ttl: TtlHandle,
    in_context: bool,
    state: bool,
}

impl Ablation {
    pub fn new(core: CoreHandle, ttl: TtlHandle) -> Self {
        Self {
            core,
            ttl,
            in_context: false,
            state: false,
        }
    }

    /// Make sure the laser is off.
    pub fn init_kernel(&mut self) -> DeviceResult<()> {
        self.core.reset();
        self.off()?;
        self.core.wait_until_mu(self.core.now_mu())?;
        Ok(())
    }

    /// Turn the laser on. Outside a guard this only logs a warning.
    pub fn on(&mut self) -> DeviceResult<()> {
        if !self.in_context {
            warn!("Ablation laser can only be turned on inside its context");
            return Ok(());
        }
        self.core.break_realtime();
        self.ttl.set_o(true)?;
        self.state = true;
        Ok(())
    }

    pub fn off(&mut self) -> DeviceResult<()> {
        self.core.break_realtime();
        self.ttl.set_o(false)?;
        self.state = false;
        Ok(())
    }

    /// Last state set.
    pub fn ablation_state(&self) -> bool {
        self.state
    }

    pub fn in_context(&self) -> bool {
        self.in_context
    }

    /// Enter the context in which the laser may be turned on.
    pub fn enter(&mut self) -> AblationGuard<'_> {
        self.in_context = true;
        AblationGuard {
            ablation: self,
            exited: false,
        }
    }
}

/// Scope in which the ablation laser may fire.
#[derive(Debug)]
pub struct AblationGuard<'a> {
    ablation: &'a mut Ablation,
    exited: bool,
}

impl AblationGuard<'_> {
    /// Leave the context, turning the laser off.
    pub fn exit(mut self) -> DeviceResult<()> {
        self.exited = true;
        self.ablation.in_context = false;
        self.ablation.off()
    }
}

impl Deref for AblationGuard<'_> {
    type Target = Ablation;

    fn deref(&self) -> &Ablation {
        self.ablation
    }
}

impl DerefMut for AblationGuard<'_> {
    fn deref_mut(&mut self) -> &mut Ablation {
        self.ablation
    }
}

impl Drop for AblationGuard<'_> {
    fn drop(&mut self) {
        if self.exited {
            return;
        }
        self.ablation.in_context = false;
        if let Err(e) = self.ablation.off() {
            error!(error = %e, "Failed to turn off the ablation laser");
        }
    }
}

#[cfg(test)]
mod tests {
    use ionctl_adapter_sim::{ABLATION_TTL, SimRig, SimValue, TrapParameters};

    use super::*;

    fn ablation() -> (SimRig, Ablation) {
        let rig = SimRig::new(TrapParameters::default(), 1);
        let ablation = Ablation::new(rig.core.clone(), rig.ttl(ABLATION_TTL).unwrap());
        (rig, ablation)
    }

    #[test]
    fn test_on_outside_context_is_ignored() {
        let (rig, mut ablation) = ablation();
        rig.core.reset();
        ablation.on().unwrap();
        assert!(!ablation.ablation_state());
        assert!(rig.core.events_on(ABLATION_TTL).is_empty());
    }

    #[test]
    fn test_exit_turns_off() {
        let (rig, mut ablation) = ablation();
        rig.core.reset();
        let mut guard = ablation.enter();
        guard.on().unwrap();
        assert!(guard.ablation_state());
        assert!(rig.trap.ablation_on());
        guard.exit().unwrap();

        assert!(!ablation.ablation_state());
        assert!(!ablation.in_context());
        assert!(!rig.trap.ablation_on());
    }

    #[test]
    fn test_drop_turns_off_on_early_return() {
        let (rig, mut ablation) = ablation();
        rig.core.reset();

        let run = |ablation: &mut Ablation| -> DeviceResult<()> {
            let mut guard = ablation.enter();
            guard.on()?;
            Err(crate::error::DeviceError::InvalidArgument("abort".into()))
        };
        assert!(run(&mut ablation).is_err());

        assert!(!ablation.ablation_state());
        let events = rig.core.events_on(ABLATION_TTL);
        assert_eq!(events.last().map(|e| e.value.clone()), Some(SimValue::Level(false)));
    }

    #[test]
    fn test_init_kernel_turns_off() {
        let (rig, mut ablation) = ablation();
        ablation.init_kernel().unwrap();
        assert_eq!(rig.core.events_on(ABLATION_TTL).len(), 1);
        assert_eq!(rig.core.slack_mu(), 0);
    }
}
