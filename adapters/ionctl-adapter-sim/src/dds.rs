//! Simulated DDS channel.

use std::sync::{Arc, Mutex};

use ionctl_hal::{Core, DdsChannel, HalResult};

use crate::timeline::{SimCore, SimValue};

/// Register state of a simulated DDS channel.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SimDdsState {
    pub initialized: bool,
    pub ftw: u64,
    pub pow: u32,
    pub asf: Option<u32>,
    pub att_db: f64,
    pub sw: bool,
}

/// DDS channel whose serial writes take a fixed time on the timeline.
#[derive(Debug)]
pub struct SimDds {
    core: Arc<SimCore>,
    channel: String,
    write_mu: i64,
    state: Mutex<SimDdsState>,
}

impl SimDds {
    /// Duration of one tuning-word or attenuator write.
    pub const DEFAULT_WRITE_MU: i64 = 1_248;

    /// Create a DDS channel on `channel`.
    pub fn new(core: Arc<SimCore>, channel: impl Into<String>) -> Self {
        Self {
            core,
            channel: channel.into(),
            write_mu: Self::DEFAULT_WRITE_MU,
            state: Mutex::new(SimDdsState {
                att_db: 31.5,
                ..SimDdsState::default()
            }),
        }
    }

    /// Override the write duration.
    pub fn with_write_mu(mut self, write_mu: i64) -> Self {
        self.write_mu = write_mu;
        self
    }

    /// Channel name.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Snapshot of the register state.
    pub fn state(&self) -> SimDdsState {
        *self.lock()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimDdsState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self, value: SimValue) -> HalResult<()> {
        self.core.submit(&self.channel, value)?;
        self.core.delay_mu(self.write_mu);
        Ok(())
    }
}

impl DdsChannel for SimDds {
    fn init(&self) -> HalResult<()> {
        self.write(SimValue::Init)?;
        self.lock().initialized = true;
        Ok(())
    }

    fn set_mu(&self, ftw: u64, pow: u32, asf: Option<u32>) -> HalResult<()> {
        self.write(SimValue::Tuning { ftw, pow, asf })?;
        let mut state = self.lock();
        state.ftw = ftw;
        state.pow = pow;
        state.asf = asf;
        Ok(())
    }

    fn set_att(&self, att_db: f64) -> HalResult<()> {
        self.write(SimValue::Attenuation(att_db))?;
        self.lock().att_db = att_db;
        Ok(())
    }

    fn set_sw(&self, on: bool) -> HalResult<()> {
        self.core.submit(&self.channel, SimValue::Switch(on))?;
        self.lock().sw = on;
        Ok(())
    }
}
