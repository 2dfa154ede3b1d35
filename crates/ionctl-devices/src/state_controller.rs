//! Binary state controllers.
//!
//! Every laser, shutter or drive that is either on or off implements
//! [`BinaryStateController`]. Implementors supply `set_state` and access to
//! their [`PulseControl`]; pulses, resets and the safety path are provided.
//!
//! ```ignore
//! trigger.pulse_mu(0)?;          // default pulse duration
//! cooling.on()?;
//! cooling.reset()?;              // back to the default state
//! ```

use tracing::{debug, warn};

use ionctl_hal::units::MS;
use ionctl_hal::{Core, CoreHandle, SystemDatasets};

use crate::error::{DeviceError, DeviceResult};

/// Default state and pulse duration of a controller.
#[derive(Debug, Clone)]
pub struct PulseControl {
    datasets: SystemDatasets,
    default_state: bool,
    default_pulse_duration: f64,
}

impl PulseControl {
    pub const DEFAULT_PULSE_DURATION_KEY: &'static str = "default_pulse_duration";

    /// Fallback pulse duration in seconds.
    pub const DEFAULT_PULSE_DURATION: f64 = 1.0 * MS;

    /// Load the default pulse duration from `datasets`, falling back to
    /// `fallback_duration` seconds.
    pub fn new(
        datasets: SystemDatasets,
        default_state: bool,
        fallback_duration: f64,
    ) -> DeviceResult<Self> {
        let default_pulse_duration =
            datasets.get_or(Self::DEFAULT_PULSE_DURATION_KEY, fallback_duration)?;
        if !(default_pulse_duration.is_finite() && default_pulse_duration > 0.0) {
            return Err(DeviceError::Configuration(format!(
                "Default pulse duration {default_pulse_duration} s must be positive"
            )));
        }

        Ok(Self {
            datasets,
            default_state,
            default_pulse_duration,
        })
    }

    pub fn datasets(&self) -> &SystemDatasets {
        &self.datasets
    }

    pub fn default_state(&self) -> bool {
        self.default_state
    }

    /// Default pulse duration in seconds.
    pub fn default_pulse_duration(&self) -> f64 {
        self.default_pulse_duration
    }

    pub(crate) fn set_duration(&mut self, duration: f64) {
        self.default_pulse_duration = duration;
    }
}

/// An on/off device with pulse support.
pub trait BinaryStateController: Send {
    fn core(&self) -> &CoreHandle;

    fn pulse_control(&self) -> &PulseControl;

    fn pulse_control_mut(&mut self) -> &mut PulseControl;

    /// Drive the device into `state` at the cursor.
    fn set_state(&mut self, state: bool) -> DeviceResult<()>;

    fn on(&mut self) -> DeviceResult<()> {
        self.set_state(true)
    }

    fn off(&mut self) -> DeviceResult<()> {
        self.set_state(false)
    }

    /// Return to the default state.
    fn reset(&mut self) -> DeviceResult<()> {
        let state = self.pulse_control().default_state();
        self.set_state(state)
    }

    /// Switch off with guaranteed slack.
    fn safety_off(&mut self) -> DeviceResult<()> {
        let core = std::sync::Arc::clone(self.core());
        core.break_realtime();
        self.off()?;
        core.wait_until_mu(core.now_mu())?;
        Ok(())
    }

    /// Pulse for `duration` mu, or the default duration when not positive.
    ///
    /// An underflow during the pulse switches the device off with slack
    /// before the error is returned.
    fn pulse_mu(&mut self, duration: i64) -> DeviceResult<()> {
        let core = std::sync::Arc::clone(self.core());
        let duration = if duration > 0 {
            duration
        } else {
            core.seconds_to_mu(self.pulse_control().default_pulse_duration())
        };

        let result = self.on().and_then(|()| {
            core.delay_mu(duration);
            self.off()
        });

        match result {
            Err(e) if e.is_underflow() => {
                warn!(duration_mu = duration, "Underflow during pulse, switching off");
                self.safety_off()?;
                Err(e)
            }
            other => other,
        }
    }

    /// Pulse for `duration` seconds.
    fn pulse(&mut self, duration: f64) -> DeviceResult<()> {
        let duration = self.core().seconds_to_mu(duration);
        self.pulse_mu(duration)
    }

    fn default_pulse_duration(&self) -> f64 {
        self.pulse_control().default_pulse_duration()
    }

    /// Use `duration` seconds as the default pulse duration.
    fn set_default_pulse_duration(&mut self, duration: f64) -> DeviceResult<()> {
        if !(duration.is_finite() && duration > 0.0) {
            return Err(DeviceError::InvalidArgument(format!(
                "Pulse duration {duration} s must be positive"
            )));
        }
        debug!(duration, "Default pulse duration set");
        self.pulse_control_mut().set_duration(duration);
        Ok(())
    }

    fn set_default_pulse_duration_mu(&mut self, duration: i64) -> DeviceResult<()> {
        let duration = self.core().mu_to_seconds(duration);
        self.set_default_pulse_duration(duration)
    }

    /// Persist the current default pulse duration.
    fn store_default_pulse_duration(&self) -> DeviceResult<()> {
        let control = self.pulse_control();
        control.datasets.set(
            PulseControl::DEFAULT_PULSE_DURATION_KEY,
            &control.default_pulse_duration,
        )?;
        Ok(())
    }
}
