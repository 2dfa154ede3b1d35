//! DAC8734 voltage scaling.
//!
//! The DAC takes a signed 16-bit full-scale-range code. The output voltage
//! is `code / 2^16 * gain * v_ref`.

use crate::error::{DeviceError, DeviceResult};

/// Output gain of a DAC8734 channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Gain {
    X2,
    #[default]
    X4,
}

impl Gain {
    pub fn factor(self) -> f64 {
        match self {
            Gain::X2 => 2.0,
            Gain::X4 => 4.0,
        }
    }
}

impl TryFrom<u8> for Gain {
    type Error = DeviceError;

    fn try_from(value: u8) -> DeviceResult<Self> {
        match value {
            2 => Ok(Gain::X2),
            4 => Ok(Gain::X4),
            other => Err(DeviceError::Configuration(format!(
                "DAC gain must be 2 or 4, got {other}"
            ))),
        }
    }
}

/// Voltage scaling of a DAC8734.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dac8734 {
    gain: Gain,
    v_ref: f64,
}

impl Default for Dac8734 {
    fn default() -> Self {
        Self::new(Gain::default(), Self::DEFAULT_V_REF)
    }
}

impl Dac8734 {
    pub const DEFAULT_V_REF: f64 = 5.0;

    const FULL_SCALE: f64 = 65_536.0;
    const MIN_CODE: i32 = -32_768;
    const MAX_CODE: i32 = 32_767;

    pub fn new(gain: Gain, v_ref: f64) -> Self {
        Self { gain, v_ref }
    }

    pub fn gain(&self) -> Gain {
        self.gain
    }

    pub fn v_ref(&self) -> f64 {
        self.v_ref
    }

    /// Voltage of one code step.
    pub fn lsb(&self) -> f64 {
        self.gain.factor() * self.v_ref / Self::FULL_SCALE
    }

    /// Convert an output voltage to a full-scale-range code.
    pub fn vout_to_fsr(&self, vout: f64) -> DeviceResult<i32> {
        let code = (vout / self.gain.factor() / self.v_ref * Self::FULL_SCALE).round_ties_even();
        if !(f64::from(Self::MIN_CODE)..=f64::from(Self::MAX_CODE)).contains(&code) {
            return Err(DeviceError::InvalidArgument(format!(
                "Voltage {vout} V out of range"
            )));
        }
        Ok(code as i32)
    }

    /// Convert a full-scale-range code to an output voltage.
    pub fn fsr_to_vout(&self, code: i32) -> DeviceResult<f64> {
        if !(Self::MIN_CODE..=Self::MAX_CODE).contains(&code) {
            return Err(DeviceError::InvalidArgument(format!(
                "DAC code {code} out of range"
            )));
        }
        Ok(f64::from(code) / Self::FULL_SCALE * self.gain.factor() * self.v_ref)
    }
}
