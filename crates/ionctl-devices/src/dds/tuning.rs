//! Tuning-word conversions for the AD9910 and AD9912 synthesizers.

use crate::error::{DeviceError, DeviceResult};

/// Word widths and system clock of a DDS chip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tuning {
    ftw_bits: u32,
    pow_bits: u32,
    asf_bits: Option<u32>,
    sysclk: f64,
}

impl Tuning {
    /// Default system clock of both chips.
    pub const DEFAULT_SYSCLK: f64 = 1e9;

    /// AD9910: 32-bit frequency, 16-bit phase, 14-bit amplitude.
    pub const fn ad9910(sysclk: f64) -> Self {
        Self {
            ftw_bits: 32,
            pow_bits: 16,
            asf_bits: Some(14),
            sysclk,
        }
    }

    /// AD9912: 48-bit frequency, 14-bit phase, no amplitude control.
    pub const fn ad9912(sysclk: f64) -> Self {
        Self {
            ftw_bits: 48,
            pow_bits: 14,
            asf_bits: None,
            sysclk,
        }
    }

    pub fn sysclk(&self) -> f64 {
        self.sysclk
    }

    /// Frequency resolution in tuning-word steps per Hz.
    pub fn ftw_per_hz(&self) -> f64 {
        (1_u64 << self.ftw_bits) as f64 / self.sysclk
    }

    pub fn frequency_to_ftw(&self, frequency: f64) -> u64 {
        let mask = (1_u64 << self.ftw_bits) - 1;
        ((frequency * self.ftw_per_hz()).round() as i64 as u64) & mask
    }

    pub fn ftw_to_frequency(&self, ftw: u64) -> f64 {
        ftw as f64 / self.ftw_per_hz()
    }

    pub fn turns_to_pow(&self, turns: f64) -> u32 {
        let mask = (1_u32 << self.pow_bits) - 1;
        ((turns * (1_u64 << self.pow_bits) as f64).round() as i64 as u32) & mask
    }

    pub fn pow_to_turns(&self, pow: u32) -> f64 {
        pow as f64 / (1_u64 << self.pow_bits) as f64
    }

    /// Full-scale amplitude word, if the chip has amplitude control.
    pub fn max_asf(&self) -> Option<u32> {
        self.asf_bits.map(|bits| (1_u32 << bits) - 1)
    }

    /// Convert a relative amplitude in `[0, 1]` to an amplitude word.
    pub fn amplitude_to_asf(&self, amplitude: f64) -> DeviceResult<u32> {
        let full_scale = self.max_asf().ok_or_else(|| {
            DeviceError::InvalidArgument("DDS has no amplitude control".to_string())
        })?;
        let code = (amplitude * f64::from(full_scale)).round();
        if !(0.0..=f64::from(full_scale)).contains(&code) {
            return Err(DeviceError::InvalidArgument(format!(
                "Amplitude {amplitude} out of range"
            )));
        }
        Ok(code as u32)
    }

    pub fn asf_to_amplitude(&self, asf: u32) -> Option<f64> {
        self.max_asf()
            .map(|full_scale| f64::from(asf) / f64::from(full_scale))
    }
}
