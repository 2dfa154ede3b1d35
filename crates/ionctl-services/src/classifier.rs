//! Ion-count estimation from PMT counts.
//!
//! The PMT array images the ion chain, so the fluorescence pattern across the
//! channels identifies how many ions are trapped. Classification runs in
//! integer arithmetic:
//!
//! 1. Rates per channel in kHz: `count / duration_ms`, rounded down.
//! 2. If no channel reaches the absence threshold, there are no ions.
//! 3. Normalise: `x = isqrt(sum(rate^2) / 10000)` (at least 1),
//!    `norm = rate / x`.
//! 4. Project onto the reference patterns and take the first strict maximum.
//!
//! | Ions | Pattern (channel 0, 1, 2) |
//! |------|---------------------------|
//! | 1 | `[0, 100, 0]` |
//! | 2 | `[30, 60, 30]` |
//! | 3 | `[50, 50, 50]` |
//!
//! With these patterns and non-negative counts the two-ion row never exceeds
//! both other rows, so an estimate of two is not produced. When every
//! projection is zero the estimate is one.

use ndarray::{Array1, Array2, array};
use serde::{Deserialize, Serialize};

use crate::error::{ServiceError, ServiceResult};

/// Timing and threshold of a detection window used for classification.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionWindow {
    /// Gate duration in milliseconds.
    pub duration_ms: i64,
    /// Rate in kHz a channel must reach to indicate an ion.
    pub absence_threshold_khz: f64,
    /// Delay between consecutive windows in machine units.
    pub delay_mu: i64,
}

impl DetectionWindow {
    pub fn new(duration_ms: i64, absence_threshold_khz: f64) -> Self {
        Self {
            duration_ms,
            absence_threshold_khz,
            delay_mu: 0,
        }
    }

    /// Window from a duration in seconds and a threshold in Hz. The
    /// duration is rounded to whole milliseconds.
    pub fn from_si(duration: f64, absence_threshold: f64) -> Self {
        Self::new((duration * 1e3).round() as i64, absence_threshold / 1e3)
    }

    pub fn with_delay_mu(mut self, delay_mu: i64) -> Self {
        self.delay_mu = delay_mu;
        self
    }

    /// Gate duration in seconds.
    pub fn duration(&self) -> f64 {
        self.duration_ms as f64 * 1e-3
    }

    fn validate(&self) -> ServiceResult<()> {
        if self.duration_ms <= 0 {
            return Err(ServiceError::ClassificationInput(format!(
                "Detection window of {} ms",
                self.duration_ms
            )));
        }
        Ok(())
    }
}

/// Integer square root by Newton iteration.
pub fn isqrt(n: u64) -> u64 {
    let mut x = n;
    let mut y = x.div_ceil(2);
    while y < x {
        x = y;
        y = (x + n / x) / 2;
    }
    x
}

/// Estimates the number of ions from one count per PMT channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classifier {
    reference: Array2<i64>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self {
            reference: array![[0, 100, 0], [30, 60, 30], [50, 50, 50]],
        }
    }
}

impl Classifier {
    /// Classifier with custom reference patterns, one row per ion count.
    pub fn new(reference: Array2<i64>) -> ServiceResult<Self> {
        if reference.is_empty() {
            return Err(ServiceError::ClassificationInput(
                "Reference matrix can not be empty".to_string(),
            ));
        }
        Ok(Self { reference })
    }

    pub fn reference(&self) -> &Array2<i64> {
        &self.reference
    }

    /// Largest estimate the classifier can return.
    pub fn max_ions(&self) -> usize {
        self.reference.nrows()
    }

    /// Number of channels the reference patterns cover.
    pub fn num_channels(&self) -> usize {
        self.reference.ncols()
    }

    /// Integer rates in kHz.
    pub fn rates(&self, counts: &[i32], window: &DetectionWindow) -> ServiceResult<Array1<i64>> {
        window.validate()?;
        if counts.is_empty() {
            return Err(ServiceError::ClassificationInput(
                "Count vector can not be empty".to_string(),
            ));
        }
        if counts.len() != self.num_channels() {
            return Err(ServiceError::ClassificationInput(format!(
                "Got {} counts for {} channels",
                counts.len(),
                self.num_channels()
            )));
        }
        Ok(counts
            .iter()
            .map(|&count| i64::from(count).div_euclid(window.duration_ms))
            .collect())
    }

    /// Estimate the number of ions, in `0..=max_ions()`.
    pub fn classify(&self, counts: &[i32], window: &DetectionWindow) -> ServiceResult<usize> {
        let rates = self.rates(counts, window)?;

        if !rates
            .iter()
            .any(|&rate| rate as f64 >= window.absence_threshold_khz)
        {
            return Ok(0);
        }

        let sum_sq: u128 = rates
            .iter()
            .map(|&rate| (i128::from(rate) * i128::from(rate)) as u128)
            .sum();
        let scale = u64::try_from(sum_sq / 10_000).unwrap_or(u64::MAX);
        let x = i64::try_from(isqrt(scale)).unwrap_or(i64::MAX).max(1);
        let norm = rates.mapv(|rate| rate.div_euclid(x));

        let result = self.reference.dot(&norm);
        let mut max_index = 0;
        let mut max_value = 0;
        for (i, &value) in result.iter().enumerate() {
            if value > max_value {
                max_index = i;
                max_value = value;
            }
        }
        Ok(max_index + 1)
    }
}
