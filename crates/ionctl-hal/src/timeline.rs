//! Real-time core and timeline cursor.
//!
//! The core owns a virtual timeline cursor measured in machine units (mu).
//! Timed operations are scheduled at the cursor; delays move it forward and
//! latency compensation may move it backward within the available slack.
//!
//! ```text
//!   hardware counter ──────────────●·····························▶
//!                                  │<─── slack ───>│
//!   timeline cursor  ──────────────────────────────●─────────────▶
//!                                                now_mu()
//! ```
//!
//! An event submitted at a cursor position that the hardware counter has
//! already passed is rejected with [`HalError::Underflow`](crate::HalError).

use std::sync::Arc;

use crate::error::HalResult;

/// Shared handle to a core.
pub type CoreHandle = Arc<dyn Core>;

/// Timeline interface of the real-time core.
///
/// All methods take `&self`: a core is shared by every device built on it
/// and implementations synchronise internally.
pub trait Core: Send + Sync + std::fmt::Debug {
    /// Duration of one machine unit in seconds.
    fn ref_period(&self) -> f64;

    /// Coarse RTIO clock multiplier, the smallest delay between two
    /// sequential events on different channels.
    fn ref_multiplier(&self) -> i64 {
        8
    }

    /// Current cursor position.
    fn now_mu(&self) -> i64;

    /// Move the cursor to an absolute position.
    fn at_mu(&self, t_mu: i64);

    /// Move the cursor relative to its current position. Negative values
    /// retreat the cursor.
    fn delay_mu(&self, dt_mu: i64);

    /// Move the cursor ahead of the hardware counter so that subsequent
    /// events have slack.
    fn break_realtime(&self);

    /// Block until the hardware counter reaches `t_mu`.
    fn wait_until_mu(&self, t_mu: i64) -> HalResult<()>;

    /// Clear pending events and re-establish slack.
    fn reset(&self);

    /// Close the communication channel to the device. The channel is
    /// reopened transparently by the next operation.
    fn close_comm(&self);

    /// Convert seconds to machine units.
    fn seconds_to_mu(&self, seconds: f64) -> i64 {
        (seconds / self.ref_period()).round() as i64
    }

    /// Convert machine units to seconds.
    fn mu_to_seconds(&self, mu: i64) -> f64 {
        mu as f64 * self.ref_period()
    }

    /// Move the cursor by a duration in seconds.
    fn delay(&self, seconds: f64) {
        self.delay_mu(self.seconds_to_mu(seconds));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Debug)]
    struct FixedCore {
        cursor: Mutex<i64>,
    }

    impl Core for FixedCore {
        fn ref_period(&self) -> f64 {
            1e-9
        }
        fn now_mu(&self) -> i64 {
            *self.cursor.lock().unwrap()
        }
        fn at_mu(&self, t_mu: i64) {
            *self.cursor.lock().unwrap() = t_mu;
        }
        fn delay_mu(&self, dt_mu: i64) {
            *self.cursor.lock().unwrap() += dt_mu;
        }
        fn break_realtime(&self) {}
        fn wait_until_mu(&self, _t_mu: i64) -> HalResult<()> {
            Ok(())
        }
        fn reset(&self) {}
        fn close_comm(&self) {}
    }

    #[test]
    fn test_unit_conversions() {
        let core = FixedCore {
            cursor: Mutex::new(0),
        };
        assert_eq!(core.seconds_to_mu(1e-6), 1_000);
        assert_eq!(core.seconds_to_mu(100e-3), 100_000_000);
        assert!((core.mu_to_seconds(2_500) - 2.5e-6).abs() < 1e-15);
    }

    #[test]
    fn test_delay_in_seconds() {
        let core = FixedCore {
            cursor: Mutex::new(10),
        };
        core.delay(200e-6);
        assert_eq!(core.now_mu(), 200_010);
        core.delay_mu(-10);
        assert_eq!(core.now_mu(), 200_000);
    }
}
