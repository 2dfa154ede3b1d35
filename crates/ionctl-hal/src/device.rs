//! Timed device channels.
//!
//! These traits are the only operations the control layer issues to
//! hardware. Every call is scheduled at the core's current cursor.

use std::sync::Arc;

use crate::error::HalResult;

/// Digital output line.
pub trait TtlOut: Send + Sync + std::fmt::Debug {
    /// Schedule the output level at the cursor. Zero-duration on the
    /// timeline.
    fn set_o(&self, level: bool) -> HalResult<()>;
}

/// Direct digital synthesizer channel with an RF switch and a digital step
/// attenuator.
///
/// Tuning words are passed in machine units; the word widths depend on the
/// chip (see the `dds::tuning` module of `ionctl-devices`).
pub trait DdsChannel: Send + Sync + std::fmt::Debug {
    /// Initialize the chip.
    fn init(&self) -> HalResult<()>;

    /// Write frequency, phase and (if supported) amplitude words.
    /// Advances the cursor by the duration of the serial write.
    fn set_mu(&self, ftw: u64, pow: u32, asf: Option<u32>) -> HalResult<()>;

    /// Write the attenuator in dB. Advances the cursor by the duration of
    /// the serial write.
    fn set_att(&self, att_db: f64) -> HalResult<()>;

    /// Set the RF switch. Zero-duration on the timeline.
    fn set_sw(&self, state: bool) -> HalResult<()>;
}

/// Gated photon-event counter.
pub trait EdgeCounter: Send + Sync + std::fmt::Debug {
    /// Open the counting gate at the cursor.
    fn gate_begin(&self) -> HalResult<()>;

    /// Close the counting gate at the cursor and queue the count.
    fn gate_end(&self) -> HalResult<()>;

    /// Retrieve the oldest queued count. Blocks until the gate closing
    /// event has passed, which consumes all slack.
    fn fetch_count(&self) -> HalResult<i32>;
}

/// Shared TTL output.
pub type TtlHandle = Arc<dyn TtlOut>;

/// Shared DDS channel.
pub type DdsHandle = Arc<dyn DdsChannel>;

/// Shared edge counter.
pub type CounterHandle = Arc<dyn EdgeCounter>;
