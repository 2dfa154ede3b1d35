//! ionctl Device Modules
//!
//! Device modules of the ion-trap setup, built on the `ionctl-hal` traits.
//! Each module owns its hardware channels and its namespace in the system
//! datasets.
//!
//! # Overview
//!
//! | Module | Hardware | Role |
//! |--------|----------|------|
//! | [`Switch`] | TTL | latency-compensated binary switch |
//! | [`Dds9910`], [`Dds9912`] | DDS | tuning, attenuator and RF switch |
//! | [`MasterSwitchDds`] | DDS | one RF switch shared by sub-switches |
//! | [`PmtArray`] | edge counters | gated photon counting |
//! | [`Ablation`] | TTL | ablation laser, guarded |
//! | [`Laser370`], [`Laser355`] | DDS, TTL | CW lasers |
//! | [`MicrowaveModule`] | DDS | qubit drive |
//! | [`TriggerTtl`] | TTL | instrument trigger |
//! | [`Properties`] | - | persisted system properties |
//! | [`Dac8734`] | - | DAC voltage scaling |
//!
//! # Latency compensation
//!
//! Every timed set accepts a `realtime` flag. With `realtime = true` the
//! command is pre-issued by the module's stored [`Latency`] so that its
//! effect lands at the caller's cursor. Without it, configuration writes get
//! a fixed slack instead.
//!
//! ```ignore
//! use ionctl_devices::{Dds9910, Dds9910Settings, DdsModule};
//!
//! let mut dds = Dds9910::new(core, channel, datasets, Dds9910Settings::default())?;
//! dds.update_config_latency()?;
//! dds.config_freq(150e6, true)?;   // takes effect at the cursor
//! dds.set(true, true)?;
//! ```

pub mod ablation;
pub mod cw_laser;
pub mod dac;
pub mod dds;
pub mod error;
pub mod latency;
pub mod microwave;
pub mod pmt;
pub mod properties;
pub mod state_controller;
pub mod switch;
pub mod trigger_ttl;

pub use ablation::{Ablation, AblationGuard};
pub use cw_laser::{Laser355, Laser370, Laser370Channels, Mode370};
pub use dac::{Dac8734, Gain};
pub use dds::{
    Dds9910, Dds9910Settings, Dds9912, DdsBase, DdsModule, DdsSettings, MasterSwitchDds,
    MasterSwitchState, Tuning,
};
pub use error::{DeviceError, DeviceResult};
pub use latency::Latency;
pub use microwave::MicrowaveModule;
pub use pmt::{NUM_CHANNELS, PmtArray};
pub use properties::Properties;
pub use state_controller::{BinaryStateController, PulseControl};
pub use switch::{Switch, SwitchConfig};
pub use trigger_ttl::TriggerTtl;
