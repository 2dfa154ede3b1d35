//! ionctl Simulated Hardware
//!
//! A deterministic in-process stand-in for the real-time core and the
//! devices of the ion-trap setup. Used by the test suites and by the
//! `ionctl` CLI when no hardware is attached.
//!
//! # Features
//!
//! - **Timeline**: [`SimCore`] tracks the cursor and a hardware counter and
//!   rejects events behind the counter with an underflow
//! - **Event log**: every accepted TTL edge, DDS write and counter gate is
//!   recorded as a [`SimEvent`] for inspection
//! - **Ion trap**: [`SimIonTrap`] generates PMT counts from trapped ions and
//!   loads ions while the ablation TTL is high
//! - **Scripted counts**: [`ScriptedCounts`] replays fixed count vectors
//! - **Scheduler**: [`SimScheduler`] scripts pause and termination requests
//!
//! # Example
//!
//! ```ignore
//! use ionctl_adapter_sim::{SimRig, TrapParameters};
//! use ionctl_hal::Core;
//!
//! let rig = SimRig::new(TrapParameters::default(), 42);
//! rig.core.reset();
//! let ablation = rig.ttl("ttl1")?;
//! ablation.set_o(true)?;
//! rig.core.delay(1e-3);
//! ablation.set_o(false)?;
//! assert_eq!(rig.core.events_on("ttl1").len(), 2);
//! ```

mod counter;
mod dds;
mod rig;
mod scheduler;
mod timeline;
mod trap;
mod ttl;

pub use counter::{CountSource, ScriptedCounts, SimEdgeCounter};
pub use dds::{SimDds, SimDdsState};
pub use rig::{ABLATION_TTL, COUNTER_KEYS, DDS_KEYS, SimRig, TTL_KEYS};
pub use scheduler::SimScheduler;
pub use timeline::{SimCore, SimEvent, SimValue};
pub use trap::{SimIonTrap, TrapParameters};
pub use ttl::SimTtl;
