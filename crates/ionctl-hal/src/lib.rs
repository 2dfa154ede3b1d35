//! ionctl Hardware Abstraction Layer
//!
//! This crate defines the interface between the ion-trap control modules and
//! the real-time hardware they drive. Nothing in here talks to hardware; the
//! traits are implemented by a backend such as `ionctl-adapter-sim`.
//!
//! # Overview
//!
//! - A [`Core`] owning the timeline cursor, in machine units (mu)
//! - Timed device channels: [`TtlOut`], [`DdsChannel`], [`EdgeCounter`]
//! - Persisted calibration values via [`DatasetStore`] and the namespaced
//!   [`SystemDatasets`] view
//! - The [`ExperimentScheduler`] a long-running loop yields to
//! - [`Shared`] handles for device modules used by several services
//!
//! # Timeline model
//!
//! Every timed call is scheduled at `core.now_mu()`. Operations with a
//! duration advance the cursor; zero-duration events (TTL edges, RF switch
//! toggles) do not. Scheduling behind the hardware counter fails with
//! [`HalError::Underflow`].
//!
//! ```ignore
//! use ionctl_hal::{Core, TtlOut, HalResult};
//!
//! fn pulse(core: &dyn Core, ttl: &dyn TtlOut, duration: f64) -> HalResult<()> {
//!     ttl.set_o(true)?;
//!     core.delay(duration);
//!     ttl.set_o(false)
//! }
//! ```

pub mod dataset;
pub mod device;
pub mod error;
pub mod scheduler;
pub mod shared;
pub mod timeline;
pub mod units;

pub use dataset::{DatasetHandle, DatasetStore, JsonFileDatasets, MemoryDatasets, SystemDatasets};
pub use device::{CounterHandle, DdsChannel, DdsHandle, EdgeCounter, TtlHandle, TtlOut};
pub use error::{HalError, HalResult};
pub use scheduler::{ExperimentScheduler, SchedulerHandle};
pub use shared::Shared;
pub use timeline::{Core, CoreHandle};
