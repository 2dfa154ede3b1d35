//! ionctl Services
//!
//! Services combine device modules into experiment-level operations. They
//! hold [`Shared`](ionctl_hal::Shared) handles to the modules and never
//! write hardware channels directly.
//!
//! # Overview
//!
//! | Service | Modules | Role |
//! |---------|---------|------|
//! | [`Classifier`] | - | ion count from PMT counts |
//! | [`DetectionService`] | PMT array, 370 nm laser | gated state detection |
//! | [`CoolPrep`] | 370 nm laser | Doppler cooling and state preparation |
//! | [`IonLoadService`] | ablation, 355 nm laser, detection, cooling | ion loading |
//! | [`CountPlot`] | - | live count rates during loading |
//!
//! # Example
//!
//! ```ignore
//! use ionctl_services::{IonLoadService, LoadRequest, LoadStrategy};
//!
//! let loader = IonLoadService::new(modules, &datasets.child("ion_load"))?;
//! let request = LoadRequest::new(1)
//!     .with_strict(true)
//!     .with_strategy(LoadStrategy::MonitorFluorescence);
//! let loaded = loader.load_ions(&request).await?;
//! ```

pub mod classifier;
pub mod cool_prep;
pub mod detection;
pub mod error;
pub mod ion_load;
pub mod plot;

pub use classifier::{Classifier, DetectionWindow, isqrt};
pub use cool_prep::{CoolPrep, Cooling, Preparing};
pub use detection::{DetectOptions, DetectionService};
pub use error::{ServiceError, ServiceResult};
pub use ion_load::{
    DEFAULT_BUFFER_SIZE, IonLoadModules, IonLoadService, LoadDefaults, LoadRequest, LoadStrategy,
    MANUAL_LOAD, MAX_BUFFER_SIZE,
};
pub use plot::{COUNT_PLOT_KEY, CountPlot, PlotEvent};
