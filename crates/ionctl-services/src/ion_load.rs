//! Ion loading.
//!
//! [`IonLoadService::load_ions`] repeats loading attempts until the requested
//! number of ions is trapped or the time budget is spent. Between attempts
//! the service yields to the experiment scheduler when it asks for a pause.
//!
//! One attempt:
//!
//! 1. Reset the core, detect and classify. Return early when enough ions are
//!    already trapped.
//! 2. Enable cooling, open the 355 nm shutter and run the [`LoadStrategy`]
//!    with the ablation laser in its guarded context.
//! 3. Always close the 355 nm shutter, restore cooling and sync the timeline.
//!
//! The time spent in step 2 is subtracted from the budget.

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use ionctl_devices::{Ablation, BinaryStateController, Laser355, NUM_CHANNELS, Properties};
use ionctl_hal::units::{KHZ, MS, S};
use ionctl_hal::{Core, CoreHandle, HalError, SchedulerHandle, Shared, SystemDatasets};

use crate::classifier::{Classifier, DetectionWindow};
use crate::cool_prep::CoolPrep;
use crate::detection::{DetectOptions, DetectionService};
use crate::error::{ServiceError, ServiceResult};
use crate::plot::CountPlot;

/// Requested count that loads until the time budget runs out.
pub const MANUAL_LOAD: usize = NUM_CHANNELS + 1;

pub const DEFAULT_BUFFER_SIZE: usize = 3;

pub const MAX_BUFFER_SIZE: usize = 32;

/// Active PMT channels per number of ions.
const ACTIVE_CHANNELS: [&[usize]; NUM_CHANNELS + 1] = [&[], &[0], &[0, 1], &[0, 1, 2]];

/// What happens while the ablation laser is enabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStrategy {
    /// One ablation pulse, after which the requested ions are assumed loaded.
    #[default]
    AblationPulse,
    /// Keep ablating while classifying buffered detection windows.
    MonitorFluorescence,
}

/// Parameters of one [`IonLoadService::load_ions`] call.
///
/// `None` selects the value stored in the system datasets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadRequest {
    /// Ions to load, `0` for a manual load.
    pub num_ions: usize,
    /// Require exactly `num_ions` ions.
    pub strict: bool,
    /// Leave cooling on after loading.
    pub cool_after_loading: bool,
    /// Detection windows in flight while monitoring fluorescence.
    pub buffer_size: usize,
    /// Time budget in seconds.
    pub max_time: Option<f64>,
    /// Release attempts allowed for strict loading.
    pub num_releases: Option<u32>,
    /// Detection window in seconds.
    pub detection_window: Option<f64>,
    /// Pause before every detection window, in seconds.
    pub detection_delay: f64,
    /// Ion absence threshold in Hz.
    pub ion_absence_threshold: Option<f64>,
    pub strategy: LoadStrategy,
}

impl LoadRequest {
    pub fn new(num_ions: usize) -> Self {
        Self {
            num_ions,
            strict: false,
            cool_after_loading: true,
            buffer_size: DEFAULT_BUFFER_SIZE,
            max_time: None,
            num_releases: None,
            detection_window: None,
            detection_delay: 0.0,
            ion_absence_threshold: None,
            strategy: LoadStrategy::default(),
        }
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_cool_after_loading(mut self, cool: bool) -> Self {
        self.cool_after_loading = cool;
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn with_max_time(mut self, max_time: f64) -> Self {
        self.max_time = Some(max_time);
        self
    }

    pub fn with_num_releases(mut self, num_releases: u32) -> Self {
        self.num_releases = Some(num_releases);
        self
    }

    pub fn with_detection_window(mut self, window: f64) -> Self {
        self.detection_window = Some(window);
        self
    }

    pub fn with_detection_delay(mut self, delay: f64) -> Self {
        self.detection_delay = delay;
        self
    }

    pub fn with_ion_absence_threshold(mut self, threshold: f64) -> Self {
        self.ion_absence_threshold = Some(threshold);
        self
    }

    pub fn with_strategy(mut self, strategy: LoadStrategy) -> Self {
        self.strategy = strategy;
        self
    }
}

/// Loading defaults from the system datasets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoadDefaults {
    /// Hz.
    pub ion_absence_threshold: f64,
    /// Seconds.
    pub load_detection_window: f64,
    /// Seconds.
    pub load_max_time: f64,
    pub load_num_releases: u32,
}

impl LoadDefaults {
    pub const ION_ABSENCE_THRESHOLD_KEY: &'static str = "ion_absence_threshold";
    pub const LOAD_DETECTION_WINDOW_KEY: &'static str = "load_detection_window";
    pub const LOAD_MAX_TIME_KEY: &'static str = "load_max_time";
    pub const LOAD_NUM_RELEASES_KEY: &'static str = "load_num_releases";

    /// Read the defaults, storing the fallbacks for absent keys.
    pub fn load(datasets: &SystemDatasets) -> ServiceResult<Self> {
        let fallback = Self::default();
        Ok(Self {
            ion_absence_threshold: datasets
                .get_or(Self::ION_ABSENCE_THRESHOLD_KEY, fallback.ion_absence_threshold)?,
            load_detection_window: datasets
                .get_or(Self::LOAD_DETECTION_WINDOW_KEY, fallback.load_detection_window)?,
            load_max_time: datasets.get_or(Self::LOAD_MAX_TIME_KEY, fallback.load_max_time)?,
            load_num_releases: datasets
                .get_or(Self::LOAD_NUM_RELEASES_KEY, fallback.load_num_releases)?,
        })
    }
}

impl Default for LoadDefaults {
    fn default() -> Self {
        Self {
            ion_absence_threshold: 5.0 * KHZ,
            load_detection_window: 100.0 * MS,
            load_max_time: 300.0 * S,
            load_num_releases: 10,
        }
    }
}

/// A validated request.
#[derive(Debug, Clone, Copy)]
struct LoadPlan {
    requested: usize,
    manual: bool,
    strict: bool,
    cool_after_loading: bool,
    buffer_size: usize,
    max_time_mu: i64,
    window: DetectionWindow,
    strategy: LoadStrategy,
}

/// Modules and services the loader drives.
#[derive(Debug, Clone)]
pub struct IonLoadModules {
    pub core: CoreHandle,
    pub scheduler: SchedulerHandle,
    pub ablation: Shared<Ablation>,
    pub l355: Shared<Laser355>,
    pub cool_prep: CoolPrep,
    pub detection: DetectionService,
    pub properties: Shared<Properties>,
}

/// Ion loading service.
#[derive(Debug, Clone)]
pub struct IonLoadService {
    modules: IonLoadModules,
    defaults: LoadDefaults,
    classifier: Classifier,
    plot: CountPlot,
}

impl IonLoadService {
    pub fn new(modules: IonLoadModules, datasets: &SystemDatasets) -> ServiceResult<Self> {
        Ok(Self {
            modules,
            defaults: LoadDefaults::load(datasets)?,
            classifier: Classifier::default(),
            plot: CountPlot::disabled(),
        })
    }

    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Publish the per-window count rates to `plot`.
    pub fn with_plot(mut self, plot: CountPlot) -> Self {
        self.plot = plot;
        self
    }

    pub fn defaults(&self) -> &LoadDefaults {
        &self.defaults
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Load ions. Returns the number of ions trapped at the end.
    ///
    /// # Errors
    ///
    /// [`ServiceError::IonLoad`] when fewer ions than requested are trapped
    /// once the budget is spent, or when a strict request ends with a
    /// different count. Termination requested by the scheduler propagates
    /// as [`HalError::TerminationRequested`].
    #[instrument(skip(self, request), fields(num_ions = request.num_ions, strict = request.strict))]
    pub async fn load_ions(&self, request: &LoadRequest) -> ServiceResult<usize> {
        let plan = self.plan(request)?;
        let core = &self.modules.core;
        let scheduler = &self.modules.scheduler;

        let mut budget_mu = plan.max_time_mu;
        let mut current = 0;
        self.plot.clear();

        while budget_mu > 0 && current < plan.requested {
            if scheduler.check_pause() {
                debug!("Pausing ion loading");
                core.close_comm();
                if let Err(e) = scheduler.pause().await {
                    if matches!(e, HalError::TerminationRequested) {
                        warn!("Ion loading aborted by user");
                    }
                    return Err(e.into());
                }
            }

            info!("Attempting to load ions");
            (current, budget_mu) = self.attempt_load(&plan, budget_mu)?;

            if budget_mu <= 0 {
                warn!("Loading aborted due to timeout");
            }
            info!("{current} ion(s) loaded");

            self.update_num_ions(current)?;

            if !plan.manual && plan.strict && current > plan.requested {
                error!(
                    loaded = current,
                    requested = plan.requested,
                    "Overloaded ions, releasing ions is not supported"
                );
                break;
            }
        }

        if !plan.manual
            && (current < plan.requested || (plan.strict && current != plan.requested))
        {
            return Err(ServiceError::IonLoad {
                loaded: current,
                requested: plan.requested,
                strict: current >= plan.requested,
            });
        }
        Ok(current)
    }

    fn plan(&self, request: &LoadRequest) -> ServiceResult<LoadPlan> {
        let core = &self.modules.core;
        let max_time = request
            .max_time
            .filter(|&t| t > 0.0)
            .unwrap_or(self.defaults.load_max_time);
        let window = request
            .detection_window
            .filter(|&w| w > 0.0)
            .unwrap_or(self.defaults.load_detection_window);
        let threshold = request
            .ion_absence_threshold
            .filter(|&t| t >= 0.0)
            .unwrap_or(self.defaults.ion_absence_threshold);
        let num_releases = request
            .num_releases
            .unwrap_or(self.defaults.load_num_releases);

        let num_channels = self.modules.detection.num_channels();
        if request.num_ions > num_channels {
            return Err(invalid(format!(
                "Can not load {} ions with {num_channels} PMT channels",
                request.num_ions
            )));
        }
        if request.buffer_size > MAX_BUFFER_SIZE {
            return Err(invalid(format!(
                "Buffer size {} exceeds {MAX_BUFFER_SIZE}",
                request.buffer_size
            )));
        }
        if !(max_time.is_finite() && max_time > 0.0) {
            return Err(invalid(format!("Maximum load time {max_time} s")));
        }
        if !(window.is_finite() && window > 0.0) {
            return Err(invalid(format!("Detection window {window} s")));
        }
        if !(request.detection_delay.is_finite() && request.detection_delay >= 0.0) {
            return Err(invalid(format!(
                "Detection delay {} s",
                request.detection_delay
            )));
        }
        if !(threshold.is_finite() && threshold > 0.0) {
            return Err(invalid(format!("Ion absence threshold {threshold} Hz")));
        }

        let delay_mu = core
            .seconds_to_mu(request.detection_delay)
            .max(core.ref_multiplier());
        let window = DetectionWindow::from_si(window, threshold).with_delay_mu(delay_mu);
        if window.duration_ms < 1 {
            return Err(invalid(format!(
                "Detection window {} s is shorter than 1 ms",
                window.duration()
            )));
        }

        let manual = request.num_ions == 0;
        if manual {
            warn!("Manual loading enabled");
        }
        debug!(
            max_time,
            window_ms = window.duration_ms,
            threshold_khz = window.absence_threshold_khz,
            num_releases,
            "Load plan resolved"
        );

        Ok(LoadPlan {
            requested: if manual { MANUAL_LOAD } else { request.num_ions },
            manual,
            strict: request.strict,
            cool_after_loading: request.cool_after_loading,
            buffer_size: request.buffer_size,
            max_time_mu: core.seconds_to_mu(max_time),
            window,
            strategy: request.strategy,
        })
    }

    /// One loading attempt. Returns the ion count and the remaining budget.
    fn attempt_load(&self, plan: &LoadPlan, budget_mu: i64) -> ServiceResult<(usize, i64)> {
        let core = &self.modules.core;
        core.reset();

        let current = self.detect_num_ions(&plan.window)?;
        if current >= plan.requested {
            return Ok((current, budget_mu));
        }

        let t_start = core.now_mu();
        let t_stop = t_start.saturating_add(budget_mu);
        core.break_realtime();

        let outcome = self.run_strategy(plan, current, t_stop);
        let cleanup = self.finish_attempt(plan.cool_after_loading);
        if outcome.is_err() {
            if let Err(e) = &cleanup {
                error!(error = %e, "Cleanup after load attempt failed");
            }
        }
        let (current, t_end) = outcome?;
        cleanup?;

        Ok((current, budget_mu.saturating_sub(t_end - t_start)))
    }

    /// Returns the ion count and the cursor when ablation ended.
    fn run_strategy(
        &self,
        plan: &LoadPlan,
        current: usize,
        t_stop: i64,
    ) -> ServiceResult<(usize, i64)> {
        self.modules.cool_prep.cool.lock().set_state(true)?;
        self.modules.l355.lock().set_shutter(true, false)?;

        let mut ablation = self.modules.ablation.lock();
        let mut guard = ablation.enter();
        guard.on()?;
        let current = match plan.strategy {
            LoadStrategy::AblationPulse => plan.requested,
            LoadStrategy::MonitorFluorescence => self.monitor_fluorescence(plan, current, t_stop)?,
        };
        guard.off()?;
        guard.exit()?;

        Ok((current, self.modules.core.now_mu()))
    }

    fn finish_attempt(&self, cool_after_loading: bool) -> ServiceResult<()> {
        let core = &self.modules.core;
        core.break_realtime();
        self.modules.l355.lock().set_shutter(false, false)?;
        self.modules
            .cool_prep
            .cool
            .lock()
            .set_state(cool_after_loading)?;
        core.wait_until_mu(core.now_mu())?;
        Ok(())
    }

    /// Classify buffered windows until enough ions show up, the budget ends
    /// at `t_stop` or the scheduler wants to pause.
    fn monitor_fluorescence(
        &self,
        plan: &LoadPlan,
        mut current: usize,
        t_stop: i64,
    ) -> ServiceResult<usize> {
        let core = &self.modules.core;
        let detection = &self.modules.detection;
        core.break_realtime();

        let window_mu = core.seconds_to_mu(plan.window.duration());
        for _ in 0..plan.buffer_size {
            core.delay_mu(plan.window.delay_mu);
            detection.detect_all_mu(window_mu, DetectOptions::counts_only())?;
        }

        while current < plan.requested
            && core.now_mu() < t_stop
            && !self.modules.scheduler.check_pause()
        {
            core.delay_mu(plan.window.delay_mu);
            detection.detect_all_mu(window_mu, DetectOptions::counts_only())?;
            current = self.classify_counts(&plan.window)?;
        }

        for _ in 0..plan.buffer_size {
            current = self.classify_counts(&plan.window)?;
        }
        Ok(current)
    }

    /// Detect and classify without updating any stored state.
    ///
    /// `None` selects the stored window (seconds) and threshold (Hz). No
    /// slack is left afterwards.
    pub fn get_num_ions(
        &self,
        detection_window: Option<f64>,
        ion_absence_threshold: Option<f64>,
    ) -> ServiceResult<usize> {
        let window = detection_window
            .filter(|&w| w > 0.0)
            .unwrap_or(self.defaults.load_detection_window);
        let threshold = ion_absence_threshold
            .filter(|&t| t >= 0.0)
            .unwrap_or(self.defaults.ion_absence_threshold);
        self.detect_num_ions(&DetectionWindow::from_si(window, threshold))
    }

    fn detect_num_ions(&self, window: &DetectionWindow) -> ServiceResult<usize> {
        self.modules
            .detection
            .detect_all(window.duration(), DetectOptions::default())?;
        self.classify_counts(window)
    }

    fn classify_counts(&self, window: &DetectionWindow) -> ServiceResult<usize> {
        let counts = self.modules.detection.count_all()?;
        self.plot.append_counts(&counts, window.duration_ms);
        self.classifier.classify(&counts, window)
    }

    /// Store the ion count and activate the matching PMT channels.
    pub fn update_num_ions(&self, num_ions: usize) -> ServiceResult<()> {
        let num_ions = num_ions.min(NUM_CHANNELS);
        self.modules.properties.lock().set_num_ions(num_ions)?;
        self.modules
            .detection
            .set_active_channels(ACTIVE_CHANNELS[num_ions])
    }
}

fn invalid(message: String) -> ServiceError {
    ServiceError::InvalidParameter(message)
}
