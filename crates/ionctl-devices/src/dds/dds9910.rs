use tracing::error;

use ionctl_hal::{CoreHandle, DdsHandle, SystemDatasets};

use super::{DdsBase, DdsModule, DdsSettings, MAX_FREQUENCY, Tuning};
use crate::error::{DeviceError, DeviceResult};

/// Build-time defaults of an AD9910 channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dds9910Settings {
    pub dds: DdsSettings,
    pub amp: f64,
    pub max_amp: f64,
}

impl Default for Dds9910Settings {
    fn default() -> Self {
        Self {
            dds: DdsSettings::default(),
            amp: 0.0,
            max_amp: 1.0,
        }
    }
}

/// AD9910 channel: frequency, phase and amplitude control.
#[derive(Debug)]
pub struct Dds9910 {
    base: DdsBase,
    default_amp: f64,
    max_amp: f64,
    max_asf: u32,
    default_ftw: u64,
    default_pow: u32,
    default_asf: u32,
    current_ftw: u64,
    current_pow: u32,
    current_asf: u32,
}

impl Dds9910 {
    pub const AMP_KEY: &'static str = "amp";
    pub const MAX_AMP_KEY: &'static str = "max_amp";

    pub fn new(
        core: CoreHandle,
        dds: DdsHandle,
        datasets: SystemDatasets,
        settings: Dds9910Settings,
    ) -> DeviceResult<Self> {
        Self::with_tuning(
            core,
            dds,
            datasets,
            settings,
            Tuning::ad9910(Tuning::DEFAULT_SYSCLK),
        )
    }

    pub fn with_tuning(
        core: CoreHandle,
        dds: DdsHandle,
        datasets: SystemDatasets,
        settings: Dds9910Settings,
        tuning: Tuning,
    ) -> DeviceResult<Self> {
        check_amplitude("Amplitude", settings.amp)?;
        check_amplitude("Max amplitude", settings.max_amp)?;

        let base = DdsBase::new(core, dds, datasets, tuning, settings.dds)?;
        let datasets = base.datasets();

        let max_amp = datasets.get_or(Self::MAX_AMP_KEY, settings.max_amp)?;
        let default_amp = datasets.get_or(Self::AMP_KEY, settings.amp)?;
        check_amplitude("Max amplitude", max_amp)?;
        check_amplitude("Amplitude", default_amp)?;

        let max_asf = config_error(tuning.amplitude_to_asf(max_amp))?;
        let default_asf = config_error(tuning.amplitude_to_asf(default_amp))?;
        let default_ftw = tuning.frequency_to_ftw(base.defaults().freq);
        let default_pow = tuning.turns_to_pow(base.defaults().phase);

        Ok(Self {
            base,
            default_amp,
            max_amp,
            max_asf,
            default_ftw,
            default_pow,
            default_asf,
            current_ftw: default_ftw,
            current_pow: default_pow,
            current_asf: default_asf,
        })
    }

    /// Configure frequency (Hz), amplitude `[0, 1]` and phase (turns).
    pub fn config(&mut self, freq: f64, amp: f64, phase: f64, realtime: bool) -> DeviceResult<()> {
        let ftw = self.freq_to_ftw(freq)?;
        let asf = self.base.tuning().amplitude_to_asf(amp)?;
        let pow = self.phase_to_pow(phase)?;
        self.config_mu(ftw, asf, pow, realtime)
    }

    /// Configure in machine words. An amplitude word above the maximum is
    /// logged and not written.
    pub fn config_mu(&mut self, ftw: u64, asf: u32, pow: u32, realtime: bool) -> DeviceResult<()> {
        self.base.prepare_write(self.base.config_latency(), realtime);

        if asf <= self.max_asf {
            self.base.dds().set_mu(ftw, pow, Some(asf))?;
            self.current_ftw = ftw;
            self.current_asf = asf;
            self.current_pow = pow;
        } else {
            error!(
                asf,
                max_asf = self.max_asf,
                prefix = self.base.datasets().prefix(),
                "Amplitude set out of range"
            );
        }
        Ok(())
    }

    pub fn config_freq_mu(&mut self, ftw: u64, realtime: bool) -> DeviceResult<()> {
        self.config_mu(ftw, self.current_asf, self.current_pow, realtime)
    }

    pub fn config_amp_mu(&mut self, asf: u32, realtime: bool) -> DeviceResult<()> {
        self.config_mu(self.current_ftw, asf, self.current_pow, realtime)
    }

    pub fn config_phase_mu(&mut self, pow: u32, realtime: bool) -> DeviceResult<()> {
        self.config_mu(self.current_ftw, self.current_asf, pow, realtime)
    }

    pub fn config_freq(&mut self, freq: f64, realtime: bool) -> DeviceResult<()> {
        let ftw = self.freq_to_ftw(freq)?;
        self.config_freq_mu(ftw, realtime)
    }

    pub fn config_amp(&mut self, amp: f64, realtime: bool) -> DeviceResult<()> {
        let asf = self.base.tuning().amplitude_to_asf(amp)?;
        self.config_amp_mu(asf, realtime)
    }

    pub fn config_phase(&mut self, phase: f64, realtime: bool) -> DeviceResult<()> {
        let pow = self.phase_to_pow(phase)?;
        self.config_phase_mu(pow, realtime)
    }

    /// Change the default frequency for subsequent resets.
    pub fn set_default_freq(&mut self, freq: f64) -> DeviceResult<()> {
        self.default_ftw = self.freq_to_ftw(freq)?;
        self.base.defaults_mut().freq = freq;
        Ok(())
    }

    /// Change the default amplitude for subsequent resets.
    pub fn set_default_amp(&mut self, amp: f64) -> DeviceResult<()> {
        self.default_asf = self.base.tuning().amplitude_to_asf(amp)?;
        self.default_amp = amp;
        Ok(())
    }

    /// Change the default phase for subsequent resets.
    pub fn set_default_phase(&mut self, phase: f64) -> DeviceResult<()> {
        self.default_pow = self.phase_to_pow(phase)?;
        self.base.defaults_mut().phase = phase;
        Ok(())
    }

    pub fn default_amp(&self) -> f64 {
        self.default_amp
    }

    pub fn max_amp(&self) -> f64 {
        self.max_amp
    }

    pub fn max_asf(&self) -> u32 {
        self.max_asf
    }

    /// Current `(ftw, asf, pow)` words.
    pub fn current_mu(&self) -> (u64, u32, u32) {
        (self.current_ftw, self.current_asf, self.current_pow)
    }

    fn freq_to_ftw(&self, freq: f64) -> DeviceResult<u64> {
        if !(0.0..=MAX_FREQUENCY).contains(&freq) {
            return Err(DeviceError::InvalidArgument(format!(
                "Frequency {freq} Hz out of range"
            )));
        }
        Ok(self.base.tuning().frequency_to_ftw(freq))
    }

    fn phase_to_pow(&self, phase: f64) -> DeviceResult<u32> {
        if !(0.0..=1.0).contains(&phase) {
            return Err(DeviceError::InvalidArgument(format!(
                "Phase {phase} out of range"
            )));
        }
        Ok(self.base.tuning().turns_to_pow(phase))
    }
}

impl DdsModule for Dds9910 {
    fn base(&self) -> &DdsBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut DdsBase {
        &mut self.base
    }

    fn reset_config(&mut self, realtime: bool) -> DeviceResult<()> {
        self.config_mu(self.default_ftw, self.default_asf, self.default_pow, realtime)
    }
}

fn check_amplitude(what: &str, amp: f64) -> DeviceResult<()> {
    if (0.0..=1.0).contains(&amp) {
        Ok(())
    } else {
        Err(DeviceError::Configuration(format!(
            "{what} {amp} out of range"
        )))
    }
}

fn config_error<T>(result: DeviceResult<T>) -> DeviceResult<T> {
    result.map_err(|e| DeviceError::Configuration(e.to_string()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ionctl_adapter_sim::{SimCore, SimDds, SimValue};
    use ionctl_hal::{Core, MemoryDatasets};

    use super::*;
    use crate::latency::Latency;

    fn dds(settings: Dds9910Settings) -> (Arc<SimCore>, Arc<SimDds>, Dds9910) {
        let core = Arc::new(SimCore::new());
        let sim = Arc::new(SimDds::new(Arc::clone(&core), "urukul0_ch1"));
        let datasets = SystemDatasets::new(Arc::new(MemoryDatasets::new())).child("dds");
        let dds = Dds9910::new(core.clone(), sim.clone(), datasets, settings).unwrap();
        (core, sim, dds)
    }

    fn settings() -> Dds9910Settings {
        Dds9910Settings {
            dds: DdsSettings {
                freq: 200e6,
                att: 10.0,
                min_att: 10.0,
                sw: true,
                ..DdsSettings::default()
            },
            amp: 0.5,
            max_amp: 0.8,
        }
    }

    #[test]
    fn test_build_validation() {
        let core = Arc::new(SimCore::new());
        let sim = Arc::new(SimDds::new(Arc::clone(&core), "urukul0_ch1"));
        let datasets = SystemDatasets::new(Arc::new(MemoryDatasets::new()));
        let result = Dds9910::new(
            core,
            sim,
            datasets,
            Dds9910Settings {
                amp: 1.2,
                ..settings()
            },
        );
        assert!(matches!(result, Err(DeviceError::Configuration(_))));
    }

    #[test]
    fn test_non_realtime_config_adds_slack() {
        let (core, sim, mut dds) = dds(settings());
        core.reset();
        let now = core.now_mu();
        dds.config(100e6, 0.5, 0.0, false).unwrap();

        let events = core.events_on("urukul0_ch1");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].timestamp_mu, now + 200_000);
        assert_eq!(core.now_mu(), now + 200_000 + SimDds::DEFAULT_WRITE_MU);
        assert_eq!(sim.state().ftw, Tuning::ad9910(1e9).frequency_to_ftw(100e6));
    }

    #[test]
    fn test_realtime_config_is_compensated() {
        let (core, _sim, mut dds) = dds(settings());
        let latency = dds.update_config_latency().unwrap();
        assert_eq!(latency, Latency::from_mu(SimDds::DEFAULT_WRITE_MU));
        assert_eq!(dds.base().config_latency(), latency);

        core.reset();
        core.clear_events();
        let now = core.now_mu();
        dds.config_freq(150e6, true).unwrap();

        assert_eq!(core.now_mu(), now);
        assert_eq!(
            core.events_on("urukul0_ch1")[0].timestamp_mu,
            now - SimDds::DEFAULT_WRITE_MU
        );
    }

    #[test]
    fn test_amplitude_above_max_is_not_written() {
        let (core, sim, mut dds) = dds(settings());
        core.reset();
        let before = dds.current_mu();
        dds.config_amp(0.9, false).unwrap();

        assert!(core.events_on("urukul0_ch1").is_empty());
        assert_eq!(dds.current_mu(), before);
        assert_eq!(sim.state().asf, None);
    }

    #[test]
    fn test_attenuation_below_min_is_not_written() {
        let (core, sim, mut dds) = dds(settings());
        core.reset();
        dds.config_att(5.0, false).unwrap();
        assert!(core.events_on("urukul0_ch1").is_empty());
        assert_eq!(sim.state().att_db, 31.5);

        dds.config_att(12.0, false).unwrap();
        assert_eq!(sim.state().att_db, 12.0);
    }

    #[test]
    fn test_field_setters_keep_other_words() {
        let (core, _sim, mut dds) = dds(settings());
        core.reset();
        dds.config(100e6, 0.25, 0.5, false).unwrap();
        let (ftw, asf, _) = dds.current_mu();

        dds.config_phase(0.25, false).unwrap();
        let (ftw2, asf2, pow2) = dds.current_mu();
        assert_eq!((ftw2, asf2), (ftw, asf));
        assert_eq!(pow2, 0x4000);

        match core.events_on("urukul0_ch1").last().map(|e| e.value.clone()) {
            Some(SimValue::Tuning { asf: Some(a), .. }) => assert_eq!(a, asf),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_reset_applies_defaults() {
        let (core, sim, mut dds) = dds(settings());
        dds.init_kernel(false).unwrap();

        let state = sim.state();
        assert!(state.initialized);
        assert!(state.sw);
        assert_eq!(state.att_db, 10.0);
        assert_eq!(state.ftw, Tuning::ad9910(1e9).frequency_to_ftw(200e6));
        assert_eq!(state.asf, Some(Tuning::ad9910(1e9).amplitude_to_asf(0.5).unwrap()));
        assert_eq!(core.slack_mu(), 0);
    }

    #[test]
    fn test_realtime_switch_is_symmetric() {
        let (core, _sim, mut dds) = dds(settings());
        dds.base_mut().set_sw_latency(Latency::from_mu(300));
        core.reset();
        let now = core.now_mu();
        dds.set(false, true).unwrap();
        assert_eq!(core.now_mu(), now);
        assert_eq!(core.events_on("urukul0_ch1")[0].timestamp_mu, now - 300);
        assert!(!dds.base().sw_state());
    }

    #[test]
    fn test_stored_defaults_override_build_values() {
        let core = Arc::new(SimCore::new());
        let sim = Arc::new(SimDds::new(Arc::clone(&core), "urukul0_ch2"));
        let datasets = SystemDatasets::new(Arc::new(MemoryDatasets::new())).child("dds");
        datasets.set(DdsBase::FREQ_KEY, &150e6).unwrap();
        datasets.set(Dds9910::AMP_KEY, &0.75).unwrap();
        datasets.set(DdsBase::CONFIG_LATENCY_MU_KEY, &99_i64).unwrap();

        let dds = Dds9910::new(core, sim, datasets, settings()).unwrap();
        assert_eq!(dds.base().defaults().freq, 150e6);
        assert_eq!(dds.default_amp(), 0.75);
        assert_eq!(dds.base().config_latency(), Latency::from_mu(99));
    }
}
