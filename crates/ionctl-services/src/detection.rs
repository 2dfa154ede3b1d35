//! State detection with the PMT array and the 370 nm laser.

use tracing::error;

use ionctl_devices::{Laser370, Mode370, PmtArray};
use ionctl_hal::units::US;
use ionctl_hal::{Core, CoreHandle, Shared, SystemDatasets};

use crate::error::ServiceResult;

/// Laser handling around a detection window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectOptions {
    /// Mode the 370 nm laser is configured to, `None` to leave it as is.
    pub mode: Option<Mode370>,
    /// Open the 370 nm shutter for the window.
    pub trigger_shutter: bool,
}

impl Default for DetectOptions {
    fn default() -> Self {
        Self {
            mode: Some(Mode370::Detect),
            trigger_shutter: true,
        }
    }
}

impl DetectOptions {
    /// Gate the PMTs only; the laser is left untouched.
    pub fn counts_only() -> Self {
        Self {
            mode: None,
            trigger_shutter: false,
        }
    }
}

/// Detection service.
///
/// Every detection gates the PMTs for the given duration, or the stored
/// `detection_time` when the duration is not positive. Counts are retrieved
/// afterwards with [`DetectionService::count`].
#[derive(Debug, Clone)]
pub struct DetectionService {
    core: CoreHandle,
    pmt: Shared<PmtArray>,
    l370: Shared<Laser370>,
    detection_time: f64,
}

impl DetectionService {
    pub const DETECTION_TIME_KEY: &'static str = "detection_time";
    pub const DEFAULT_DETECTION_TIME: f64 = 20.0 * US;

    pub fn new(
        core: CoreHandle,
        pmt: Shared<PmtArray>,
        l370: Shared<Laser370>,
        datasets: &SystemDatasets,
    ) -> ServiceResult<Self> {
        let detection_time =
            datasets.get_or(Self::DETECTION_TIME_KEY, Self::DEFAULT_DETECTION_TIME)?;
        Ok(Self {
            core,
            pmt,
            l370,
            detection_time,
        })
    }

    pub fn num_channels(&self) -> usize {
        self.pmt.lock().num_channels()
    }

    /// Default detection duration in seconds.
    pub fn detection_time(&self) -> f64 {
        self.detection_time
    }

    /// Detect on `channels` for `duration` mu.
    ///
    /// An underflow or an invalid channel puts the 370 nm laser back into
    /// its default state with fresh slack before the error is returned.
    pub fn detect_channels_mu(
        &self,
        channels: &[usize],
        duration: i64,
        options: DetectOptions,
    ) -> ServiceResult<()> {
        let duration = if duration > 0 {
            duration
        } else {
            self.core.seconds_to_mu(self.detection_time)
        };

        let result = self.gate(channels, duration, options);
        if let Err(e) = &result {
            if e.is_underflow() || e.is_channel_out_of_range() {
                error!(error = %e, "Detection failed, resetting the 370 laser");
                if let Err(reset) = self.safe_state() {
                    error!(error = %reset, "Resetting the 370 laser failed");
                }
            }
        }
        Ok(result?)
    }

    fn safe_state(&self) -> ServiceResult<()> {
        self.core.break_realtime();
        self.l370.lock().reset(false)?;
        self.core.wait_until_mu(self.core.now_mu())?;
        Ok(())
    }

    fn gate(
        &self,
        channels: &[usize],
        duration: i64,
        options: DetectOptions,
    ) -> ionctl_devices::DeviceResult<()> {
        let mut l370 = self.l370.lock();
        if let Some(mode) = options.mode {
            l370.config_mode(mode, false)?;
        }
        if options.trigger_shutter {
            l370.set_shutter(true, false)?;
        }
        self.pmt.lock().detect_channels_mu(channels, duration)?;
        if options.trigger_shutter {
            l370.set_shutter(false, false)?;
        }
        Ok(())
    }

    pub fn detect_channels(
        &self,
        channels: &[usize],
        duration: f64,
        options: DetectOptions,
    ) -> ServiceResult<()> {
        self.detect_channels_mu(channels, self.core.seconds_to_mu(duration), options)
    }

    pub fn detect_all_mu(&self, duration: i64, options: DetectOptions) -> ServiceResult<()> {
        let channels: Vec<usize> = (0..self.num_channels()).collect();
        self.detect_channels_mu(&channels, duration, options)
    }

    pub fn detect_all(&self, duration: f64, options: DetectOptions) -> ServiceResult<()> {
        self.detect_all_mu(self.core.seconds_to_mu(duration), options)
    }

    pub fn detect_active_mu(&self, duration: i64, options: DetectOptions) -> ServiceResult<()> {
        let channels = self.active_channels();
        self.detect_channels_mu(&channels, duration, options)
    }

    pub fn detect_active(&self, duration: f64, options: DetectOptions) -> ServiceResult<()> {
        self.detect_active_mu(self.core.seconds_to_mu(duration), options)
    }

    pub fn detect_mu(
        &self,
        channel: usize,
        duration: i64,
        options: DetectOptions,
    ) -> ServiceResult<()> {
        self.detect_channels_mu(&[channel], duration, options)
    }

    pub fn detect(
        &self,
        channel: usize,
        duration: f64,
        options: DetectOptions,
    ) -> ServiceResult<()> {
        self.detect_mu(channel, self.core.seconds_to_mu(duration), options)
    }

    /// Oldest count of `channel`. Consumes all slack.
    pub fn count(&self, channel: usize) -> ServiceResult<i32> {
        Ok(self.pmt.lock().count(channel)?)
    }

    /// One count per PMT channel.
    pub fn count_all(&self) -> ServiceResult<Vec<i32>> {
        Ok(self.pmt.lock().count_all()?)
    }

    /// Whether `channel` counted at least the state detection threshold.
    pub fn measure(&self, channel: usize) -> ServiceResult<bool> {
        Ok(self.pmt.lock().measure(channel)?)
    }

    pub fn active_channels(&self) -> Vec<usize> {
        self.pmt.lock().active_channels().to_vec()
    }

    pub fn set_active_channels(&self, channels: &[usize]) -> ServiceResult<()> {
        Ok(self.pmt.lock().set_active_channels(channels)?)
    }

    pub fn state_detection_threshold(&self) -> i32 {
        self.pmt.lock().state_detection_threshold()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ionctl_adapter_sim::{ScriptedCounts, SimCore, SimRig};
    use ionctl_devices::Laser370Channels;
    use ionctl_hal::{DdsChannel, DdsHandle, HalError, HalResult, MemoryDatasets};

    use super::*;

    /// DDS that rejects every write.
    #[derive(Debug)]
    struct DeadDds;

    impl DdsChannel for DeadDds {
        fn init(&self) -> HalResult<()> {
            Err(HalError::Device("DDS not responding".to_string()))
        }

        fn set_mu(&self, _ftw: u64, _pow: u32, _asf: Option<u32>) -> HalResult<()> {
            self.init()
        }

        fn set_att(&self, _att_db: f64) -> HalResult<()> {
            self.init()
        }

        fn set_sw(&self, _state: bool) -> HalResult<()> {
            self.init()
        }
    }

    fn service(rig: &SimRig) -> (DetectionService, Shared<Laser370>) {
        service_with_dpc(rig, rig.dds("urukul0_ch2").unwrap())
    }

    fn service_with_dpc(rig: &SimRig, dpc: DdsHandle) -> (DetectionService, Shared<Laser370>) {
        let datasets = SystemDatasets::new(Arc::new(MemoryDatasets::new()));
        let pmt = PmtArray::new(rig.core.clone(), rig.counters(), datasets.child("pmt")).unwrap();
        let l370 = Laser370::new(
            rig.core.clone(),
            Laser370Channels {
                shutter: rig.dds("urukul0_ch1").unwrap(),
                dpc,
                cool_sw: rig.ttl("ttl2").unwrap(),
            },
            &datasets.child("laser370"),
        )
        .unwrap();
        let l370 = Shared::new(l370);
        let service = DetectionService::new(
            rig.core.clone(),
            Shared::new(pmt),
            l370.clone(),
            &datasets.child("detection"),
        )
        .unwrap();
        (service, l370)
    }

    #[test]
    fn test_default_detection_opens_shutter_in_detect_mode() {
        let script = Arc::new(ScriptedCounts::new());
        script.push_vector(&[3, 4, 5]);
        let rig = SimRig::scripted(script);
        let (detection, l370) = service(&rig);

        rig.core.reset();
        detection.detect_all_mu(0, DetectOptions::default()).unwrap();
        assert_eq!(l370.lock().mode(), Mode370::Detect);

        let gates = rig.core.events_on("ttl4_counter");
        assert_eq!(gates[1].timestamp_mu - gates[0].timestamp_mu, 20_000);
        assert!(!rig.sim_dds("urukul0_ch1").unwrap().state().sw);
        assert_eq!(detection.count_all().unwrap(), vec![3, 4, 5]);
    }

    #[test]
    fn test_counts_only_leaves_laser_alone() {
        let rig = SimRig::scripted(Arc::new(ScriptedCounts::new()));
        let (detection, _l370) = service(&rig);

        rig.core.reset();
        detection.detect_all(1e-3, DetectOptions::counts_only()).unwrap();
        assert!(rig.core.events_on("urukul0_ch1").is_empty());
        assert!(rig.core.events_on("urukul0_ch2").is_empty());
        assert_eq!(rig.core.events_on("ttl6_counter").len(), 2);
    }

    #[test]
    fn test_underflow_resets_laser() {
        let rig = SimRig::scripted(Arc::new(ScriptedCounts::new()));
        let (detection, l370) = service(&rig);

        rig.core.reset();
        rig.core.advance_counter(10 * SimCore::DEFAULT_SLACK_MU);
        let err = detection
            .detect_all_mu(0, DetectOptions::default())
            .unwrap_err();
        assert!(err.is_underflow());

        assert_eq!(l370.lock().mode(), Mode370::Cool);
        assert!(rig.sim_dds("urukul0_ch1").unwrap().state().sw);
        assert_eq!(rig.core.slack_mu(), 0);
    }

    #[test]
    fn test_failed_reset_keeps_detection_error() {
        let rig = SimRig::scripted(Arc::new(ScriptedCounts::new()));
        let (detection, _l370) = service_with_dpc(&rig, Arc::new(DeadDds));

        rig.core.reset();
        rig.core.advance_counter(10 * SimCore::DEFAULT_SLACK_MU);
        let err = detection
            .detect_all_mu(0, DetectOptions::counts_only())
            .unwrap_err();

        // The reset hits the dead DDS; the underflow is still what surfaces.
        assert!(err.is_underflow(), "{err}");
    }

    #[test]
    fn test_out_of_range_channel_resets_laser() {
        let rig = SimRig::scripted(Arc::new(ScriptedCounts::new()));
        let (detection, l370) = service(&rig);

        rig.core.reset();
        let err = detection
            .detect_channels_mu(&[0, 7], 100, DetectOptions::default())
            .unwrap_err();
        assert!(matches!(
            err,
            crate::ServiceError::Device(ref e) if e.is_channel_out_of_range()
        ));
        assert_eq!(l370.lock().mode(), Mode370::Cool);
    }
}
