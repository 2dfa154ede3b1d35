//! Photomultiplier array with gated photon counting.

use tracing::debug;

use ionctl_hal::{Core, CoreHandle, CounterHandle, HalError, SystemDatasets};

use crate::error::{DeviceError, DeviceResult};

/// Number of PMT channels in the array.
pub const NUM_CHANNELS: usize = 3;

/// Edge counters of the PMT array, one per channel.
///
/// A detection opens the gate of every listed channel at the cursor, waits
/// for the duration and closes all gates. Counts are retrieved afterwards in
/// the same channel order.
#[derive(Debug)]
pub struct PmtArray {
    core: CoreHandle,
    counters: Vec<CounterHandle>,
    datasets: SystemDatasets,
    state_detection_threshold: i32,
    active_channels: Vec<usize>,
}

impl PmtArray {
    pub const STATE_DETECTION_THRESHOLD_KEY: &'static str = "state_detection_threshold";
    pub const ACTIVE_CHANNELS_KEY: &'static str = "active_channels";

    /// Counts at or above this value read as the bright state.
    pub const DEFAULT_STATE_DETECTION_THRESHOLD: i32 = 2;

    pub fn new(
        core: CoreHandle,
        counters: Vec<CounterHandle>,
        datasets: SystemDatasets,
    ) -> DeviceResult<Self> {
        if counters.len() != NUM_CHANNELS {
            return Err(DeviceError::Configuration(format!(
                "PMT array needs {NUM_CHANNELS} counters, got {}",
                counters.len()
            )));
        }

        let state_detection_threshold = datasets.get_or(
            Self::STATE_DETECTION_THRESHOLD_KEY,
            Self::DEFAULT_STATE_DETECTION_THRESHOLD,
        )?;
        let active_channels: Vec<usize> =
            datasets.get_or(Self::ACTIVE_CHANNELS_KEY, Vec::new())?;
        validate_channel_list(&active_channels)
            .map_err(|e| DeviceError::Configuration(format!("Stored active channels: {e}")))?;

        Ok(Self {
            core,
            counters,
            datasets,
            state_detection_threshold,
            active_channels,
        })
    }

    pub fn num_channels(&self) -> usize {
        self.counters.len()
    }

    pub fn active_channels(&self) -> &[usize] {
        &self.active_channels
    }

    pub fn state_detection_threshold(&self) -> i32 {
        self.state_detection_threshold
    }

    /// Gate `channels` for `duration` mu starting at the cursor.
    pub fn detect_channels_mu(&self, channels: &[usize], duration: i64) -> DeviceResult<()> {
        if channels.is_empty() {
            return Err(HalError::EmptyChannelList.into());
        }
        let counters = channels
            .iter()
            .map(|&channel| self.counter(channel))
            .collect::<DeviceResult<Vec<_>>>()?;

        debug!(?channels, duration_mu = duration, "PMT detection");
        for counter in &counters {
            counter.gate_begin()?;
        }
        self.core.delay_mu(duration);
        for counter in &counters {
            counter.gate_end()?;
        }
        Ok(())
    }

    pub fn detect_all_mu(&self, duration: i64) -> DeviceResult<()> {
        let channels: Vec<usize> = (0..self.num_channels()).collect();
        self.detect_channels_mu(&channels, duration)
    }

    pub fn detect_active_mu(&self, duration: i64) -> DeviceResult<()> {
        self.detect_channels_mu(&self.active_channels, duration)
    }

    pub fn detect_mu(&self, channel: usize, duration: i64) -> DeviceResult<()> {
        self.detect_channels_mu(&[channel], duration)
    }

    /// Gate `channels` for `duration` seconds.
    pub fn detect_channels(&self, channels: &[usize], duration: f64) -> DeviceResult<()> {
        self.detect_channels_mu(channels, self.core.seconds_to_mu(duration))
    }

    pub fn detect_all(&self, duration: f64) -> DeviceResult<()> {
        self.detect_all_mu(self.core.seconds_to_mu(duration))
    }

    pub fn detect_active(&self, duration: f64) -> DeviceResult<()> {
        self.detect_active_mu(self.core.seconds_to_mu(duration))
    }

    pub fn detect(&self, channel: usize, duration: f64) -> DeviceResult<()> {
        self.detect_mu(channel, self.core.seconds_to_mu(duration))
    }

    /// Retrieve the oldest count of `channel`.
    pub fn count(&self, channel: usize) -> DeviceResult<i32> {
        Ok(self.counter(channel)?.fetch_count()?)
    }

    /// Retrieve one count per channel, in the order given.
    pub fn count_channels(&self, channels: &[usize]) -> DeviceResult<Vec<i32>> {
        channels.iter().map(|&channel| self.count(channel)).collect()
    }

    pub fn count_all(&self) -> DeviceResult<Vec<i32>> {
        (0..self.num_channels()).map(|c| self.count(c)).collect()
    }

    pub fn count_active(&self) -> DeviceResult<Vec<i32>> {
        self.count_channels(&self.active_channels)
    }

    /// Whether `channel` counted at least the state detection threshold.
    pub fn measure(&self, channel: usize) -> DeviceResult<bool> {
        Ok(self.count(channel)? >= self.state_detection_threshold)
    }

    pub fn measure_channels(&self, channels: &[usize]) -> DeviceResult<Vec<bool>> {
        channels.iter().map(|&channel| self.measure(channel)).collect()
    }

    /// Validate and persist the channels used by active detection.
    pub fn set_active_channels(&mut self, channels: &[usize]) -> DeviceResult<()> {
        validate_channel_list(channels)?;
        self.datasets.set(Self::ACTIVE_CHANNELS_KEY, channels)?;
        self.active_channels = channels.to_vec();
        debug!(?channels, "Active PMT channels set");
        Ok(())
    }

    fn counter(&self, channel: usize) -> DeviceResult<&CounterHandle> {
        self.counters.get(channel).ok_or_else(|| {
            HalError::ChannelOutOfRange {
                channel,
                num_channels: self.counters.len(),
            }
            .into()
        })
    }
}

fn validate_channel_list(channels: &[usize]) -> DeviceResult<()> {
    if channels.len() > NUM_CHANNELS {
        return Err(DeviceError::InvalidArgument(format!(
            "{} channels listed, the array has {NUM_CHANNELS}",
            channels.len()
        )));
    }
    for (i, &channel) in channels.iter().enumerate() {
        if channel >= NUM_CHANNELS {
            return Err(DeviceError::InvalidArgument(format!(
                "Channel {channel} out of range"
            )));
        }
        if channels[..i].contains(&channel) {
            return Err(DeviceError::InvalidArgument(format!(
                "Channel {channel} listed twice"
            )));
        }
    }
    Ok(())
}
