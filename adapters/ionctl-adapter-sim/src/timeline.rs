//! Simulated real-time core.

use std::sync::Mutex;

use tracing::{debug, trace};

use ionctl_hal::{Core, HalError, HalResult};

/// Payload of a simulated timeline event.
#[derive(Debug, Clone, PartialEq)]
pub enum SimValue {
    /// TTL output level.
    Level(bool),
    /// DDS RF switch state.
    Switch(bool),
    /// DDS tuning words.
    Tuning {
        ftw: u64,
        pow: u32,
        asf: Option<u32>,
    },
    /// DDS attenuator setting in dB.
    Attenuation(f64),
    /// DDS chip initialization.
    Init,
    /// Edge counter gate opened.
    GateOpen,
    /// Edge counter gate closed.
    GateClose,
}

/// An event accepted by the simulated core.
#[derive(Debug, Clone, PartialEq)]
pub struct SimEvent {
    /// Cursor position at submission.
    pub timestamp_mu: i64,
    /// Device channel name.
    pub channel: String,
    /// Event payload.
    pub value: SimValue,
}

#[derive(Debug, Default)]
struct Timeline {
    cursor: i64,
    counter: i64,
    events: Vec<SimEvent>,
    resets: usize,
    comm_closes: usize,
}

/// Simulated core with a 1 ns machine unit.
///
/// The hardware counter only moves when the host waits for it
/// ([`Core::wait_until_mu`], fetching a count) or when a test advances it
/// explicitly with [`SimCore::advance_counter`]. This keeps simulated
/// sessions fully deterministic.
#[derive(Debug)]
pub struct SimCore {
    timeline: Mutex<Timeline>,
    ref_period: f64,
    slack_mu: i64,
}

impl SimCore {
    /// Slack granted by `reset` and `break_realtime`.
    pub const DEFAULT_SLACK_MU: i64 = 125_000;

    /// Create a core with default settings.
    pub fn new() -> Self {
        Self::with_slack(Self::DEFAULT_SLACK_MU)
    }

    /// Create a core granting `slack_mu` on `reset` and `break_realtime`.
    pub fn with_slack(slack_mu: i64) -> Self {
        Self {
            timeline: Mutex::new(Timeline::default()),
            ref_period: 1e-9,
            slack_mu,
        }
    }

    fn timeline(&self) -> std::sync::MutexGuard<'_, Timeline> {
        self.timeline
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Submit an event at the cursor.
    pub fn submit(&self, channel: &str, value: SimValue) -> HalResult<()> {
        let mut timeline = self.timeline();
        if timeline.cursor < timeline.counter {
            debug!(
                channel,
                at_mu = timeline.cursor,
                counter_mu = timeline.counter,
                "Rejected event behind the hardware counter"
            );
            return Err(HalError::Underflow {
                at_mu: timeline.cursor,
                counter_mu: timeline.counter,
            });
        }
        trace!(channel, at_mu = timeline.cursor, ?value, "Event");
        let event = SimEvent {
            timestamp_mu: timeline.cursor,
            channel: channel.to_string(),
            value,
        };
        timeline.events.push(event);
        Ok(())
    }

    /// Current hardware counter.
    pub fn hardware_counter(&self) -> i64 {
        self.timeline().counter
    }

    /// Move the hardware counter forward, consuming slack.
    pub fn advance_counter(&self, dt_mu: i64) {
        self.timeline().counter += dt_mu.max(0);
    }

    /// Slack between cursor and hardware counter.
    pub fn slack_mu(&self) -> i64 {
        let timeline = self.timeline();
        timeline.cursor - timeline.counter
    }

    /// All accepted events in submission order.
    pub fn events(&self) -> Vec<SimEvent> {
        self.timeline().events.clone()
    }

    /// Accepted events of one channel.
    pub fn events_on(&self, channel: &str) -> Vec<SimEvent> {
        self.timeline()
            .events
            .iter()
            .filter(|e| e.channel == channel)
            .cloned()
            .collect()
    }

    /// Forget all recorded events.
    pub fn clear_events(&self) {
        self.timeline().events.clear();
    }

    /// Number of `reset` calls so far.
    pub fn reset_count(&self) -> usize {
        self.timeline().resets
    }

    /// Number of `close_comm` calls so far.
    pub fn comm_close_count(&self) -> usize {
        self.timeline().comm_closes
    }
}

impl Default for SimCore {
    fn default() -> Self {
        Self::new()
    }
}

impl Core for SimCore {
    fn ref_period(&self) -> f64 {
        self.ref_period
    }

    fn now_mu(&self) -> i64 {
        self.timeline().cursor
    }

    fn at_mu(&self, t_mu: i64) {
        self.timeline().cursor = t_mu;
    }

    fn delay_mu(&self, dt_mu: i64) {
        self.timeline().cursor += dt_mu;
    }

    fn break_realtime(&self) {
        let mut timeline = self.timeline();
        let min_cursor = timeline.counter + self.slack_mu;
        if timeline.cursor < min_cursor {
            timeline.cursor = min_cursor;
        }
    }

    fn wait_until_mu(&self, t_mu: i64) -> HalResult<()> {
        let mut timeline = self.timeline();
        if timeline.counter < t_mu {
            timeline.counter = t_mu;
        }
        Ok(())
    }

    fn reset(&self) {
        let mut timeline = self.timeline();
        timeline.cursor = timeline.counter + self.slack_mu;
        timeline.resets += 1;
    }

    fn close_comm(&self) {
        self.timeline().comm_closes += 1;
        debug!("Core communication closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_grants_slack() {
        let core = SimCore::new();
        core.advance_counter(1_000);
        core.reset();
        assert_eq!(core.now_mu(), 1_000 + SimCore::DEFAULT_SLACK_MU);
        assert_eq!(core.slack_mu(), SimCore::DEFAULT_SLACK_MU);
        assert_eq!(core.reset_count(), 1);
    }

    #[test]
    fn test_underflow_behind_counter() {
        let core = SimCore::new();
        core.reset();
        core.advance_counter(2 * SimCore::DEFAULT_SLACK_MU);

        let err = core.submit("ttl0", SimValue::Level(true)).unwrap_err();
        assert!(err.is_underflow());
        assert!(core.events().is_empty());

        core.break_realtime();
        core.submit("ttl0", SimValue::Level(true)).unwrap();
        assert_eq!(core.events_on("ttl0").len(), 1);
    }

    #[test]
    fn test_break_realtime_never_retreats() {
        let core = SimCore::new();
        core.delay_mu(10 * SimCore::DEFAULT_SLACK_MU);
        let before = core.now_mu();
        core.break_realtime();
        assert_eq!(core.now_mu(), before);
    }

    #[test]
    fn test_wait_until_consumes_slack() {
        let core = SimCore::new();
        core.reset();
        let now = core.now_mu();
        core.wait_until_mu(now).unwrap();
        assert_eq!(core.hardware_counter(), now);
        assert_eq!(core.slack_mu(), 0);
    }
}
