//! Simulated TTL output.

use std::sync::Arc;

use ionctl_hal::{HalResult, TtlOut};

use crate::timeline::{SimCore, SimValue};

type Listener = Box<dyn Fn(bool) + Send + Sync>;

/// TTL output recording its edges on the simulated timeline.
pub struct SimTtl {
    core: Arc<SimCore>,
    channel: String,
    listener: Option<Listener>,
}

impl SimTtl {
    /// Create a TTL output on `channel`.
    pub fn new(core: Arc<SimCore>, channel: impl Into<String>) -> Self {
        Self {
            core,
            channel: channel.into(),
            listener: None,
        }
    }

    /// Invoke `listener` with the level of every accepted edge.
    pub fn with_listener(mut self, listener: impl Fn(bool) + Send + Sync + 'static) -> Self {
        self.listener = Some(Box::new(listener));
        self
    }

    /// Channel name.
    pub fn channel(&self) -> &str {
        &self.channel
    }
}

impl std::fmt::Debug for SimTtl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimTtl")
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

impl TtlOut for SimTtl {
    fn set_o(&self, level: bool) -> HalResult<()> {
        self.core.submit(&self.channel, SimValue::Level(level))?;
        if let Some(listener) = &self.listener {
            listener(level);
        }
        Ok(())
    }
}
