//! Live plot of PMT count rates during ion loading.
//!
//! Producers never block: points are sent over an unbounded channel and are
//! dropped silently when no consumer is attached.

use tokio::sync::mpsc;

/// Dataset key under which the load count plot is published.
pub const COUNT_PLOT_KEY: &str = "plot.load.counts";

/// Update sent to a plot consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum PlotEvent {
    /// Discard all previous points.
    Clear,
    /// One rate per PMT channel, in kHz.
    Append(Vec<f64>),
}

/// Sending half of the count plot.
#[derive(Debug, Clone)]
pub struct CountPlot {
    tx: Option<mpsc::UnboundedSender<PlotEvent>>,
}

impl CountPlot {
    /// Create a plot and the receiver its events go to.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PlotEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A plot without consumer.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn clear(&self) {
        self.send(PlotEvent::Clear);
    }

    /// Append the rates of one detection window of `duration_ms`.
    pub fn append_counts(&self, counts: &[i32], duration_ms: i64) {
        let rates = counts
            .iter()
            .map(|&count| f64::from(count) / duration_ms as f64)
            .collect();
        self.send(PlotEvent::Append(rates));
    }

    fn send(&self, event: PlotEvent) {
        if let Some(tx) = &self.tx {
            // A closed receiver only means nobody is watching.
            let _ = tx.send(event);
        }
    }
}

impl Default for CountPlot {
    fn default() -> Self {
        Self::disabled()
    }
}
