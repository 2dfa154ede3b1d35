//! Load command implementation.

use std::time::Duration;

use anyhow::Result;
use chrono::Local;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use ionctl_hal::Core;
use ionctl_services::{CountPlot, LoadRequest, LoadStrategy, PlotEvent};

use super::common::open_system;
use crate::config::SessionConfig;

/// Options of one load.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub num_ions: usize,
    pub strict: bool,
    pub no_cool: bool,
    pub strategy: Option<LoadStrategy>,
    pub max_time: Option<f64>,
    pub window: Option<f64>,
}

/// Execute the load command.
pub async fn execute(config: &SessionConfig, options: LoadOptions) -> Result<()> {
    let strategy = options.strategy.unwrap_or(config.load.strategy);
    let target = if options.num_ions == 0 {
        "as many ions as possible".to_string()
    } else {
        format!("{} ion(s)", options.num_ions)
    };
    println!(
        "{} Loading {} on the simulated trap ({})",
        style("→").cyan().bold(),
        style(target).green(),
        style(format!("{strategy:?}")).yellow()
    );

    let system = open_system(config)?;

    let mut request = LoadRequest::new(options.num_ions)
        .with_strict(options.strict)
        .with_cool_after_loading(!options.no_cool)
        .with_strategy(strategy);
    if let Some(max_time) = options.max_time.or(config.load.max_time) {
        request = request.with_max_time(max_time);
    }
    if let Some(window) = options.window {
        request = request.with_detection_window(window);
    }

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message("Detecting...");

    let (plot, mut events) = CountPlot::channel();
    let monitor = {
        let pb = pb.clone();
        tokio::spawn(async move {
            let mut windows = 0_usize;
            while let Some(event) = events.recv().await {
                if let PlotEvent::Append(rates) = event {
                    windows += 1;
                    let rates: Vec<String> = rates.iter().map(|r| format!("{r:.1}")).collect();
                    pb.set_message(format!("window {windows}: [{}] kHz", rates.join(", ")));
                }
            }
            windows
        })
    };

    let started = Local::now();
    let loader = system.ion_load.clone().with_plot(plot);
    let result = loader.load_ions(&request).await;
    // Closes the plot channel so the monitor ends.
    drop(loader);
    let windows = monitor.await.unwrap_or_default();
    pb.finish_and_clear();

    let elapsed = system.core().mu_to_seconds(system.core().now_mu());
    match &result {
        Ok(loaded) => {
            println!(
                "\n{} {} ion(s) loaded",
                style("✓").green().bold(),
                style(loaded).yellow().bold()
            );
        }
        Err(e) => {
            println!("\n{} {}", style("✗").red().bold(), e);
        }
    }
    println!("  Trapped (simulated): {}", system.rig.trap.num_ions());
    println!("  Detection windows:   {windows}");
    println!("  Timeline:            {elapsed:.3} s");
    println!("  Started:             {}", started.format("%Y-%m-%d %H:%M:%S"));
    println!(
        "  Finished:            {}",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    );

    result.map(|_| ()).map_err(Into::into)
}
