//! Calibrate command implementation.

use anyhow::Result;
use console::style;

use ionctl_devices::{DdsModule, Latency};

use super::common::open_system;
use crate::config::SessionConfig;

/// Execute the calibrate command: measure (or clear) and store the DDS
/// latencies of every laser and the microwave drive.
pub fn execute(config: &SessionConfig, clear: bool) -> Result<()> {
    let action = if clear { "Clearing" } else { "Calibrating" };
    println!(
        "{} {} DDS latencies on the simulated rig",
        style("→").cyan().bold(),
        action
    );

    let system = open_system(config)?;

    {
        let mut l370 = system.l370.lock();
        let mut l355 = system.l355.lock();
        let mut microwave = system.microwave.lock();
        if clear {
            l370.clear_latency()?;
            l355.clear_latency()?;
            microwave.clear_latency()?;
        } else {
            l370.update_latency()?;
            l355.update_latency()?;
            microwave.update_latency()?;
        }
    }

    println!(
        "\n  {:<20} {:>10} {:>10} {:>10}",
        "DDS", "config", "att", "sw"
    );
    let l370 = system.l370.lock();
    let l355 = system.l355.lock();
    let microwave = system.microwave.lock();
    let rows = [
        ("laser370.shutter", l370.shutter().base()),
        ("laser370.dpc", l370.dpc().base()),
        ("laser355.shutter", l355.shutter().base()),
        ("microwave.dds", microwave.dds().base()),
    ];
    for (name, base) in rows {
        println!(
            "  {:<20} {:>10} {:>10} {:>10}",
            style(name).cyan(),
            base.config_latency().mu(),
            base.att_latency().mu(),
            base.sw_latency().mu()
        );
    }

    let cool_sw = l370.cool_switch().latency();
    if cool_sw != Latency::ZERO {
        println!("  {:<20} {:>32}", style("laser370.cool_sw").cyan(), cool_sw.mu());
    }

    println!(
        "\n{} Latencies stored in {}",
        style("✓").green().bold(),
        style(config.dataset_path()?.display()).dim()
    );
    Ok(())
}
