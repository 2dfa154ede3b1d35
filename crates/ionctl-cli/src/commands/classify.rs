//! Classify command implementation.

use anyhow::Result;
use console::style;
use serde::Serialize;

use ionctl_services::{Classifier, DetectionWindow};

#[derive(Serialize)]
struct Classification {
    counts: Vec<i32>,
    window: DetectionWindow,
    rates_khz: Vec<i64>,
    num_ions: usize,
}

/// Execute the classify command.
pub fn execute(counts: &[i32], window_ms: i64, threshold_khz: f64, format: &str) -> Result<()> {
    let classifier = Classifier::default();
    let window = DetectionWindow::new(window_ms, threshold_khz);

    let rates = classifier.rates(counts, &window)?;
    let num_ions = classifier.classify(counts, &window)?;

    match format.to_lowercase().as_str() {
        "json" => {
            let report = Classification {
                counts: counts.to_vec(),
                window,
                rates_khz: rates.to_vec(),
                num_ions,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        "table" => {
            println!(
                "{} Classifying counts over {} ms (absence below {} kHz)",
                style("→").cyan().bold(),
                window_ms,
                threshold_khz
            );
            for (channel, (count, rate)) in counts.iter().zip(rates.iter()).enumerate() {
                println!(
                    "  PMT {}: {:>8} counts {:>6} kHz",
                    style(channel).cyan(),
                    count,
                    rate
                );
            }
            println!(
                "\n{} {} ion(s)",
                style("✓").green().bold(),
                style(num_ions).yellow().bold()
            );
        }
        other => anyhow::bail!("Unknown format: '{other}'. Available: table, json"),
    }
    Ok(())
}
