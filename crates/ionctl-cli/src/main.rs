//! ionctl Command-Line Interface
//!
//! Runs ion-count classification, ion loading and latency calibration
//! against a simulated trapped-ion rig. Datasets persist in a JSON file
//! between runs.
//!
//! ```text
//! ionctl classify 0 20000 0
//! ionctl load 2 --strategy monitor-fluorescence --max-time 30
//! ionctl calibrate
//! ionctl datasets system.laser370
//! ```

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use console::style;
use tracing_subscriber::EnvFilter;

use ionctl_services::LoadStrategy;

mod commands;
mod config;
mod system;

use commands::load::LoadOptions;
use commands::{calibrate, classify, datasets, load, version};
use config::SessionConfig;

/// ionctl - trapped-ion control on a simulated rig
#[derive(Parser)]
#[command(name = "ionctl")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Configuration file (default: ~/.ionctl/config.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify one PMT count vector into an ion count
    Classify {
        /// Counts of the PMT channels
        #[arg(required = true, num_args = 1.., allow_negative_numbers = true)]
        counts: Vec<i32>,

        /// Detection window in milliseconds
        #[arg(long, default_value = "100")]
        window_ms: i64,

        /// Ion absence threshold in kHz
        #[arg(long, default_value = "5.0")]
        threshold_khz: f64,

        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Load ions into the simulated trap
    Load {
        /// Ions to load, 0 for a manual load
        num_ions: usize,

        /// Fail unless exactly the requested number is loaded
        #[arg(long)]
        strict: bool,

        /// Leave cooling off after loading
        #[arg(long)]
        no_cool: bool,

        /// Loading strategy
        #[arg(short, long, value_enum)]
        strategy: Option<StrategyArg>,

        /// Time budget in seconds
        #[arg(long)]
        max_time: Option<f64>,

        /// Detection window in seconds
        #[arg(long)]
        window: Option<f64>,
    },

    /// Measure and store the DDS latencies
    Calibrate {
        /// Reset the stored latencies to zero instead
        #[arg(long)]
        clear: bool,
    },

    /// Show stored datasets
    Datasets {
        /// Only keys starting with this prefix
        prefix: Option<String>,

        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Show version information
    Version,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StrategyArg {
    AblationPulse,
    MonitorFluorescence,
}

impl From<StrategyArg> for LoadStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::AblationPulse => LoadStrategy::AblationPulse,
            StrategyArg::MonitorFluorescence => LoadStrategy::MonitorFluorescence,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();

    let result = match SessionConfig::load(cli.config.as_deref()) {
        Ok(config) => run(cli.command, &config).await,
        Err(e) => Err(e),
    };

    // Handle errors
    if let Err(e) = result {
        eprintln!("{} {:#}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }

    Ok(())
}

async fn run(command: Commands, config: &SessionConfig) -> anyhow::Result<()> {
    match command {
        Commands::Classify {
            counts,
            window_ms,
            threshold_khz,
            format,
        } => classify::execute(&counts, window_ms, threshold_khz, &format),

        Commands::Load {
            num_ions,
            strict,
            no_cool,
            strategy,
            max_time,
            window,
        } => {
            load::execute(
                config,
                LoadOptions {
                    num_ions,
                    strict,
                    no_cool,
                    strategy: strategy.map(Into::into),
                    max_time,
                    window,
                },
            )
            .await
        }

        Commands::Calibrate { clear } => calibrate::execute(config, clear),

        Commands::Datasets { prefix, format } => {
            datasets::execute(config, prefix.as_deref(), &format)
        }

        Commands::Version => {
            version::execute();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_classify() {
        let cli = Cli::try_parse_from(["ionctl", "classify", "0", "20000", "0"]).unwrap();
        match cli.command {
            Commands::Classify {
                counts,
                window_ms,
                threshold_khz,
                format,
            } => {
                assert_eq!(counts, vec![0, 20_000, 0]);
                assert_eq!(window_ms, 100);
                assert_eq!(threshold_khz, 5.0);
                assert_eq!(format, "table");
            }
            _ => panic!("expected classify"),
        }
    }

    #[test]
    fn test_classify_requires_counts() {
        assert!(Cli::try_parse_from(["ionctl", "classify"]).is_err());
    }

    #[test]
    fn test_parse_load() {
        let cli = Cli::try_parse_from([
            "ionctl",
            "load",
            "2",
            "--strict",
            "--strategy",
            "monitor-fluorescence",
            "--max-time",
            "30",
        ])
        .unwrap();
        match cli.command {
            Commands::Load {
                num_ions,
                strict,
                no_cool,
                strategy,
                max_time,
                window,
            } => {
                assert_eq!(num_ions, 2);
                assert!(strict);
                assert!(!no_cool);
                assert_eq!(strategy, Some(StrategyArg::MonitorFluorescence));
                assert_eq!(max_time, Some(30.0));
                assert_eq!(window, None);
            }
            _ => panic!("expected load"),
        }
    }

    #[test]
    fn test_strategy_conversion() {
        assert_eq!(
            LoadStrategy::from(StrategyArg::AblationPulse),
            LoadStrategy::AblationPulse
        );
        assert_eq!(
            LoadStrategy::from(StrategyArg::MonitorFluorescence),
            LoadStrategy::MonitorFluorescence
        );
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        let result = Cli::try_parse_from(["ionctl", "load", "1", "--strategy", "magic"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_global_flags() {
        let cli =
            Cli::try_parse_from(["ionctl", "calibrate", "-vv", "--config", "lab.yaml"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config, Some(PathBuf::from("lab.yaml")));
        assert!(matches!(cli.command, Commands::Calibrate { clear: false }));
    }

    #[test]
    fn test_parse_datasets() {
        let cli = Cli::try_parse_from(["ionctl", "datasets", "laser370", "-f", "json"]).unwrap();
        match cli.command {
            Commands::Datasets { prefix, format } => {
                assert_eq!(prefix.as_deref(), Some("laser370"));
                assert_eq!(format, "json");
            }
            _ => panic!("expected datasets"),
        }
    }
}
