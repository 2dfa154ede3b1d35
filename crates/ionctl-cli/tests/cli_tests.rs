//! End-to-end tests of the `ionctl` binary.
//!
//! Every test runs in its own temporary home directory so that config and
//! datasets never leak between runs.

use std::path::Path;
use std::process::{Command, Output};

use serde_json::{Value, json};
use tempfile::TempDir;

fn ionctl(home: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ionctl"))
        .args(args)
        .env("HOME", home)
        .env("IONCTL_DATASETS", home.join("datasets.json"))
        .env_remove("IONCTL_SEED")
        .env_remove("IONCTL_LOAD_RATE_HZ")
        .env_remove("IONCTL_LOAD_STRATEGY")
        .output()
        .expect("failed to run ionctl")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Stored dataset values.
fn stored(home: &Path) -> Value {
    let content = std::fs::read_to_string(home.join("datasets.json")).unwrap();
    let file: Value = serde_json::from_str(&content).unwrap();
    file["values"].clone()
}

// ============================================================================
// classify
// ============================================================================

#[test]
fn test_classify_json() {
    let home = TempDir::new().unwrap();
    let output = ionctl(home.path(), &["classify", "0", "20000", "0", "-f", "json"]);

    assert!(output.status.success(), "{output:?}");
    let report: Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(report["num_ions"], 1);
    assert_eq!(report["rates_khz"], json!([0, 200, 0]));
}

#[test]
fn test_classify_wrong_channel_count_fails() {
    let home = TempDir::new().unwrap();
    let output = ionctl(home.path(), &["classify", "0", "20000"]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Error:"));
}

#[test]
fn test_unknown_format_fails() {
    let home = TempDir::new().unwrap();
    let output = ionctl(home.path(), &["classify", "0", "0", "0", "-f", "xml"]);
    assert!(!output.status.success());
}

// ============================================================================
// load
// ============================================================================

#[test]
fn test_load_stores_ion_count() {
    let home = TempDir::new().unwrap();
    let output = ionctl(home.path(), &["load", "1"]);

    assert!(output.status.success(), "{output:?}");
    assert!(stdout(&output).contains("ion(s) loaded"));
    assert_eq!(stored(home.path())["system.properties.num_ions"], 1);
}

#[test]
fn test_load_rejects_too_many_ions() {
    let home = TempDir::new().unwrap();
    let output = ionctl(home.path(), &["load", "4"]);
    assert!(!output.status.success());
}

#[test]
fn test_config_file_is_read() {
    let home = TempDir::new().unwrap();
    let config = home.path().join("lab.yaml");
    std::fs::write(
        &config,
        "trap:\n  initial_ions: 1\nload:\n  strategy: monitor_fluorescence\n",
    )
    .unwrap();

    let output = ionctl(
        home.path(),
        &["load", "1", "--config", config.to_str().unwrap()],
    );

    assert!(output.status.success(), "{output:?}");
    assert!(stdout(&output).contains("MonitorFluorescence"));
    assert_eq!(stored(home.path())["system.properties.num_ions"], 1);
}

#[test]
fn test_missing_config_file_fails() {
    let home = TempDir::new().unwrap();
    let output = ionctl(
        home.path(),
        &["version", "--config", "/nonexistent/ionctl.yaml"],
    );
    assert!(!output.status.success());
}

// ============================================================================
// calibrate and datasets
// ============================================================================

#[test]
fn test_calibrate_then_list_datasets() {
    let home = TempDir::new().unwrap();
    let output = ionctl(home.path(), &["calibrate"]);
    assert!(output.status.success(), "{output:?}");

    let output = ionctl(
        home.path(),
        &["datasets", "system.laser355", "--format", "json"],
    );
    assert!(output.status.success(), "{output:?}");
    let entries: Value = serde_json::from_str(&stdout(&output)).unwrap();
    let entries = entries.as_object().unwrap();
    assert!(entries.contains_key("system.laser355.shutter.dds_latency_mu"));
    assert!(entries.keys().all(|k| k.starts_with("system.laser355")));
}

#[test]
fn test_calibrate_clear_zeroes_latencies() {
    let home = TempDir::new().unwrap();
    assert!(ionctl(home.path(), &["calibrate"]).status.success());
    assert!(ionctl(home.path(), &["calibrate", "--clear"]).status.success());

    let datasets = stored(home.path());
    for key in [
        "system.laser370.shutter.dds_latency_mu",
        "system.laser370.dpc.att_latency_mu",
        "system.microwave.dds.sw_latency_mu",
    ] {
        assert_eq!(datasets[key], 0, "{key}");
    }
}

#[test]
fn test_version() {
    let home = TempDir::new().unwrap();
    let output = ionctl(home.path(), &["version"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains(env!("CARGO_PKG_VERSION")));
}
