//! Integration tests for latency compensation on the simulated rig.
//!
//! These tests calibrate device latencies against the simulator and check
//! that realtime operations then take effect at the caller's cursor.

use std::sync::Arc;

use ionctl_adapter_sim::{SimDds, SimRig, SimValue, TrapParameters};
use ionctl_devices::{
    Dds9910, Dds9910Settings, DdsModule, Laser370, Laser370Channels, Latency, Mode370, Switch,
    SwitchConfig,
};
use ionctl_hal::{Core, JsonFileDatasets, MemoryDatasets, SystemDatasets};

fn rig() -> SimRig {
    SimRig::new(TrapParameters::default(), 7)
}

fn memory_datasets() -> SystemDatasets {
    SystemDatasets::new(Arc::new(MemoryDatasets::new()))
}

// ============================================================================
// DDS configuration latency
// ============================================================================

#[test]
fn test_calibrated_config_write_completes_at_cursor() {
    let rig = rig();
    let mut dds = Dds9910::new(
        rig.core.clone(),
        rig.dds("urukul0_ch2").unwrap(),
        memory_datasets().child("dds"),
        Dds9910Settings::default(),
    )
    .unwrap();

    let latency = dds.update_config_latency().unwrap();
    assert_eq!(latency, Latency::from_mu(SimDds::DEFAULT_WRITE_MU));

    rig.core.reset();
    rig.core.delay_mu(50_000);
    let cursor = rig.core.now_mu();
    dds.config_freq(180e6, true).unwrap();

    assert_eq!(rig.core.now_mu(), cursor);
    let write = rig.core.events_on("urukul0_ch2").pop().unwrap();
    assert_eq!(write.timestamp_mu, cursor - SimDds::DEFAULT_WRITE_MU);
}

#[test]
fn test_attenuator_latency_is_measured_and_cleared() {
    let rig = rig();
    let datasets = memory_datasets().child("dds");
    let mut dds = Dds9910::new(
        rig.core.clone(),
        rig.dds("urukul0_ch1").unwrap(),
        datasets.clone(),
        Dds9910Settings::default(),
    )
    .unwrap();

    dds.update_latency().unwrap();
    assert_eq!(datasets.get::<i64>("att_latency_mu").unwrap(), Some(1_248));
    assert_eq!(datasets.get::<i64>("dds_latency_mu").unwrap(), Some(1_248));

    dds.clear_latency().unwrap();
    assert_eq!(dds.base().att_latency(), Latency::ZERO);
    assert_eq!(datasets.get::<i64>("dds_latency_mu").unwrap(), Some(0));
    assert_eq!(datasets.get::<i64>("sw_latency_mu").unwrap(), Some(0));
}

// ============================================================================
// Switch latency
// ============================================================================

#[test]
fn test_stored_switch_latency_is_applied_on_build() {
    let rig = rig();
    let datasets = memory_datasets().child("switch");
    let build = || {
        Switch::new(
            rig.core.clone(),
            rig.ttl("ttl0").unwrap(),
            datasets.clone(),
            SwitchConfig::default(),
        )
        .unwrap()
    };

    build().store_latency(Latency::from_mu(320)).unwrap();
    let mut switch = build();
    assert_eq!(switch.latency(), Latency::from_mu(320));

    rig.core.reset();
    let cursor = rig.core.now_mu();
    switch.set(true, true).unwrap();
    switch.set(false, true).unwrap();

    let stamps: Vec<i64> = rig
        .core
        .events_on("ttl0")
        .iter()
        .map(|e| e.timestamp_mu)
        .collect();
    assert_eq!(stamps, vec![cursor - 320, cursor - 320]);
    assert_eq!(rig.core.now_mu(), cursor);
}

// ============================================================================
// Persistence
// ============================================================================

#[test]
fn test_latencies_survive_a_file_backed_session() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("datasets.json");
    let rig = rig();

    let channels = || Laser370Channels {
        shutter: rig.dds("urukul0_ch1").unwrap(),
        dpc: rig.dds("urukul0_ch2").unwrap(),
        cool_sw: rig.ttl("ttl2").unwrap(),
    };

    {
        let datasets = SystemDatasets::new(Arc::new(JsonFileDatasets::open(&path).unwrap()));
        let mut laser = Laser370::new(rig.core.clone(), channels(), &datasets.child("laser370"))
            .unwrap();
        laser.update_latency().unwrap();
    }

    let datasets = SystemDatasets::new(Arc::new(JsonFileDatasets::open(&path).unwrap()));
    let mut laser =
        Laser370::new(rig.core.clone(), channels(), &datasets.child("laser370")).unwrap();
    assert_eq!(laser.dpc().base().config_latency(), Latency::from_mu(1_248));

    rig.core.reset();
    rig.core.clear_events();
    let cursor = rig.core.now_mu();
    laser.config_mode(Mode370::Prep, true).unwrap();
    assert_eq!(rig.core.now_mu(), cursor + 1_000);

    let dpc = rig.core.events_on("urukul0_ch2");
    assert_eq!(dpc[0].timestamp_mu, cursor - 1_248);
    assert_eq!(dpc.last().unwrap().value, SimValue::Switch(true));
}
