//! Integration tests for the ion-load loop on the simulated rig.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use ndarray::array;

use ionctl_adapter_sim::{
    ABLATION_TTL, CountSource, ScriptedCounts, SimCore, SimRig, SimValue, TrapParameters,
};
use ionctl_devices::{Ablation, Laser355, Laser370, Laser370Channels, PmtArray, Properties};
use ionctl_hal::{Core, MemoryDatasets, Shared, SystemDatasets};
use ionctl_services::{
    Classifier, CoolPrep, CountPlot, DetectionService, IonLoadModules, IonLoadService,
    LoadRequest, LoadStrategy, PlotEvent, ServiceError,
};

struct Session {
    rig: SimRig,
    loader: IonLoadService,
    detection: DetectionService,
    properties: Shared<Properties>,
    l370: Shared<Laser370>,
}

fn session(rig: SimRig) -> Session {
    let datasets = SystemDatasets::new(Arc::new(MemoryDatasets::new()));
    let core = rig.core.clone();

    let pmt = PmtArray::new(core.clone(), rig.counters(), datasets.child("pmt")).unwrap();
    let l370 = Laser370::new(
        core.clone(),
        Laser370Channels {
            shutter: rig.dds("urukul0_ch1").unwrap(),
            dpc: rig.dds("urukul0_ch2").unwrap(),
            cool_sw: rig.ttl("ttl2").unwrap(),
        },
        &datasets.child("laser370"),
    )
    .unwrap();
    let l355 = Laser355::new(
        core.clone(),
        rig.dds("urukul0_ch0").unwrap(),
        &datasets.child("laser355"),
    )
    .unwrap();
    let l370 = Shared::new(l370);

    let detection = DetectionService::new(
        core.clone(),
        Shared::new(pmt),
        l370.clone(),
        &datasets.child("detection"),
    )
    .unwrap();
    let cool_prep =
        CoolPrep::new(core.clone(), l370.clone(), &datasets.child("cool_prep")).unwrap();
    let properties = Shared::new(Properties::new(datasets.child("properties")).unwrap());

    let modules = IonLoadModules {
        core: core.clone(),
        scheduler: rig.scheduler.clone(),
        ablation: Shared::new(Ablation::new(core, rig.ttl(ABLATION_TTL).unwrap())),
        l355: Shared::new(l355),
        cool_prep,
        detection: detection.clone(),
        properties: properties.clone(),
    };
    let loader = IonLoadService::new(modules, &datasets.child("ion_load")).unwrap();

    Session {
        rig,
        loader,
        detection,
        properties,
        l370,
    }
}

/// Dark counts; the `stall_at`-th fetch pushes the hardware counter far
/// past the cursor, as a host falling behind the timeline would.
struct StallingCounts {
    core: OnceLock<Arc<SimCore>>,
    fetches: AtomicUsize,
    stall_at: usize,
}

impl CountSource for StallingCounts {
    fn count(&self, _channel: usize, _begin_mu: i64, _end_mu: i64, _ref_period: f64) -> i32 {
        if self.fetches.fetch_add(1, Ordering::SeqCst) == self.stall_at {
            if let Some(core) = self.core.get() {
                core.advance_counter(10_000_000_000);
            }
        }
        0
    }
}

fn stalling(stall_at: usize) -> SimRig {
    let source = Arc::new(StallingCounts {
        core: OnceLock::new(),
        fetches: AtomicUsize::new(0),
        stall_at,
    });
    let rig = SimRig::with_source(source.clone());
    source.core.set(rig.core.clone()).unwrap();
    rig
}

fn scripted(vectors: &[[i32; 3]]) -> SimRig {
    let script = Arc::new(ScriptedCounts::new());
    for counts in vectors {
        script.push_vector(counts);
    }
    SimRig::scripted(script)
}

// ============================================================================
// Loop termination
// ============================================================================

#[tokio::test]
async fn test_ion_already_present_ends_after_one_attempt() {
    let s = session(scripted(&[[0, 20_000, 0]]));

    let loaded = s.loader.load_ions(&LoadRequest::new(1)).await.unwrap();

    assert_eq!(loaded, 1);
    assert_eq!(s.rig.core.reset_count(), 1);
    assert_eq!(s.properties.lock().num_ions(), 1);
    assert_eq!(s.detection.active_channels(), vec![0]);
    // No ablation when the ion was already there.
    assert!(s.rig.core.events_on(ABLATION_TTL).is_empty());
}

#[tokio::test]
async fn test_ablation_pulse_assumes_requested_ions() {
    let s = session(scripted(&[]));

    let loaded = s.loader.load_ions(&LoadRequest::new(2)).await.unwrap();

    assert_eq!(loaded, 2);
    let edges: Vec<SimValue> = s
        .rig
        .core
        .events_on(ABLATION_TTL)
        .into_iter()
        .map(|e| e.value)
        .collect();
    assert_eq!(edges.first(), Some(&SimValue::Level(true)));
    assert_eq!(edges.last(), Some(&SimValue::Level(false)));
    assert!(!s.rig.trap.ablation_on());
    assert_eq!(s.detection.active_channels(), vec![0, 1]);
}

#[tokio::test]
async fn test_deadline_reports_missing_ions() {
    let s = session(scripted(&[]));
    let request = LoadRequest::new(3)
        .with_strategy(LoadStrategy::MonitorFluorescence)
        .with_max_time(5e-3)
        .with_detection_window(1e-3);

    let err = s.loader.load_ions(&request).await.unwrap_err();

    assert!(matches!(
        err,
        ServiceError::IonLoad {
            loaded: 0,
            requested: 3,
            strict: false
        }
    ));
    assert_eq!(
        err.to_string(),
        "Could not load requested number of ions: 0 out of 3 ion(s) loaded"
    );
    assert_eq!(s.properties.lock().num_ions(), 0);
    assert!(!s.rig.trap.ablation_on());
}

// ============================================================================
// Strict loading
// ============================================================================

#[tokio::test]
async fn test_strict_overshoot_stops_without_release() {
    let s = session(scripted(&[[20_000, 0, 0]]));
    // Reference rows under which a bright channel 0 reads as two ions.
    let classifier = Classifier::new(array![[0, 100, 0], [100, 0, 0], [0, 0, 100]]).unwrap();
    let loader = s.loader.clone().with_classifier(classifier);

    let err = loader
        .load_ions(&LoadRequest::new(1).with_strict(true))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ServiceError::IonLoad {
            loaded: 2,
            requested: 1,
            strict: true
        }
    ));
    assert!(err.to_string().contains("2 ion(s) loaded instead of 1 ion(s)"));
    assert_eq!(s.rig.core.reset_count(), 1);
    assert_eq!(s.properties.lock().num_ions(), 2);
}

#[tokio::test]
async fn test_overshoot_is_accepted_when_not_strict() {
    let s = session(scripted(&[[20_000, 20_000, 20_000]]));
    let loaded = s.loader.load_ions(&LoadRequest::new(1)).await.unwrap();
    assert_eq!(loaded, 3);
}

// ============================================================================
// Manual loading
// ============================================================================

#[tokio::test]
async fn test_manual_load_never_fails() {
    let s = session(scripted(&[]));

    let loaded = s.loader.load_ions(&LoadRequest::new(0)).await.unwrap();

    assert_eq!(loaded, ionctl_services::MANUAL_LOAD);
    assert_eq!(s.properties.lock().num_ions(), 3);
    assert_eq!(s.detection.active_channels(), vec![0, 1, 2]);
}

// ============================================================================
// Scheduler
// ============================================================================

#[tokio::test]
async fn test_pause_closes_comm_and_resumes() {
    let s = session(scripted(&[[0, 20_000, 0]]));
    s.rig.scheduler.request_pause();

    let loaded = s.loader.load_ions(&LoadRequest::new(1)).await.unwrap();

    assert_eq!(loaded, 1);
    assert_eq!(s.rig.scheduler.pause_count(), 1);
    assert_eq!(s.rig.core.comm_close_count(), 1);
}

#[tokio::test]
async fn test_termination_propagates() {
    let s = session(scripted(&[[0, 20_000, 0]]));
    s.rig.scheduler.request_termination();

    let err = s.loader.load_ions(&LoadRequest::new(1)).await.unwrap_err();

    assert!(err.is_termination());
    assert_eq!(s.rig.core.reset_count(), 0);
}

// ============================================================================
// Cleanup and parameters
// ============================================================================

#[tokio::test]
async fn test_cleanup_closes_shutters() {
    let s = session(scripted(&[]));
    let request = LoadRequest::new(1).with_cool_after_loading(false);

    s.loader.load_ions(&request).await.unwrap();

    assert!(!s.rig.sim_dds("urukul0_ch0").unwrap().state().sw);
    assert!(!s.rig.sim_dds("urukul0_ch1").unwrap().state().sw);
    assert_eq!(s.rig.core.slack_mu(), 0);
}

#[tokio::test]
async fn test_failed_attempt_leaves_hardware_safe() {
    // Fetch 3 is the first buffered window, after the three early detection
    // counts; the next gate then lands behind the hardware counter.
    let s = session(stalling(3));
    let request = LoadRequest::new(1)
        .with_strategy(LoadStrategy::MonitorFluorescence)
        .with_cool_after_loading(true);

    let err = s.loader.load_ions(&request).await.unwrap_err();

    assert!(err.is_underflow(), "{err}");
    assert!(!s.rig.trap.ablation_on());
    assert!(!s.rig.sim_dds("urukul0_ch0").unwrap().state().sw);
    assert!(s.l370.lock().cool_switch().current_state());
    assert_eq!(s.properties.lock().num_ions(), 0);
}

#[tokio::test]
async fn test_huge_time_budget_does_not_overflow() {
    let s = session(scripted(&[]));

    let loaded = s
        .loader
        .load_ions(&LoadRequest::new(1).with_max_time(1e11))
        .await
        .unwrap();

    assert_eq!(loaded, 1);
}

#[tokio::test]
async fn test_huge_time_budget_while_monitoring() {
    let s = session(scripted(&[[0, 0, 0], [0, 20_000, 0]]));
    let request = LoadRequest::new(1)
        .with_strategy(LoadStrategy::MonitorFluorescence)
        .with_buffer_size(0)
        .with_max_time(1e11);

    assert_eq!(s.loader.load_ions(&request).await.unwrap(), 1);
}

#[tokio::test]
async fn test_invalid_requests_are_rejected() {
    let s = session(scripted(&[]));
    let requests = [
        LoadRequest::new(4),
        LoadRequest::new(1).with_buffer_size(33),
        LoadRequest::new(1).with_detection_delay(-1.0),
        LoadRequest::new(1).with_detection_window(1e-4),
    ];
    for request in requests {
        let err = s.loader.load_ions(&request).await.unwrap_err();
        assert!(
            matches!(err, ServiceError::InvalidParameter(_)),
            "{request:?}: {err}"
        );
    }
    assert_eq!(s.rig.core.reset_count(), 0);
}

#[tokio::test]
async fn test_non_positive_values_select_stored_defaults() {
    let s = session(scripted(&[[0, 20_000, 0]]));
    let request = LoadRequest::new(1)
        .with_max_time(-1.0)
        .with_detection_window(0.0)
        .with_ion_absence_threshold(-1.0);

    assert_eq!(s.loader.load_ions(&request).await.unwrap(), 1);
    assert_eq!(s.loader.defaults().load_max_time, 300.0);
}

// ============================================================================
// Plot and simulated trap
// ============================================================================

#[tokio::test]
async fn test_counts_are_plotted_in_khz() {
    let s = session(scripted(&[[0, 20_000, 0]]));
    let (plot, mut rx) = CountPlot::channel();
    let loader = s.loader.clone().with_plot(plot);

    loader.load_ions(&LoadRequest::new(1)).await.unwrap();

    assert_eq!(rx.recv().await, Some(PlotEvent::Clear));
    assert_eq!(
        rx.recv().await,
        Some(PlotEvent::Append(vec![0.0, 200.0, 0.0]))
    );
}

#[tokio::test]
async fn test_monitor_fluorescence_traps_ions() {
    let params = TrapParameters {
        load_rate_hz: 1e3,
        ..TrapParameters::default()
    };
    let s = session(SimRig::new(params, 11));
    let request = LoadRequest::new(1)
        .with_strategy(LoadStrategy::MonitorFluorescence)
        .with_max_time(10.0);

    let loaded = s.loader.load_ions(&request).await.unwrap();

    assert!(loaded >= 1);
    assert!(s.rig.trap.num_ions() >= 1);
    assert!(!s.rig.trap.ablation_on());
}

#[tokio::test]
async fn test_get_num_ions_does_not_store() {
    let s = session(scripted(&[[0, 20_000, 0]]));
    s.rig.core.reset();

    assert_eq!(s.loader.get_num_ions(None, None).unwrap(), 1);
    assert_eq!(s.properties.lock().num_ions(), 0);
}
