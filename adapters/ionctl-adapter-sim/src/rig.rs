//! A complete simulated experiment setup.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use ionctl_hal::{CounterHandle, DdsHandle, HalError, HalResult, TtlHandle};

use crate::counter::{CountSource, ScriptedCounts, SimEdgeCounter};
use crate::dds::SimDds;
use crate::scheduler::SimScheduler;
use crate::timeline::SimCore;
use crate::trap::{SimIonTrap, TrapParameters};
use crate::ttl::SimTtl;

/// TTL outputs of the setup.
pub const TTL_KEYS: [&str; 3] = ["ttl0", "ttl1", "ttl2"];

/// TTL output driving the ablation laser.
pub const ABLATION_TTL: &str = "ttl1";

/// DDS channels of the setup.
pub const DDS_KEYS: [&str; 4] = ["urukul0_ch0", "urukul0_ch1", "urukul0_ch2", "urukul0_ch3"];

/// PMT edge counters, in channel order.
pub const COUNTER_KEYS: [&str; 3] = ["ttl4_counter", "ttl5_counter", "ttl6_counter"];

/// Simulated core, devices, trap and scheduler wired together.
///
/// The ablation TTL drives the trap's ablation flag so that a loading
/// sequence run against the rig traps ions.
#[derive(Debug)]
pub struct SimRig {
    pub core: Arc<SimCore>,
    pub trap: Arc<SimIonTrap>,
    pub scheduler: Arc<SimScheduler>,
    ttls: FxHashMap<&'static str, Arc<SimTtl>>,
    dds: FxHashMap<&'static str, Arc<SimDds>>,
    counters: Vec<Arc<SimEdgeCounter>>,
}

impl SimRig {
    /// Rig whose PMT counts come from the simulated trap.
    pub fn new(params: TrapParameters, seed: u64) -> Self {
        let trap = Arc::new(SimIonTrap::new(params, seed));
        Self::build(Arc::clone(&trap), trap)
    }

    /// Rig whose PMT counts are replayed from `script`.
    pub fn scripted(script: Arc<ScriptedCounts>) -> Self {
        let trap = Arc::new(SimIonTrap::new(TrapParameters::default(), 0));
        Self::build(trap, script)
    }

    /// Rig whose PMT counts come from `source`.
    pub fn with_source(source: Arc<dyn CountSource>) -> Self {
        let trap = Arc::new(SimIonTrap::new(TrapParameters::default(), 0));
        Self::build(trap, source)
    }

    fn build(trap: Arc<SimIonTrap>, source: Arc<dyn CountSource>) -> Self {
        let core = Arc::new(SimCore::new());

        let ttls = TTL_KEYS
            .iter()
            .map(|&key| {
                let ttl = SimTtl::new(Arc::clone(&core), key);
                let ttl = if key == ABLATION_TTL {
                    let trap = Arc::clone(&trap);
                    ttl.with_listener(move |level| trap.set_ablation(level))
                } else {
                    ttl
                };
                (key, Arc::new(ttl))
            })
            .collect();

        let dds = DDS_KEYS
            .iter()
            .map(|&key| (key, Arc::new(SimDds::new(Arc::clone(&core), key))))
            .collect();

        let counters = COUNTER_KEYS
            .iter()
            .enumerate()
            .map(|(index, &key)| {
                Arc::new(SimEdgeCounter::new(
                    Arc::clone(&core),
                    key,
                    index,
                    Arc::clone(&source),
                ))
            })
            .collect();

        Self {
            core,
            trap,
            scheduler: Arc::new(SimScheduler::new(0)),
            ttls,
            dds,
            counters,
        }
    }

    /// TTL output by device key.
    pub fn ttl(&self, key: &str) -> HalResult<TtlHandle> {
        self.sim_ttl(key)
            .map(|ttl| ttl as TtlHandle)
            .ok_or_else(|| HalError::Configuration(format!("Unknown TTL device '{key}'")))
    }

    /// DDS channel by device key.
    pub fn dds(&self, key: &str) -> HalResult<DdsHandle> {
        self.sim_dds(key)
            .map(|dds| dds as DdsHandle)
            .ok_or_else(|| HalError::Configuration(format!("Unknown DDS device '{key}'")))
    }

    /// PMT edge counters in channel order.
    pub fn counters(&self) -> Vec<CounterHandle> {
        self.counters
            .iter()
            .map(|c| Arc::clone(c) as CounterHandle)
            .collect()
    }

    /// Concrete simulated TTL.
    pub fn sim_ttl(&self, key: &str) -> Option<Arc<SimTtl>> {
        self.ttls.get(key).cloned()
    }

    /// Concrete simulated DDS.
    pub fn sim_dds(&self, key: &str) -> Option<Arc<SimDds>> {
        self.dds.get(key).cloned()
    }
}
