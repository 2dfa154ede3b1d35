//! The simulated experiment system.
//!
//! | Module | Device |
//! |--------|--------|
//! | trigger | `ttl0` |
//! | ablation | `ttl1` |
//! | 370 nm cooling switch | `ttl2` |
//! | 355 nm shutter | `urukul0_ch0` |
//! | 370 nm shutter, double pass | `urukul0_ch1`, `urukul0_ch2` |
//! | microwave | `urukul0_ch3` |
//! | PMT array | `ttl4_counter` .. `ttl6_counter` |

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use ionctl_adapter_sim::{ABLATION_TTL, SimRig, TrapParameters};
use ionctl_devices::{
    Ablation, Laser355, Laser370, Laser370Channels, MicrowaveModule, PmtArray, Properties,
    TriggerTtl,
};
use ionctl_hal::{CoreHandle, DatasetHandle, Shared, SystemDatasets};
use ionctl_services::{CoolPrep, DetectionService, IonLoadModules, IonLoadService};

use crate::config::SessionConfig;

/// All modules and services of a simulated session.
pub struct SimSystem {
    pub rig: SimRig,
    pub datasets: SystemDatasets,
    pub ablation: Shared<Ablation>,
    pub l370: Shared<Laser370>,
    pub l355: Shared<Laser355>,
    pub microwave: Shared<MicrowaveModule>,
    pub trigger: Shared<TriggerTtl>,
    pub properties: Shared<Properties>,
    pub detection: DetectionService,
    pub cool_prep: CoolPrep,
    pub ion_load: IonLoadService,
}

impl SimSystem {
    /// Build the system on a fresh simulated rig.
    pub fn build(config: &SessionConfig, store: DatasetHandle) -> Result<Self> {
        let rig = SimRig::new(TrapParameters::from(&config.trap), config.seed);
        rig.trap.set_num_ions(config.trap.initial_ions);

        let datasets = SystemDatasets::new(store);
        let core: CoreHandle = rig.core.clone();

        let ablation = Shared::new(Ablation::new(core.clone(), rig.ttl(ABLATION_TTL)?));
        let l370 = Shared::new(Laser370::new(
            core.clone(),
            Laser370Channels {
                shutter: rig.dds("urukul0_ch1")?,
                dpc: rig.dds("urukul0_ch2")?,
                cool_sw: rig.ttl("ttl2")?,
            },
            &datasets.child("laser370"),
        )?);
        let l355 = Shared::new(Laser355::new(
            core.clone(),
            rig.dds("urukul0_ch0")?,
            &datasets.child("laser355"),
        )?);
        let microwave = Shared::new(MicrowaveModule::new(
            core.clone(),
            rig.dds("urukul0_ch3")?,
            datasets.child("microwave"),
        )?);
        let trigger = Shared::new(TriggerTtl::new(
            core.clone(),
            rig.ttl("ttl0")?,
            datasets.child("trigger"),
        )?);
        let pmt = Shared::new(PmtArray::new(
            core.clone(),
            rig.counters(),
            datasets.child("pmt"),
        )?);
        let properties = Shared::new(Properties::new(datasets.child("properties"))?);

        let detection = DetectionService::new(
            core.clone(),
            pmt,
            l370.clone(),
            &datasets.child("detection"),
        )?;
        let cool_prep = CoolPrep::new(core.clone(), l370.clone(), &datasets.child("cool_prep"))?;
        let ion_load = IonLoadService::new(
            IonLoadModules {
                core,
                scheduler: rig.scheduler.clone(),
                ablation: ablation.clone(),
                l355: l355.clone(),
                cool_prep: cool_prep.clone(),
                detection: detection.clone(),
                properties: properties.clone(),
            },
            &datasets.child("ion_load"),
        )?;

        Ok(Self {
            rig,
            datasets,
            ablation,
            l370,
            l355,
            microwave,
            trigger,
            properties,
            detection,
            cool_prep,
            ion_load,
        })
    }

    /// Bring every device into its default state.
    pub fn init(&self) -> Result<()> {
        self.ablation.lock().init_kernel()?;
        self.l370.lock().init_kernel()?;
        self.l355.lock().init_kernel()?;
        self.microwave.lock().init_kernel()?;
        self.trigger.lock().init_kernel()?;
        info!(
            datasets = %self.datasets.prefix(),
            "Simulated system initialized"
        );
        Ok(())
    }

    pub fn core(&self) -> &Arc<ionctl_adapter_sim::SimCore> {
        &self.rig.core
    }
}
