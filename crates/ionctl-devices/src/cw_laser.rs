//! Continuous-wave lasers: the 370 nm cooling/detection laser and the
//! 355 nm ionisation laser.
//!
//! The 370 nm laser has three devices:
//!
//! | Device | Role |
//! |--------|------|
//! | shutter DDS | AOM acting as a fast shutter |
//! | double-pass DDS | selects the detuning of the current [`Mode370`] |
//! | Doppler switch | enables the cooling sideband in [`Mode370::Cool`] |

use std::fmt;

use tracing::debug;

use ionctl_hal::units::{MHZ, US};
use ionctl_hal::{Core, CoreHandle, DdsHandle, SystemDatasets, TtlHandle};

use crate::dds::{Dds9910, Dds9910Settings, DdsModule, DdsSettings};
use crate::error::DeviceResult;
use crate::latency::Latency;
use crate::switch::{Switch, SwitchConfig};

/// Operating mode of the 370 nm laser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode370 {
    Cool,
    Prep,
    Detect,
    Off,
}

impl Mode370 {
    /// Double-pass frequency (Hz) and amplitude of the mode.
    pub fn tuning(self) -> Option<(f64, f64)> {
        match self {
            Mode370::Cool => Some((100.0 * MHZ, 0.5)),
            Mode370::Prep => Some((150.0 * MHZ, 0.75)),
            Mode370::Detect => Some((200.0 * MHZ, 1.0)),
            Mode370::Off => None,
        }
    }
}

impl fmt::Display for Mode370 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mode370::Cool => "cool",
            Mode370::Prep => "prep",
            Mode370::Detect => "detect",
            Mode370::Off => "off",
        };
        f.write_str(name)
    }
}

/// Hardware channels of the 370 nm laser.
#[derive(Debug, Clone)]
pub struct Laser370Channels {
    pub shutter: DdsHandle,
    pub dpc: DdsHandle,
    pub cool_sw: TtlHandle,
}

/// The 370 nm laser.
#[derive(Debug)]
pub struct Laser370 {
    core: CoreHandle,
    shutter: Dds9910,
    dpc: Dds9910,
    cool_sw: Switch,
    mode: Mode370,
}

impl Laser370 {
    pub fn new(
        core: CoreHandle,
        channels: Laser370Channels,
        datasets: &SystemDatasets,
    ) -> DeviceResult<Self> {
        let shutter = Dds9910::new(
            core.clone(),
            channels.shutter,
            datasets.child("shutter"),
            Dds9910Settings {
                dds: DdsSettings {
                    freq: 250.0 * MHZ,
                    att: 10.0,
                    min_att: 10.0,
                    sw: true,
                    ..DdsSettings::default()
                },
                amp: 1.0,
                ..Dds9910Settings::default()
            },
        )?;

        let (cool_freq, cool_amp) = (100.0 * MHZ, 0.5);
        let dpc = Dds9910::new(
            core.clone(),
            channels.dpc,
            datasets.child("dpc"),
            Dds9910Settings {
                dds: DdsSettings {
                    freq: cool_freq,
                    att: 10.0,
                    min_att: 10.0,
                    sw: true,
                    ..DdsSettings::default()
                },
                amp: cool_amp,
                ..Dds9910Settings::default()
            },
        )?;

        let cool_sw = Switch::new(
            core.clone(),
            channels.cool_sw,
            datasets.child("cool_sw"),
            SwitchConfig {
                active_low: false,
                default_state: true,
            },
        )?;

        Ok(Self {
            core,
            shutter,
            dpc,
            cool_sw,
            mode: Mode370::Cool,
        })
    }

    pub fn init_kernel(&mut self) -> DeviceResult<()> {
        self.shutter.init_kernel(false)?;
        self.dpc.init_kernel(false)?;
        self.cool_sw.init_kernel()?;
        self.mode = Mode370::Cool;
        Ok(())
    }

    /// Tune the double-pass DDS and the Doppler switch for `mode`.
    pub fn config_mode(&mut self, mode: Mode370, realtime: bool) -> DeviceResult<()> {
        if let Some((freq, amp)) = mode.tuning() {
            let phase = self.dpc.base().tuning().pow_to_turns(self.dpc.current_mu().2);
            self.dpc.config(freq, amp, phase, realtime)?;
        }
        self.core.delay(1.0 * US);
        self.dpc.set(mode != Mode370::Off, realtime)?;
        self.cool_sw.set(mode == Mode370::Cool, realtime)?;

        debug!(%mode, "370 mode configured");
        self.mode = mode;
        Ok(())
    }

    pub fn set_shutter(&mut self, state: bool, realtime: bool) -> DeviceResult<()> {
        self.shutter.set(state, realtime)
    }

    /// Configure `mode` and open or close the shutter.
    pub fn set_state(&mut self, mode: Mode370, state: bool, realtime: bool) -> DeviceResult<()> {
        self.config_mode(mode, realtime)?;
        self.set_shutter(state, realtime)
    }

    /// Cooling with the shutter open, all DDS defaults applied.
    pub fn reset(&mut self, realtime: bool) -> DeviceResult<()> {
        self.set_state(Mode370::Cool, true, realtime)?;
        self.shutter.reset_config(realtime)?;
        self.shutter.reset_att(realtime)?;
        self.dpc.reset_config(realtime)?;
        self.dpc.reset_att(realtime)
    }

    pub fn safety_off(&mut self) -> DeviceResult<()> {
        self.shutter.safety_off()?;
        self.dpc.safety_off()?;
        self.cool_sw.safety_off()?;
        self.mode = Mode370::Off;
        Ok(())
    }

    /// Measure and store the DDS latencies.
    pub fn update_latency(&mut self) -> DeviceResult<()> {
        self.shutter.update_latency()?;
        self.dpc.update_latency()
    }

    pub fn clear_latency(&mut self) -> DeviceResult<()> {
        self.shutter.clear_latency()?;
        self.dpc.clear_latency()?;
        self.cool_sw.set_latency(Latency::ZERO);
        self.cool_sw.store_latency(Latency::ZERO)
    }

    pub fn mode(&self) -> Mode370 {
        self.mode
    }

    pub fn shutter(&self) -> &Dds9910 {
        &self.shutter
    }

    pub fn shutter_mut(&mut self) -> &mut Dds9910 {
        &mut self.shutter
    }

    pub fn dpc(&self) -> &Dds9910 {
        &self.dpc
    }

    pub fn dpc_mut(&mut self) -> &mut Dds9910 {
        &mut self.dpc
    }

    pub fn cool_switch(&self) -> &Switch {
        &self.cool_sw
    }

    pub fn cool_switch_mut(&mut self) -> &mut Switch {
        &mut self.cool_sw
    }
}

/// The 355 nm ionisation laser, gated by a DDS shutter.
#[derive(Debug)]
pub struct Laser355 {
    shutter: Dds9910,
}

impl Laser355 {
    pub fn new(
        core: CoreHandle,
        shutter: DdsHandle,
        datasets: &SystemDatasets,
    ) -> DeviceResult<Self> {
        let shutter = Dds9910::new(
            core,
            shutter,
            datasets.child("shutter"),
            Dds9910Settings {
                dds: DdsSettings {
                    freq: 205.75 * MHZ,
                    att: 11.0,
                    min_att: 10.0,
                    sw: false,
                    ..DdsSettings::default()
                },
                amp: 0.0,
                ..Dds9910Settings::default()
            },
        )?;
        Ok(Self { shutter })
    }

    pub fn init_kernel(&mut self) -> DeviceResult<()> {
        self.shutter.init_kernel(false)
    }

    pub fn set_shutter(&mut self, state: bool, realtime: bool) -> DeviceResult<()> {
        self.shutter.set(state, realtime)
    }

    /// Shutter closed, DDS defaults applied.
    pub fn reset(&mut self, realtime: bool) -> DeviceResult<()> {
        self.set_shutter(false, realtime)?;
        self.shutter.reset_config(realtime)?;
        self.shutter.reset_att(realtime)
    }

    pub fn safety_off(&mut self) -> DeviceResult<()> {
        self.shutter.safety_off()
    }

    pub fn update_latency(&mut self) -> DeviceResult<()> {
        self.shutter.update_latency()
    }

    pub fn clear_latency(&mut self) -> DeviceResult<()> {
        self.shutter.clear_latency()
    }

    pub fn shutter(&self) -> &Dds9910 {
        &self.shutter
    }

    pub fn shutter_mut(&mut self) -> &mut Dds9910 {
        &mut self.shutter
    }
}
