//! Simulated ion trap with a fluorescence model.
//!
//! Ions sit at fixed positions imaged onto the PMT array. The first ion is
//! trapped in the centre (channel 1), further ions fill channel 0 and then
//! channel 2. Every imaged ion adds `ion_rate_hz` to its channel on top of
//! the background. While the ablation laser is on, each closed detection
//! window traps one more ion with probability `1 - exp(-load_rate * t)`.

use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use crate::counter::CountSource;

/// Order in which trapped ions appear on the PMT channels.
const POSITIONS: [usize; 3] = [1, 0, 2];

/// Physical parameters of the simulated trap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrapParameters {
    /// Fluorescence rate of one ion on its channel.
    pub ion_rate_hz: f64,
    /// Dark count rate of every channel.
    pub background_rate_hz: f64,
    /// Loading rate while the ablation laser is on.
    pub load_rate_hz: f64,
    /// Ions the trap can hold.
    pub max_ions: usize,
}

impl Default for TrapParameters {
    fn default() -> Self {
        Self {
            ion_rate_hz: 40e3,
            background_rate_hz: 500.0,
            load_rate_hz: 20.0,
            max_ions: POSITIONS.len(),
        }
    }
}

#[derive(Debug)]
struct TrapState {
    ions: usize,
    ablation_on: bool,
    rng: StdRng,
}

/// Simulated ion trap.
#[derive(Debug)]
pub struct SimIonTrap {
    params: TrapParameters,
    state: Mutex<TrapState>,
}

impl SimIonTrap {
    /// Create an empty trap with a fixed random seed.
    pub fn new(params: TrapParameters, seed: u64) -> Self {
        Self {
            params,
            state: Mutex::new(TrapState {
                ions: 0,
                ablation_on: false,
                rng: StdRng::seed_from_u64(seed),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TrapState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Trap parameters.
    pub fn params(&self) -> &TrapParameters {
        &self.params
    }

    /// Number of trapped ions.
    pub fn num_ions(&self) -> usize {
        self.lock().ions
    }

    /// Place `ions` ions in the trap.
    pub fn set_num_ions(&self, ions: usize) {
        self.lock().ions = ions.min(self.params.max_ions);
    }

    /// Whether the ablation laser is on.
    pub fn ablation_on(&self) -> bool {
        self.lock().ablation_on
    }

    /// Switch the ablation laser.
    pub fn set_ablation(&self, on: bool) {
        self.lock().ablation_on = on;
    }

    fn photons(rng: &mut StdRng, mean: f64) -> i32 {
        if mean <= 0.0 {
            return 0;
        }
        // Gaussian approximation of shot noise
        let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
        let u2: f64 = rng.r#gen();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        (mean + mean.sqrt() * z).round().max(0.0) as i32
    }
}

impl CountSource for SimIonTrap {
    fn count(&self, channel: usize, begin_mu: i64, end_mu: i64, ref_period: f64) -> i32 {
        let duration = (end_mu - begin_mu).max(0) as f64 * ref_period;
        let mut state = self.lock();

        if channel == 0 && state.ablation_on && state.ions < self.params.max_ions {
            let p = 1.0 - (-self.params.load_rate_hz * duration).exp();
            if state.rng.r#gen::<f64>() < p {
                state.ions += 1;
                info!(ions = state.ions, "Simulated ion trapped");
            }
        }

        let lit = POSITIONS
            .iter()
            .take(state.ions)
            .filter(|&&position| position == channel)
            .count() as f64;
        let rate = self.params.background_rate_hz + lit * self.params.ion_rate_hz;
        Self::photons(&mut state.rng, rate * duration)
    }
}
