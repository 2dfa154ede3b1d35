//! SI unit multipliers.
//!
//! Values throughout the crates are plain `f64` in base SI units. These
//! constants keep literals readable: `100 * MHZ`, `20 * US`.

pub const NS: f64 = 1e-9;
pub const US: f64 = 1e-6;
pub const MS: f64 = 1e-3;
pub const S: f64 = 1.0;

pub const HZ: f64 = 1.0;
pub const KHZ: f64 = 1e3;
pub const MHZ: f64 = 1e6;

pub const V: f64 = 1.0;
pub const DB: f64 = 1.0;
