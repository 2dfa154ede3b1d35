//! CLI command implementations.

pub mod calibrate;
pub mod classify;
pub mod common;
pub mod datasets;
pub mod load;
pub mod version;
