use tracing::debug;

use ionctl_hal::SystemDatasets;

use crate::error::DeviceResult;

/// Persisted properties of the trapped-ion system.
#[derive(Debug)]
pub struct Properties {
    datasets: SystemDatasets,
    num_ions: usize,
}

impl Properties {
    pub const NUM_IONS_KEY: &'static str = "num_ions";

    pub fn new(datasets: SystemDatasets) -> DeviceResult<Self> {
        let num_ions = datasets.get_or(Self::NUM_IONS_KEY, 0_usize)?;
        Ok(Self { datasets, num_ions })
    }

    /// Number of ions believed to be trapped.
    pub fn num_ions(&self) -> usize {
        self.num_ions
    }

    pub fn set_num_ions(&mut self, num_ions: usize) -> DeviceResult<()> {
        self.datasets.set(Self::NUM_IONS_KEY, &num_ions)?;
        self.num_ions = num_ions;
        debug!(num_ions, "Number of ions updated");
        Ok(())
    }
}
