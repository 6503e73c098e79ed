use msdsim::core::error::RangeError;
use msdsim::core::vector::Vector;
use msdsim::engine::Lattice;
use msdsim::engine::config::LatticeConfig;
use msdsim::workflows::simulate::SimulationPlan;

pub struct AppConfig {
    pub lattice: LatticeConfig,
    pub simulation: SimulationPlan,
    pub randomize: bool,
    pub overrides: Vec<SiteOverride>,
    pub sweep: SweepSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SweepSettings {
    pub parameter: String,
    pub values: Vec<f64>,
    pub slots: usize,
}

/// A fixed moment for one site, written after the lattice is built.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SiteOverride {
    pub x: usize,
    pub y: usize,
    pub z: usize,
    pub spin: Option<Vector>,
    pub flux: Option<Vector>,
}

impl SiteOverride {
    pub fn apply(&self, lattice: &mut Lattice) -> Result<(), RangeError> {
        let index = lattice.index(self.x, self.y, self.z)?;
        let spin = match self.spin {
            Some(spin) => spin,
            None => lattice.spin(index)?,
        };
        let flux = match self.flux {
            Some(flux) => flux,
            None => lattice.flux(index)?,
        };
        lattice.set_local_m(index, spin, flux)
    }
}
