use super::config::{
    ConfigError, FlipModel, LatticeConfig, LatticeConfigBuilder, SiteSelection, Topology,
};
use super::energy::CouplingTable;
use super::error::MsdError;
use super::geometry::{Geometry, Layout, Site};
use super::metropolis::gen_seed;
use crate::core::error::RangeError;
use crate::core::models::molecule::{EdgeParameters, MoleculeGraph, NodeParameters};
use crate::core::models::parameters::{NamedCoefficients, Parameters};
use crate::core::models::region::Region;
use crate::core::models::results::Results;
use crate::core::vector::{Vector, VectorExt};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256StarStar;
use std::f64::consts::PI;
use tracing::{debug, info, instrument};

/// A device: two ferromagnets bridged by copies of a molecule, with every site holding a spin
/// and a flux vector.
///
/// The lattice keeps [`Results`] consistent with its site state at all times. Single-site writes
/// go through the incremental update in [`super::energy`]; coefficient changes trigger a full
/// recomputation. A `Lattice` is a single-threaded state machine with its own random stream, so
/// independent instances can run on separate threads without sharing anything.
#[derive(Debug, Clone)]
pub struct Lattice {
    pub(super) geometry: Geometry,
    pub(super) layout: Layout,
    pub(super) spins: Vec<Vector>,
    pub(super) fluxes: Vec<Vector>,
    pub(super) parameters: Parameters,
    pub(super) couplings: CouplingTable,
    pub(super) molecule: MoleculeGraph,
    pub(super) results: Results,
    pub(super) record: Vec<Results>,
    pub(super) flip_model: FlipModel,
    pub(super) site_selection: SiteSelection,
    pub(super) cursor: usize,
    pub(super) seed: u64,
    pub(super) rng: Xoshiro256StarStar,
}

impl Lattice {
    #[instrument(skip_all, name = "lattice_new")]
    pub fn new(config: &LatticeConfig) -> Result<Self, MsdError> {
        let (geometry, molecule) = config.resolve();
        info!(
            width = geometry.width,
            height = geometry.height,
            depth = geometry.depth,
            mol_pos_l = geometry.mol_pos_l,
            mol_pos_r = geometry.mol_pos_r,
            "Initializing lattice with full energy calculation..."
        );

        let layout = Layout::new(&geometry, &molecule)?;
        let seed = config.seed.unwrap_or_else(gen_seed);
        let parameters = config.parameters;

        let mut lattice = Self {
            geometry,
            spins: vec![Vector::zeros(); geometry.len()],
            fluxes: vec![Vector::zeros(); geometry.len()],
            layout,
            parameters,
            couplings: CouplingTable::new(&parameters),
            molecule,
            results: Results::default(),
            record: Vec::new(),
            flip_model: config.flip_model,
            site_selection: config.site_selection,
            cursor: 0,
            seed,
            rng: Xoshiro256StarStar::seed_from_u64(seed),
        };
        lattice.align_all();
        lattice.recompute();

        info!(
            sites = lattice.n(),
            seed,
            energy = lattice.results.u,
            "Lattice initialized."
        );
        Ok(lattice)
    }

    /// `width x height x depth` with a centered molecule chain and full lead cross-sections.
    pub fn centered(width: usize, height: usize, depth: usize) -> Result<Self, MsdError> {
        Self::new(&LatticeConfigBuilder::new().dimensions(width, height, depth).build()?)
    }

    /// A centered single-column molecule with lead bands `height_l` rows and `depth_r` layers
    /// thick.
    pub fn with_leads(
        width: usize,
        height: usize,
        depth: usize,
        height_l: usize,
        depth_r: usize,
    ) -> Result<Self, MsdError> {
        let geometry = super::config::GeometrySpec::Leads {
            width,
            height,
            depth,
            height_l,
            depth_r,
        };
        Self::new(&LatticeConfigBuilder::new().geometry(geometry).build()?)
    }

    /// A molecule graph placed with its first column at `mol_pos_l`.
    pub fn with_molecule(
        width: usize,
        height: usize,
        depth: usize,
        molecule: MoleculeGraph,
        mol_pos_l: usize,
    ) -> Result<Self, MsdError> {
        let config = LatticeConfigBuilder::new()
            .geometry(super::config::GeometrySpec::Anchored {
                width,
                height,
                depth,
                mol_pos_l,
            })
            .topology(Topology::Graph(molecule))
            .build()?;
        Self::new(&config)
    }

    // ----- geometry -----

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn dimensions(&self) -> (usize, usize, usize) {
        (self.geometry.width, self.geometry.height, self.geometry.depth)
    }

    pub fn mol_pos(&self) -> (usize, usize) {
        (self.geometry.mol_pos_l, self.geometry.mol_pos_r)
    }

    /// `(top_l, bottom_l, front_r, back_r)`.
    pub fn inner_bounds(&self) -> (usize, usize, usize, usize) {
        let g = &self.geometry;
        (g.top_l, g.bottom_l, g.front_r, g.back_r)
    }

    /// Whether any site (for zones) or any bond (for boundary pairs) belongs to `region`.
    pub fn region_exists(&self, region: Region) -> bool {
        let g = &self.geometry;
        match region {
            Region::Left => g.has_left(),
            Region::Right => g.has_right(),
            Region::Molecule => g.has_molecule(),
            Region::MoleculeLeft => g.has_molecule() && g.has_left(),
            Region::MoleculeRight => g.has_molecule() && g.has_right(),
            Region::LeftRight => g.has_left() && g.has_right(),
        }
    }

    /// Number of occupied sites.
    pub fn n(&self) -> usize {
        self.layout.occupied.len()
    }

    /// Sites in a zone, or distinct sites touching a bond of a boundary pair.
    pub fn region_count(&self, region: Region) -> usize {
        self.layout.counts[region as usize]
    }

    pub fn index(&self, x: usize, y: usize, z: usize) -> Result<usize, RangeError> {
        self.geometry.index(x, y, z)
    }

    pub fn coords(&self, index: usize) -> Result<(usize, usize, usize), RangeError> {
        self.site(index)?;
        Ok(self.geometry.coords(index))
    }

    pub(super) fn site(&self, index: usize) -> Result<Site, RangeError> {
        match self.layout.sites.get(index) {
            Some(Some(site)) => Ok(*site),
            Some(None) => Err(RangeError::Vacant { index }),
            None => Err(RangeError::Index {
                index,
                len: self.layout.sites.len(),
            }),
        }
    }

    pub fn site_region(&self, index: usize) -> Result<Region, RangeError> {
        Ok(self.site(index)?.zone)
    }

    /// Linear indices of occupied sites, ascending.
    pub fn occupied(&self) -> &[usize] {
        &self.layout.occupied
    }

    // ----- site access -----

    pub fn spin(&self, index: usize) -> Result<Vector, RangeError> {
        self.site(index)?;
        Ok(self.spins[index])
    }

    pub fn flux(&self, index: usize) -> Result<Vector, RangeError> {
        self.site(index)?;
        Ok(self.fluxes[index])
    }

    /// The local moment `spin + flux`.
    pub fn local_m(&self, index: usize) -> Result<Vector, RangeError> {
        self.site(index)?;
        Ok(self.spins[index] + self.fluxes[index])
    }

    pub fn spin_at(&self, x: usize, y: usize, z: usize) -> Result<Vector, RangeError> {
        self.spin(self.index(x, y, z)?)
    }

    pub fn flux_at(&self, x: usize, y: usize, z: usize) -> Result<Vector, RangeError> {
        self.flux(self.index(x, y, z)?)
    }

    pub fn local_m_at(&self, x: usize, y: usize, z: usize) -> Result<Vector, RangeError> {
        self.local_m(self.index(x, y, z)?)
    }

    pub fn set_spin(&mut self, index: usize, spin: Vector) -> Result<(), RangeError> {
        let flux = self.flux(index)?;
        self.set_local_m(index, spin, flux)
    }

    pub fn set_flux(&mut self, index: usize, flux: Vector) -> Result<(), RangeError> {
        let spin = self.spin(index)?;
        self.set_local_m(index, spin, flux)
    }

    /// Writes one site and updates the cached aggregates incrementally.
    pub fn set_local_m(
        &mut self,
        index: usize,
        spin: Vector,
        flux: Vector,
    ) -> Result<(), RangeError> {
        let delta = self.delta_for_move(index, spin, flux)?;
        self.apply_move(delta);
        Ok(())
    }

    pub fn set_spin_at(&mut self, x: usize, y: usize, z: usize, spin: Vector) -> Result<(), RangeError> {
        self.set_spin(self.index(x, y, z)?, spin)
    }

    pub fn set_flux_at(&mut self, x: usize, y: usize, z: usize, flux: Vector) -> Result<(), RangeError> {
        self.set_flux(self.index(x, y, z)?, flux)
    }

    pub fn set_local_m_at(
        &mut self,
        (x, y, z): (usize, usize, usize),
        spin: Vector,
        flux: Vector,
    ) -> Result<(), RangeError> {
        self.set_local_m(self.index(x, y, z)?, spin, flux)
    }

    // ----- coefficients -----

    pub fn parameters(&self) -> Parameters {
        self.parameters
    }

    pub fn results(&self) -> Results {
        self.results
    }

    /// Replaces every lattice-level coefficient and recomputes all aggregates.
    ///
    /// Lead spins are rescaled to the new magnitudes and lead fluxes by the ratio of the new to
    /// the old bound, so re-applying the current parameters leaves every site bit-identical.
    #[instrument(skip_all)]
    pub fn set_parameters(&mut self, parameters: Parameters) {
        let old = self.couplings;
        self.parameters = parameters;
        self.couplings = CouplingTable::new(&parameters);

        for i in 0..self.layout.occupied.len() {
            let index = self.layout.occupied[i];
            let Some(site) = self.layout.sites[index] else {
                continue;
            };
            if site.node.is_none() {
                let (from, to) = (old.site(site.zone), self.couplings.site(site.zone));
                self.rescale(index, &from, &to);
            }
        }
        self.recompute();
        debug!(energy = self.results.u, "Parameters applied.");
    }

    /// Sets every molecule node and edge to the given coefficients and recomputes all aggregates.
    #[instrument(skip_all)]
    pub fn set_mol_parameters(&mut self, node: NodeParameters, edge: EdgeParameters) {
        let old = self.molecule.clone();
        self.molecule.set_all_parameters(node, edge);
        self.rescale_molecule(&old);
        self.recompute();
    }

    pub fn molecule(&self) -> &MoleculeGraph {
        &self.molecule
    }

    /// Whether `key` names a lattice or molecule coefficient.
    pub fn is_parameter_key(key: &str) -> bool {
        Parameters::default().get_by_name(key).is_some()
            || NodeParameters::default().get_by_name(key).is_some()
            || EdgeParameters::default().get_by_name(key).is_some()
    }

    /// Reads a coefficient by its conventional key. Molecule keys (`"Jm"`, `"Am.x"`, ...) read
    /// the first node or edge and yield `None` when the molecule has none.
    pub fn parameter_by_name(&self, key: &str) -> Option<f64> {
        self.parameters
            .get_by_name(key)
            .or_else(|| self.molecule.node_parameters(0).ok()?.get_by_name(key))
            .or_else(|| self.molecule.edge_parameters(0).ok()?.get_by_name(key))
    }

    /// Writes one coefficient by its conventional key. `kT` and `B` take the cheap refresh; a
    /// molecule key overwrites that field on every node or edge and leaves the others alone.
    #[instrument(skip(self))]
    pub fn set_parameter_by_name(&mut self, key: &str, value: f64) -> Result<(), MsdError> {
        let mut parameters = self.parameters;
        if parameters.set_by_name(key, value) {
            match key {
                "kT" => self.set_kt(value),
                k if k.starts_with("B.") => self.set_b(parameters.b),
                _ => self.set_parameters(parameters),
            }
            return Ok(());
        }
        if !Self::is_parameter_key(key) {
            return Err(ConfigError::InvalidValue {
                name: "parameter",
                value: key.to_string(),
            }
            .into());
        }

        let old = self.molecule.clone();
        for node in 0..self.molecule.node_count() {
            let mut p = self.molecule.node_parameters(node)?;
            if p.set_by_name(key, value) {
                self.molecule.set_node_parameters(node, p)?;
            }
        }
        for edge in 0..self.molecule.edge_count() {
            let mut p = self.molecule.edge_parameters(edge)?;
            if p.set_by_name(key, value) {
                self.molecule.set_edge_parameters(edge, p)?;
            }
        }
        self.rescale_molecule(&old);
        self.recompute();
        debug!(key, value, energy = self.results.u, "Molecule coefficient applied.");
        Ok(())
    }

    /// Replaces the molecule prototype. The node count must not change; edges may.
    #[instrument(skip_all)]
    pub fn set_molecule(&mut self, molecule: MoleculeGraph) -> Result<(), MsdError> {
        if molecule.node_count() != self.molecule.node_count() {
            return Err(MsdError::Molecule(format!(
                "replacement has {} nodes, the lattice holds {}",
                molecule.node_count(),
                self.molecule.node_count()
            )));
        }
        self.layout = Layout::new(&self.geometry, &molecule)?;
        let old = std::mem::replace(&mut self.molecule, molecule);
        self.rescale_molecule(&old);
        self.recompute();
        Ok(())
    }

    /// Changes the external field. Only the Zeeman part of each zone's energy moves.
    pub fn set_b(&mut self, b: Vector) {
        let db = b - self.parameters.b;
        self.parameters.b = b;
        for zone in Region::ZONES {
            if let Some(m) = self.results.magnetization(zone) {
                self.results.add_energy(zone, -db.dot(&m));
            }
        }
        self.results.resum();
    }

    /// Changes the temperature, which only scales acceptance probabilities.
    pub fn set_kt(&mut self, kt: f64) {
        self.parameters.kt = kt;
    }

    pub fn flip_model(&self) -> FlipModel {
        self.flip_model
    }

    pub fn set_flip_model(&mut self, model: FlipModel) {
        self.flip_model = model;
    }

    pub fn site_selection(&self) -> SiteSelection {
        self.site_selection
    }

    pub fn set_site_selection(&mut self, selection: SiteSelection) {
        self.site_selection = selection;
        self.cursor = 0;
    }

    // ----- seeding and resets -----

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Sets the seed and restarts the random stream from it.
    pub fn set_seed(&mut self, seed: u64) {
        self.seed = seed;
        self.rng = Xoshiro256StarStar::seed_from_u64(seed);
    }

    fn restart(&mut self, reseed: bool) {
        let seed = if reseed { gen_seed() } else { self.seed };
        self.set_seed(seed);
        self.record.clear();
        self.results.t = 0;
        self.cursor = 0;
    }

    /// Aligns every spin along +y at its zone's magnitude and clears every flux.
    #[instrument(skip_all)]
    pub fn reinitialize(&mut self, reseed: bool) {
        self.restart(reseed);
        self.align_all();
        self.recompute();
    }

    /// Gives every site a uniformly random spin direction and a random flux within its bound.
    #[instrument(skip_all)]
    pub fn randomize(&mut self, reseed: bool) {
        self.restart(reseed);
        for i in 0..self.layout.occupied.len() {
            let index = self.layout.occupied[i];
            let Some(site) = self.layout.sites[index] else {
                continue;
            };
            let c = self.site_coefficients(site);
            let spin = self.random_direction(c.s);
            let magnitude = c.f * self.uniform();
            let flux = self.random_direction(magnitude);
            self.spins[index] = spin;
            self.fluxes[index] = flux;
        }
        self.recompute();
    }

    pub(super) fn uniform(&mut self) -> f64 {
        use rand::Rng;
        self.rng.r#gen::<f64>()
    }

    /// A vector of length `rho` pointing uniformly over the sphere.
    pub(super) fn random_direction(&mut self, rho: f64) -> Vector {
        let theta = 2.0 * PI * self.uniform();
        let phi = (2.0 * self.uniform() - 1.0).asin();
        Vector::from_spherical(rho, theta, phi)
    }

    // ----- record -----

    /// Samples appended by recorded Metropolis runs since the last reset.
    pub fn record(&self) -> &[Results] {
        &self.record
    }

    pub fn clear_record(&mut self) {
        self.record.clear();
    }

    /// Appends a snapshot of the current aggregates to the record.
    pub fn record_sample(&mut self) {
        self.record.push(self.results);
    }

    // ----- helpers -----

    fn align_all(&mut self) {
        for i in 0..self.layout.occupied.len() {
            let index = self.layout.occupied[i];
            if let Some(site) = self.layout.sites[index] {
                let c = self.site_coefficients(site);
                self.spins[index] = Vector::y() * c.s;
                self.fluxes[index] = Vector::zeros();
            }
        }
    }

    fn rescale_molecule(&mut self, old: &MoleculeGraph) {
        for i in 0..self.layout.occupied.len() {
            let index = self.layout.occupied[i];
            let Some(node) = self.layout.sites[index].and_then(|s| s.node) else {
                continue;
            };
            let from = *old.node_at(node);
            let to = *self.molecule.node_at(node);
            self.rescale(index, &from, &to);
        }
    }

    fn rescale(&mut self, index: usize, from: &NodeParameters, to: &NodeParameters) {
        if from.s != 0.0 {
            self.spins[index] *= to.s / from.s;
        } else {
            self.spins[index] = Vector::y() * to.s;
        }
        if from.f != 0.0 {
            self.fluxes[index] *= to.f / from.f;
        } else {
            self.fluxes[index] = Vector::zeros();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::GeometrySpec;

    fn setup(width: usize, height: usize, depth: usize) -> Lattice {
        let config = LatticeConfigBuilder::new()
            .dimensions(width, height, depth)
            .seed(7)
            .build()
            .unwrap();
        Lattice::new(&config).unwrap()
    }

    #[test]
    fn initial_state_is_aligned_with_zero_flux() {
        let mut p = Parameters::default();
        p.s_l = 2.0;
        let config = LatticeConfigBuilder::new()
            .dimensions(5, 2, 2)
            .parameters(p)
            .seed(1)
            .build()
            .unwrap();
        let lattice = Lattice::new(&config).unwrap();
        for &i in lattice.occupied() {
            let expected = match lattice.site_region(i).unwrap() {
                Region::Left => 2.0,
                _ => 1.0,
            };
            assert_eq!(lattice.spin(i).unwrap(), Vector::y() * expected);
            assert_eq!(lattice.flux(i).unwrap(), Vector::zeros());
        }
        assert_eq!(lattice.flip_model(), FlipModel::Continuous);
        assert_eq!(lattice.results().t, 0);
    }

    #[test]
    fn geometry_queries_report_construction_bounds() {
        let lattice = setup(5, 3, 2);
        assert_eq!(lattice.dimensions(), (5, 3, 2));
        assert_eq!(lattice.mol_pos(), (2, 2));
        assert_eq!(lattice.inner_bounds(), (0, 2, 0, 1));
        assert!(Region::ALL.iter().all(|&r| lattice.region_exists(r)));
        assert_eq!(lattice.region_count(Region::Left), 2 * 3 * 2);
        assert_eq!(
            lattice.n(),
            lattice.region_count(Region::Left)
                + lattice.region_count(Region::Right)
                + lattice.region_count(Region::Molecule)
        );
    }

    #[test]
    fn accessors_reject_out_of_range_and_vacant_positions() {
        let lattice = Lattice::with_leads(5, 5, 5, 1, 1).unwrap();
        assert!(matches!(
            lattice.spin_at(5, 0, 0),
            Err(RangeError::Coordinates { .. })
        ));
        assert!(matches!(
            lattice.flux(10_000),
            Err(RangeError::Index { .. })
        ));
        let vacant = lattice.index(0, 0, 0).unwrap();
        assert_eq!(lattice.spin(vacant), Err(RangeError::Vacant { index: vacant }));
        assert!(lattice.coords(vacant).is_err());
    }

    #[test]
    fn writes_to_vacant_positions_leave_state_untouched() {
        let mut lattice = Lattice::with_leads(5, 5, 5, 1, 1).unwrap();
        let before = lattice.results();
        assert!(lattice.set_spin_at(0, 0, 0, Vector::x()).is_err());
        assert_eq!(lattice.results(), before);
    }

    #[test]
    fn set_parameters_rescales_lead_spins() {
        let mut lattice = setup(3, 1, 1);
        lattice.set_spin(0, Vector::x()).unwrap();
        let mut p = lattice.parameters();
        p.s_l = 3.0;
        lattice.set_parameters(p);
        assert_eq!(lattice.spin(0).unwrap(), Vector::x() * 3.0);

        p.s_l = 0.0;
        lattice.set_parameters(p);
        p.s_l = 2.0;
        lattice.set_parameters(p);
        assert_eq!(lattice.spin(0).unwrap(), Vector::y() * 2.0);
    }

    #[test]
    fn set_parameters_rescales_or_clears_lead_flux() {
        let mut p = Parameters::default();
        p.f_r = 0.5;
        let config = LatticeConfigBuilder::new()
            .dimensions(3, 1, 1)
            .parameters(p)
            .seed(3)
            .build()
            .unwrap();
        let mut lattice = Lattice::new(&config).unwrap();
        lattice.set_flux(2, Vector::z() * 0.5).unwrap();
        p.f_r = 1.0;
        lattice.set_parameters(p);
        assert_eq!(lattice.flux(2).unwrap(), Vector::z());
        p.f_r = 0.0;
        lattice.set_parameters(p);
        assert_eq!(lattice.flux(2).unwrap(), Vector::zeros());
    }

    #[test]
    fn reapplying_parameters_is_bit_identical() {
        let mut lattice = setup(6, 3, 3);
        lattice.randomize(false);
        let spins = lattice.spins.clone();
        let fluxes = lattice.fluxes.clone();
        lattice.set_parameters(lattice.parameters());
        assert_eq!(lattice.spins, spins);
        assert_eq!(lattice.fluxes, fluxes);
    }

    #[test]
    fn set_kt_leaves_energy_alone() {
        let mut lattice = setup(4, 2, 2);
        lattice.randomize(false);
        let before = lattice.results();
        lattice.set_kt(3.0);
        assert_eq!(lattice.results(), before);
        assert_eq!(lattice.parameters().kt, 3.0);
    }

    #[test]
    fn set_molecule_requires_matching_node_count() {
        let mut lattice = setup(7, 1, 1);
        let (l, r) = lattice.mol_pos();
        assert_eq!(r - l + 1, 1);
        let err = lattice.set_molecule(MoleculeGraph::linear(2)).unwrap_err();
        assert!(matches!(err, MsdError::Molecule(_)));
        assert_eq!(lattice.molecule().node_count(), 1);
    }

    #[test]
    fn set_mol_parameters_rescales_molecule_spins() {
        let mut lattice = setup(5, 1, 1);
        let m = lattice.index(2, 0, 0).unwrap();
        lattice.set_spin(m, -Vector::x()).unwrap();
        lattice.set_mol_parameters(
            NodeParameters {
                s: 0.5,
                ..NodeParameters::default()
            },
            EdgeParameters::default(),
        );
        assert_eq!(lattice.spin(m).unwrap(), -Vector::x() * 0.5);
        assert_eq!(lattice.molecule().node_parameters(0).unwrap().s, 0.5);
    }

    #[test]
    fn molecule_keys_write_every_node_and_edge() {
        let mut lattice = setup(8, 1, 1);
        assert_eq!(lattice.molecule().node_count(), 2);
        let m = lattice.index(3, 0, 0).unwrap();

        lattice.set_parameter_by_name("Jm", -2.0).unwrap();
        lattice.set_parameter_by_name("Sm", 0.5).unwrap();
        lattice.set_parameter_by_name("Dm.z", 0.25).unwrap();
        assert_eq!(lattice.parameter_by_name("Jm"), Some(-2.0));
        assert_eq!(lattice.parameter_by_name("Sm"), Some(0.5));
        assert_eq!(lattice.parameter_by_name("Dm.z"), Some(0.25));
        assert_eq!(lattice.parameter_by_name("Fm"), Some(0.0));
        assert_eq!(lattice.spin(m).unwrap(), Vector::y() * 0.5);
        for (_, edge) in lattice.molecule().edges() {
            assert_eq!(edge.parameters.j, -2.0);
            assert_eq!(edge.parameters.d, Vector::new(0.0, 0.0, 0.25));
        }

        let cached = lattice.results();
        lattice.recompute();
        assert_eq!(lattice.results(), cached);
    }

    #[test]
    fn lattice_keys_route_through_parameters() {
        let mut lattice = setup(5, 2, 2);
        lattice.set_parameter_by_name("JmL", 0.5).unwrap();
        lattice.set_parameter_by_name("B.y", 0.2).unwrap();
        lattice.set_parameter_by_name("kT", 1.5).unwrap();
        let p = lattice.parameters();
        assert_eq!((p.j_ml, p.b.y, p.kt), (0.5, 0.2, 1.5));
        assert_eq!(lattice.parameter_by_name("B.y"), Some(0.2));

        let before = lattice.results();
        let err = lattice.set_parameter_by_name("Jq", 1.0).unwrap_err();
        assert!(matches!(err, MsdError::Config(ConfigError::InvalidValue { .. })));
        assert_eq!(lattice.results(), before);
        assert!(Lattice::is_parameter_key("Je1m"));
        assert!(!Lattice::is_parameter_key("Jq"));
    }

    #[test]
    fn molecule_keys_read_none_without_edges() {
        let lattice = setup(5, 1, 1);
        assert_eq!(lattice.molecule().edge_count(), 0);
        assert_eq!(lattice.parameter_by_name("Jm"), None);
        assert_eq!(lattice.parameter_by_name("Sm"), Some(1.0));
    }

    #[test]
    fn reinitialize_twice_gives_identical_results() {
        let mut lattice = setup(5, 2, 2);
        lattice.randomize(false);
        lattice.reinitialize(false);
        let first = lattice.results();
        lattice.metropolis(100);
        lattice.reinitialize(false);
        assert_eq!(lattice.results(), first);
        assert_eq!(lattice.results().t, 0);
        assert!(lattice.record().is_empty());
    }

    #[test]
    fn randomize_respects_magnitudes() {
        let mut p = Parameters::default();
        p.f_l = 0.3;
        let config = LatticeConfigBuilder::new()
            .dimensions(5, 2, 2)
            .parameters(p)
            .seed(11)
            .build()
            .unwrap();
        let mut lattice = Lattice::new(&config).unwrap();
        lattice.randomize(false);
        for &i in lattice.occupied() {
            assert!((lattice.spin(i).unwrap().norm() - 1.0).abs() < 1e-12);
            let bound = if lattice.site_region(i).unwrap() == Region::Left {
                0.3
            } else {
                0.0
            };
            assert!(lattice.flux(i).unwrap().norm() <= bound + 1e-12);
        }
    }

    #[test]
    fn randomize_without_reseed_is_repeatable() {
        let mut lattice = setup(4, 3, 3);
        lattice.randomize(false);
        let first = lattice.results();
        lattice.randomize(false);
        assert_eq!(lattice.results(), first);
        let seed = lattice.seed();
        lattice.randomize(true);
        assert_ne!(lattice.seed(), seed);
    }

    #[test]
    fn with_molecule_places_graph_at_requested_column() {
        let lattice = Lattice::with_molecule(8, 1, 1, MoleculeGraph::circular(3), 2).unwrap();
        assert_eq!(lattice.mol_pos(), (2, 4));
        assert_eq!(lattice.region_count(Region::Molecule), 3);
        assert_eq!(lattice.molecule().edge_count(), 3);
    }

    #[test]
    fn explicit_geometry_with_mismatched_graph_fails() {
        let config = LatticeConfigBuilder::new()
            .geometry(GeometrySpec::Explicit(Geometry::full(6, 1, 1, 2, 3, 0, 0, 0, 0)))
            .molecule(MoleculeGraph::linear(3))
            .build()
            .unwrap();
        assert!(matches!(Lattice::new(&config), Err(MsdError::Molecule(_))));
    }
}
