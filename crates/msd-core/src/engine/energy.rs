//! The Hamiltonian and its single-site update.
//!
//! ```text
//! U = - sum over bonds (i -> j) [ J s_i.s_j + Je1 (s_i.f_j + f_i.s_j) + Jee f_i.f_j
//!                                 + b (m_i.m_j)^2 + D.(m_i x m_j) ]
//!     - sum over sites [ B.m + A.(m o m) + Je0 s.f ]
//! ```
//!
//! with `m = s + f` and `o` the component-wise product. Bond energy is accounted to the bond's
//! region; on-site energy to the site's zone.

use super::geometry::{Bond, Site};
use super::lattice::Lattice;
use crate::core::error::RangeError;
use crate::core::models::molecule::{EdgeParameters, NodeParameters};
use crate::core::models::parameters::Parameters;
use crate::core::models::region::Region;
use crate::core::vector::{Vector, VectorExt};
use tracing::trace;

/// Lattice-level coefficients indexed by region.
#[derive(Debug, Clone, Copy)]
pub struct CouplingTable {
    sites: [NodeParameters; 6],
    bonds: [EdgeParameters; 6],
}

impl CouplingTable {
    pub fn new(parameters: &Parameters) -> Self {
        let empty_site = NodeParameters {
            s: 0.0,
            ..NodeParameters::default()
        };
        let mut sites = [empty_site; 6];
        let mut bonds = [EdgeParameters::zero(); 6];
        for region in Region::ALL {
            if let Some(site) = parameters.site_coupling(region) {
                sites[region as usize] = site;
            }
            if let Some(bond) = parameters.bond_coupling(region) {
                bonds[region as usize] = bond;
            }
        }
        Self { sites, bonds }
    }

    #[inline]
    pub fn site(&self, zone: Region) -> NodeParameters {
        self.sites[zone as usize]
    }

    #[inline]
    pub fn bond(&self, region: Region) -> EdgeParameters {
        self.bonds[region as usize]
    }
}

/// A proposed single-site change, together with its effect on every energy bucket.
///
/// Only valid against the lattice state it was computed from; apply it before any other write.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveDelta {
    pub index: usize,
    pub zone: Region,
    pub spin: Vector,
    pub flux: Vector,
    pub d_spin: Vector,
    pub d_flux: Vector,
    /// Energy change per region, indexed by `Region as usize`.
    pub d_energy: [f64; 6],
}

impl MoveDelta {
    /// Total energy change.
    pub fn energy(&self) -> f64 {
        self.d_energy.iter().sum()
    }

    pub fn magnetization(&self) -> Vector {
        self.d_spin + self.d_flux
    }
}

/// Negated energy of one bond with `(s_i, f_i)` as the leading end.
#[inline]
fn bond_energy(k: &EdgeParameters, si: &Vector, fi: &Vector, sj: &Vector, fj: &Vector) -> f64 {
    let mi = si + fi;
    let mj = sj + fj;
    k.j * si.dot(sj)
        + k.je1 * (si.dot(fj) + fi.dot(sj))
        + k.jee * fi.dot(fj)
        + k.b * mi.dot(&mj).powi(2)
        + k.d.dot(&mi.cross(&mj))
}

/// Negated on-site energy, field term included.
#[inline]
fn site_energy(c: &NodeParameters, b: &Vector, s: &Vector, f: &Vector) -> f64 {
    let m = s + f;
    b.dot(&m) + c.a.dot(&m.component_sq()) + c.je0 * s.dot(f)
}

impl Lattice {
    pub(super) fn site_coefficients(&self, site: Site) -> NodeParameters {
        match site.node {
            Some(node) => *self.molecule.node_at(node),
            None => self.couplings.site(site.zone),
        }
    }

    fn bond_coefficients(&self, bond: &Bond) -> EdgeParameters {
        match bond.edge {
            Some(edge) => *self.molecule.edge_at(edge),
            None => self.couplings.bond(bond.region),
        }
    }

    /// Computes the effect of setting site `index` to `(spin, flux)` without committing it.
    pub fn delta_for_move(
        &self,
        index: usize,
        spin: Vector,
        flux: Vector,
    ) -> Result<MoveDelta, RangeError> {
        let site = self.site(index)?;
        Ok(self.move_delta(index, site, spin, flux))
    }

    pub(super) fn move_delta(&self, index: usize, site: Site, spin: Vector, flux: Vector) -> MoveDelta {
        let s = self.spins[index];
        let f = self.fluxes[index];
        let m = s + f;
        let m_new = spin + flux;
        let ds = spin - s;
        let df = flux - f;
        let dm = m_new - m;

        let mut d_energy = [0.0; 6];
        let c = self.site_coefficients(site);
        d_energy[site.zone as usize] -= self.parameters.b.dot(&dm)
            + c.a.dot(&(m_new.component_sq() - m.component_sq()))
            + c.je0 * (spin.dot(&flux) - s.dot(&f));

        for bond in self.layout.bonds.of(index) {
            let k = self.bond_coefficients(bond);
            let ns = self.spins[bond.neighbor];
            let nf = self.fluxes[bond.neighbor];
            let nm = ns + nf;
            let directional = if bond.leading {
                dm.cross(&nm)
            } else {
                nm.cross(&dm)
            };
            d_energy[bond.region as usize] -= k.j * ds.dot(&ns)
                + k.je1 * (ds.dot(&nf) + df.dot(&ns))
                + k.jee * df.dot(&nf)
                + k.b * (m_new.dot(&nm).powi(2) - m.dot(&nm).powi(2))
                + k.d.dot(&directional);
        }

        MoveDelta {
            index,
            zone: site.zone,
            spin,
            flux,
            d_spin: ds,
            d_flux: df,
            d_energy,
        }
    }

    /// Commits a delta computed by [`Self::delta_for_move`] against the current state.
    pub fn apply_move(&mut self, delta: MoveDelta) {
        self.spins[delta.index] = delta.spin;
        self.fluxes[delta.index] = delta.flux;
        self.results
            .add_moment(delta.zone, delta.d_spin, delta.d_flux);
        for region in Region::ALL {
            self.results
                .add_energy(region, delta.d_energy[region as usize]);
        }
        trace!(index = delta.index, du = delta.energy(), "Applied move.");
    }

    /// Recomputes every aggregate from the site state, keeping `t`.
    pub(super) fn recompute(&mut self) {
        self.results.clear_aggregates();
        let b = self.parameters.b;

        for &index in &self.layout.occupied {
            let Some(site) = self.layout.sites[index] else {
                continue;
            };
            let (s, f) = (self.spins[index], self.fluxes[index]);
            let c = self.site_coefficients(site);
            self.results.add_moment(site.zone, s, f);
            self.results.add_energy(site.zone, -site_energy(&c, &b, &s, &f));
        }

        for (i, bond) in self.layout.bonds.unique() {
            let k = self.bond_coefficients(bond);
            let j = bond.neighbor;
            let e = bond_energy(
                &k,
                &self.spins[i],
                &self.fluxes[i],
                &self.spins[j],
                &self.fluxes[j],
            );
            self.results.add_energy(bond.region, -e);
        }

        self.results.resum();
        trace!(energy = self.results.u, "Recomputed aggregates from scratch.");
    }

    /// Total energy recomputed from scratch, leaving the cache untouched.
    pub fn full_energy(&self) -> f64 {
        let mut copy = self.clone();
        copy.recompute();
        copy.results.u
    }
}
