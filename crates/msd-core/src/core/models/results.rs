use super::region::Region;
use crate::core::vector::Vector;
use serde::{Deserialize, Serialize};

/// Cached aggregates of a lattice at simulation time `t`.
///
/// The local moment `m = s + f` of every site is summed into its zone (`ML`, `MR`, `Mm`) and the
/// totals; `MS*` and `MF*` hold the spin-only and flux-only parts. Energy is split into the three
/// zones and the three boundary pairs, with `U` their sum.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Results {
    pub t: u64,

    #[serde(rename = "M")]
    pub m: Vector,
    #[serde(rename = "ML")]
    pub m_l: Vector,
    #[serde(rename = "MR")]
    pub m_r: Vector,
    #[serde(rename = "Mm")]
    pub m_m: Vector,

    #[serde(rename = "MS")]
    pub ms: Vector,
    #[serde(rename = "MSL")]
    pub ms_l: Vector,
    #[serde(rename = "MSR")]
    pub ms_r: Vector,
    #[serde(rename = "MSm")]
    pub ms_m: Vector,

    #[serde(rename = "MF")]
    pub mf: Vector,
    #[serde(rename = "MFL")]
    pub mf_l: Vector,
    #[serde(rename = "MFR")]
    pub mf_r: Vector,
    #[serde(rename = "MFm")]
    pub mf_m: Vector,

    #[serde(rename = "U")]
    pub u: f64,
    #[serde(rename = "UL")]
    pub u_l: f64,
    #[serde(rename = "UR")]
    pub u_r: f64,
    #[serde(rename = "Um")]
    pub u_m: f64,
    #[serde(rename = "UmL")]
    pub u_ml: f64,
    #[serde(rename = "UmR")]
    pub u_mr: f64,
    #[serde(rename = "ULR")]
    pub u_lr: f64,
}

impl Results {
    /// Total moment of a zone. `None` for boundary regions.
    pub fn magnetization(&self, zone: Region) -> Option<Vector> {
        match zone {
            Region::Left => Some(self.m_l),
            Region::Right => Some(self.m_r),
            Region::Molecule => Some(self.m_m),
            _ => None,
        }
    }

    pub fn spin_magnetization(&self, zone: Region) -> Option<Vector> {
        match zone {
            Region::Left => Some(self.ms_l),
            Region::Right => Some(self.ms_r),
            Region::Molecule => Some(self.ms_m),
            _ => None,
        }
    }

    pub fn flux_magnetization(&self, zone: Region) -> Option<Vector> {
        match zone {
            Region::Left => Some(self.mf_l),
            Region::Right => Some(self.mf_r),
            Region::Molecule => Some(self.mf_m),
            _ => None,
        }
    }

    pub fn energy(&self, region: Region) -> f64 {
        match region {
            Region::Left => self.u_l,
            Region::Right => self.u_r,
            Region::Molecule => self.u_m,
            Region::MoleculeLeft => self.u_ml,
            Region::MoleculeRight => self.u_mr,
            Region::LeftRight => self.u_lr,
        }
    }

    fn energy_mut(&mut self, region: Region) -> &mut f64 {
        match region {
            Region::Left => &mut self.u_l,
            Region::Right => &mut self.u_r,
            Region::Molecule => &mut self.u_m,
            Region::MoleculeLeft => &mut self.u_ml,
            Region::MoleculeRight => &mut self.u_mr,
            Region::LeftRight => &mut self.u_lr,
        }
    }

    /// Adds a change of local moment to `zone` and to the totals. Boundary regions are ignored.
    pub(crate) fn add_moment(&mut self, zone: Region, ds: Vector, df: Vector) {
        let (m, ms, mf) = match zone {
            Region::Left => (&mut self.m_l, &mut self.ms_l, &mut self.mf_l),
            Region::Right => (&mut self.m_r, &mut self.ms_r, &mut self.mf_r),
            Region::Molecule => (&mut self.m_m, &mut self.ms_m, &mut self.mf_m),
            _ => return,
        };
        *m += ds + df;
        *ms += ds;
        *mf += df;
        self.m += ds + df;
        self.ms += ds;
        self.mf += df;
    }

    /// Adds `du` to the energy of `region` and to the total.
    pub(crate) fn add_energy(&mut self, region: Region, du: f64) {
        *self.energy_mut(region) += du;
        self.u += du;
    }

    /// Recomputes the totals from the per-region parts.
    pub(crate) fn resum(&mut self) {
        self.m = self.m_l + self.m_r + self.m_m;
        self.ms = self.ms_l + self.ms_r + self.ms_m;
        self.mf = self.mf_l + self.mf_r + self.mf_m;
        self.u = Region::ALL.iter().map(|&r| self.energy(r)).sum();
    }

    /// Clears every aggregate, keeping `t`.
    pub(crate) fn clear_aggregates(&mut self) {
        *self = Self {
            t: self.t,
            ..Self::default()
        };
    }
}
