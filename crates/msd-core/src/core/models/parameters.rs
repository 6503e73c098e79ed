use super::molecule::{EdgeParameters, NodeParameters};
use super::region::Region;
use crate::core::vector::Vector;
use serde::{Deserialize, Serialize};

/// Coefficient records addressable by conventional key. Scalars use their bare name (`"kT"`,
/// `"Jm"`); vector components append an axis (`"B.y"`, `"Am.z"`).
pub trait NamedCoefficients: Copy {
    fn scalar_mut(&mut self, key: &str) -> Option<&mut f64>;

    fn vector_mut(&mut self, key: &str) -> Option<&mut Vector>;

    fn slot_mut(&mut self, key: &str) -> Option<&mut f64> {
        match key.split_once('.') {
            Some((base, axis)) => {
                let v = self.vector_mut(base)?;
                match axis {
                    "x" => Some(&mut v.x),
                    "y" => Some(&mut v.y),
                    "z" => Some(&mut v.z),
                    _ => None,
                }
            }
            None => self.scalar_mut(key),
        }
    }

    /// Returns `false`, leaving `self` untouched, when the key is unknown.
    fn set_by_name(&mut self, key: &str, value: f64) -> bool {
        match self.slot_mut(key) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    fn get_by_name(&self, key: &str) -> Option<f64> {
        let mut copy = *self;
        copy.slot_mut(key).map(|slot| *slot)
    }
}

/// Lattice-level Hamiltonian coefficients.
///
/// The molecule's own coefficients (`Sm`, `Jm`, ...) live on the molecule graph so that each node
/// and edge may differ; this record holds the two ferromagnets and the three boundary pairs.
/// Fields serialize under their conventional names (`kT`, `B`, `SL`, `JmL`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Parameters {
    #[serde(rename = "kT")]
    pub kt: f64,
    #[serde(rename = "B")]
    pub b: Vector,

    #[serde(rename = "SL")]
    pub s_l: f64,
    #[serde(rename = "SR")]
    pub s_r: f64,
    #[serde(rename = "FL")]
    pub f_l: f64,
    #[serde(rename = "FR")]
    pub f_r: f64,

    #[serde(rename = "JL")]
    pub j_l: f64,
    #[serde(rename = "JR")]
    pub j_r: f64,
    #[serde(rename = "JmL")]
    pub j_ml: f64,
    #[serde(rename = "JmR")]
    pub j_mr: f64,
    #[serde(rename = "JLR")]
    pub j_lr: f64,

    #[serde(rename = "Je0L")]
    pub je0_l: f64,
    #[serde(rename = "Je0R")]
    pub je0_r: f64,

    #[serde(rename = "Je1L")]
    pub je1_l: f64,
    #[serde(rename = "Je1R")]
    pub je1_r: f64,
    #[serde(rename = "Je1mL")]
    pub je1_ml: f64,
    #[serde(rename = "Je1mR")]
    pub je1_mr: f64,
    #[serde(rename = "Je1LR")]
    pub je1_lr: f64,

    #[serde(rename = "JeeL")]
    pub jee_l: f64,
    #[serde(rename = "JeeR")]
    pub jee_r: f64,
    #[serde(rename = "JeemL")]
    pub jee_ml: f64,
    #[serde(rename = "JeemR")]
    pub jee_mr: f64,
    #[serde(rename = "JeeLR")]
    pub jee_lr: f64,

    // Biquadratic couplings.
    #[serde(rename = "bL")]
    pub bq_l: f64,
    #[serde(rename = "bR")]
    pub bq_r: f64,
    #[serde(rename = "bmL")]
    pub bq_ml: f64,
    #[serde(rename = "bmR")]
    pub bq_mr: f64,
    #[serde(rename = "bLR")]
    pub bq_lr: f64,

    #[serde(rename = "AL")]
    pub a_l: Vector,
    #[serde(rename = "AR")]
    pub a_r: Vector,

    #[serde(rename = "DL")]
    pub d_l: Vector,
    #[serde(rename = "DR")]
    pub d_r: Vector,
    #[serde(rename = "DmL")]
    pub d_ml: Vector,
    #[serde(rename = "DmR")]
    pub d_mr: Vector,
    #[serde(rename = "DLR")]
    pub d_lr: Vector,
}

impl Default for Parameters {
    fn default() -> Self {
        let zero = Vector::zeros();
        Self {
            kt: 0.25,
            b: zero,
            s_l: 1.0,
            s_r: 1.0,
            f_l: 0.0,
            f_r: 0.0,
            j_l: 1.0,
            j_r: 1.0,
            j_ml: 1.0,
            j_mr: -1.0,
            j_lr: 0.0,
            je0_l: 0.0,
            je0_r: 0.0,
            je1_l: 0.0,
            je1_r: 0.0,
            je1_ml: 0.0,
            je1_mr: 0.0,
            je1_lr: 0.0,
            jee_l: 0.0,
            jee_r: 0.0,
            jee_ml: 0.0,
            jee_mr: 0.0,
            jee_lr: 0.0,
            bq_l: 0.0,
            bq_r: 0.0,
            bq_ml: 0.0,
            bq_mr: 0.0,
            bq_lr: 0.0,
            a_l: zero,
            a_r: zero,
            d_l: zero,
            d_r: zero,
            d_ml: zero,
            d_mr: zero,
            d_lr: zero,
        }
    }
}

impl Parameters {
    /// Every coefficient zero, including `kT`.
    pub fn zero() -> Self {
        let zero = Vector::zeros();
        Self {
            kt: 0.0,
            b: zero,
            s_l: 0.0,
            s_r: 0.0,
            f_l: 0.0,
            f_r: 0.0,
            j_l: 0.0,
            j_r: 0.0,
            j_ml: 0.0,
            j_mr: 0.0,
            ..Self::default()
        }
    }

    /// On-site coefficients of a ferromagnet zone. `None` for the molecule, whose nodes carry
    /// their own, and for boundary regions, which have no sites.
    pub fn site_coupling(&self, zone: Region) -> Option<NodeParameters> {
        match zone {
            Region::Left => Some(NodeParameters {
                s: self.s_l,
                f: self.f_l,
                je0: self.je0_l,
                a: self.a_l,
            }),
            Region::Right => Some(NodeParameters {
                s: self.s_r,
                f: self.f_r,
                je0: self.je0_r,
                a: self.a_r,
            }),
            _ => None,
        }
    }

    /// Pair coefficients of the bonds accounted to `region`. `None` for the molecule.
    pub fn bond_coupling(&self, region: Region) -> Option<EdgeParameters> {
        let (j, je1, jee, b, d) = match region {
            Region::Left => (self.j_l, self.je1_l, self.jee_l, self.bq_l, self.d_l),
            Region::Right => (self.j_r, self.je1_r, self.jee_r, self.bq_r, self.d_r),
            Region::MoleculeLeft => (self.j_ml, self.je1_ml, self.jee_ml, self.bq_ml, self.d_ml),
            Region::MoleculeRight => (self.j_mr, self.je1_mr, self.jee_mr, self.bq_mr, self.d_mr),
            Region::LeftRight => (self.j_lr, self.je1_lr, self.jee_lr, self.bq_lr, self.d_lr),
            Region::Molecule => return None,
        };
        Some(EdgeParameters { j, je1, jee, b, d })
    }
}

impl NamedCoefficients for Parameters {
    fn vector_mut(&mut self, key: &str) -> Option<&mut Vector> {
        Some(match key {
            "B" => &mut self.b,
            "AL" => &mut self.a_l,
            "AR" => &mut self.a_r,
            "DL" => &mut self.d_l,
            "DR" => &mut self.d_r,
            "DmL" => &mut self.d_ml,
            "DmR" => &mut self.d_mr,
            "DLR" => &mut self.d_lr,
            _ => return None,
        })
    }

    fn scalar_mut(&mut self, key: &str) -> Option<&mut f64> {
        Some(match key {
            "kT" => &mut self.kt,
            "SL" => &mut self.s_l,
            "SR" => &mut self.s_r,
            "FL" => &mut self.f_l,
            "FR" => &mut self.f_r,
            "JL" => &mut self.j_l,
            "JR" => &mut self.j_r,
            "JmL" => &mut self.j_ml,
            "JmR" => &mut self.j_mr,
            "JLR" => &mut self.j_lr,
            "Je0L" => &mut self.je0_l,
            "Je0R" => &mut self.je0_r,
            "Je1L" => &mut self.je1_l,
            "Je1R" => &mut self.je1_r,
            "Je1mL" => &mut self.je1_ml,
            "Je1mR" => &mut self.je1_mr,
            "Je1LR" => &mut self.je1_lr,
            "JeeL" => &mut self.jee_l,
            "JeeR" => &mut self.jee_r,
            "JeemL" => &mut self.jee_ml,
            "JeemR" => &mut self.jee_mr,
            "JeeLR" => &mut self.jee_lr,
            "bL" => &mut self.bq_l,
            "bR" => &mut self.bq_r,
            "bmL" => &mut self.bq_ml,
            "bmR" => &mut self.bq_mr,
            "bLR" => &mut self.bq_lr,
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let p = Parameters::default();
        assert_eq!(p.kt, 0.25);
        assert_eq!(p.b, Vector::zeros());
        assert_eq!((p.s_l, p.s_r, p.f_l, p.f_r), (1.0, 1.0, 0.0, 0.0));
        assert_eq!((p.j_l, p.j_r, p.j_ml, p.j_mr, p.j_lr), (1.0, 1.0, 1.0, -1.0, 0.0));
        assert_eq!(p.bq_lr, 0.0);
        assert_eq!(p.d_mr, Vector::zeros());
    }

    #[test]
    fn zero_clears_every_default() {
        let p = Parameters::zero();
        for region in Region::ALL {
            if let Some(bond) = p.bond_coupling(region) {
                assert_eq!(bond, EdgeParameters::zero());
            }
            if let Some(site) = p.site_coupling(region) {
                assert_eq!((site.s, site.f, site.je0), (0.0, 0.0, 0.0));
            }
        }
        assert_eq!(p.kt, 0.0);
    }

    #[test]
    fn coupling_table_routes_each_region() {
        let mut p = Parameters::zero();
        p.j_ml = 2.0;
        p.jee_lr = 3.0;
        p.d_r = Vector::z();
        p.s_l = 4.0;
        p.a_r = Vector::x();

        assert_eq!(p.bond_coupling(Region::MoleculeLeft).unwrap().j, 2.0);
        assert_eq!(p.bond_coupling(Region::LeftRight).unwrap().jee, 3.0);
        assert_eq!(p.bond_coupling(Region::Right).unwrap().d, Vector::z());
        assert_eq!(p.site_coupling(Region::Left).unwrap().s, 4.0);
        assert_eq!(p.site_coupling(Region::Right).unwrap().a, Vector::x());

        assert!(p.bond_coupling(Region::Molecule).is_none());
        assert!(p.site_coupling(Region::Molecule).is_none());
        assert!(p.site_coupling(Region::MoleculeRight).is_none());
    }

    #[test]
    fn serializes_under_conventional_names() {
        let text = toml::to_string(&Parameters::default()).unwrap();
        for key in ["kT", "B", "SL", "JmR", "Je1mL", "JeeLR", "bL", "AR", "DmR"] {
            assert!(
                text.lines().any(|l| l.starts_with(&format!("{key} ="))),
                "missing {key} in\n{text}"
            );
        }
    }

    #[test]
    fn deserializes_partial_documents_over_defaults() {
        let p: Parameters = toml::from_str("kT = 0.5\nJLR = 0.2\nB = [0.1, 0.0, 0.0]").unwrap();
        assert_eq!(p.kt, 0.5);
        assert_eq!(p.j_lr, 0.2);
        assert_eq!(p.b, Vector::new(0.1, 0.0, 0.0));
        assert_eq!(p.j_mr, -1.0);
    }

    #[test]
    fn set_by_name_handles_scalars_and_vector_components() {
        let mut p = Parameters::default();
        assert!(p.set_by_name("JmL", 0.75));
        assert!(p.set_by_name("B.y", -0.5));
        assert!(p.set_by_name("DLR.z", 2.0));
        assert_eq!(p.j_ml, 0.75);
        assert_eq!(p.b, Vector::new(0.0, -0.5, 0.0));
        assert_eq!(p.d_lr.z, 2.0);
        assert_eq!(p.get_by_name("B.y"), Some(-0.5));
        assert_eq!(p.get_by_name("JmL"), Some(0.75));

        assert!(!p.set_by_name("Jx", 1.0));
        assert!(!p.set_by_name("B.w", 1.0));
        assert!(!p.set_by_name("SL.x", 1.0));
        assert_eq!(p.get_by_name("nope"), None);
    }
}
