use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A structural zone of the device (`Left`, `Right`, `Molecule`) or a boundary pair between two
/// zones. Every site belongs to exactly one zone, and every bond is accounted to exactly one of
/// the six regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Region {
    #[serde(rename = "L")]
    Left,
    #[serde(rename = "R")]
    Right,
    #[serde(rename = "m")]
    Molecule,
    #[serde(rename = "mL")]
    MoleculeLeft,
    #[serde(rename = "mR")]
    MoleculeRight,
    #[serde(rename = "LR")]
    LeftRight,
}

impl Region {
    pub const ALL: [Region; 6] = [
        Region::Left,
        Region::Right,
        Region::Molecule,
        Region::MoleculeLeft,
        Region::MoleculeRight,
        Region::LeftRight,
    ];

    pub const ZONES: [Region; 3] = [Region::Left, Region::Right, Region::Molecule];

    /// Whether sites (and hence magnetization) can belong to this region. Boundary pairs only
    /// ever carry bond energy.
    pub const fn is_zone(self) -> bool {
        matches!(self, Region::Left | Region::Right | Region::Molecule)
    }

    /// The region a bond between sites of zones `a` and `b` is accounted to.
    pub const fn between(a: Region, b: Region) -> Option<Region> {
        match (a, b) {
            (Region::Left, Region::Left) => Some(Region::Left),
            (Region::Right, Region::Right) => Some(Region::Right),
            (Region::Molecule, Region::Molecule) => Some(Region::Molecule),
            (Region::Left, Region::Molecule) | (Region::Molecule, Region::Left) => {
                Some(Region::MoleculeLeft)
            }
            (Region::Right, Region::Molecule) | (Region::Molecule, Region::Right) => {
                Some(Region::MoleculeRight)
            }
            (Region::Left, Region::Right) | (Region::Right, Region::Left) => {
                Some(Region::LeftRight)
            }
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Region::Left => "L",
            Region::Right => "R",
            Region::Molecule => "m",
            Region::MoleculeLeft => "mL",
            Region::MoleculeRight => "mR",
            Region::LeftRight => "LR",
        }
    }
}

#[derive(Debug, Error)]
#[error("Invalid region name: '{0}'")]
pub struct ParseRegionError(pub String);

impl FromStr for Region {
    type Err = ParseRegionError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "L" | "left" => Ok(Self::Left),
            "R" | "right" => Ok(Self::Right),
            "m" | "mol" | "molecule" => Ok(Self::Molecule),
            "mL" | "mol-left" => Ok(Self::MoleculeLeft),
            "mR" | "mol-right" => Ok(Self::MoleculeRight),
            "LR" | "left-right" => Ok(Self::LeftRight),
            _ => Err(ParseRegionError(s.to_string())),
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
