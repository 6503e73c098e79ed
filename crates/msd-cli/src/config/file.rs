use crate::error::{CliError, Result};
use msdsim::core::models::molecule::{EdgeParameters, MoleculeGraph, NodeParameters};
use msdsim::core::models::parameters::NamedCoefficients;
use msdsim::core::vector::Vector;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileConfig {
    pub geometry: Option<FileGeometry>,
    pub molecule: Option<FileMolecule>,
    /// Keyed by the conventional coefficient names (`kT`, `B`, `JmL`, ...); validated on merge.
    pub parameters: Option<BTreeMap<String, ParameterValue>>,
    pub simulation: Option<FileSimulation>,
    pub sweep: Option<FileSweep>,
    #[serde(default)]
    pub overrides: Vec<FileSiteOverride>,
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileGeometry {
    pub width: Option<usize>,
    pub height: Option<usize>,
    pub depth: Option<usize>,
    pub mol_pos_l: Option<usize>,
    pub mol_pos_r: Option<usize>,
    pub top_l: Option<usize>,
    pub bottom_l: Option<usize>,
    pub front_r: Option<usize>,
    pub back_r: Option<usize>,
    pub height_l: Option<usize>,
    pub depth_r: Option<usize>,
}

impl FileGeometry {
    pub const KEYS: [&'static str; 11] = [
        "width", "height", "depth", "mol-pos-l", "mol-pos-r", "top-l", "bottom-l", "front-r",
        "back-r", "height-l", "depth-r",
    ];
}

/// Field-wise molecule coefficient overrides, applied to every node or edge.
#[derive(Deserialize, Serialize, Debug, Default, Clone, Copy, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MoleculeOverrides {
    #[serde(rename = "Sm")]
    pub s: Option<f64>,
    #[serde(rename = "Fm")]
    pub f: Option<f64>,
    #[serde(rename = "Je0m")]
    pub je0: Option<f64>,
    #[serde(rename = "Am")]
    pub a: Option<Vector>,
    #[serde(rename = "Jm")]
    pub j: Option<f64>,
    #[serde(rename = "Je1m")]
    pub je1: Option<f64>,
    #[serde(rename = "Jeem")]
    pub jee: Option<f64>,
    #[serde(rename = "bm")]
    pub b: Option<f64>,
    #[serde(rename = "Dm")]
    pub d: Option<Vector>,
}

impl MoleculeOverrides {
    pub const KEYS: [&'static str; 9] = ["Sm", "Fm", "Je0m", "Am", "Jm", "Je1m", "Jeem", "bm", "Dm"];

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn touches_nodes(&self) -> bool {
        self.s.is_some() || self.f.is_some() || self.je0.is_some() || self.a.is_some()
    }

    pub fn touches_edges(&self) -> bool {
        self.j.is_some()
            || self.je1.is_some()
            || self.jee.is_some()
            || self.b.is_some()
            || self.d.is_some()
    }

    pub fn apply_node(&self, node: &mut NodeParameters) {
        node.s = self.s.unwrap_or(node.s);
        node.f = self.f.unwrap_or(node.f);
        node.je0 = self.je0.unwrap_or(node.je0);
        node.a = self.a.unwrap_or(node.a);
    }

    pub fn apply_edge(&self, edge: &mut EdgeParameters) {
        edge.j = self.j.unwrap_or(edge.j);
        edge.je1 = self.je1.unwrap_or(edge.je1);
        edge.jee = self.jee.unwrap_or(edge.jee);
        edge.b = self.b.unwrap_or(edge.b);
        edge.d = self.d.unwrap_or(edge.d);
    }

    /// Applies the node and edge overrides to every node and edge of `graph`, leaving the fields
    /// not overridden as they are.
    pub fn apply_graph(&self, graph: &mut MoleculeGraph) {
        if self.touches_nodes() {
            for node in 0..graph.node_count() {
                if let Ok(mut p) = graph.node_parameters(node) {
                    self.apply_node(&mut p);
                    let _ = graph.set_node_parameters(node, p);
                }
            }
        }
        if self.touches_edges() {
            for edge in 0..graph.edge_count() {
                if let Ok(mut p) = graph.edge_parameters(edge) {
                    self.apply_edge(&mut p);
                    let _ = graph.set_edge_parameters(edge, p);
                }
            }
        }
    }

    /// Sets one override from a `-S molecule.<key>=<value>` style string.
    pub fn set_from_str(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "Sm" => self.s = Some(parse_float(key, value)?),
            "Fm" => self.f = Some(parse_float(key, value)?),
            "Je0m" => self.je0 = Some(parse_float(key, value)?),
            "Jm" => self.j = Some(parse_float(key, value)?),
            "Je1m" => self.je1 = Some(parse_float(key, value)?),
            "Jeem" => self.jee = Some(parse_float(key, value)?),
            "bm" => self.b = Some(parse_float(key, value)?),
            "Am" => self.a = Some(parse_vector(key, value)?),
            "Dm" => self.d = Some(parse_vector(key, value)?),
            _ => {
                return Err(CliError::Config(format!(
                    "Unsupported molecule key: '{}'",
                    key
                )));
            }
        }
        Ok(())
    }
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FileMolecule {
    /// `linear`, `circular`, or a path to a TOML or binary molecule file.
    pub topology: Option<String>,
    #[serde(rename = "Sm")]
    pub s: Option<f64>,
    #[serde(rename = "Fm")]
    pub f: Option<f64>,
    #[serde(rename = "Je0m")]
    pub je0: Option<f64>,
    #[serde(rename = "Am")]
    pub a: Option<Vector>,
    #[serde(rename = "Jm")]
    pub j: Option<f64>,
    #[serde(rename = "Je1m")]
    pub je1: Option<f64>,
    #[serde(rename = "Jeem")]
    pub jee: Option<f64>,
    #[serde(rename = "bm")]
    pub b: Option<f64>,
    #[serde(rename = "Dm")]
    pub d: Option<Vector>,
}

impl FileMolecule {
    pub fn overrides(&self) -> MoleculeOverrides {
        MoleculeOverrides {
            s: self.s,
            f: self.f,
            je0: self.je0,
            a: self.a,
            j: self.j,
            je1: self.je1,
            jee: self.jee,
            b: self.b,
            d: self.d,
        }
    }

    pub fn set_overrides(&mut self, o: MoleculeOverrides) {
        self.s = o.s;
        self.f = o.f;
        self.je0 = o.je0;
        self.a = o.a;
        self.j = o.j;
        self.je1 = o.je1;
        self.jee = o.jee;
        self.b = o.b;
        self.d = o.d;
    }
}

/// A coefficient value: a scalar, or a vector written as `[x, y, z]`.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
#[serde(untagged)]
pub enum ParameterValue {
    Scalar(f64),
    Vector(Vector),
}

impl ParameterValue {
    /// Writes the value into `coefficients` under `key`, which may name a vector component.
    pub fn apply(self, coefficients: &mut impl NamedCoefficients, key: &str) -> Result<()> {
        let applied = match self {
            Self::Scalar(value) => coefficients.set_by_name(key, value),
            Self::Vector(value) => match coefficients.vector_mut(key) {
                Some(slot) => {
                    *slot = value;
                    true
                }
                None => false,
            },
        };
        if applied {
            Ok(())
        } else {
            Err(CliError::Config(format!(
                "Unsupported parameter '{}' for value {:?}",
                key, self
            )))
        }
    }

    pub fn from_str_value(key: &str, value: &str) -> Result<Self> {
        if value.trim_start().starts_with('[') {
            parse_vector(key, value).map(Self::Vector)
        } else {
            parse_float(key, value).map(Self::Scalar)
        }
    }
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileSimulation {
    pub flipping_algorithm: Option<String>,
    pub site_selection: Option<String>,
    pub seed: Option<u64>,
    pub randomize: Option<bool>,
    pub burn_in: Option<u64>,
    pub steps: Option<u64>,
    pub record_frequency: Option<u64>,
}

impl FileSimulation {
    pub const KEYS: [&'static str; 7] = [
        "flipping-algorithm", "site-selection", "seed", "randomize", "burn-in", "steps",
        "record-frequency",
    ];
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileSweep {
    pub parameter: Option<String>,
    pub start: Option<f64>,
    pub stop: Option<f64>,
    pub points: Option<usize>,
    pub slots: Option<usize>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FileSiteOverride {
    pub x: usize,
    pub y: usize,
    pub z: usize,
    pub spin: Option<Vector>,
    pub flux: Option<Vector>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Reading run configuration from {:?}", path);
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }

    pub fn from_toml_str(text: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

pub fn parse_float(key: &str, value: &str) -> Result<f64> {
    value
        .trim()
        .parse()
        .map_err(|_| CliError::Config(format!("Invalid float value for {}: {}", key, value)))
}

pub fn parse_vector(key: &str, value: &str) -> Result<Vector> {
    let inner = value
        .trim()
        .strip_prefix('[')
        .and_then(|v| v.strip_suffix(']'))
        .ok_or_else(|| {
            CliError::Config(format!("Invalid vector value for {}: {}", key, value))
        })?;
    let components = inner
        .split(',')
        .map(|c| parse_float(key, c))
        .collect::<Result<Vec<f64>>>()?;
    match components.as_slice() {
        [x, y, z] => Ok(Vector::new(*x, *y, *z)),
        _ => Err(CliError::Config(format!(
            "Vector value for {} needs three components: {}",
            key, value
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use msdsim::core::models::parameters::Parameters;

    const FULL: &str = r#"
        [geometry]
        width = 11
        height = 4
        depth = 4
        mol-pos-l = 5
        mol-pos-r = 5

        [molecule]
        topology = "circular"
        Jm = 0.5
        Am = [0.0, 0.1, 0.0]

        [parameters]
        kT = 0.3
        B = [0.0, 0.1, 0.0]
        "B.z" = 0.2
        JmR = 1.0

        [simulation]
        flipping-algorithm = "discrete"
        seed = 42
        burn-in = 1000
        steps = 5000
        record-frequency = 100

        [sweep]
        parameter = "kT"
        start = 0.1
        stop = 2.0
        points = 20

        [[overrides]]
        x = 0
        y = 1
        z = 1
        spin = [1.0, 0.0, 0.0]
    "#;

    #[test]
    fn parses_every_section() {
        let config = FileConfig::from_toml_str(FULL).unwrap();
        let geometry = config.geometry.unwrap();
        assert_eq!(geometry.width, Some(11));
        assert_eq!(geometry.mol_pos_r, Some(5));
        assert_eq!(geometry.height_l, None);

        let molecule = config.molecule.unwrap();
        assert_eq!(molecule.topology.as_deref(), Some("circular"));
        assert_eq!(molecule.j, Some(0.5));
        assert_eq!(molecule.overrides().a, Some(Vector::new(0.0, 0.1, 0.0)));

        let parameters = config.parameters.unwrap();
        assert_eq!(parameters["kT"], ParameterValue::Scalar(0.3));
        assert_eq!(parameters["B"], ParameterValue::Vector(Vector::new(0.0, 0.1, 0.0)));

        let simulation = config.simulation.unwrap();
        assert_eq!(simulation.flipping_algorithm.as_deref(), Some("discrete"));
        assert_eq!(simulation.record_frequency, Some(100));
        assert_eq!(config.sweep.unwrap().points, Some(20));
        assert_eq!(config.overrides.len(), 1);
        assert_eq!(config.overrides[0].flux, None);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(FileConfig::from_toml_str("[geometry]\nwidht = 3\n").is_err());
        assert!(FileConfig::from_toml_str("[simulation]\nsteps = 3\nfoo = 1\n").is_err());
        assert!(FileConfig::from_toml_str("[extra]\n").is_err());
    }

    #[test]
    fn parameter_values_apply_by_name() {
        let mut p = Parameters::default();
        ParameterValue::Scalar(0.7).apply(&mut p, "kT").unwrap();
        ParameterValue::Scalar(0.2).apply(&mut p, "B.y").unwrap();
        ParameterValue::Vector(Vector::new(1.0, 2.0, 3.0))
            .apply(&mut p, "DLR")
            .unwrap();
        assert_eq!(p.kt, 0.7);
        assert_eq!(p.b.y, 0.2);
        assert_eq!(p.d_lr, Vector::new(1.0, 2.0, 3.0));

        assert!(ParameterValue::Scalar(1.0).apply(&mut p, "Temperature").is_err());
        assert!(ParameterValue::Vector(Vector::zeros()).apply(&mut p, "kT").is_err());
    }

    #[test]
    fn string_values_parse_as_scalars_or_vectors() {
        assert_eq!(
            ParameterValue::from_str_value("B", "[0, 1.5, -2]").unwrap(),
            ParameterValue::Vector(Vector::new(0.0, 1.5, -2.0))
        );
        assert_eq!(
            ParameterValue::from_str_value("kT", " 0.25").unwrap(),
            ParameterValue::Scalar(0.25)
        );
        assert!(ParameterValue::from_str_value("B", "[1, 2]").is_err());
        assert!(ParameterValue::from_str_value("kT", "warm").is_err());
    }

    #[test]
    fn molecule_overrides_are_field_wise() {
        let mut overrides = MoleculeOverrides::default();
        assert!(overrides.is_empty());
        overrides.set_from_str("Jm", "0.25").unwrap();
        overrides.set_from_str("Sm", "2").unwrap();
        assert!(overrides.touches_nodes() && overrides.touches_edges());

        let mut node = NodeParameters::default();
        overrides.apply_node(&mut node);
        assert_eq!((node.s, node.f), (2.0, 0.0));
        let mut edge = EdgeParameters::default();
        overrides.apply_edge(&mut edge);
        assert_eq!((edge.j, edge.b), (0.25, 0.0));

        assert!(overrides.set_from_str("Xm", "1").is_err());
    }

    #[test]
    fn graph_overrides_reach_every_node_and_edge() {
        let mut graph = MoleculeGraph::circular(4);
        let mut overrides = MoleculeOverrides::default();
        overrides.set_from_str("Fm", "0.5").unwrap();
        overrides.set_from_str("Dm", "[0, 0, 1]").unwrap();
        overrides.apply_graph(&mut graph);
        assert!(graph.nodes().all(|(_, p)| p.f == 0.5 && p.s == 1.0));
        assert!(graph
            .edges()
            .all(|(_, e)| e.parameters.d == Vector::z() && e.parameters.j == 1.0));
    }
}
