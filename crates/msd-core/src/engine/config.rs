use super::geometry::Geometry;
use crate::core::models::molecule::{EdgeParameters, MoleculeGraph, NodeParameters};
use crate::core::models::parameters::Parameters;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Invalid value for {name}: '{value}'")]
    InvalidValue { name: &'static str, value: String },
}

/// How the Metropolis driver proposes a new moment for the chosen site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlipModel {
    /// Reverses the spin, leaving the flux as is.
    Discrete,
    /// Draws a uniformly random spin direction and a random flux within the zone's bound.
    #[default]
    Continuous,
}

impl FromStr for FlipModel {
    type Err = ConfigError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "discrete" | "ising" => Ok(Self::Discrete),
            "continuous" | "heisenberg" => Ok(Self::Continuous),
            _ => Err(ConfigError::InvalidValue {
                name: "flipping-algorithm",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for FlipModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Discrete => "discrete",
            Self::Continuous => "continuous",
        })
    }
}

/// Order in which the Metropolis driver visits sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SiteSelection {
    #[default]
    Random,
    /// Cycles through the occupied sites in linear order.
    Sequential,
}

impl FromStr for SiteSelection {
    type Err = ConfigError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "random" => Ok(Self::Random),
            "sequential" => Ok(Self::Sequential),
            _ => Err(ConfigError::InvalidValue {
                name: "site-selection",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for SiteSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Random => "random",
            Self::Sequential => "sequential",
        })
    }
}

/// Shape of the bridging molecule.
#[derive(Debug, Clone, PartialEq)]
pub enum Topology {
    /// A chain filling the span, built from the configured node and edge coefficients.
    Linear,
    /// A ring filling the span, built from the configured node and edge coefficients.
    Circular,
    /// An explicit graph carrying its own coefficients.
    Graph(MoleculeGraph),
}

/// How the device bounds are given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometrySpec {
    /// See [`Geometry::centered`].
    Centered {
        width: usize,
        height: usize,
        depth: usize,
    },
    /// See [`Geometry::with_leads`].
    Leads {
        width: usize,
        height: usize,
        depth: usize,
        height_l: usize,
        depth_r: usize,
    },
    /// Already resolved bounds, clamped again on use.
    Explicit(Geometry),
    /// A molecule starting at `mol_pos_l` whose width is its node count.
    Anchored {
        width: usize,
        height: usize,
        depth: usize,
        mol_pos_l: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LatticeConfig {
    pub geometry: GeometrySpec,
    pub topology: Topology,
    pub node_parameters: NodeParameters,
    pub edge_parameters: EdgeParameters,
    pub parameters: Parameters,
    pub flip_model: FlipModel,
    pub site_selection: SiteSelection,
    /// `None` draws a fresh seed at construction.
    pub seed: Option<u64>,
}

impl LatticeConfig {
    /// Resolves the geometry and the molecule prototype that fills it.
    pub fn resolve(&self) -> (Geometry, MoleculeGraph) {
        let geometry = match self.geometry {
            GeometrySpec::Centered {
                width,
                height,
                depth,
            } => Geometry::centered(width, height, depth),
            GeometrySpec::Leads {
                width,
                height,
                depth,
                height_l,
                depth_r,
            } => Geometry::with_leads(width, height, depth, height_l, depth_r),
            GeometrySpec::Explicit(g) => Geometry::full(
                g.width, g.height, g.depth, g.mol_pos_l, g.mol_pos_r, g.top_l, g.bottom_l,
                g.front_r, g.back_r,
            ),
            GeometrySpec::Anchored {
                width,
                height,
                depth,
                mol_pos_l,
            } => {
                let nodes = match &self.topology {
                    Topology::Graph(graph) => graph.node_count(),
                    _ => 1,
                };
                Geometry::anchored(width, height, depth, mol_pos_l, nodes)
            }
        };

        let molecule = match &self.topology {
            Topology::Linear => {
                MoleculeGraph::linear_with(geometry.span(), self.node_parameters, self.edge_parameters)
            }
            Topology::Circular => MoleculeGraph::circular_with(
                geometry.span(),
                self.node_parameters,
                self.edge_parameters,
            ),
            Topology::Graph(graph) => graph.clone(),
        };
        (geometry, molecule)
    }
}

#[derive(Default)]
pub struct LatticeConfigBuilder {
    geometry: Option<GeometrySpec>,
    topology: Option<Topology>,
    node_parameters: Option<NodeParameters>,
    edge_parameters: Option<EdgeParameters>,
    parameters: Option<Parameters>,
    flip_model: Option<FlipModel>,
    site_selection: Option<SiteSelection>,
    seed: Option<u64>,
}

impl LatticeConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn geometry(mut self, geometry: GeometrySpec) -> Self {
        self.geometry = Some(geometry);
        self
    }
    pub fn dimensions(self, width: usize, height: usize, depth: usize) -> Self {
        self.geometry(GeometrySpec::Centered {
            width,
            height,
            depth,
        })
    }
    pub fn topology(mut self, topology: Topology) -> Self {
        self.topology = Some(topology);
        self
    }
    pub fn molecule(self, graph: MoleculeGraph) -> Self {
        self.topology(Topology::Graph(graph))
    }
    pub fn node_parameters(mut self, parameters: NodeParameters) -> Self {
        self.node_parameters = Some(parameters);
        self
    }
    pub fn edge_parameters(mut self, parameters: EdgeParameters) -> Self {
        self.edge_parameters = Some(parameters);
        self
    }
    pub fn parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = Some(parameters);
        self
    }
    pub fn flip_model(mut self, model: FlipModel) -> Self {
        self.flip_model = Some(model);
        self
    }
    pub fn site_selection(mut self, selection: SiteSelection) -> Self {
        self.site_selection = Some(selection);
        self
    }
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn build(self) -> Result<LatticeConfig, ConfigError> {
        Ok(LatticeConfig {
            geometry: self
                .geometry
                .ok_or(ConfigError::MissingParameter("geometry"))?,
            topology: self.topology.unwrap_or(Topology::Linear),
            node_parameters: self.node_parameters.unwrap_or_default(),
            edge_parameters: self.edge_parameters.unwrap_or_default(),
            parameters: self.parameters.unwrap_or_default(),
            flip_model: self.flip_model.unwrap_or_default(),
            site_selection: self.site_selection.unwrap_or_default(),
            seed: self.seed,
        })
    }
}
