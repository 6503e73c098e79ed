use super::parameters::NamedCoefficients;
use crate::core::error::RangeError;
use crate::core::vector::Vector;
use serde::{Deserialize, Serialize};

/// On-site coefficients of a molecule node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeParameters {
    /// Fixed spin magnitude.
    #[serde(rename = "Sm")]
    pub s: f64,
    /// Upper bound on the flux magnitude.
    #[serde(rename = "Fm")]
    pub f: f64,
    /// Spin-flux coupling on the site.
    #[serde(rename = "Je0m")]
    pub je0: f64,
    /// Anisotropy, applied to the component-wise square of the local moment.
    #[serde(rename = "Am")]
    pub a: Vector,
}

impl Default for NodeParameters {
    fn default() -> Self {
        Self {
            s: 1.0,
            f: 0.0,
            je0: 0.0,
            a: Vector::zeros(),
        }
    }
}

/// Pairwise coefficients of a molecule edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeParameters {
    /// Spin-spin exchange.
    #[serde(rename = "Jm")]
    pub j: f64,
    /// Spin-flux cross exchange.
    #[serde(rename = "Je1m")]
    pub je1: f64,
    /// Flux-flux exchange.
    #[serde(rename = "Jeem")]
    pub jee: f64,
    /// Biquadratic coupling.
    #[serde(rename = "bm")]
    pub b: f64,
    /// Directional (Dzyaloshinskii-Moriya-like) coupling; its sign follows the edge orientation.
    #[serde(rename = "Dm")]
    pub d: Vector,
}

impl Default for EdgeParameters {
    fn default() -> Self {
        Self {
            j: 1.0,
            je1: 0.0,
            jee: 0.0,
            b: 0.0,
            d: Vector::zeros(),
        }
    }
}

impl EdgeParameters {
    /// All coefficients zero, i.e. a bond that contributes no energy.
    pub fn zero() -> Self {
        Self {
            j: 0.0,
            ..Self::default()
        }
    }
}

impl NamedCoefficients for NodeParameters {
    fn scalar_mut(&mut self, key: &str) -> Option<&mut f64> {
        Some(match key {
            "Sm" => &mut self.s,
            "Fm" => &mut self.f,
            "Je0m" => &mut self.je0,
            _ => return None,
        })
    }

    fn vector_mut(&mut self, key: &str) -> Option<&mut Vector> {
        (key == "Am").then_some(&mut self.a)
    }
}

impl NamedCoefficients for EdgeParameters {
    fn scalar_mut(&mut self, key: &str) -> Option<&mut f64> {
        Some(match key {
            "Jm" => &mut self.j,
            "Je1m" => &mut self.je1,
            "Jeem" => &mut self.jee,
            "bm" => &mut self.b,
            _ => return None,
        })
    }

    fn vector_mut(&mut self, key: &str) -> Option<&mut Vector> {
        (key == "Dm").then_some(&mut self.d)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub src: usize,
    pub dest: usize,
    pub parameters: EdgeParameters,
}

impl Edge {
    pub fn is_loop(&self) -> bool {
        self.src == self.dest
    }
}

/// Orientation of an edge as seen from one of its endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Outgoing,
    Incoming,
    Loop,
}

impl Direction {
    pub const fn sign(self) -> i8 {
        match self {
            Direction::Outgoing => 1,
            Direction::Incoming => -1,
            Direction::Loop => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Neighbor {
    pub edge: usize,
    pub node: usize,
    pub direction: Direction,
}

/// A directed graph of molecule nodes, each edge oriented `src -> dest`.
///
/// Node and edge indices are dense and stable: nodes and edges are only ever appended. Two nodes
/// are designated as leads; the left lead bonds to the left ferromagnet and the right lead to the
/// right one. An empty graph has both leads at 0.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MoleculeGraph {
    nodes: Vec<NodeParameters>,
    edges: Vec<Edge>,
    adjacency: Vec<Vec<Neighbor>>,
    left_lead: usize,
    right_lead: usize,
}

impl MoleculeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// A chain `0 -> 1 -> ... -> n-1` with leads at both ends.
    pub fn linear(n: usize) -> Self {
        Self::linear_with(n, NodeParameters::default(), EdgeParameters::default())
    }

    pub fn linear_with(n: usize, node: NodeParameters, edge: EdgeParameters) -> Self {
        let mut graph = Self::new();
        for _ in 0..n {
            graph.create_node(node);
        }
        for i in 1..n {
            graph.push_edge(i - 1, i, edge);
        }
        graph.right_lead = n.saturating_sub(1);
        graph
    }

    /// A ring: the linear chain closed by `n-1 -> 0`, with the right lead half way around.
    pub fn circular(n: usize) -> Self {
        Self::circular_with(n, NodeParameters::default(), EdgeParameters::default())
    }

    pub fn circular_with(n: usize, node: NodeParameters, edge: EdgeParameters) -> Self {
        let mut graph = Self::linear_with(n, node, edge);
        if n >= 2 {
            graph.push_edge(n - 1, 0, edge);
        }
        graph.right_lead = n / 2;
        graph
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn create_node(&mut self, parameters: NodeParameters) -> usize {
        self.nodes.push(parameters);
        self.adjacency.push(Vec::new());
        self.nodes.len() - 1
    }

    /// Adds the edge `a -> b`. The orientation is fixed for the lifetime of the edge.
    pub fn connect_nodes(
        &mut self,
        a: usize,
        b: usize,
        parameters: EdgeParameters,
    ) -> Result<usize, RangeError> {
        self.check_node(a)?;
        self.check_node(b)?;
        Ok(self.push_edge(a, b, parameters))
    }

    fn push_edge(&mut self, src: usize, dest: usize, parameters: EdgeParameters) -> usize {
        let edge = self.edges.len();
        self.edges.push(Edge {
            src,
            dest,
            parameters,
        });
        if src == dest {
            self.adjacency[src].push(Neighbor {
                edge,
                node: src,
                direction: Direction::Loop,
            });
        } else {
            self.adjacency[src].push(Neighbor {
                edge,
                node: dest,
                direction: Direction::Outgoing,
            });
            self.adjacency[dest].push(Neighbor {
                edge,
                node: src,
                direction: Direction::Incoming,
            });
        }
        edge
    }

    /// The first edge joining `a` and `b` in either orientation. `None` when the nodes are not
    /// connected or either index is unknown.
    pub fn edge_index(&self, a: usize, b: usize) -> Option<usize> {
        self.adjacency
            .get(a)?
            .iter()
            .find(|n| n.node == b)
            .map(|n| n.edge)
    }

    pub fn node_parameters(&self, node: usize) -> Result<NodeParameters, RangeError> {
        self.check_node(node)?;
        Ok(self.nodes[node])
    }

    pub fn set_node_parameters(
        &mut self,
        node: usize,
        parameters: NodeParameters,
    ) -> Result<(), RangeError> {
        self.check_node(node)?;
        self.nodes[node] = parameters;
        Ok(())
    }

    /// Unchecked access for indices the caller has already validated.
    pub(crate) fn node_at(&self, node: usize) -> &NodeParameters {
        &self.nodes[node]
    }

    pub(crate) fn edge_at(&self, edge: usize) -> &EdgeParameters {
        &self.edges[edge].parameters
    }

    pub fn edge(&self, edge: usize) -> Result<&Edge, RangeError> {
        self.edges.get(edge).ok_or(RangeError::Edge {
            index: edge,
            count: self.edges.len(),
        })
    }

    pub fn edge_parameters(&self, edge: usize) -> Result<EdgeParameters, RangeError> {
        self.edge(edge).map(|e| e.parameters)
    }

    pub fn set_edge_parameters(
        &mut self,
        edge: usize,
        parameters: EdgeParameters,
    ) -> Result<(), RangeError> {
        let count = self.edges.len();
        let target = self
            .edges
            .get_mut(edge)
            .ok_or(RangeError::Edge { index: edge, count })?;
        target.parameters = parameters;
        Ok(())
    }

    /// Overwrites the coefficients of every node and every edge.
    pub fn set_all_parameters(&mut self, node: NodeParameters, edge: EdgeParameters) {
        self.nodes.fill(node);
        for e in &mut self.edges {
            e.parameters = edge;
        }
    }

    pub fn nodes(&self) -> impl ExactSizeIterator<Item = (usize, &NodeParameters)> + '_ {
        self.nodes.iter().enumerate()
    }

    pub fn edges(&self) -> impl ExactSizeIterator<Item = (usize, &Edge)> + '_ {
        self.edges.iter().enumerate()
    }

    /// Every edge incident to `node`, self-loops listed once. Empty for an unknown node.
    pub fn neighbors(&self, node: usize) -> &[Neighbor] {
        self.adjacency.get(node).map_or(&[], Vec::as_slice)
    }

    pub fn leads(&self) -> (usize, usize) {
        (self.left_lead, self.right_lead)
    }

    pub fn left_lead(&self) -> usize {
        self.left_lead
    }

    pub fn right_lead(&self) -> usize {
        self.right_lead
    }

    /// Designates the lead nodes. For an empty graph only `(0, 0)` is accepted.
    pub fn set_leads(&mut self, left: usize, right: usize) -> Result<(), RangeError> {
        if !self.nodes.is_empty() || left != 0 || right != 0 {
            self.check_node(left)?;
            self.check_node(right)?;
        }
        self.left_lead = left;
        self.right_lead = right;
        Ok(())
    }

    fn check_node(&self, node: usize) -> Result<(), RangeError> {
        if node < self.nodes.len() {
            Ok(())
        } else {
            Err(RangeError::Node {
                index: node,
                count: self.nodes.len(),
            })
        }
    }
}
