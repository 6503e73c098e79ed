//! Human-editable molecule descriptions.
//!
//! ```toml
//! [[node]]
//! id = "a"
//! Sm = 1.0
//!
//! [[node]]
//! id = "b"
//! Am = [0.0, 0.1, 0.0]
//!
//! [[edge]]
//! src = "a"
//! dest = 1
//! Jm = -0.5
//!
//! [leads]
//! left = "a"
//! right = "b"
//! ```
//!
//! Edge endpoints and leads name a node either by its position in the `[[node]]` list or by its
//! `id`. Omitted coefficients take their defaults; omitted leads are the first and last node.

use super::traits::MoleculeFile;
use crate::core::error::{FormatError, RangeError};
use crate::core::models::molecule::{EdgeParameters, MoleculeGraph, NodeParameters};
use crate::core::vector::Vector;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MoleculeFileError {
    #[error("File I/O error for '{path}': {source}")]
    Io { path: String, source: io::Error },

    #[error("TOML parsing error for '{path}': {source}")]
    Toml {
        path: String,
        source: toml::de::Error,
    },

    #[error("Invalid binary molecule '{path}': {source}")]
    Format { path: String, source: FormatError },

    #[error("Unknown node reference '{0}'")]
    UnknownNode(String),

    #[error("Duplicate node id '{0}'")]
    DuplicateId(String),

    #[error("Molecule is out of range: {0}")]
    Range(#[from] RangeError),

    #[error("Failed to render molecule description: {0}")]
    Render(#[from] toml::ser::Error),
}

impl From<io::Error> for MoleculeFileError {
    fn from(source: io::Error) -> Self {
        MoleculeFileError::Io {
            path: String::new(),
            source,
        }
    }
}

impl MoleculeFileError {
    /// Attaches a file path to errors raised while reading from an anonymous stream.
    pub fn with_path(self, path: &Path) -> Self {
        let path = path.to_string_lossy().to_string();
        match self {
            MoleculeFileError::Io { source, .. } => MoleculeFileError::Io { path, source },
            MoleculeFileError::Toml { source, .. } => MoleculeFileError::Toml { path, source },
            MoleculeFileError::Format { source, .. } => MoleculeFileError::Format { path, source },
            other => other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
enum NodeRef {
    Index(usize),
    Id(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct NodeEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(rename = "Sm", skip_serializing_if = "Option::is_none")]
    s: Option<f64>,
    #[serde(rename = "Fm", skip_serializing_if = "Option::is_none")]
    f: Option<f64>,
    #[serde(rename = "Je0m", skip_serializing_if = "Option::is_none")]
    je0: Option<f64>,
    #[serde(rename = "Am", skip_serializing_if = "Option::is_none")]
    a: Option<Vector>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct EdgeEntry {
    src: NodeRef,
    dest: NodeRef,
    #[serde(rename = "Jm", skip_serializing_if = "Option::is_none")]
    j: Option<f64>,
    #[serde(rename = "Je1m", skip_serializing_if = "Option::is_none")]
    je1: Option<f64>,
    #[serde(rename = "Jeem", skip_serializing_if = "Option::is_none")]
    jee: Option<f64>,
    #[serde(rename = "bm", skip_serializing_if = "Option::is_none")]
    b: Option<f64>,
    #[serde(rename = "Dm", skip_serializing_if = "Option::is_none")]
    d: Option<Vector>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct LeadsEntry {
    left: NodeRef,
    right: NodeRef,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct MoleculeDescription {
    #[serde(default, rename = "node")]
    nodes: Vec<NodeEntry>,
    #[serde(default, rename = "edge")]
    edges: Vec<EdgeEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    leads: Option<LeadsEntry>,
}

impl MoleculeDescription {
    fn build(self) -> Result<MoleculeGraph, MoleculeFileError> {
        let mut graph = MoleculeGraph::new();
        let mut ids = HashMap::new();
        let defaults = NodeParameters::default();

        for entry in self.nodes {
            let index = graph.create_node(NodeParameters {
                s: entry.s.unwrap_or(defaults.s),
                f: entry.f.unwrap_or(defaults.f),
                je0: entry.je0.unwrap_or(defaults.je0),
                a: entry.a.unwrap_or(defaults.a),
            });
            if let Some(id) = entry.id {
                if ids.insert(id.clone(), index).is_some() {
                    return Err(MoleculeFileError::DuplicateId(id));
                }
            }
        }

        let resolve = |r: &NodeRef| -> Result<usize, MoleculeFileError> {
            match r {
                NodeRef::Index(i) => Ok(*i),
                NodeRef::Id(id) => ids
                    .get(id)
                    .copied()
                    .ok_or_else(|| MoleculeFileError::UnknownNode(id.clone())),
            }
        };

        let defaults = EdgeParameters::default();
        for entry in &self.edges {
            let parameters = EdgeParameters {
                j: entry.j.unwrap_or(defaults.j),
                je1: entry.je1.unwrap_or(defaults.je1),
                jee: entry.jee.unwrap_or(defaults.jee),
                b: entry.b.unwrap_or(defaults.b),
                d: entry.d.unwrap_or(defaults.d),
            };
            graph.connect_nodes(resolve(&entry.src)?, resolve(&entry.dest)?, parameters)?;
        }

        match &self.leads {
            Some(leads) => graph.set_leads(resolve(&leads.left)?, resolve(&leads.right)?)?,
            None => graph.set_leads(0, graph.node_count().saturating_sub(1))?,
        }
        Ok(graph)
    }

    fn describe(graph: &MoleculeGraph) -> Self {
        let nodes = graph
            .nodes()
            .map(|(_, p)| NodeEntry {
                id: None,
                s: Some(p.s),
                f: Some(p.f),
                je0: Some(p.je0),
                a: Some(p.a),
            })
            .collect();
        let edges = graph
            .edges()
            .map(|(_, e)| EdgeEntry {
                src: NodeRef::Index(e.src),
                dest: NodeRef::Index(e.dest),
                j: Some(e.parameters.j),
                je1: Some(e.parameters.je1),
                jee: Some(e.parameters.jee),
                b: Some(e.parameters.b),
                d: Some(e.parameters.d),
            })
            .collect();
        let (left, right) = graph.leads();
        Self {
            nodes,
            edges,
            leads: Some(LeadsEntry {
                left: NodeRef::Index(left),
                right: NodeRef::Index(right),
            }),
        }
    }
}

pub fn from_toml_str(text: &str) -> Result<MoleculeGraph, MoleculeFileError> {
    let description: MoleculeDescription =
        toml::from_str(text).map_err(|e| MoleculeFileError::Toml {
            path: String::new(),
            source: e,
        })?;
    description.build()
}

pub fn to_toml_string(graph: &MoleculeGraph) -> Result<String, MoleculeFileError> {
    Ok(toml::to_string(&MoleculeDescription::describe(graph))?)
}

/// The TOML description as a [`MoleculeFile`].
pub struct TomlMoleculeFile;

impl MoleculeFile for TomlMoleculeFile {
    type Error = MoleculeFileError;

    fn read_from(reader: &mut impl Read) -> Result<MoleculeGraph, Self::Error> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        from_toml_str(&text)
    }

    fn write_to(graph: &MoleculeGraph, writer: &mut impl Write) -> Result<(), Self::Error> {
        writer.write_all(to_toml_string(graph)?.as_bytes())?;
        Ok(())
    }

    fn read_from_path<P: AsRef<Path>>(path: P) -> Result<MoleculeGraph, Self::Error> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| MoleculeFileError::Io {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        from_toml_str(&text).map_err(|e| e.with_path(path))
    }
}
