//! Persistence for molecule graphs.
//!
//! Two formats share the [`traits::MoleculeFile`] interface: the fixed little-endian binary
//! layout in [`codec`] and the human-editable TOML description in [`description`].
//! [`read_molecule`] picks the right one from the file contents.

pub mod codec;
pub mod description;
pub mod traits;

use crate::core::models::molecule::MoleculeGraph;
use description::{MoleculeFileError, TomlMoleculeFile};
use std::path::Path;
use traits::MoleculeFile;

/// Reads a molecule from either format, recognising the binary one by its header.
pub fn read_molecule(path: &Path) -> Result<MoleculeGraph, MoleculeFileError> {
    let bytes = std::fs::read(path).map_err(|e| MoleculeFileError::Io {
        path: path.to_string_lossy().to_string(),
        source: e,
    })?;
    if bytes.starts_with(codec::HEADER) {
        MoleculeGraph::from_bytes(&bytes).map_err(|e| MoleculeFileError::Format {
            path: path.to_string_lossy().to_string(),
            source: e,
        })
    } else {
        TomlMoleculeFile::read_from(&mut bytes.as_slice()).map_err(|e| e.with_path(path))
    }
}
