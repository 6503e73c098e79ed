use crate::cli::{MoleculeArgs, MoleculeCommands};
use crate::error::{CliError, Result};
use msdsim::core::io::codec::BinaryMoleculeFile;
use msdsim::core::io::description::{TomlMoleculeFile, to_toml_string};
use msdsim::core::io::read_molecule;
use msdsim::core::io::traits::MoleculeFile;
use std::path::Path;
use tracing::info;

pub fn run(args: &MoleculeArgs) -> Result<()> {
    match &args.command {
        MoleculeCommands::Compile { input, output } => compile(input, output),
        MoleculeCommands::Show { path } => {
            print!("{}", show(path)?);
            Ok(())
        }
    }
}

fn compile(input: &Path, output: &Path) -> Result<()> {
    let graph = TomlMoleculeFile::read_from_path(input).map_err(|e| CliError::FileParsing {
        path: input.to_path_buf(),
        source: e.into(),
    })?;
    BinaryMoleculeFile::write_to_path(&graph, output).map_err(|e| CliError::FileParsing {
        path: output.to_path_buf(),
        source: e.into(),
    })?;
    info!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        "Compiled molecule to {:?}",
        output
    );
    println!(
        "✓ Compiled {} nodes and {} edges ({} bytes) to {}",
        graph.node_count(),
        graph.edge_count(),
        graph.serialization_size(),
        output.display()
    );
    Ok(())
}

/// Reads either format and renders it as a TOML description.
fn show(path: &Path) -> Result<String> {
    let graph = read_molecule(path).map_err(|e| CliError::FileParsing {
        path: path.to_path_buf(),
        source: e.into(),
    })?;
    to_toml_string(&graph).map_err(|e| CliError::Other(e.into()))
}
