use crate::core::models::molecule::MoleculeGraph;
use std::error::Error;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Common interface of the molecule file formats.
pub trait MoleculeFile {
    type Error: Error + From<io::Error>;

    fn read_from(reader: &mut impl Read) -> Result<MoleculeGraph, Self::Error>;

    fn write_to(graph: &MoleculeGraph, writer: &mut impl Write) -> Result<(), Self::Error>;

    fn read_from_path<P: AsRef<Path>>(path: P) -> Result<MoleculeGraph, Self::Error> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        Self::read_from(&mut reader)
    }

    /// Writes `graph` to `path`, creating or truncating the file.
    fn write_to_path<P: AsRef<Path>>(graph: &MoleculeGraph, path: P) -> Result<(), Self::Error> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        Self::write_to(graph, &mut writer)?;
        writer.flush()?;
        Ok(())
    }
}
