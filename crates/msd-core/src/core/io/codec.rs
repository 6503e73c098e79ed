//! The binary molecule layout. Every integer is a little-endian `u64` (apart from the `u16`
//! version) and every coefficient a little-endian `f64`:
//!
//! ```text
//! "MSDMOL" version:u16
//! node_count  { Sm Fm Je0m Am.x Am.y Am.z } * node_count
//! edge_count  { src dest Jm Je1m Jeem bm Dm.x Dm.y Dm.z } * edge_count
//! left_lead right_lead
//! ```

use super::traits::MoleculeFile;
use crate::core::error::FormatError;
use crate::core::models::molecule::{EdgeParameters, MoleculeGraph, NodeParameters};
use crate::core::vector::Vector;
use std::io::{self, Read, Write};
use thiserror::Error;

pub const HEADER: &[u8; 6] = b"MSDMOL";
pub const VERSION: u16 = 1;
/// Size of the magic plus the version field.
pub const HEADER_SIZE: usize = HEADER.len() + 2;

const COUNT_SIZE: usize = 8;
const NODE_SIZE: usize = 6 * 8;
const EDGE_SIZE: usize = 2 * 8 + 7 * 8;
const LEADS_SIZE: usize = 2 * 8;

impl MoleculeGraph {
    /// Exact number of bytes [`Self::serialize`] produces.
    pub fn serialization_size(&self) -> usize {
        HEADER_SIZE
            + COUNT_SIZE
            + self.node_count() * NODE_SIZE
            + COUNT_SIZE
            + self.edge_count() * EDGE_SIZE
            + LEADS_SIZE
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.serialization_size());
        buf.extend_from_slice(HEADER);
        buf.extend_from_slice(&VERSION.to_le_bytes());

        put_u64(&mut buf, self.node_count());
        for (_, node) in self.nodes() {
            put_f64(&mut buf, node.s);
            put_f64(&mut buf, node.f);
            put_f64(&mut buf, node.je0);
            put_vector(&mut buf, &node.a);
        }

        put_u64(&mut buf, self.edge_count());
        for (_, edge) in self.edges() {
            let p = &edge.parameters;
            put_u64(&mut buf, edge.src);
            put_u64(&mut buf, edge.dest);
            put_f64(&mut buf, p.j);
            put_f64(&mut buf, p.je1);
            put_f64(&mut buf, p.jee);
            put_f64(&mut buf, p.b);
            put_vector(&mut buf, &p.d);
        }

        let (left, right) = self.leads();
        put_u64(&mut buf, left);
        put_u64(&mut buf, right);
        buf
    }

    /// Decodes a buffer written by [`Self::serialize`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FormatError> {
        let mut reader = ByteReader::new(bytes);

        if reader.take(HEADER.len())? != HEADER {
            return Err(FormatError::Header);
        }
        let version = reader.u16()?;
        if version != VERSION {
            return Err(FormatError::Version {
                found: version,
                expected: VERSION,
            });
        }

        let mut graph = MoleculeGraph::new();
        let node_count = reader.u64()?;
        for _ in 0..node_count {
            let s = reader.f64()?;
            let f = reader.f64()?;
            let je0 = reader.f64()?;
            let a = reader.vector()?;
            graph.create_node(NodeParameters { s, f, je0, a });
        }
        let count = graph.node_count();

        let edge_count = reader.u64()?;
        for edge in 0..edge_count as usize {
            let src = reader.u64()?;
            let dest = reader.u64()?;
            let parameters = EdgeParameters {
                j: reader.f64()?,
                je1: reader.f64()?,
                jee: reader.f64()?,
                b: reader.f64()?,
                d: reader.vector()?,
            };
            for node in [src, dest] {
                if node >= count as u64 {
                    return Err(FormatError::EdgeEndpoint { edge, node, count });
                }
            }
            graph
                .connect_nodes(src as usize, dest as usize, parameters)
                .map_err(|_| FormatError::EdgeEndpoint {
                    edge,
                    node: src,
                    count,
                })?;
        }

        let left = reader.u64()?;
        let right = reader.u64()?;
        reader.finish()?;

        for lead in [left, right] {
            let valid = if count == 0 {
                lead == 0
            } else {
                lead < count as u64
            };
            if !valid {
                return Err(FormatError::Lead { lead, count });
            }
        }
        graph
            .set_leads(left as usize, right as usize)
            .map_err(|_| FormatError::Lead { lead: left, count })?;
        Ok(graph)
    }

    /// Replaces this graph with the decoded one. On error `self` is left untouched.
    pub fn deserialize(&mut self, bytes: &[u8]) -> Result<(), FormatError> {
        *self = Self::from_bytes(bytes)?;
        Ok(())
    }
}

fn put_u64(buf: &mut Vec<u8>, value: usize) {
    buf.extend_from_slice(&(value as u64).to_le_bytes());
}

fn put_f64(buf: &mut Vec<u8>, value: f64) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn put_vector(buf: &mut Vec<u8>, v: &Vector) {
    put_f64(buf, v.x);
    put_f64(buf, v.y);
    put_f64(buf, v.z);
}

struct ByteReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], FormatError> {
        let available = self.bytes.len() - self.offset;
        if n > available {
            return Err(FormatError::Truncated {
                offset: self.offset,
                needed: n,
                available,
            });
        }
        let slice = &self.bytes[self.offset..self.offset + n];
        self.offset += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], FormatError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u16(&mut self) -> Result<u16, FormatError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64, FormatError> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    fn f64(&mut self) -> Result<f64, FormatError> {
        Ok(f64::from_le_bytes(self.array()?))
    }

    fn vector(&mut self) -> Result<Vector, FormatError> {
        Ok(Vector::new(self.f64()?, self.f64()?, self.f64()?))
    }

    fn finish(self) -> Result<(), FormatError> {
        match self.bytes.len() - self.offset {
            0 => Ok(()),
            extra => Err(FormatError::TrailingBytes { extra }),
        }
    }
}

#[derive(Debug, Error)]
pub enum BinaryFileError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Invalid molecule data: {0}")]
    Format(#[from] FormatError),
}

/// The binary layout as a [`MoleculeFile`].
pub struct BinaryMoleculeFile;

impl MoleculeFile for BinaryMoleculeFile {
    type Error = BinaryFileError;

    fn read_from(reader: &mut impl Read) -> Result<MoleculeGraph, Self::Error> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Ok(MoleculeGraph::from_bytes(&bytes)?)
    }

    fn write_to(graph: &MoleculeGraph, writer: &mut impl Write) -> Result<(), Self::Error> {
        writer.write_all(&graph.serialize())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_graph() -> MoleculeGraph {
        let mut g = MoleculeGraph::new();
        for i in 0..3 {
            g.create_node(NodeParameters {
                s: 1.0 + i as f64,
                f: 0.1 * i as f64,
                je0: -0.5,
                a: Vector::new(0.1, 0.2, 0.3 * i as f64),
            });
        }
        g.connect_nodes(0, 1, EdgeParameters::default()).unwrap();
        g.connect_nodes(
            2,
            1,
            EdgeParameters {
                j: -0.3,
                je1: 0.2,
                jee: 0.1,
                b: 0.05,
                d: Vector::new(0.0, 0.0, 1.0),
            },
        )
        .unwrap();
        g.connect_nodes(2, 2, EdgeParameters::zero()).unwrap();
        g.set_leads(2, 0).unwrap();
        g
    }

    #[test]
    fn serialization_size_matches_output_length() {
        for g in [
            MoleculeGraph::new(),
            MoleculeGraph::linear(1),
            MoleculeGraph::circular(7),
            sample_graph(),
        ] {
            assert_eq!(g.serialize().len(), g.serialization_size());
        }
        assert_eq!(MoleculeGraph::new().serialization_size(), 8 + 8 + 8 + 16);
    }

    #[test]
    fn decoding_reproduces_the_graph() {
        let g = sample_graph();
        let decoded = MoleculeGraph::from_bytes(&g.serialize()).unwrap();
        assert_eq!(decoded, g);
        assert_eq!(decoded.leads(), (2, 0));
        assert_eq!(decoded.edge(1).unwrap().src, 2);
    }

    #[test]
    fn output_starts_with_header_and_version() {
        let bytes = MoleculeGraph::linear(2).serialize();
        assert_eq!(&bytes[..6], HEADER);
        assert_eq!(u16::from_le_bytes([bytes[6], bytes[7]]), VERSION);
        assert_eq!(u64::from_le_bytes(bytes[8..16].try_into().unwrap()), 2);
    }

    #[test]
    fn rejects_wrong_header_without_touching_target() {
        let mut target = sample_graph();
        let mut bytes = MoleculeGraph::linear(2).serialize();
        bytes[0] = b'X';
        assert_eq!(target.deserialize(&bytes), Err(FormatError::Header));
        assert_eq!(target, sample_graph());
    }

    #[test]
    fn rejects_unknown_version() {
        let mut bytes = MoleculeGraph::linear(2).serialize();
        bytes[6] = 9;
        assert_eq!(
            MoleculeGraph::from_bytes(&bytes),
            Err(FormatError::Version {
                found: 9,
                expected: VERSION
            })
        );
    }

    #[test]
    fn rejects_truncated_and_padded_buffers() {
        let bytes = sample_graph().serialize();
        for cut in [0, 3, 8, 20, bytes.len() - 1] {
            assert!(
                matches!(
                    MoleculeGraph::from_bytes(&bytes[..cut]),
                    Err(FormatError::Truncated { .. }) | Err(FormatError::Header)
                ),
                "cut at {cut}"
            );
        }
        let mut padded = bytes.clone();
        padded.push(0);
        assert_eq!(
            MoleculeGraph::from_bytes(&padded),
            Err(FormatError::TrailingBytes { extra: 1 })
        );
    }

    #[test]
    fn rejects_edges_pointing_outside_the_node_range() {
        let g = MoleculeGraph::linear(2);
        let mut bytes = g.serialize();
        let dest_offset = HEADER_SIZE + 8 + 2 * 48 + 8 + 8;
        bytes[dest_offset..dest_offset + 8].copy_from_slice(&5u64.to_le_bytes());
        assert_eq!(
            MoleculeGraph::from_bytes(&bytes),
            Err(FormatError::EdgeEndpoint {
                edge: 0,
                node: 5,
                count: 2
            })
        );
    }

    #[test]
    fn rejects_leads_outside_the_node_range() {
        let mut bytes = MoleculeGraph::linear(3).serialize();
        let len = bytes.len();
        bytes[len - 8..].copy_from_slice(&3u64.to_le_bytes());
        assert_eq!(
            MoleculeGraph::from_bytes(&bytes),
            Err(FormatError::Lead { lead: 3, count: 3 })
        );

        let mut empty = MoleculeGraph::new().serialize();
        let len = empty.len();
        empty[len - 16..len - 8].copy_from_slice(&1u64.to_le_bytes());
        assert!(matches!(
            MoleculeGraph::from_bytes(&empty),
            Err(FormatError::Lead { lead: 1, count: 0 })
        ));
    }

    #[test]
    fn binary_file_round_trips_through_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ring.mmb");
        let g = MoleculeGraph::circular(5);
        BinaryMoleculeFile::write_to_path(&g, &path).unwrap();
        assert_eq!(BinaryMoleculeFile::read_from_path(&path).unwrap(), g);
    }

    #[test]
    fn binary_file_reports_missing_file_as_io_error() {
        let dir = tempdir().unwrap();
        let result = BinaryMoleculeFile::read_from_path(dir.path().join("absent.mmb"));
        assert!(matches!(result, Err(BinaryFileError::Io(_))));
    }
}
