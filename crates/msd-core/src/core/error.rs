use thiserror::Error;

/// A coordinate, index or graph element outside the configured bounds.
///
/// Recoverable: callers applying a batch of per-site overrides are expected to skip the offending
/// entry and carry on.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RangeError {
    #[error("Coordinates ({x}, {y}, {z}) are outside the {width}x{height}x{depth} lattice")]
    Coordinates {
        x: usize,
        y: usize,
        z: usize,
        width: usize,
        height: usize,
        depth: usize,
    },

    #[error("Index {index} is outside the lattice of {len} positions")]
    Index { index: usize, len: usize },

    #[error("Position {index} is not occupied by any site")]
    Vacant { index: usize },

    #[error("Node {index} does not exist (molecule has {count} nodes)")]
    Node { index: usize, count: usize },

    #[error("Edge {index} does not exist (molecule has {count} edges)")]
    Edge { index: usize, count: usize },
}

/// A serialized molecule buffer that cannot be decoded. The target graph is never modified when
/// this is returned.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("Buffer does not begin with the molecule header")]
    Header,

    #[error("Unsupported molecule format version {found} (expected {expected})")]
    Version { found: u16, expected: u16 },

    #[error("Buffer truncated: needed {needed} bytes at offset {offset}, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("Buffer has {extra} unexpected trailing bytes")]
    TrailingBytes { extra: usize },

    #[error("Edge {edge} references node {node}, but only {count} nodes exist")]
    EdgeEndpoint { edge: usize, node: u64, count: usize },

    #[error("Lead node {lead} is out of range for {count} nodes")]
    Lead { lead: u64, count: usize },
}
