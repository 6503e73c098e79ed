//! # Core Models Module
//!
//! Plain value types describing a device and its observable state.
//!
//! - [`region`] - The closed set of zones and boundary pairs every site and bond is classified into
//! - [`molecule`] - The directed graph describing the bridging molecule and its coefficients
//! - [`parameters`] - Lattice-level Hamiltonian coefficients and the per-region coupling table
//! - [`results`] - Cached magnetization and energy aggregates, split per region
//!
//! None of these types hold references into a lattice; snapshots handed out by the engine are
//! copies and can be kept indefinitely.

pub mod molecule;
pub mod parameters;
pub mod region;
pub mod results;
