//! # Engine Module
//!
//! The stateful simulation core: a [`Lattice`] holding every site's spin and flux, the cached
//! per-region aggregates, and the machinery that keeps them consistent.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Geometry, molecule topology, proposal strategy and seeding
//! - **Geometry** ([`geometry`]) - Device bounds, site classification and the bond table
//! - **Lattice** ([`lattice`]) - Site storage, accessors, coefficient changes and resets
//! - **Energy** ([`energy`]) - The Hamiltonian, its incremental single-site update and full recompute
//! - **Metropolis** ([`metropolis`]) - Proposals, acceptance and seeding of independent chains
//! - **Statistics** ([`stats`]) - Sample means and fluctuation estimators over the record
//! - **Iteration** ([`iter`]) - Bidirectional random-access traversal of occupied sites
//! - **Progress Monitoring** ([`progress`]) - Callbacks for long-running workflows
//! - **Error Handling** ([`error`]) - Engine-level error types
//!
//! A lattice never touches I/O or global state, so independent instances
//! are safe to drive from separate threads.

pub mod config;
pub mod energy;
pub mod error;
pub mod geometry;
pub mod iter;
pub mod lattice;
pub mod metropolis;
pub mod progress;
pub mod stats;

pub use lattice::Lattice;
