//! # msdsim Core Library
//!
//! A Metropolis Monte Carlo engine for multilayer molecular spintronic devices (MSDs): two
//! ferromagnetic leads bridged by a molecule, where every lattice or molecule site carries a
//! classical magnetic moment split into a spin and a fluctuating flux component.
//!
//! ## Architectural Philosophy
//!
//! The library follows a three-layer architecture so that the physics, the stateful engine and
//! the user-facing procedures stay independent and individually testable.
//!
//! - **[`core`]: The Foundation.** Stateless value types: the vector algebra used for spins and
//!   fields, the Hamiltonian coefficient records (`Parameters`, `Results`, `Region`), the
//!   `MoleculeGraph` describing the bridge, and its binary and TOML persistence.
//!
//! - **[`engine`]: The Logic Core.** The stateful `Lattice`. It owns site storage, a bond table
//!   computed once from the device geometry, and the cached aggregates that the incremental
//!   Hamiltonian update keeps consistent with a full recomputation. The Metropolis driver and the
//!   fluctuation estimators live here as well.
//!
//! - **[`workflows`]: The Public API.** Complete procedures built on the engine: a burn-in plus
//!   measurement run with cooperative cancellation, and parallel sweeps over independent chains.

pub mod core;
pub mod engine;
pub mod workflows;
