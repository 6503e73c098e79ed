//! Run-file configuration: TOML sections on disk, built-in defaults, and the merge that turns
//! them plus CLI flags into engine configuration.

pub mod builder;
pub mod defaults;
pub mod file;
pub mod models;
