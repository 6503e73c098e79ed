pub mod error;
pub mod io;
pub mod models;
pub mod vector;
