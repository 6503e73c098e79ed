pub mod molecule;
pub mod run;
pub mod sweep;
pub mod worker;
