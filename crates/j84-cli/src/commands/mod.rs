//! Command implementations for j84

pub mod catalog;
pub mod check;
pub mod run;

pub use catalog::catalog;
pub use check::check_config;
pub use run::{run, RunOptions};
