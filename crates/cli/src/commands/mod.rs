//! CLI command implementations

pub mod reference;
pub mod run;
