//! CLI command implementations.

pub mod append;
pub mod dump;
pub mod purge;
pub mod readers;
pub mod serve;
pub mod status;
