//! CLI subcommand implementations.

pub mod files;
pub mod serve;
