//! Subcommand implementations

pub mod devices;
pub mod record;
