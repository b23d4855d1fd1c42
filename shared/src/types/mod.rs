//! Telemetry record and export schema definitions

pub mod sample;
pub mod schema;
