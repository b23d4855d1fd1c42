//! Shared types and utilities for smitrace
//!
//! This crate contains the sample record, the column schema used for export,
//! and small time/duration helpers used by the sampler and the CLI.

pub mod types;
pub mod utils;

// Re-export commonly used types
pub use types::{sample::*, schema::*};
