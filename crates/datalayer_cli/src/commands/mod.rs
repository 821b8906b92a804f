//! CLI command implementations.

pub mod read;
pub mod units;
