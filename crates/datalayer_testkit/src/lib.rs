//! # DataLayer Testkit
//!
//! Test utilities for the datalayer toolkit.
//!
//! This crate provides:
//! - Scratch dataset directories with unit files and controlled
//!   modification times
//! - Sample mappings and items
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust
//! use datalayer_testkit::prelude::*;
//!
//! let dir = TempDataDir::new();
//! dir.write_unit("people-1.jsonl", &people("p", 3), at_minute(1));
//! assert_eq!(dir.file_names(), ["people-1.jsonl"]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
