//! # binlog testkit
//!
//! Test utilities for binlog.
//!
//! This crate provides:
//! - [`TestLog`], a log in a temporary directory
//! - proptest strategies for positions, reader names, records and slices
//! - [`AckHarness`], which checks readers against an in-memory model
//! - end-to-end tests across the storage, codec and core crates
//!
//! ## Usage
//!
//! ```rust,ignore
//! use binlog_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_log() {
//!     with_temp_log(|log| {
//!         log.register_reader("r").unwrap();
//!         // ... test operations
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod integration;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
}

pub use fixtures::*;
pub use generators::*;
pub use integration::*;
