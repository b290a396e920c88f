//! # docstash testkit
//!
//! Test utilities for docstash.
//!
//! This crate provides:
//! - Sample record types, including two versions of one type for schema
//!   evolution tests
//! - An instrumented file provider that counts and can fail writes
//! - Test fixtures for in-memory and temporary-directory databases
//! - Property-based generators of operation sequences with a reference model
//! - Stress testing utilities
//!
//! ## Usage
//!
//! ```rust,ignore
//! use docstash_testkit::prelude::*;
//!
//! #[test]
//! fn survives_restart() {
//!     let disk = TestDisk::new();
//!     let db = disk.open(player_catalog());
//!     let id = db.insert(&mut Player::named("ada")).unwrap();
//!     db.shutdown().unwrap();
//!
//!     let db = disk.open(player_catalog());
//!     assert!(db.any(|p: &Player| p.id == id.as_str()).unwrap());
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod counting;
pub mod fixtures;
pub mod generators;
pub mod records;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::counting::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::records::*;
    pub use crate::stress::*;
}

pub use counting::*;
pub use fixtures::*;
pub use generators::*;
pub use records::*;
pub use stress::*;
