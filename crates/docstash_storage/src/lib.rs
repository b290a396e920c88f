//! # docstash storage
//!
//! File provider trait and implementations for docstash.
//!
//! This crate provides the lowest-level storage abstraction for docstash.
//! Providers are **plain directory/file stores** addressed by `/`-separated
//! relative paths. They know nothing about collections, definitions, or the
//! JSON documents written through them.
//!
//! ## Design Principles
//!
//! - Providers only create, read, replace, list and delete text files
//! - `write_file` replaces the previous contents atomically
//! - Must be `Send + Sync` for concurrent access
//! - docstash owns all layout and format interpretation
//!
//! ## Available Providers
//!
//! - [`InMemoryProvider`] - For testing and ephemeral databases
//! - [`FsProvider`] - For persistent storage using OS file APIs
//!
//! ## Example
//!
//! ```rust
//! use docstash_storage::{FileProvider, InMemoryProvider};
//!
//! let provider = InMemoryProvider::new();
//! provider.write_file("db/users/u1", "{}").unwrap();
//! assert_eq!(provider.read_file("db/users/u1").unwrap().as_deref(), Some("{}"));
//! assert_eq!(provider.list_directories("db").unwrap(), vec!["users".to_string()]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod fs;
mod memory;
mod path;
mod provider;

pub use error::{StorageError, StorageResult};
pub use fs::FsProvider;
pub use memory::InMemoryProvider;
pub use path::{join, normalize};
pub use provider::FileProvider;
