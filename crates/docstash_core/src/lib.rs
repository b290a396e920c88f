//! # docstash core
//!
//! Embedded write-behind document store.
//!
//! This crate provides:
//! - An in-memory cache of typed documents grouped into collections
//! - A property catalog describing how record types map to JSON fields
//! - An object pool of pre-constructed instances for cheap copies
//! - A paced write-behind scheduler (partial writes plus a periodic full write)
//! - Field-level merge-on-write, so stored fields survive schema changes
//!
//! Storage goes through a [`docstash_storage::FileProvider`]; each document
//! is one JSON file under `<root>/<collection>/<id>`.
//!
//! ## Example
//!
//! ```rust
//! use docstash_core::{Config, Database, PropertyCatalog, Record, Schema};
//! use docstash_storage::InMemoryProvider;
//! use std::sync::Arc;
//!
//! #[derive(Debug, Default)]
//! struct Player {
//!     id: String,
//!     name: String,
//! }
//!
//! impl Record for Player {
//!     fn schema() -> Schema<Self> {
//!         Schema::<Self>::new("Player")
//!             .collection("players")
//!             .id("id", |p| &p.id, |p| &mut p.id)
//!             .field("name", |p| &p.name, |p| &mut p.name)
//!     }
//! }
//!
//! let config = Config::default().ticker_enabled(false).pool_size(8);
//! let catalog = PropertyCatalog::new().with::<Player>().unwrap();
//! let db = Database::open_with_provider(config, Arc::new(InMemoryProvider::new()), catalog).unwrap();
//!
//! let mut player = Player { name: "ada".to_string(), ..Default::default() };
//! let id = db.insert(&mut player).unwrap();
//! assert_eq!(player.id, id.as_str());
//!
//! let found = db.select(|p: &Player| p.name == "ada").unwrap();
//! assert_eq!(found.len(), 1);
//! db.shutdown().unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod catalog;
mod config;
mod database;
mod document;
mod error;
mod id;
mod persist;
mod pool;
mod registry;
mod stats;
mod ticker;

pub use cache::{FlushOutcome, StaleSet, WriteBehindCache, WriteWindow};
pub use catalog::{
    FieldDescriptor, FieldInfo, Identifier, Payload, PropertyCatalog, Record, Schema, TypeSchema,
};
pub use config::Config;
pub use database::Database;
pub use document::{Document, DocumentKey};
pub use error::{CoreError, CoreResult};
pub use id::DocumentId;
pub use persist::{CollectionDefinition, MergeWriter, DEFINITION_FILE};
pub use pool::{ObjectPool, REPLENISH_INTERVAL};
pub use registry::{Collection, CollectionRegistry};
pub use stats::{DatabaseStats, StatsSnapshot};
pub use ticker::Ticker;
