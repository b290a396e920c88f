//! Test fixtures and database helpers.
//!
//! Provides convenience functions for setting up test databases, and a
//! shared in-memory "disk" that outlives the databases opened over it so
//! that tests can restart (or crash) a database and look at what survived.

use crate::counting::CountingProvider;
use docstash_core::{Config, Database, PropertyCatalog};
use docstash_storage::FileProvider;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Configuration used by the fixtures: no background ticker, no banners and
/// a small pool, so tests decide when writes happen.
pub fn test_config() -> Config {
    Config::default()
        .ticker_enabled(false)
        .startup_messages(false)
        .pool_size(16)
}

/// A shared in-memory disk.
#[derive(Debug, Clone, Default)]
pub struct TestDisk {
    provider: Arc<CountingProvider>,
}

impl TestDisk {
    /// Creates an empty disk.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the instrumented provider.
    pub fn provider(&self) -> &Arc<CountingProvider> {
        &self.provider
    }

    /// Opens a database over this disk with [`test_config`].
    pub fn open(&self, catalog: PropertyCatalog) -> Database {
        self.open_with(test_config(), catalog)
    }

    /// Opens a database over this disk.
    pub fn open_with(&self, config: Config, catalog: PropertyCatalog) -> Database {
        Database::open_with_provider(config, self.provider.clone(), catalog)
            .expect("Failed to open database")
    }

    /// Path of a document file under the default root.
    pub fn document_path(collection: &str, id: &str) -> String {
        format!("{}/{collection}/{id}", test_config().root_name)
    }

    /// Reads and parses a stored document.
    pub fn read_json(&self, collection: &str, id: &str) -> Option<Value> {
        self.provider
            .read_file(&Self::document_path(collection, id))
            .expect("Failed to read document")
            .map(|text| serde_json::from_str(&text).expect("Stored document is not JSON"))
    }

    /// Stores a raw document, bypassing the database.
    pub fn write_json(&self, collection: &str, id: &str, value: &Value) {
        let text = serde_json::to_string_pretty(value).expect("Failed to encode document");
        self.provider
            .write_file(&Self::document_path(collection, id), &text)
            .expect("Failed to write document");
    }

    /// Returns whether a document file exists.
    pub fn has_document(&self, collection: &str, id: &str) -> bool {
        self.read_json(collection, id).is_some()
    }
}

/// Abandons a database without shutting it down.
///
/// Nothing pending is written and the database's memory is leaked, like a
/// process dying. Only use this on databases opened without the background
/// ticker.
pub fn crash(db: Database) {
    std::mem::forget(db);
}

/// A test database with automatic cleanup.
pub struct TestDatabase {
    /// The database instance.
    pub db: Database,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestDatabase {
    /// Creates a new in-memory test database.
    pub fn memory(catalog: PropertyCatalog) -> Self {
        Self {
            db: TestDisk::new().open(catalog),
            _temp_dir: None,
        }
    }

    /// Creates a new database in a temporary directory.
    pub fn file(catalog: PropertyCatalog) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db = Database::open_with_config(temp_dir.path(), test_config(), catalog)
            .expect("Failed to open file database");

        Self {
            db,
            _temp_dir: Some(temp_dir),
        }
    }

    /// Returns the database directory if file-based, None if in-memory.
    pub fn path(&self) -> Option<PathBuf> {
        self._temp_dir.as_ref().map(|d| d.path().to_path_buf())
    }

    /// Shuts the database down and opens the same directory again.
    ///
    /// # Panics
    ///
    /// Panics for in-memory databases.
    pub fn reopen(self, catalog: PropertyCatalog) -> Self {
        let Self { db, _temp_dir: temp_dir } = self;
        let temp_dir = temp_dir.expect("Only file databases can be reopened");

        db.shutdown().expect("Failed to shut down");
        drop(db);

        let db = Database::open_with_config(temp_dir.path(), test_config(), catalog)
            .expect("Failed to reopen file database");
        Self {
            db,
            _temp_dir: Some(temp_dir),
        }
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// Runs a test with a temporary in-memory database.
///
/// # Example
///
/// ```rust,ignore
/// use docstash_testkit::{player_catalog, with_temp_db, Player};
///
/// #[test]
/// fn my_test() {
///     with_temp_db(player_catalog(), |db| {
///         db.insert(&mut Player::named("ada")).unwrap();
///     });
/// }
/// ```
pub fn with_temp_db<F, R>(catalog: PropertyCatalog, f: F) -> R
where
    F: FnOnce(&Database) -> R,
{
    let test_db = TestDatabase::memory(catalog);
    f(&test_db.db)
}

/// Runs a test with a database in a temporary directory.
pub fn with_file_db<F, R>(catalog: PropertyCatalog, f: F) -> R
where
    F: FnOnce(&Database, &Path) -> R,
{
    let test_db = TestDatabase::file(catalog);
    let path = test_db.path().expect("File database should have a path");
    f(&test_db.db, &path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{player_catalog, Player};

    #[test]
    fn disk_survives_restart() {
        let disk = TestDisk::new();
        let db = disk.open(player_catalog());
        let id = db.insert(&mut Player::named("ada")).unwrap();
        db.shutdown().unwrap();

        assert!(disk.has_document("players", id.as_str()));
        let db = disk.open(player_catalog());
        assert_eq!(db.count::<Player>().unwrap(), 1);
    }

    #[test]
    fn file_database_reopens() {
        let test_db = TestDatabase::file(player_catalog());
        let id = test_db.insert(&mut Player::named("ada")).unwrap();

        let test_db = test_db.reopen(player_catalog());
        let found = test_db.select(|p: &Player| p.id == id.as_str()).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "ada");
    }

    #[test]
    fn with_file_db_exposes_the_directory() {
        with_file_db(player_catalog(), |db, path| {
            db.insert(&mut Player::named("ada")).unwrap();
            db.force_full_write().unwrap();
            assert!(path.join("docstash").join("players").is_dir());
        });
    }
}
