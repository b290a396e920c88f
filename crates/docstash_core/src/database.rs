//! Database facade and startup loading.

use crate::cache::{FlushOutcome, WriteBehindCache};
use crate::catalog::{Payload, PropertyCatalog, Record, TypeSchema};
use crate::config::Config;
use crate::document::Document;
use crate::error::{CoreError, CoreResult};
use crate::id::DocumentId;
use crate::persist::MergeWriter;
use crate::pool::ObjectPool;
use crate::registry::{Collection, CollectionRegistry};
use crate::stats::{DatabaseStats, StatsSnapshot};
use crate::ticker::Ticker;
use docstash_storage::{FileProvider, FsProvider, InMemoryProvider};
use parking_lot::{Mutex, RwLock};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// The main database handle.
///
/// `Database` keeps every document in memory and writes changes behind the
/// caller's back:
/// - Inserts copy the caller's value into the cache and mark it stale
/// - Selects scan the cache and hand out copies (or shared read-only handles)
/// - A background ticker writes stale documents in paced partial writes and
///   a periodic full write
/// - Writes merge field-by-field into the stored JSON, so fields the current
///   type no longer declares survive
///
/// # Opening a Database
///
/// Register every record type before opening, so that stored collections of
/// that type can be loaded:
///
/// ```rust,ignore
/// use docstash_core::{Database, PropertyCatalog};
/// use std::path::Path;
///
/// let catalog = PropertyCatalog::new().with::<Player>()?;
/// let db = Database::open(Path::new("saves"), catalog)?;
///
/// let mut player = Player { name: "ada".into(), ..Default::default() };
/// let id = db.insert(&mut player)?;
///
/// let found = db.select(|p: &Player| p.name == "ada")?;
/// assert_eq!(found.len(), 1);
///
/// // Writes everything still pending
/// db.shutdown()?;
/// ```
///
/// # In-Memory Databases
///
/// For testing, use `Database::open_in_memory()`:
///
/// ```rust,ignore
/// let db = Database::open_in_memory(PropertyCatalog::new())?;
/// ```
pub struct Database {
    /// Configuration.
    config: Config,
    /// Record type metadata.
    catalog: Arc<PropertyCatalog>,
    /// Operation counters.
    stats: Arc<DatabaseStats>,
    /// Pre-constructed instances per type.
    pool: Arc<ObjectPool>,
    /// File access.
    writer: Arc<MergeWriter>,
    /// Cached collections.
    registry: CollectionRegistry,
    /// Stale set and flush scheduler.
    cache: Arc<WriteBehindCache>,
    /// Background threads, if running.
    ticker: Mutex<Option<Ticker>>,
    /// Whether the database is open.
    is_open: RwLock<bool>,
}

impl Database {
    /// Opens a database stored under a directory.
    ///
    /// The directory is created if missing and locked against other
    /// processes for as long as the database is open.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// use docstash_core::{Database, PropertyCatalog};
    /// use std::path::Path;
    ///
    /// let db = Database::open(Path::new("saves"), PropertyCatalog::new())?;
    /// ```
    pub fn open(path: &Path, catalog: PropertyCatalog) -> CoreResult<Self> {
        Self::open_with_config(path, Config::default(), catalog)
    }

    /// Opens a database stored under a directory with custom configuration.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// use docstash_core::{Config, Database, PropertyCatalog};
    /// use std::time::Duration;
    ///
    /// let config = Config::default()
    ///     .flush_interval(Duration::from_secs(5))
    ///     .partial_writes_per_second(4);
    ///
    /// let db = Database::open_with_config(Path::new("saves"), config, catalog)?;
    /// ```
    pub fn open_with_config(path: &Path, config: Config, catalog: PropertyCatalog) -> CoreResult<Self> {
        let provider = FsProvider::open(path)?;
        Self::open_with_provider(config, Arc::new(provider), catalog)
    }

    /// Opens an in-memory database.
    ///
    /// Nothing survives the process. Useful for tests.
    pub fn open_in_memory(catalog: PropertyCatalog) -> CoreResult<Self> {
        Self::open_with_provider(Config::default(), Arc::new(InMemoryProvider::new()), catalog)
    }

    /// Opens a database over any file provider.
    ///
    /// Every collection found under the root folder is loaded. A collection
    /// that cannot be loaded (unknown document type, unreadable definition or
    /// document) is logged and skipped; the others stay available.
    ///
    /// # Errors
    ///
    /// Fails if the root folder cannot be listed or created, or if the
    /// background ticker cannot be started.
    pub fn open_with_provider(
        config: Config,
        provider: Arc<dyn FileProvider>,
        catalog: PropertyCatalog,
    ) -> CoreResult<Self> {
        if config.startup_messages {
            info!(root = %config.root_name, "starting docstash");
        }
        if !config.merge_on_write {
            warn!("merge on write is disabled; stored fields unknown to the current types will be dropped");
        }

        let stats = Arc::new(DatabaseStats::new());
        let pool = Arc::new(ObjectPool::new(config.pool_size, Arc::clone(&stats)));
        let writer = Arc::new(MergeWriter::new(provider, &config));
        let registry = CollectionRegistry::new(
            Arc::clone(&pool),
            Arc::clone(&writer),
            config.definition_write_attempts,
        );
        let cache = Arc::new(WriteBehindCache::new(
            Arc::clone(&writer),
            Arc::clone(&stats),
            &config,
        ));

        writer.ensure_root()?;

        let db = Self {
            config,
            catalog: Arc::new(catalog),
            stats,
            pool,
            writer,
            registry,
            cache,
            ticker: Mutex::new(None),
            is_open: RwLock::new(true),
        };

        db.load_collections()?;
        db.cache.start_window_at(Instant::now());

        if db.config.ticker_enabled {
            let ticker = Ticker::start(
                Arc::clone(&db.cache),
                Arc::clone(&db.pool),
                db.config.tick_interval,
            )?;
            *db.ticker.lock() = Some(ticker);
        }

        if db.config.startup_messages {
            info!(collections = db.registry.len(), "docstash ready");
        }
        Ok(db)
    }

    fn load_collections(&self) -> CoreResult<()> {
        for name in self.writer.list_collections()? {
            let started = Instant::now();
            match self.load_collection(&name) {
                Ok(count) => info!(
                    collection = %name,
                    documents = count,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "loaded collection"
                ),
                Err(e) => error!(collection = %name, error = %e, "failed to load collection; skipping it"),
            }
        }
        Ok(())
    }

    fn load_collection(&self, name: &str) -> CoreResult<usize> {
        let (_, schema) = self.writer.load_definition(name, &self.catalog)?;

        let documents = self
            .writer
            .load_all(name, &schema)?
            .into_iter()
            .map(|(id, payload)| Document::new(id, name, Arc::clone(&schema), payload).map(Arc::new))
            .collect::<CoreResult<Vec<_>>>()?;

        self.registry.attach(name, &schema)?;
        self.registry.insert_documents(name, documents)
    }

    // ========================================================================
    // Inserts
    // ========================================================================

    /// Inserts a record into its type's collection.
    ///
    /// The cache stores a copy; later changes to `record` are not seen until
    /// it is inserted again. If the identifier is unset, a new one is
    /// generated and written back into `record`. Inserting an id that
    /// already exists replaces that document.
    ///
    /// # Errors
    ///
    /// Returns `NotACollectionType` or `MissingIdentifier` if `T` cannot be
    /// stored, and `DatabaseClosed` after shutdown.
    pub fn insert<T: Record>(&self, record: &mut T) -> CoreResult<DocumentId> {
        self.insert_record(None, record)
    }

    /// Inserts a record into a named collection instead of its type's
    /// default one.
    pub fn insert_into<T: Record>(&self, collection: &str, record: &mut T) -> CoreResult<DocumentId> {
        self.insert_record(Some(collection), record)
    }

    /// Inserts several records, returning their ids in order.
    ///
    /// Stops at the first failure; records before it stay inserted.
    pub fn insert_many<T: Record>(&self, records: &mut [T]) -> CoreResult<Vec<DocumentId>> {
        records
            .iter_mut()
            .map(|record| self.insert_record(None, record))
            .collect()
    }

    fn insert_record<T: Record>(&self, collection: Option<&str>, record: &mut T) -> CoreResult<DocumentId> {
        self.ensure_open()?;

        let schema = self.catalog.schema_of::<T>()?;
        let (collection_name, id) = Document::prepare(&schema, collection, record)?;
        let collection = self.registry.get_or_create(&collection_name, &schema)?;

        let data = self.pool.clone_object(&*record, schema.type_name())?;
        let document = Arc::new(Document::new(id.clone(), collection_name, schema, data)?);

        collection.insert_document(Arc::clone(&document))?;
        self.cache.mark_stale(document);
        self.stats.record_insert();
        Ok(id)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Returns copies of every `T` matching `predicate`.
    ///
    /// Copies come from the object pool; mutating them does not touch the
    /// cache. A collection that does not exist yet yields no results.
    pub fn select<T: Record>(&self, predicate: impl Fn(&T) -> bool) -> CoreResult<Vec<T>> {
        let (schema, collection) = self.default_collection::<T>()?;
        self.copy_matching(&schema, collection.as_deref(), &predicate)
    }

    /// Like [`Database::select`], over a named collection.
    pub fn select_in<T: Record>(
        &self,
        collection: &str,
        predicate: impl Fn(&T) -> bool,
    ) -> CoreResult<Vec<T>> {
        self.ensure_open()?;
        let schema = self.catalog.schema_of::<T>()?;
        self.copy_matching(&schema, self.registry.get(collection).as_deref(), &predicate)
    }

    /// Returns a copy of the first `T` matching `predicate`.
    pub fn select_one<T: Record>(&self, predicate: impl Fn(&T) -> bool) -> CoreResult<Option<T>> {
        let (schema, collection) = self.default_collection::<T>()?;
        self.stats.record_select();

        let Some(collection) = collection else {
            return Ok(None);
        };
        let found = collection
            .documents()
            .into_iter()
            .find(|doc| doc.downcast_ref::<T>().is_some_and(|record| predicate(record)));

        found.map(|doc| self.copy_out(&schema, &doc)).transpose()
    }

    /// Returns shared read-only handles to every `T` matching `predicate`.
    ///
    /// Nothing is copied. A handle keeps showing the version it was taken
    /// from, even if the document is replaced or deleted afterwards.
    pub fn select_refs<T: Record>(&self, predicate: impl Fn(&T) -> bool) -> CoreResult<Vec<Arc<T>>> {
        let (_, collection) = self.default_collection::<T>()?;
        self.stats.record_select();

        let Some(collection) = collection else {
            return Ok(Vec::new());
        };
        Ok(collection
            .documents()
            .iter()
            .filter_map(|doc| doc.shared::<T>())
            .filter(|record| predicate(record))
            .collect())
    }

    /// Returns whether any `T` matches `predicate`.
    pub fn any<T: Record>(&self, predicate: impl Fn(&T) -> bool) -> CoreResult<bool> {
        let (_, collection) = self.default_collection::<T>()?;
        self.stats.record_select();

        Ok(collection.is_some_and(|collection| {
            collection
                .documents()
                .iter()
                .any(|doc| doc.downcast_ref::<T>().is_some_and(|record| predicate(record)))
        }))
    }

    /// Returns how many documents the collection of `T` holds.
    pub fn count<T: Record>(&self) -> CoreResult<usize> {
        let (_, collection) = self.default_collection::<T>()?;
        Ok(collection.map_or(0, |collection| collection.len()))
    }

    fn default_collection<T: Record>(&self) -> CoreResult<(Arc<TypeSchema>, Option<Arc<Collection>>)> {
        self.ensure_open()?;
        let schema = self.catalog.schema_of::<T>()?;
        let name = schema
            .collection()
            .ok_or_else(|| CoreError::not_a_collection_type(schema.type_name()))?;
        let collection = self.registry.get(name);
        Ok((schema, collection))
    }

    fn copy_matching<T: Record>(
        &self,
        schema: &TypeSchema,
        collection: Option<&Collection>,
        predicate: &impl Fn(&T) -> bool,
    ) -> CoreResult<Vec<T>> {
        self.stats.record_select();

        let Some(collection) = collection else {
            return Ok(Vec::new());
        };

        let mut results = Vec::new();
        for doc in collection.documents() {
            if doc.downcast_ref::<T>().is_some_and(|record| predicate(record)) {
                results.push(self.copy_out(schema, &doc)?);
            }
        }
        Ok(results)
    }

    fn copy_out<T: Record>(&self, schema: &TypeSchema, document: &Document) -> CoreResult<T> {
        let copy = self.pool.clone_object(document.data(), schema.type_name())?;
        into_record(copy, document.collection(), schema)
    }

    // ========================================================================
    // Deletes
    // ========================================================================

    /// Deletes every `T` matching `predicate`, returning how many were
    /// deleted.
    ///
    /// Deleted documents leave the cache and the stale set, and their files
    /// are removed right away. A flush already running will not write them
    /// again.
    ///
    /// # Errors
    ///
    /// Propagates storage errors from removing files.
    pub fn delete<T: Record>(&self, predicate: impl Fn(&T) -> bool) -> CoreResult<usize> {
        let (_, collection) = self.default_collection::<T>()?;
        let Some(collection) = collection else {
            return Ok(0);
        };

        let victims: Vec<DocumentId> = collection
            .documents()
            .iter()
            .filter(|doc| doc.downcast_ref::<T>().is_some_and(|record| predicate(record)))
            .map(|doc| doc.id().clone())
            .collect();

        let mut deleted = 0;
        for id in victims {
            let Some(document) = collection.remove(&id) else {
                continue;
            };
            document.mark_deleted();
            self.cache.unmark(&document.key());
            self.writer.delete(collection.name(), &id)?;
            deleted += 1;
        }

        self.stats.record_deletes(deleted as u64);
        Ok(deleted)
    }

    /// Deletes every collection, in memory and on disk.
    ///
    /// Waits for a running flush to finish, then drops everything stale.
    ///
    /// # Errors
    ///
    /// Returns `LockTimeout` if a flush holds the write lock for too long,
    /// and propagates storage errors.
    pub fn delete_all_data(&self) -> CoreResult<()> {
        self.ensure_open()?;

        self.cache.exclusive(|| {
            for collection in self.registry.names() {
                if let Some(collection) = self.registry.get(&collection) {
                    for doc in collection.documents() {
                        doc.mark_deleted();
                    }
                }
            }
            self.registry.clear();
            self.writer.wipe()
        })??;

        warn!("deleted all data");
        Ok(())
    }

    // ========================================================================
    // Utilities
    // ========================================================================

    /// Copies every declared field from `source` into `target`.
    ///
    /// Used to refresh a caller's instance from a selected copy without
    /// replacing it.
    pub fn copy_saved_data<T: Record>(&self, source: &T, target: &mut T) -> CoreResult<()> {
        let schema = self.catalog.schema_of::<T>()?;
        schema.copy_fields(source, target)
    }

    /// Writes every stale document now, returning how many were written.
    ///
    /// # Errors
    ///
    /// Returns `LockTimeout` if a running flush holds the write lock for
    /// longer than the configured timeout.
    pub fn force_full_write(&self) -> CoreResult<usize> {
        self.ensure_open()?;
        self.cache.force_full_write()
    }

    /// Runs one scheduled flush tick on the calling thread.
    ///
    /// For databases opened without the background ticker.
    pub fn tick(&self) -> CoreResult<FlushOutcome> {
        self.ensure_open()?;
        self.pool.replenish_check();
        Ok(self.cache.tick())
    }

    /// Pauses or resumes scheduled flushes.
    pub fn set_flushing_enabled(&self, enabled: bool) {
        self.cache.set_enabled(enabled);
    }

    /// Returns how many documents wait to be written.
    #[must_use]
    pub fn pending_writes(&self) -> usize {
        self.cache.pending_count()
    }

    /// Returns the names of the loaded collections, sorted.
    #[must_use]
    pub fn collection_names(&self) -> Vec<String> {
        self.registry.names()
    }

    /// Returns the record type catalog.
    #[must_use]
    pub fn catalog(&self) -> &PropertyCatalog {
        &self.catalog
    }

    /// Returns the object pool backing selects.
    #[must_use]
    pub fn pool(&self) -> &ObjectPool {
        &self.pool
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns a snapshot of the operation counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Stops the ticker, writes everything stale and releases the cache.
    ///
    /// Calling this more than once is a no-op. Every other operation fails
    /// with `DatabaseClosed` afterwards.
    ///
    /// # Errors
    ///
    /// Returns the error of the final write, if it could not run. The
    /// database is closed either way.
    pub fn shutdown(&self) -> CoreResult<()> {
        let mut is_open = self.is_open.write();
        if !*is_open {
            return Ok(());
        }
        *is_open = false;

        if self.config.startup_messages {
            info!("shutting down docstash");
        }

        if let Some(mut ticker) = self.ticker.lock().take() {
            ticker.stop();
        }

        let result = self.cache.force_full_write();
        match &result {
            Ok(written) => info!(written, "final write complete"),
            Err(e) => error!(error = %e, pending = self.cache.pending_count(), "final write failed"),
        }

        self.registry.clear();
        self.pool.clear();
        self.cache.clear();

        if self.config.startup_messages {
            info!("docstash stopped");
        }
        result.map(|_| ())
    }

    /// Checks if the database is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        *self.is_open.read()
    }

    /// Ensures the database is open.
    fn ensure_open(&self) -> CoreResult<()> {
        if *self.is_open.read() {
            Ok(())
        } else {
            Err(CoreError::DatabaseClosed)
        }
    }
}

fn into_record<T: Record>(payload: Payload, collection: &str, schema: &TypeSchema) -> CoreResult<T> {
    payload
        .downcast::<T>()
        .map(|record| *record)
        .map_err(|_| CoreError::type_mismatch(collection, schema.type_name(), std::any::type_name::<T>()))
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("is_open", &self.is_open())
            .field("collections", &self.registry.len())
            .field("pending_writes", &self.pending_writes())
            .finish_non_exhaustive()
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}
