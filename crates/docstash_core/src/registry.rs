//! Collection registry.

use crate::catalog::TypeSchema;
use crate::document::Document;
use crate::error::{CoreError, CoreResult};
use crate::id::DocumentId;
use crate::persist::{CollectionDefinition, MergeWriter};
use crate::pool::ObjectPool;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// A named set of cached documents of one declared type.
pub struct Collection {
    name: String,
    schema: Arc<TypeSchema>,
    documents: DashMap<DocumentId, Arc<Document>>,
}

impl Collection {
    fn new(name: impl Into<String>, schema: Arc<TypeSchema>) -> Self {
        Self {
            name: name.into(),
            schema,
            documents: DashMap::new(),
        }
    }

    /// Returns the collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the declared document schema.
    pub fn schema(&self) -> &Arc<TypeSchema> {
        &self.schema
    }

    /// Returns the declared document type name.
    pub fn document_type(&self) -> &str {
        self.schema.type_name()
    }

    /// Checks that documents of `schema` may be stored here.
    ///
    /// # Errors
    ///
    /// Returns `TypeMismatch` for any other type.
    pub fn check_type(&self, schema: &TypeSchema) -> CoreResult<()> {
        if schema.rust_type_id() == self.schema.rust_type_id() {
            Ok(())
        } else {
            Err(CoreError::type_mismatch(
                &self.name,
                self.schema.type_name(),
                schema.type_name(),
            ))
        }
    }

    /// Inserts or replaces a document, returning the replaced one.
    ///
    /// A replaced document is marked superseded so that a pending or failed
    /// write of it can never overwrite the newer version.
    ///
    /// # Errors
    ///
    /// Returns `TypeMismatch` if the document's type is not the declared one.
    pub fn insert_document(&self, document: Arc<Document>) -> CoreResult<Option<Arc<Document>>> {
        self.check_type(document.schema())?;
        let replaced = self.documents.insert(document.id().clone(), document);
        if let Some(old) = &replaced {
            old.mark_superseded();
        }
        Ok(replaced)
    }

    /// Looks up a document.
    pub fn get(&self, id: &DocumentId) -> Option<Arc<Document>> {
        self.documents.get(id).map(|doc| Arc::clone(doc.value()))
    }

    /// Removes a document from the cache.
    pub fn remove(&self, id: &DocumentId) -> Option<Arc<Document>> {
        self.documents.remove(id).map(|(_, doc)| doc)
    }

    /// Returns a snapshot of the cached documents.
    pub fn documents(&self) -> Vec<Arc<Document>> {
        self.documents
            .iter()
            .map(|doc| Arc::clone(doc.value()))
            .collect()
    }

    /// Returns the number of cached documents.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Returns true if the collection holds no documents.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("document_type", &self.document_type())
            .field("documents", &self.len())
            .finish()
    }
}

/// Collection name → collection, created lazily on first insert.
///
/// Lookups never block. Creation is serialized by a registry-wide lock so
/// that a collection's pool entry, file lock and definition exist before it
/// becomes visible.
pub struct CollectionRegistry {
    collections: DashMap<String, Arc<Collection>>,
    creation: Mutex<()>,
    pool: Arc<ObjectPool>,
    writer: Arc<MergeWriter>,
    definition_write_attempts: u32,
}

impl CollectionRegistry {
    /// Creates an empty registry.
    pub fn new(pool: Arc<ObjectPool>, writer: Arc<MergeWriter>, definition_write_attempts: u32) -> Self {
        Self {
            collections: DashMap::new(),
            creation: Mutex::new(()),
            pool,
            writer,
            definition_write_attempts,
        }
    }

    /// Returns a collection if it exists.
    pub fn get(&self, name: &str) -> Option<Arc<Collection>> {
        self.collections.get(name).map(|c| Arc::clone(c.value()))
    }

    /// Returns the collection `name`, creating it for `schema` documents.
    ///
    /// # Errors
    ///
    /// Returns `TypeMismatch` if the collection exists with another type, and
    /// `Initialization` if the definition could not be written.
    pub fn get_or_create(&self, name: &str, schema: &Arc<TypeSchema>) -> CoreResult<Arc<Collection>> {
        if let Some(collection) = self.get(name) {
            collection.check_type(schema)?;
            return Ok(collection);
        }

        let _creating = self.creation.lock();
        if let Some(collection) = self.get(name) {
            collection.check_type(schema)?;
            return Ok(collection);
        }

        self.pool.register_type(schema)?;
        self.writer.collection_lock(name);
        self.write_definition(&CollectionDefinition::for_schema(name, schema))?;

        let collection = Arc::new(Collection::new(name, Arc::clone(schema)));
        self.collections
            .insert(name.to_string(), Arc::clone(&collection));

        info!(collection = name, document_type = schema.type_name(), "created collection");
        Ok(collection)
    }

    /// Publishes a collection whose definition is already stored.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if the collection already exists.
    pub fn attach(&self, name: &str, schema: &Arc<TypeSchema>) -> CoreResult<Arc<Collection>> {
        let _creating = self.creation.lock();
        if self.collections.contains_key(name) {
            return Err(CoreError::invalid_operation(format!(
                "collection {name} is already loaded"
            )));
        }

        self.pool.register_type(schema)?;
        self.writer.collection_lock(name);

        let collection = Arc::new(Collection::new(name, Arc::clone(schema)));
        self.collections
            .insert(name.to_string(), Arc::clone(&collection));
        Ok(collection)
    }

    fn write_definition(&self, definition: &CollectionDefinition) -> CoreResult<()> {
        let attempts = self.definition_write_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self.writer.save_definition(definition) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(collection = %definition.name, attempt, error = %e, "failed to write collection definition");
                    last_error = Some(e);
                }
            }
        }

        Err(CoreError::initialization(
            &definition.name,
            format!(
                "definition not written after {attempts} attempts: {}",
                last_error.map(|e| e.to_string()).unwrap_or_default()
            ),
        ))
    }

    /// Inserts already-built documents without marking them stale.
    ///
    /// Used when loading collections from disk. Returns how many were inserted.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if the collection does not exist, or
    /// `TypeMismatch` for a document of the wrong type.
    pub fn insert_documents(&self, name: &str, documents: Vec<Arc<Document>>) -> CoreResult<usize> {
        let collection = self
            .get(name)
            .ok_or_else(|| CoreError::invalid_operation(format!("collection {name} does not exist")))?;

        let count = documents.len();
        for document in documents {
            collection.insert_document(document)?;
        }
        Ok(count)
    }

    /// Returns every collection name, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.iter().map(|c| c.key().clone()).collect();
        names.sort();
        names
    }

    /// Removes a collection from memory.
    pub fn remove(&self, name: &str) -> Option<Arc<Collection>> {
        let _creating = self.creation.lock();
        self.collections.remove(name).map(|(_, c)| c)
    }

    /// Removes every collection from memory.
    pub fn clear(&self) {
        let _creating = self.creation.lock();
        self.collections.clear();
    }

    /// Returns the number of collections.
    pub fn len(&self) -> usize {
        self.collections.len()
    }

    /// Returns true if no collection exists.
    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Record, Schema};
    use crate::config::Config;
    use crate::stats::DatabaseStats;
    use docstash_storage::{FileProvider, InMemoryProvider, StorageError, StorageResult};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::thread;

    #[derive(Debug, Default, Clone)]
    struct Rock {
        id: String,
        mass: u32,
    }

    impl Record for Rock {
        fn schema() -> Schema<Self> {
            Schema::<Self>::new("Rock")
                .collection("rocks")
                .id("id", |r| &r.id, |r| &mut r.id)
                .field("mass", |r| &r.mass, |r| &mut r.mass)
        }
    }

    #[derive(Debug, Default, Clone)]
    struct Leaf {
        id: String,
    }

    impl Record for Leaf {
        fn schema() -> Schema<Self> {
            Schema::<Self>::new("Leaf")
                .collection("leaves")
                .id("id", |l| &l.id, |l| &mut l.id)
        }
    }

    /// Fails the first `failures` writes.
    struct FlakyProvider {
        inner: InMemoryProvider,
        failures: AtomicU32,
    }

    impl FileProvider for FlakyProvider {
        fn directory_exists(&self, dir: &str) -> StorageResult<bool> {
            self.inner.directory_exists(dir)
        }
        fn create_directory(&self, dir: &str) -> StorageResult<()> {
            self.inner.create_directory(dir)
        }
        fn delete_directory(&self, dir: &str) -> StorageResult<()> {
            self.inner.delete_directory(dir)
        }
        fn read_file(&self, file: &str) -> StorageResult<Option<String>> {
            self.inner.read_file(file)
        }
        fn write_file(&self, file: &str, contents: &str) -> StorageResult<()> {
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return Err(StorageError::Io(std::io::Error::other("disk hiccup")));
            }
            self.inner.write_file(file, contents)
        }
        fn delete_file(&self, file: &str) -> StorageResult<()> {
            self.inner.delete_file(file)
        }
        fn list_files(&self, dir: &str) -> StorageResult<Vec<String>> {
            self.inner.list_files(dir)
        }
        fn list_directories(&self, dir: &str) -> StorageResult<Vec<String>> {
            self.inner.list_directories(dir)
        }
    }

    fn registry_with(provider: Arc<dyn FileProvider>) -> (CollectionRegistry, Arc<ObjectPool>) {
        let config = Config::default();
        let pool = Arc::new(ObjectPool::new(4, Arc::new(DatabaseStats::new())));
        let writer = Arc::new(MergeWriter::new(provider, &config));
        (
            CollectionRegistry::new(Arc::clone(&pool), writer, config.definition_write_attempts),
            pool,
        )
    }

    fn rock_document(id: &str) -> Arc<Document> {
        Arc::new(
            Document::new(
                DocumentId::new(id),
                "rocks",
                Arc::new(TypeSchema::of::<Rock>()),
                Box::new(Rock {
                    id: id.to_string(),
                    mass: 1,
                }),
            )
            .unwrap(),
        )
    }

    #[test]
    fn get_or_create_registers_everything() {
        let provider = Arc::new(InMemoryProvider::new());
        let (registry, pool) = registry_with(provider.clone());
        let schema = Arc::new(TypeSchema::of::<Rock>());

        assert!(registry.get("rocks").is_none());
        let collection = registry.get_or_create("rocks", &schema).unwrap();

        assert_eq!(collection.document_type(), "Rock");
        assert!(pool.is_registered("Rock"));
        assert!(provider
            .read_file("docstash/rocks/definition.txt")
            .unwrap()
            .is_some());

        let again = registry.get_or_create("rocks", &schema).unwrap();
        assert!(Arc::ptr_eq(&collection, &again));
        assert_eq!(registry.names(), vec!["rocks"]);
    }

    #[test]
    fn get_or_create_rejects_other_types() {
        let (registry, _) = registry_with(Arc::new(InMemoryProvider::new()));
        registry
            .get_or_create("rocks", &Arc::new(TypeSchema::of::<Rock>()))
            .unwrap();

        let err = registry
            .get_or_create("rocks", &Arc::new(TypeSchema::of::<Leaf>()))
            .unwrap_err();
        assert!(matches!(err, CoreError::TypeMismatch { .. }));
    }

    #[test]
    fn definition_write_is_retried() {
        let provider = Arc::new(FlakyProvider {
            inner: InMemoryProvider::new(),
            failures: AtomicU32::new(2),
        });
        let (registry, _) = registry_with(provider);

        registry
            .get_or_create("rocks", &Arc::new(TypeSchema::of::<Rock>()))
            .unwrap();
    }

    #[test]
    fn exhausted_definition_writes_fail_initialization() {
        let provider = Arc::new(FlakyProvider {
            inner: InMemoryProvider::new(),
            failures: AtomicU32::new(3),
        });
        let (registry, _) = registry_with(provider);

        let err = registry
            .get_or_create("rocks", &Arc::new(TypeSchema::of::<Rock>()))
            .unwrap_err();
        assert!(matches!(err, CoreError::Initialization { .. }));
        assert!(registry.get("rocks").is_none());
    }

    #[test]
    fn concurrent_creation_yields_one_collection() {
        let (registry, _) = registry_with(Arc::new(InMemoryProvider::new()));
        let registry = Arc::new(registry);
        let schema = Arc::new(TypeSchema::of::<Rock>());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let schema = Arc::clone(&schema);
                thread::spawn(move || registry.get_or_create("rocks", &schema).unwrap())
            })
            .collect();

        let collections: Vec<Arc<Collection>> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();
        for collection in &collections {
            assert!(Arc::ptr_eq(collection, &collections[0]));
        }
    }

    #[test]
    fn insert_documents_and_replacement() {
        let (registry, _) = registry_with(Arc::new(InMemoryProvider::new()));
        registry
            .attach("rocks", &Arc::new(TypeSchema::of::<Rock>()))
            .unwrap();

        let inserted = registry
            .insert_documents("rocks", vec![rock_document("a"), rock_document("b")])
            .unwrap();
        assert_eq!(inserted, 2);

        let collection = registry.get("rocks").unwrap();
        let replaced = collection.insert_document(rock_document("a")).unwrap();
        assert!(replaced.unwrap().is_superseded());
        assert_eq!(collection.len(), 2);

        assert!(registry.insert_documents("missing", Vec::new()).is_err());
    }

    #[test]
    fn attach_twice_fails() {
        let (registry, _) = registry_with(Arc::new(InMemoryProvider::new()));
        let schema = Arc::new(TypeSchema::of::<Rock>());
        registry.attach("rocks", &schema).unwrap();
        assert!(registry.attach("rocks", &schema).is_err());
    }

    #[test]
    fn remove_and_clear() {
        let (registry, _) = registry_with(Arc::new(InMemoryProvider::new()));
        registry
            .get_or_create("rocks", &Arc::new(TypeSchema::of::<Rock>()))
            .unwrap();
        registry
            .get_or_create("leaves", &Arc::new(TypeSchema::of::<Leaf>()))
            .unwrap();
        assert_eq!(registry.len(), 2);

        assert!(registry.remove("rocks").is_some());
        assert_eq!(registry.names(), vec!["leaves"]);

        registry.clear();
        assert!(registry.is_empty());
    }
}
