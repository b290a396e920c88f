//! Persistence merge writer.
//!
//! Layout under the provider:
//!
//! ```text
//! <root>/<collection>/definition.txt   collection definition (JSON)
//! <root>/<collection>/<document-id>    one JSON object per document
//! ```
//!
//! With merging enabled a save never drops a stored field: fields the
//! current type no longer declares keep their stored value, so renaming or
//! removing a field in the application does not destroy old data.

use crate::catalog::{Payload, PropertyCatalog, TypeSchema};
use crate::config::Config;
use crate::document::Document;
use crate::error::{CoreError, CoreResult};
use crate::id::DocumentId;
use dashmap::DashMap;
use docstash_storage::{join, FileProvider};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

/// File name of a collection definition.
pub const DEFINITION_FILE: &str = "definition.txt";

/// Returns why `name` cannot be a single file or directory name under the
/// root, or `None` if it can.
///
/// Hidden names are rejected because providers never list them.
pub(crate) fn unusable_name(name: &str) -> Option<&'static str> {
    if name.is_empty() {
        Some("it is empty")
    } else if name.starts_with('.') {
        Some("it starts with '.'")
    } else if name.chars().any(|c| c == '/' || c == '\\') {
        Some("it contains a path separator")
    } else if name.chars().any(char::is_control) {
        Some("it contains control characters")
    } else {
        None
    }
}

/// Like [`unusable_name`], additionally rejecting the definition file name.
pub(crate) fn unusable_document_name(name: &str) -> Option<&'static str> {
    unusable_name(name).or_else(|| {
        name.eq_ignore_ascii_case(DEFINITION_FILE)
            .then_some("it is reserved for the collection definition")
    })
}

/// Stored metadata of a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionDefinition {
    /// Collection name; must match the directory name.
    pub name: String,
    /// Stable type name of the documents.
    pub document_type: String,
    /// Name of the identifier field.
    pub id_field: String,
}

impl CollectionDefinition {
    /// Builds the definition of a collection holding `schema` documents.
    pub fn for_schema(name: impl Into<String>, schema: &TypeSchema) -> Self {
        Self {
            name: name.into(),
            document_type: schema.type_name().to_string(),
            id_field: schema
                .identifier()
                .map(|field| field.name().to_string())
                .unwrap_or_default(),
        }
    }
}

/// Reads and writes documents and definitions through a file provider.
///
/// All file access for one collection is serialized by that collection's
/// lock, so a read-merge-write never interleaves with another write or a
/// delete of the same collection.
pub struct MergeWriter {
    provider: Arc<dyn FileProvider>,
    root: String,
    merge_on_write: bool,
    indent: bool,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl MergeWriter {
    /// Creates a writer rooted at `config.root_name`.
    pub fn new(provider: Arc<dyn FileProvider>, config: &Config) -> Self {
        Self {
            provider,
            root: config.root_name.clone(),
            merge_on_write: config.merge_on_write,
            indent: config.indent_json,
            locks: DashMap::new(),
        }
    }

    /// Returns the underlying provider.
    pub fn provider(&self) -> &Arc<dyn FileProvider> {
        &self.provider
    }

    /// Returns the root folder name.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Creates the root folder if it is missing.
    ///
    /// # Errors
    ///
    /// Propagates storage errors.
    pub fn ensure_root(&self) -> CoreResult<()> {
        if !self.provider.directory_exists(&self.root)? {
            self.provider.create_directory(&self.root)?;
        }
        Ok(())
    }

    /// Returns the lock serializing file access for `collection`, creating it
    /// if needed.
    pub fn collection_lock(&self, collection: &str) -> Arc<Mutex<()>> {
        Arc::clone(
            self.locks
                .entry(collection.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }

    fn collection_path(&self, collection: &str) -> String {
        join(&[self.root.as_str(), collection])
    }

    fn document_path(&self, collection: &str, id: &DocumentId) -> String {
        join(&[self.root.as_str(), collection, id.as_str()])
    }

    fn encode(&self, fields: &Map<String, Value>) -> CoreResult<String> {
        Ok(if self.indent {
            serde_json::to_string_pretty(fields)?
        } else {
            serde_json::to_string(fields)?
        })
    }

    /// Saves a document, merging with the stored version.
    ///
    /// Returns `false` without writing if the document was deleted or
    /// replaced by a newer version.
    ///
    /// # Errors
    ///
    /// Propagates encoding and storage errors.
    pub fn save(&self, document: &Document) -> CoreResult<bool> {
        if document.is_retired() {
            return Ok(false);
        }

        let current = document.field_map()?;
        let path = self.document_path(document.collection(), document.id());

        let lock = self.collection_lock(document.collection());
        let _guard = lock.lock();

        // A delete holds this lock while removing the file; checking again
        // here keeps a deleted document from being written back.
        if document.is_retired() {
            return Ok(false);
        }

        let fields = if self.merge_on_write {
            match self.provider.read_file(&path)? {
                Some(previous) => merge(document, &previous, current),
                None => current,
            }
        } else {
            current
        };

        self.provider.write_file(&path, &self.encode(&fields)?)?;
        Ok(true)
    }

    /// Deletes a document file.
    ///
    /// # Errors
    ///
    /// Propagates storage errors.
    pub fn delete(&self, collection: &str, id: &DocumentId) -> CoreResult<()> {
        let lock = self.collection_lock(collection);
        let _guard = lock.lock();
        self.provider
            .delete_file(&self.document_path(collection, id))?;
        Ok(())
    }

    /// Writes a collection definition.
    ///
    /// # Errors
    ///
    /// Propagates encoding and storage errors.
    pub fn save_definition(&self, definition: &CollectionDefinition) -> CoreResult<()> {
        let contents = if self.indent {
            serde_json::to_string_pretty(definition)?
        } else {
            serde_json::to_string(definition)?
        };

        let lock = self.collection_lock(&definition.name);
        let _guard = lock.lock();
        self.provider.write_file(
            &join(&[self.root.as_str(), definition.name.as_str(), DEFINITION_FILE]),
            &contents,
        )?;
        Ok(())
    }

    /// Reads a collection definition without validating it.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDefinition` if the file is not a valid definition.
    pub fn read_definition(&self, collection: &str) -> CoreResult<Option<CollectionDefinition>> {
        let path = join(&[self.root.as_str(), collection, DEFINITION_FILE]);
        let Some(contents) = self.provider.read_file(&path)? else {
            return Ok(None);
        };

        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|e| CoreError::invalid_definition(collection, e.to_string()))
    }

    /// Reads and validates a collection definition, resolving its type.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDefinition` if the definition is missing, malformed or
    /// names another collection, and `UnknownDocumentType` if the catalog
    /// cannot resolve the stored type.
    pub fn load_definition(
        &self,
        collection: &str,
        catalog: &PropertyCatalog,
    ) -> CoreResult<(CollectionDefinition, Arc<TypeSchema>)> {
        let definition = self
            .read_definition(collection)?
            .ok_or_else(|| CoreError::invalid_definition(collection, "definition.txt is missing"))?;

        if definition.name != collection {
            return Err(CoreError::invalid_definition(
                collection,
                format!("definition names collection {:?}", definition.name),
            ));
        }

        let schema = catalog
            .resolve(&definition.document_type)
            .ok_or_else(|| CoreError::unknown_document_type(collection, &definition.document_type))?;

        Ok((definition, schema))
    }

    /// Loads every document of a collection.
    ///
    /// # Errors
    ///
    /// Fails on the first unreadable document, and with `DocumentIdMismatch`
    /// if a file name differs from the id stored in the file.
    pub fn load_all(
        &self,
        collection: &str,
        schema: &TypeSchema,
    ) -> CoreResult<Vec<(DocumentId, Payload)>> {
        let lock = self.collection_lock(collection);
        let _guard = lock.lock();

        let dir = self.collection_path(collection);
        let mut documents = Vec::new();

        for file_name in self.provider.list_files(&dir)? {
            if file_name == DEFINITION_FILE {
                continue;
            }

            let Some(contents) = self.provider.read_file(&join(&[dir.as_str(), file_name.as_str()]))? else {
                continue;
            };

            let fields: Map<String, Value> = serde_json::from_str(&contents)?;
            let payload = schema.from_field_map(&fields)?;
            let id = schema.document_id(payload.as_ref())?.unwrap_or_else(|| DocumentId::new(""));

            if id.as_str() != file_name {
                return Err(CoreError::document_id_mismatch(collection, file_name, id.as_str()));
            }

            documents.push((id, payload));
        }

        debug!(collection, count = documents.len(), "loaded documents");
        Ok(documents)
    }

    /// Reads every document file of a collection as raw text, keyed by file
    /// name.
    ///
    /// # Errors
    ///
    /// Propagates storage errors.
    pub fn read_raw_documents(&self, collection: &str) -> CoreResult<Vec<(String, String)>> {
        let dir = self.collection_path(collection);
        let mut documents = Vec::new();

        for file_name in self.provider.list_files(&dir)? {
            if file_name == DEFINITION_FILE {
                continue;
            }
            if let Some(contents) = self.provider.read_file(&join(&[dir.as_str(), file_name.as_str()]))? {
                documents.push((file_name, contents));
            }
        }
        Ok(documents)
    }

    /// Lists the collection directories under the root.
    ///
    /// # Errors
    ///
    /// Propagates storage errors.
    pub fn list_collections(&self) -> CoreResult<Vec<String>> {
        Ok(self.provider.list_directories(&self.root)?)
    }

    /// Deletes a collection directory and everything in it.
    ///
    /// # Errors
    ///
    /// Propagates storage errors.
    pub fn delete_collection(&self, collection: &str) -> CoreResult<()> {
        let lock = self.collection_lock(collection);
        let _guard = lock.lock();
        self.provider
            .delete_directory(&self.collection_path(collection))?;
        Ok(())
    }

    /// Deletes every collection directory.
    ///
    /// The caller must hold the write-in-progress lock.
    ///
    /// # Errors
    ///
    /// Propagates storage errors.
    pub fn wipe(&self) -> CoreResult<()> {
        for collection in self.list_collections()? {
            self.delete_collection(&collection)?;
        }
        self.locks.clear();
        Ok(())
    }
}

/// Merges freshly encoded fields over a stored document.
fn merge(document: &Document, previous: &str, current: Map<String, Value>) -> Map<String, Value> {
    match serde_json::from_str::<Value>(previous) {
        Ok(Value::Object(mut merged)) => {
            merged.extend(current);
            merged
        }
        Ok(_) | Err(_) => {
            warn!(
                collection = document.collection(),
                id = %document.id(),
                "stored document is not a JSON object; overwriting it"
            );
            current
        }
    }
}
