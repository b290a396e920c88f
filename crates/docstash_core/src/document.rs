//! Cached documents.

use crate::catalog::{Payload, TypeSchema};
use crate::error::{CoreError, CoreResult};
use crate::id::DocumentId;
use crate::persist::{unusable_document_name, unusable_name, MergeWriter};
use serde_json::{Map, Value};
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Identity of a document across collections.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentKey {
    /// Collection name.
    pub collection: String,
    /// Document id.
    pub id: DocumentId,
}

/// A payload owned by the cache, together with its identity.
///
/// Documents are immutable once built: an insert with an existing id builds
/// a new `Document` and replaces the old one, which becomes superseded. The
/// payload is a private copy never shared with the caller or with another
/// document; read-only handles to it may be given out.
pub struct Document {
    id: DocumentId,
    collection: String,
    schema: Arc<TypeSchema>,
    data: Arc<dyn Any + Send + Sync>,
    deleted: AtomicBool,
    superseded: AtomicBool,
}

impl Document {
    /// Validates a caller's payload before insertion and returns the target
    /// collection and the payload's id.
    ///
    /// The type must be a collection root with an identifier field. An unset
    /// identifier is generated and written back into `payload`; an assigned
    /// one is kept. `collection` overrides the type's default collection.
    ///
    /// Both the collection name and the id become file names, so each must
    /// be a single plain path component.
    ///
    /// # Errors
    ///
    /// Returns `NotACollectionType` or `MissingIdentifier` for unsuitable
    /// types, `InvalidCollectionName` or `InvalidDocumentId` for names that
    /// cannot be stored.
    pub fn prepare(
        schema: &TypeSchema,
        collection: Option<&str>,
        payload: &mut dyn Any,
    ) -> CoreResult<(String, DocumentId)> {
        let default_collection = schema
            .collection()
            .ok_or_else(|| CoreError::not_a_collection_type(schema.type_name()))?;
        let collection = collection.unwrap_or(default_collection).to_string();
        if let Some(reason) = unusable_name(&collection) {
            return Err(CoreError::invalid_collection_name(collection, reason));
        }

        if schema.identifier().is_none() {
            return Err(CoreError::missing_identifier(schema.type_name()));
        }

        let id = schema.assign_id(payload)?;
        if let Some(reason) = unusable_document_name(id.as_str()) {
            return Err(CoreError::invalid_document_id(id.as_str(), reason));
        }
        Ok((collection, id))
    }

    /// Wraps a payload the cache exclusively owns.
    ///
    /// # Errors
    ///
    /// Returns `TypeMismatch` if `data` is not an instance of `schema`.
    pub fn new(
        id: DocumentId,
        collection: impl Into<String>,
        schema: Arc<TypeSchema>,
        data: Payload,
    ) -> CoreResult<Self> {
        let collection = collection.into();
        if !schema.is_instance(data.as_ref()) {
            return Err(CoreError::type_mismatch(
                collection,
                schema.type_name(),
                "an unrelated payload",
            ));
        }

        Ok(Self {
            id,
            collection,
            schema,
            data: Arc::from(data),
            deleted: AtomicBool::new(false),
            superseded: AtomicBool::new(false),
        })
    }

    /// Returns the document id.
    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    /// Returns the collection name.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Returns the collection and id.
    pub fn key(&self) -> DocumentKey {
        DocumentKey {
            collection: self.collection.clone(),
            id: self.id.clone(),
        }
    }

    /// Returns the payload's schema.
    pub fn schema(&self) -> &Arc<TypeSchema> {
        &self.schema
    }

    /// Returns the stable type name of the payload.
    pub fn type_name(&self) -> &str {
        self.schema.type_name()
    }

    /// Returns the payload.
    pub fn data(&self) -> &(dyn Any + Send + Sync) {
        self.data.as_ref()
    }

    /// Returns the payload as `T`, if it is one.
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.data.downcast_ref::<T>()
    }

    /// Returns a shared read-only handle to the payload, if it is a `T`.
    pub fn shared<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.data).downcast::<T>().ok()
    }

    /// Encodes the payload's declared fields.
    ///
    /// # Errors
    ///
    /// Fails if a field value cannot be encoded.
    pub fn field_map(&self) -> CoreResult<Map<String, Value>> {
        self.schema.to_field_map(self.data.as_ref())
    }

    /// Returns whether the document was deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }

    /// Marks the document deleted; it will never be written again.
    pub fn mark_deleted(&self) {
        self.deleted.store(true, Ordering::Release);
    }

    /// Returns whether a newer version replaced this document.
    pub fn is_superseded(&self) -> bool {
        self.superseded.load(Ordering::Acquire)
    }

    /// Marks the document replaced by a newer version.
    pub fn mark_superseded(&self) {
        self.superseded.store(true, Ordering::Release);
    }

    /// Returns whether this version must not be written any more.
    pub fn is_retired(&self) -> bool {
        self.is_deleted() || self.is_superseded()
    }

    /// Writes the document through `writer`.
    ///
    /// Returns `false` if the document was retired and nothing was written.
    ///
    /// # Errors
    ///
    /// Propagates encoding and storage errors.
    pub fn persist(&self, writer: &MergeWriter) -> CoreResult<bool> {
        writer.save(self)
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("id", &self.id)
            .field("collection", &self.collection)
            .field("type", &self.schema.type_name())
            .field("deleted", &self.is_deleted())
            .field("superseded", &self.is_superseded())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Record, Schema};

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Note {
        id: String,
        text: String,
    }

    impl Record for Note {
        fn schema() -> Schema<Self> {
            Schema::<Self>::new("Note")
                .collection("notes")
                .id("id", |n| &n.id, |n| &mut n.id)
                .field("text", |n| &n.text, |n| &mut n.text)
        }
    }

    #[derive(Debug, Default)]
    struct Fragment {
        id: String,
    }

    impl Record for Fragment {
        fn schema() -> Schema<Self> {
            Schema::<Self>::new("Fragment").id("id", |f| &f.id, |f| &mut f.id)
        }
    }

    #[derive(Debug, Default)]
    struct Unkeyed {
        text: String,
    }

    impl Record for Unkeyed {
        fn schema() -> Schema<Self> {
            Schema::<Self>::new("Unkeyed")
                .collection("unkeyed")
                .field("text", |u| &u.text, |u| &mut u.text)
        }
    }

    #[test]
    fn prepare_generates_and_writes_back_id() {
        let schema = TypeSchema::of::<Note>();
        let mut note = Note::default();

        let (collection, id) = Document::prepare(&schema, None, &mut note).unwrap();
        assert_eq!(collection, "notes");
        assert!(!note.id.is_empty());
        assert_eq!(id.as_str(), note.id);
    }

    #[test]
    fn prepare_keeps_existing_id_and_honors_override() {
        let schema = TypeSchema::of::<Note>();
        let mut note = Note {
            id: "n1".to_string(),
            text: String::new(),
        };

        let (collection, id) = Document::prepare(&schema, Some("archive"), &mut note).unwrap();
        assert_eq!(collection, "archive");
        assert_eq!(id, DocumentId::new("n1"));
        assert_eq!(note.id, "n1");
    }

    #[test]
    fn prepare_rejects_non_collection_types() {
        let schema = TypeSchema::of::<Fragment>();
        let err = Document::prepare(&schema, Some("fragments"), &mut Fragment::default()).unwrap_err();
        assert!(matches!(err, CoreError::NotACollectionType { .. }));
    }

    #[test]
    fn prepare_rejects_types_without_identifier() {
        let schema = TypeSchema::of::<Unkeyed>();
        let err = Document::prepare(&schema, None, &mut Unkeyed::default()).unwrap_err();
        assert!(matches!(err, CoreError::MissingIdentifier { .. }));
    }

    #[test]
    fn prepare_rejects_ids_that_are_not_plain_file_names() {
        let schema = TypeSchema::of::<Note>();

        for id in ["definition.txt", "DEFINITION.TXT", "guild/bob", "a\\b", ".", "..", ".hidden", "tab\there"] {
            let mut note = Note {
                id: id.to_string(),
                text: String::new(),
            };
            let err = Document::prepare(&schema, None, &mut note).unwrap_err();
            assert!(matches!(err, CoreError::InvalidDocumentId { .. }), "{id:?}: {err}");
            assert!(err.is_programmer_error());
        }

        let mut dotted = Note {
            id: "v1.2".to_string(),
            text: String::new(),
        };
        assert!(Document::prepare(&schema, None, &mut dotted).is_ok());
    }

    #[test]
    fn prepare_rejects_unusable_collection_names() {
        let schema = TypeSchema::of::<Note>();

        for name in ["", "..", "a/b", "a\\b"] {
            let err = Document::prepare(&schema, Some(name), &mut Note::default()).unwrap_err();
            assert!(matches!(err, CoreError::InvalidCollectionName { .. }), "{name:?}: {err}");
        }
    }

    #[test]
    fn new_checks_payload_type() {
        let schema = Arc::new(TypeSchema::of::<Note>());
        let err = Document::new(
            DocumentId::new("x"),
            "notes",
            schema,
            Box::new(Fragment::default()),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::TypeMismatch { .. }));
    }

    #[test]
    fn deleted_flag() {
        let schema = Arc::new(TypeSchema::of::<Note>());
        let doc = Document::new(
            DocumentId::new("n1"),
            "notes",
            schema,
            Box::new(Note::default()),
        )
        .unwrap();

        assert!(!doc.is_retired());
        doc.mark_deleted();
        assert!(doc.is_deleted());
        assert!(doc.is_retired());
        assert!(!doc.is_superseded());
        assert_eq!(doc.key().collection, "notes");
        assert!(doc.downcast_ref::<Note>().is_some());
    }

    #[test]
    fn shared_handles_point_at_the_cached_payload() {
        let schema = Arc::new(TypeSchema::of::<Note>());
        let doc = Document::new(
            DocumentId::new("n1"),
            "notes",
            schema,
            Box::new(Note {
                id: "n1".to_string(),
                text: "hello".to_string(),
            }),
        )
        .unwrap();

        let handle = doc.shared::<Note>().unwrap();
        assert_eq!(handle.text, "hello");
        assert!(std::ptr::eq(&*handle, doc.downcast_ref::<Note>().unwrap()));
        assert!(doc.shared::<Fragment>().is_none());
    }
}
