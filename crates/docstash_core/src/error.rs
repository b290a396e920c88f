//! Error types for docstash core.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in docstash core operations.
///
/// Variants fall into three groups, see [`CoreError::is_programmer_error`],
/// [`CoreError::is_corruption`] and [`CoreError::is_transient`].
#[derive(Debug, Error)]
pub enum CoreError {
    /// File provider error.
    #[error("storage error: {0}")]
    Storage(#[from] docstash_storage::StorageError),

    /// I/O error outside the file provider.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON encoding or decoding error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The record type declares no identifier field.
    #[error("type {type_name} has no identifier field")]
    MissingIdentifier {
        /// Stable name of the record type.
        type_name: String,
    },

    /// The record type is not marked as a collection root.
    #[error("type {type_name} is not a collection type")]
    NotACollectionType {
        /// Stable name of the record type.
        type_name: String,
    },

    /// A payload does not match the collection's declared document type.
    #[error("collection {collection} holds {expected}, got {actual}")]
    TypeMismatch {
        /// Collection name.
        collection: String,
        /// Declared document type.
        expected: String,
        /// Type of the offending payload.
        actual: String,
    },

    /// The object pool has never seen this type.
    #[error("type {type_name} is not registered with the object pool")]
    UnregisteredType {
        /// Stable name of the record type.
        type_name: String,
    },

    /// Two different Rust types were registered under the same stable name.
    #[error("type name {type_name} is already registered to a different type")]
    ConflictingRegistration {
        /// The contested stable name.
        type_name: String,
    },

    /// A document id cannot be used as a file name.
    #[error("document id {id:?} is not usable as a file name: {reason}")]
    InvalidDocumentId {
        /// The rejected id.
        id: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// A collection name cannot be used as a directory name.
    #[error("collection name {name:?} is not usable as a directory name: {reason}")]
    InvalidCollectionName {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// A stored definition names a type the catalog cannot resolve.
    #[error("collection {collection} stores unknown document type {type_name}")]
    UnknownDocumentType {
        /// Collection name.
        collection: String,
        /// Type name found in the definition.
        type_name: String,
    },

    /// A document file's name does not match the id stored inside it.
    #[error(
        "document file {file_name} in collection {collection} contains id {id}; \
         rename or remove the file to repair the collection"
    )]
    DocumentIdMismatch {
        /// Collection name.
        collection: String,
        /// File name on disk.
        file_name: String,
        /// Identifier stored in the file.
        id: String,
    },

    /// A collection definition is missing or malformed.
    #[error("invalid definition for collection {collection}: {message}")]
    InvalidDefinition {
        /// Collection name.
        collection: String,
        /// Description of the problem.
        message: String,
    },

    /// A collection could not be initialized.
    #[error("failed to initialize collection {collection}: {message}")]
    Initialization {
        /// Collection name.
        collection: String,
        /// Description of the failure.
        message: String,
    },

    /// The write-in-progress lock could not be acquired in time.
    #[error("timed out after {timeout:?} waiting for the write lock")]
    LockTimeout {
        /// How long we waited.
        timeout: Duration,
    },

    /// Database is closed.
    #[error("database is closed")]
    DatabaseClosed,

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates a missing identifier error.
    pub fn missing_identifier(type_name: impl Into<String>) -> Self {
        Self::MissingIdentifier {
            type_name: type_name.into(),
        }
    }

    /// Creates a not-a-collection-type error.
    pub fn not_a_collection_type(type_name: impl Into<String>) -> Self {
        Self::NotACollectionType {
            type_name: type_name.into(),
        }
    }

    /// Creates a type mismatch error.
    pub fn type_mismatch(
        collection: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch {
            collection: collection.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Creates an unregistered type error.
    pub fn unregistered_type(type_name: impl Into<String>) -> Self {
        Self::UnregisteredType {
            type_name: type_name.into(),
        }
    }

    /// Creates a conflicting registration error.
    pub fn conflicting_registration(type_name: impl Into<String>) -> Self {
        Self::ConflictingRegistration {
            type_name: type_name.into(),
        }
    }

    /// Creates an invalid document id error.
    pub fn invalid_document_id(id: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidDocumentId {
            id: id.into(),
            reason,
        }
    }

    /// Creates an invalid collection name error.
    pub fn invalid_collection_name(name: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidCollectionName {
            name: name.into(),
            reason,
        }
    }

    /// Creates an unknown document type error.
    pub fn unknown_document_type(collection: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::UnknownDocumentType {
            collection: collection.into(),
            type_name: type_name.into(),
        }
    }

    /// Creates a document id mismatch error.
    pub fn document_id_mismatch(
        collection: impl Into<String>,
        file_name: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        Self::DocumentIdMismatch {
            collection: collection.into(),
            file_name: file_name.into(),
            id: id.into(),
        }
    }

    /// Creates an invalid definition error.
    pub fn invalid_definition(collection: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidDefinition {
            collection: collection.into(),
            message: message.into(),
        }
    }

    /// Creates an initialization error.
    pub fn initialization(collection: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Initialization {
            collection: collection.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns true for errors caused by incorrect use of the API.
    ///
    /// These are never retried.
    #[must_use]
    pub fn is_programmer_error(&self) -> bool {
        matches!(
            self,
            Self::MissingIdentifier { .. }
                | Self::NotACollectionType { .. }
                | Self::TypeMismatch { .. }
                | Self::UnregisteredType { .. }
                | Self::ConflictingRegistration { .. }
                | Self::InvalidDocumentId { .. }
                | Self::InvalidCollectionName { .. }
        )
    }

    /// Returns true for errors caused by inconsistent data on disk.
    ///
    /// These require manual repair.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::DocumentIdMismatch { .. }
                | Self::UnknownDocumentType { .. }
                | Self::InvalidDefinition { .. }
        )
    }

    /// Returns true for I/O and encoding failures that may succeed on retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Io(_) | Self::Json(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docstash_storage::StorageError;

    #[test]
    fn classification() {
        assert!(CoreError::missing_identifier("Player").is_programmer_error());
        assert!(CoreError::type_mismatch("players", "Player", "Item").is_programmer_error());
        assert!(!CoreError::unregistered_type("Player").is_corruption());
        assert!(CoreError::invalid_document_id("..", "it starts with '.'").is_programmer_error());
        assert!(CoreError::invalid_collection_name("a/b", "it contains a path separator").is_programmer_error());

        assert!(CoreError::document_id_mismatch("players", "a", "b").is_corruption());
        assert!(CoreError::unknown_document_type("players", "Ghost").is_corruption());
        assert!(!CoreError::invalid_definition("players", "empty").is_transient());

        let storage: CoreError = StorageError::ReadOnly.into();
        assert!(storage.is_transient());
        assert!(!storage.is_programmer_error());
    }

    #[test]
    fn messages_name_the_collection() {
        let err = CoreError::document_id_mismatch("players", "p1", "p2");
        let msg = err.to_string();
        assert!(msg.contains("players"));
        assert!(msg.contains("p1"));
        assert!(msg.contains("repair"));
    }
}
