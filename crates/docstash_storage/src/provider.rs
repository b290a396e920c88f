//! File provider trait definition.

use crate::error::StorageResult;

/// A directory/file store for docstash.
///
/// Providers are **plain text-file stores** addressed by `/`-separated paths
/// relative to the provider's root. docstash owns the layout
/// (`<root>/<collection>/definition.txt`, `<root>/<collection>/<id>`) and the
/// JSON inside the files; providers do not interpret either.
///
/// # Invariants
///
/// - `write_file` replaces the whole file atomically: a concurrent or later
///   `read_file` sees either the old contents or the new contents, never a mix
/// - `write_file` creates missing parent directories
/// - `read_file` and `list_*` on missing paths succeed with `None`/empty
/// - `delete_file` and `delete_directory` on missing paths are no-ops
/// - Providers must be `Send + Sync`; every method takes `&self`
///
/// # Implementors
///
/// - [`super::InMemoryProvider`] - For testing
/// - [`super::FsProvider`] - For persistent storage
pub trait FileProvider: Send + Sync {
    /// Returns whether `dir` exists and is a directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid or an I/O error occurs.
    fn directory_exists(&self, dir: &str) -> StorageResult<bool>;

    /// Creates `dir` and any missing parents.
    ///
    /// # Errors
    ///
    /// Returns an error if a path component is a file or an I/O error occurs.
    fn create_directory(&self, dir: &str) -> StorageResult<()>;

    /// Deletes `dir` and everything below it.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid or an I/O error occurs.
    fn delete_directory(&self, dir: &str) -> StorageResult<()>;

    /// Reads the full contents of `file`.
    ///
    /// Returns `None` if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid or an I/O error occurs.
    fn read_file(&self, file: &str) -> StorageResult<Option<String>>;

    /// Atomically replaces the contents of `file` with `contents`.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid, a parent is a file,
    /// or an I/O error occurs.
    fn write_file(&self, file: &str, contents: &str) -> StorageResult<()>;

    /// Deletes `file`.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid or an I/O error occurs.
    fn delete_file(&self, file: &str) -> StorageResult<()>;

    /// Lists the names (not paths) of the files directly inside `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid or an I/O error occurs.
    fn list_files(&self, dir: &str) -> StorageResult<Vec<String>>;

    /// Lists the names (not paths) of the directories directly inside `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid or an I/O error occurs.
    fn list_directories(&self, dir: &str) -> StorageResult<Vec<String>>;
}
