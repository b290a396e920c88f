//! Instrumented file provider.
//!
//! Wraps an [`InMemoryProvider`], counting writes per path. Writes can be
//! slowed down to widen race windows, and made to fail for paths under a
//! prefix.

use docstash_storage::{FileProvider, InMemoryProvider, StorageError, StorageResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

/// An in-memory provider that records every write.
#[derive(Debug, Default)]
pub struct CountingProvider {
    inner: InMemoryProvider,
    writes: Mutex<HashMap<String, usize>>,
    deletes: Mutex<HashMap<String, usize>>,
    failing_prefix: Mutex<Option<String>>,
    write_delay_micros: AtomicU64,
}

impl CountingProvider {
    /// Creates an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns how many times `path` was written.
    pub fn writes_to(&self, path: &str) -> usize {
        self.writes.lock().get(path).copied().unwrap_or(0)
    }

    /// Returns how many times `path` was deleted.
    pub fn deletes_of(&self, path: &str) -> usize {
        self.deletes.lock().get(path).copied().unwrap_or(0)
    }

    /// Returns the total number of successful writes.
    pub fn total_writes(&self) -> usize {
        self.writes.lock().values().sum()
    }

    /// Returns the number of successful writes to paths under `prefix`.
    pub fn writes_under(&self, prefix: &str) -> usize {
        self.writes
            .lock()
            .iter()
            .filter(|(path, _)| path.starts_with(prefix))
            .map(|(_, count)| count)
            .sum()
    }

    /// Forgets every recorded write and delete.
    pub fn reset_counts(&self) {
        self.writes.lock().clear();
        self.deletes.lock().clear();
    }

    /// Makes writes to paths under `prefix` fail until cleared.
    pub fn fail_writes_under(&self, prefix: Option<&str>) {
        *self.failing_prefix.lock() = prefix.map(str::to_string);
    }

    /// Sleeps this long inside every write.
    pub fn set_write_delay(&self, delay: Duration) {
        let micros = u64::try_from(delay.as_micros()).unwrap_or(u64::MAX);
        self.write_delay_micros.store(micros, Ordering::Relaxed);
    }

    /// Returns the wrapped provider.
    pub fn inner(&self) -> &InMemoryProvider {
        &self.inner
    }
}

impl FileProvider for CountingProvider {
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
        if let Some(prefix) = self.failing_prefix.lock().as_deref() {
            if file.starts_with(prefix) {
                return Err(StorageError::Io(io::Error::other(format!(
                    "injected failure writing {file}"
                ))));
            }
        }

        let delay = self.write_delay_micros.load(Ordering::Relaxed);
        if delay > 0 {
            thread::sleep(Duration::from_micros(delay));
        }

        self.inner.write_file(file, contents)?;
        *self.writes.lock().entry(file.to_string()).or_insert(0) += 1;
        Ok(())
    }

    fn delete_file(&self, file: &str) -> StorageResult<()> {
        self.inner.delete_file(file)?;
        *self.deletes.lock().entry(file.to_string()).or_insert(0) += 1;
        Ok(())
    }

    fn list_files(&self, dir: &str) -> StorageResult<Vec<String>> {
        self.inner.list_files(dir)
    }

    fn list_directories(&self, dir: &str) -> StorageResult<Vec<String>> {
        self.inner.list_directories(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_writes_per_path() {
        let provider = CountingProvider::new();
        provider.write_file("db/a/1", "{}").unwrap();
        provider.write_file("db/a/1", "{}").unwrap();
        provider.write_file("db/b/2", "{}").unwrap();

        assert_eq!(provider.writes_to("db/a/1"), 2);
        assert_eq!(provider.writes_to("db/b/2"), 1);
        assert_eq!(provider.writes_under("db/a/"), 2);
        assert_eq!(provider.total_writes(), 3);

        provider.reset_counts();
        assert_eq!(provider.total_writes(), 0);
    }

    #[test]
    fn injected_failures() {
        let provider = CountingProvider::new();
        provider.fail_writes_under(Some("db/a/"));

        assert!(provider.write_file("db/a/1", "{}").is_err());
        assert!(provider.write_file("db/b/1", "{}").is_ok());
        assert_eq!(provider.writes_to("db/a/1"), 0);

        provider.fail_writes_under(None);
        assert!(provider.write_file("db/a/1", "{}").is_ok());
        assert_eq!(provider.read_file("db/a/1").unwrap().as_deref(), Some("{}"));
    }
}
