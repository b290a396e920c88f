//! Filesystem provider for persistent storage.

use crate::error::{StorageError, StorageResult};
use crate::path::normalize;
use crate::provider::FileProvider;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Advisory lock file held for the provider's lifetime.
const LOCK_FILE: &str = "LOCK";
/// Suffix of the scratch file used for atomic replacement.
const TEMP_SUFFIX: &str = ".tmp";

/// A filesystem-backed file provider.
///
/// All paths are resolved below a base directory. Data survives process
/// restarts.
///
/// # Durability
///
/// `write_file` uses the write-then-rename pattern:
/// 1. Write to a hidden temporary file next to the target
/// 2. Sync the temporary file to disk
/// 3. Rename it over the target
/// 4. Fsync the parent directory so the rename is durable
///
/// Hidden files (names starting with `.`) are never listed, so a temporary
/// file left behind by a crash is invisible to docstash.
///
/// # Locking
///
/// [`FsProvider::open`] takes an exclusive advisory lock on `<base>/LOCK`
/// so two processes cannot write to the same database directory.
/// [`FsProvider::open_read_only`] takes no lock and rejects every write.
///
/// # Example
///
/// ```no_run
/// use docstash_storage::{FileProvider, FsProvider};
/// use std::path::Path;
///
/// let provider = FsProvider::open(Path::new("data")).unwrap();
/// provider.write_file("docstash/players/p1", "{\"id\":\"p1\"}").unwrap();
/// ```
#[derive(Debug)]
pub struct FsProvider {
    base: PathBuf,
    /// Lock file handle (held for exclusive access). `None` when read-only.
    _lock_file: Option<File>,
}

impl FsProvider {
    /// Opens or creates a provider rooted at `base`, taking the directory lock.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Locked`] if another process holds the lock, or
    /// an I/O error if the directory cannot be created.
    pub fn open(base: &Path) -> StorageResult<Self> {
        fs::create_dir_all(base)?;

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(base.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked);
        }

        Ok(Self {
            base: base.to_path_buf(),
            _lock_file: Some(lock_file),
        })
    }

    /// Opens an existing directory for inspection without locking it.
    ///
    /// Every mutating method returns [`StorageError::ReadOnly`].
    ///
    /// # Errors
    ///
    /// Returns an error if `base` is not an existing directory.
    pub fn open_read_only(base: &Path) -> StorageResult<Self> {
        if !base.is_dir() {
            return Err(StorageError::not_a_directory(base.display().to_string()));
        }

        Ok(Self {
            base: base.to_path_buf(),
            _lock_file: None,
        })
    }

    /// Returns the base directory.
    #[must_use]
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Returns whether this provider rejects writes.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self._lock_file.is_none()
    }

    fn resolve(&self, path: &str) -> StorageResult<PathBuf> {
        let parts = normalize(path)?;
        Ok(parts.iter().fold(self.base.clone(), |acc, part| acc.join(part)))
    }

    fn ensure_writable(&self) -> StorageResult<()> {
        if self.is_read_only() {
            Err(StorageError::ReadOnly)
        } else {
            Ok(())
        }
    }

    fn entries(&self, dir: &str, want_dirs: bool) -> StorageResult<Vec<String>> {
        let path = self.resolve(dir)?;

        let read_dir = match fs::read_dir(&path) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        for entry in read_dir {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || (path == self.base && name == LOCK_FILE) {
                continue;
            }
            if entry.file_type()?.is_dir() == want_dirs {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Syncs a directory so that entry creation, rename and removal are durable.
    ///
    /// NTFS journals metadata, so there is nothing to do on Windows.
    #[cfg(unix)]
    fn sync_directory(dir: &Path) -> StorageResult<()> {
        File::open(dir)?.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(_dir: &Path) -> StorageResult<()> {
        Ok(())
    }
}

impl FileProvider for FsProvider {
    fn directory_exists(&self, dir: &str) -> StorageResult<bool> {
        Ok(self.resolve(dir)?.is_dir())
    }

    fn create_directory(&self, dir: &str) -> StorageResult<()> {
        self.ensure_writable()?;
        let path = self.resolve(dir)?;
        if path.is_file() {
            return Err(StorageError::not_a_directory(dir));
        }
        fs::create_dir_all(path)?;
        Ok(())
    }

    fn delete_directory(&self, dir: &str) -> StorageResult<()> {
        self.ensure_writable()?;
        if normalize(dir)?.is_empty() {
            return Err(StorageError::invalid_path(dir));
        }

        match fs::remove_dir_all(self.resolve(dir)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn read_file(&self, file: &str) -> StorageResult<Option<String>> {
        if normalize(file)?.is_empty() {
            return Err(StorageError::invalid_path(file));
        }

        match fs::read_to_string(self.resolve(file)?) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_file(&self, file: &str, contents: &str) -> StorageResult<()> {
        self.ensure_writable()?;

        let target = self.resolve(file)?;
        let (Some(parent), Some(name)) = (target.parent(), target.file_name()) else {
            return Err(StorageError::invalid_path(file));
        };
        if target == self.base {
            return Err(StorageError::invalid_path(file));
        }

        fs::create_dir_all(parent)?;

        let temp = parent.join(format!(".{}{TEMP_SUFFIX}", name.to_string_lossy()));
        let mut handle = File::create(&temp)?;
        handle.write_all(contents.as_bytes())?;
        handle.sync_all()?;
        drop(handle);

        fs::rename(&temp, &target)?;
        Self::sync_directory(parent)?;

        Ok(())
    }

    fn delete_file(&self, file: &str) -> StorageResult<()> {
        self.ensure_writable()?;

        match fs::remove_file(self.resolve(file)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn list_files(&self, dir: &str) -> StorageResult<Vec<String>> {
        self.entries(dir, false)
    }

    fn list_directories(&self, dir: &str) -> StorageResult<Vec<String>> {
        self.entries(dir, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn fs_open_creates_base() {
        let temp = tempdir().unwrap();
        let base = temp.path().join("db");

        let provider = FsProvider::open(&base).unwrap();
        assert!(base.is_dir());
        assert_eq!(provider.base(), base);
        assert!(!provider.is_read_only());
    }

    #[test]
    fn fs_lock_prevents_second_open() {
        let temp = tempdir().unwrap();
        let _first = FsProvider::open(temp.path()).unwrap();

        let result = FsProvider::open(temp.path());
        assert!(matches!(result, Err(StorageError::Locked)));
    }

    #[test]
    fn fs_lock_released_on_drop() {
        let temp = tempdir().unwrap();
        {
            let _provider = FsProvider::open(temp.path()).unwrap();
        }
        let _again = FsProvider::open(temp.path()).unwrap();
    }

    #[test]
    fn fs_write_and_read() {
        let temp = tempdir().unwrap();
        let provider = FsProvider::open(temp.path()).unwrap();

        provider.write_file("db/players/p1", "{\"a\":1}").unwrap();
        assert_eq!(
            provider.read_file("db/players/p1").unwrap().as_deref(),
            Some("{\"a\":1}")
        );

        provider.write_file("db/players/p1", "{\"a\":2}").unwrap();
        assert_eq!(
            provider.read_file("db/players/p1").unwrap().as_deref(),
            Some("{\"a\":2}")
        );
    }

    #[test]
    fn fs_temp_files_are_hidden() {
        let temp = tempdir().unwrap();
        let provider = FsProvider::open(temp.path()).unwrap();

        provider.write_file("db/players/p1", "{}").unwrap();
        fs::write(temp.path().join("db/players/.p2.tmp"), "partial").unwrap();

        assert_eq!(provider.list_files("db/players").unwrap(), vec!["p1"]);
    }

    #[test]
    fn fs_lock_file_is_not_listed() {
        let temp = tempdir().unwrap();
        let provider = FsProvider::open(temp.path()).unwrap();
        provider.create_directory("db").unwrap();

        assert!(provider.list_files("").unwrap().is_empty());
        assert_eq!(provider.list_directories("").unwrap(), vec!["db"]);
    }

    #[test]
    fn fs_missing_paths() {
        let temp = tempdir().unwrap();
        let provider = FsProvider::open(temp.path()).unwrap();

        assert!(provider.read_file("db/none").unwrap().is_none());
        assert!(provider.list_files("db/none").unwrap().is_empty());
        assert!(!provider.directory_exists("db/none").unwrap());
        provider.delete_file("db/none").unwrap();
        provider.delete_directory("db/none").unwrap();
    }

    #[test]
    fn fs_delete_directory_recursive() {
        let temp = tempdir().unwrap();
        let provider = FsProvider::open(temp.path()).unwrap();

        provider.write_file("db/players/p1", "{}").unwrap();
        provider.write_file("db/players/p2", "{}").unwrap();
        provider.delete_directory("db/players").unwrap();

        assert!(!provider.directory_exists("db/players").unwrap());
        assert!(provider.directory_exists("db").unwrap());
    }

    #[test]
    fn fs_persistence() {
        let temp = tempdir().unwrap();

        {
            let provider = FsProvider::open(temp.path()).unwrap();
            provider.write_file("db/items/i1", "persistent").unwrap();
        }

        {
            let provider = FsProvider::open(temp.path()).unwrap();
            assert_eq!(
                provider.read_file("db/items/i1").unwrap().as_deref(),
                Some("persistent")
            );
        }
    }

    #[test]
    fn fs_read_only_rejects_writes() {
        let temp = tempdir().unwrap();
        {
            let provider = FsProvider::open(temp.path()).unwrap();
            provider.write_file("db/a", "x").unwrap();
        }

        let provider = FsProvider::open_read_only(temp.path()).unwrap();
        assert!(provider.is_read_only());
        assert_eq!(provider.read_file("db/a").unwrap().as_deref(), Some("x"));
        assert!(matches!(
            provider.write_file("db/b", "y"),
            Err(StorageError::ReadOnly)
        ));
        assert!(matches!(
            provider.delete_file("db/a"),
            Err(StorageError::ReadOnly)
        ));
    }

    #[test]
    fn fs_read_only_requires_existing_directory() {
        let temp = tempdir().unwrap();
        assert!(FsProvider::open_read_only(&temp.path().join("missing")).is_err());
    }
}
