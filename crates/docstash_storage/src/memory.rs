//! In-memory file provider for testing.

use crate::error::{StorageError, StorageResult};
use crate::path::{join, normalize};
use crate::provider::FileProvider;
use parking_lot::RwLock;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
enum Node {
    Directory,
    File(String),
}

/// An in-memory file provider.
///
/// This provider keeps a directory tree in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral databases that don't need persistence
///
/// Sharing one provider between two `Database` instances (via `Arc`) is how
/// tests simulate a process restart over the same "disk".
///
/// # Thread Safety
///
/// This provider is thread-safe and can be shared across threads.
///
/// # Example
///
/// ```rust
/// use docstash_storage::{FileProvider, InMemoryProvider};
///
/// let provider = InMemoryProvider::new();
/// provider.create_directory("db/players").unwrap();
/// assert!(provider.directory_exists("db").unwrap());
/// assert!(provider.list_files("db/players").unwrap().is_empty());
/// ```
#[derive(Debug, Default)]
pub struct InMemoryProvider {
    /// Normalized path → node. Every ancestor of a node is present as a
    /// `Directory` node.
    nodes: RwLock<BTreeMap<String, Node>>,
}

impl InMemoryProvider {
    /// Creates a new empty in-memory provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the paths of every file, sorted.
    ///
    /// Useful for testing and debugging.
    #[must_use]
    pub fn file_paths(&self) -> Vec<String> {
        self.nodes
            .read()
            .iter()
            .filter(|(_, node)| matches!(node, Node::File(_)))
            .map(|(path, _)| path.clone())
            .collect()
    }

    /// Returns the number of files stored.
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.nodes
            .read()
            .values()
            .filter(|node| matches!(node, Node::File(_)))
            .count()
    }

    /// Removes everything.
    pub fn clear(&self) {
        self.nodes.write().clear();
    }

    fn ensure_directories(nodes: &mut BTreeMap<String, Node>, parts: &[&str]) -> StorageResult<()> {
        for depth in 1..=parts.len() {
            let path = join(&parts[..depth]);
            match nodes.get(&path) {
                Some(Node::Directory) => {}
                Some(Node::File(_)) => return Err(StorageError::not_a_directory(path)),
                None => {
                    nodes.insert(path, Node::Directory);
                }
            }
        }
        Ok(())
    }

    fn children(
        &self,
        dir: &str,
        keep: impl Fn(&Node) -> bool,
    ) -> StorageResult<Vec<String>> {
        let parts = normalize(dir)?;
        let nodes = self.nodes.read();

        let prefix = if parts.is_empty() {
            String::new()
        } else {
            let dir_path = join(&parts);
            if !matches!(nodes.get(&dir_path), Some(Node::Directory)) {
                return Ok(Vec::new());
            }
            format!("{dir_path}/")
        };

        // Keys sharing a prefix form a contiguous range in a BTreeMap.
        Ok(nodes
            .range(prefix.clone()..)
            .take_while(|(path, _)| path.starts_with(&prefix))
            .filter(|(path, node)| !path[prefix.len()..].contains('/') && keep(*node))
            .map(|(path, _)| path[prefix.len()..].to_string())
            .collect())
    }
}

impl FileProvider for InMemoryProvider {
    fn directory_exists(&self, dir: &str) -> StorageResult<bool> {
        let parts = normalize(dir)?;
        if parts.is_empty() {
            return Ok(true);
        }
        Ok(matches!(
            self.nodes.read().get(&join(&parts)),
            Some(Node::Directory)
        ))
    }

    fn create_directory(&self, dir: &str) -> StorageResult<()> {
        let parts = normalize(dir)?;
        Self::ensure_directories(&mut self.nodes.write(), &parts)
    }

    fn delete_directory(&self, dir: &str) -> StorageResult<()> {
        let parts = normalize(dir)?;
        let mut nodes = self.nodes.write();

        if parts.is_empty() {
            nodes.clear();
            return Ok(());
        }

        let dir_path = join(&parts);
        if !matches!(nodes.get(&dir_path), Some(Node::Directory)) {
            return Ok(());
        }

        let prefix = format!("{dir_path}/");
        nodes.retain(|path, _| path != &dir_path && !path.starts_with(&prefix));
        Ok(())
    }

    fn read_file(&self, file: &str) -> StorageResult<Option<String>> {
        let parts = normalize(file)?;
        if parts.is_empty() {
            return Err(StorageError::invalid_path(file));
        }

        match self.nodes.read().get(&join(&parts)) {
            Some(Node::File(contents)) => Ok(Some(contents.clone())),
            _ => Ok(None),
        }
    }

    fn write_file(&self, file: &str, contents: &str) -> StorageResult<()> {
        let parts = normalize(file)?;
        let Some((_, parents)) = parts.split_last() else {
            return Err(StorageError::invalid_path(file));
        };

        let mut nodes = self.nodes.write();
        Self::ensure_directories(&mut nodes, parents)?;

        let path = join(&parts);
        if matches!(nodes.get(&path), Some(Node::Directory)) {
            return Err(StorageError::invalid_path(path));
        }

        nodes.insert(path, Node::File(contents.to_string()));
        Ok(())
    }

    fn delete_file(&self, file: &str) -> StorageResult<()> {
        let parts = normalize(file)?;
        let path = join(&parts);
        let mut nodes = self.nodes.write();

        if matches!(nodes.get(&path), Some(Node::File(_))) {
            nodes.remove(&path);
        }
        Ok(())
    }

    fn list_files(&self, dir: &str) -> StorageResult<Vec<String>> {
        self.children(dir, |node| matches!(node, Node::File(_)))
    }

    fn list_directories(&self, dir: &str) -> StorageResult<Vec<String>> {
        self.children(dir, |node| matches!(node, Node::Directory))
    }
}
