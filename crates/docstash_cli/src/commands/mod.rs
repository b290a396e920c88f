//! CLI command implementations.

pub mod inspect;
pub mod verify;

use docstash_core::{Config, MergeWriter};
use docstash_storage::{FileProvider, FsProvider};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Opens a database directory for reading only.
///
/// No lock is taken, so this works while the database is open elsewhere.
pub fn open_reader(path: &Path, root: &str) -> Result<MergeWriter, Box<dyn std::error::Error>> {
    let provider = FsProvider::open_read_only(path)?;
    let config = Config::default().root_name(root);
    let reader = MergeWriter::new(Arc::new(provider), &config);

    if !reader.provider().directory_exists(reader.root())? {
        return Err(format!("No docstash root {:?} found in {:?}", root, path).into());
    }
    debug!(path = %path.display(), root, "opened database read-only");
    Ok(reader)
}
