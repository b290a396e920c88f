//! The stale set: documents waiting to be written.

use crate::document::{Document, DocumentKey};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// Dead keys tolerated in the queue order before it is compacted.
const COMPACT_SLACK: usize = 64;

#[derive(Default)]
struct Inner {
    /// Queue order. May hold keys whose entry was already removed; those are
    /// skipped when popped. Kept below `2 * entries.len() + COMPACT_SLACK`.
    order: VecDeque<DocumentKey>,
    entries: HashMap<DocumentKey, Arc<Document>>,
}

impl Inner {
    fn compact(&mut self) {
        if self.order.len() <= self.entries.len() * 2 + COMPACT_SLACK {
            return;
        }

        let entries = &self.entries;
        let mut seen = HashSet::with_capacity(entries.len());
        self.order
            .retain(|key| entries.contains_key(key) && seen.insert(key.clone()));
    }
}

/// Concurrent set of documents awaiting persistence.
///
/// Holds at most one document per `(collection, id)`: marking a newer
/// version stale replaces the queued one in place. Documents are taken in
/// roughly the order they first became stale.
#[derive(Default)]
pub struct StaleSet {
    inner: Mutex<Inner>,
}

impl StaleSet {
    /// Creates an empty stale set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a document, replacing any queued version with the same key.
    pub fn push(&self, document: Arc<Document>) {
        let key = document.key();
        let mut inner = self.inner.lock();
        if inner.entries.insert(key.clone(), document).is_none() {
            inner.order.push_back(key);
        }
    }

    /// Queues a document whose write failed.
    ///
    /// Does nothing if the document was deleted or replaced, or if another
    /// version is already queued. Returns whether it was queued.
    pub fn requeue(&self, document: Arc<Document>) -> bool {
        if document.is_retired() {
            return false;
        }

        let key = document.key();
        let mut inner = self.inner.lock();
        if inner.entries.contains_key(&key) {
            return false;
        }
        inner.entries.insert(key.clone(), document);
        inner.order.push_back(key);
        true
    }

    /// Takes the next document.
    pub fn pop(&self) -> Option<Arc<Document>> {
        let mut inner = self.inner.lock();
        while let Some(key) = inner.order.pop_front() {
            if let Some(document) = inner.entries.remove(&key) {
                return Some(document);
            }
        }
        None
    }

    /// Removes the queued version of a document.
    pub fn remove(&self, key: &DocumentKey) -> Option<Arc<Document>> {
        let mut inner = self.inner.lock();
        let removed = inner.entries.remove(key);
        inner.compact();
        removed
    }

    /// Returns whether a version of the document is queued.
    pub fn contains(&self, key: &DocumentKey) -> bool {
        self.inner.lock().entries.contains_key(key)
    }

    /// Returns the number of queued documents.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops everything queued.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.order.clear();
        inner.entries.clear();
    }
}
