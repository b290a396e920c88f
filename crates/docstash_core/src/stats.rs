//! Database statistics.
//!
//! Counters for monitoring the write-behind cache and the object pool.
//!
//! # Usage
//!
//! ```rust,ignore
//! let stats = db.stats();
//! println!("Written: {}", stats.documents_written);
//! println!("Pending: {}", db.pending_writes());
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Database statistics.
///
/// All counters are atomic and can be read while operations are in progress.
/// Values are monotonically increasing.
#[derive(Debug, Default)]
pub struct DatabaseStats {
    // Operation counters
    inserts: AtomicU64,
    selects: AtomicU64,
    deletes: AtomicU64,

    // Flush counters
    documents_written: AtomicU64,
    write_failures: AtomicU64,
    partial_flushes: AtomicU64,
    full_flushes: AtomicU64,

    // Pool counters
    pool_hits: AtomicU64,
    pool_misses: AtomicU64,
    pool_replenishments: AtomicU64,
}

impl DatabaseStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    // === Increment methods (internal use) ===

    pub(crate) fn record_insert(&self) {
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_select(&self) {
        self.selects.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_deletes(&self, count: u64) {
        self.deletes.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_document_written(&self) {
        self.documents_written.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_partial_flush(&self) {
        self.partial_flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_full_flush(&self) {
        self.full_flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_pool_hit(&self) {
        self.pool_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_pool_miss(&self) {
        self.pool_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_pool_replenishment(&self) {
        self.pool_replenishments.fetch_add(1, Ordering::Relaxed);
    }

    // === Getter methods (public API) ===

    /// Returns the number of inserted documents.
    pub fn inserts(&self) -> u64 {
        self.inserts.load(Ordering::Relaxed)
    }

    /// Returns the number of select calls.
    pub fn selects(&self) -> u64 {
        self.selects.load(Ordering::Relaxed)
    }

    /// Returns the number of deleted documents.
    pub fn deletes(&self) -> u64 {
        self.deletes.load(Ordering::Relaxed)
    }

    /// Returns the number of document files written.
    pub fn documents_written(&self) -> u64 {
        self.documents_written.load(Ordering::Relaxed)
    }

    /// Returns the number of documents that exhausted their write attempts.
    pub fn write_failures(&self) -> u64 {
        self.write_failures.load(Ordering::Relaxed)
    }

    /// Returns the number of partial flushes that wrote at least one document.
    pub fn partial_flushes(&self) -> u64 {
        self.partial_flushes.load(Ordering::Relaxed)
    }

    /// Returns the number of full flushes.
    pub fn full_flushes(&self) -> u64 {
        self.full_flushes.load(Ordering::Relaxed)
    }

    /// Returns how often the pool handed out a pre-built instance.
    pub fn pool_hits(&self) -> u64 {
        self.pool_hits.load(Ordering::Relaxed)
    }

    /// Returns how often the pool had to construct an instance on demand.
    pub fn pool_misses(&self) -> u64 {
        self.pool_misses.load(Ordering::Relaxed)
    }

    /// Returns the number of background pool refills.
    pub fn pool_replenishments(&self) -> u64 {
        self.pool_replenishments.load(Ordering::Relaxed)
    }

    /// Returns a snapshot of all stats.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            inserts: self.inserts(),
            selects: self.selects(),
            deletes: self.deletes(),
            documents_written: self.documents_written(),
            write_failures: self.write_failures(),
            partial_flushes: self.partial_flushes(),
            full_flushes: self.full_flushes(),
            pool_hits: self.pool_hits(),
            pool_misses: self.pool_misses(),
            pool_replenishments: self.pool_replenishments(),
        }
    }
}

/// A point-in-time snapshot of database statistics.
///
/// Unlike `DatabaseStats`, this is a plain struct that can be compared or
/// passed across threads without atomics.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Inserted documents.
    pub inserts: u64,
    /// Select calls.
    pub selects: u64,
    /// Deleted documents.
    pub deletes: u64,
    /// Document files written.
    pub documents_written: u64,
    /// Documents that exhausted their write attempts.
    pub write_failures: u64,
    /// Partial flushes that wrote something.
    pub partial_flushes: u64,
    /// Full flushes.
    pub full_flushes: u64,
    /// Pool hits.
    pub pool_hits: u64,
    /// Pool misses.
    pub pool_misses: u64,
    /// Background pool refills.
    pub pool_replenishments: u64,
}
