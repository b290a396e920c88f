//! Write-behind cache.
//!
//! Inserts only mark documents stale; the scheduler decides when they reach
//! disk. Each tick is one of:
//!
//! - **idle**: nothing is due
//! - **partial write**: a paced share of the stale set, see [`WriteWindow`]
//! - **full write**: everything stale, once per flush interval
//!
//! Scheduled ticks, forced full writes and wipes exclude each other through
//! the write-in-progress lock, which also guards the pacing state.

mod stale;
mod window;

pub use stale::StaleSet;
pub use window::WriteWindow;

use crate::config::Config;
use crate::document::{Document, DocumentKey};
use crate::error::{CoreError, CoreResult};
use crate::persist::MergeWriter;
use crate::stats::DatabaseStats;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// What a tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was due, the cache is disabled, or another write was running.
    Idle,
    /// A partial write ran.
    Partial {
        /// Documents written.
        written: usize,
    },
    /// A full write ran.
    Full {
        /// Documents written.
        written: usize,
    },
}

/// The stale set plus the scheduler deciding how much of it to write.
pub struct WriteBehindCache {
    stale: StaleSet,
    /// Write-in-progress lock.
    window: Mutex<WriteWindow>,
    writer: Arc<MergeWriter>,
    stats: Arc<DatabaseStats>,
    enabled: AtomicBool,
    flush_interval: Duration,
    partial_interval: Duration,
    lock_timeout: Duration,
    write_attempts: u32,
}

impl WriteBehindCache {
    /// Creates an empty cache writing through `writer`.
    pub fn new(writer: Arc<MergeWriter>, stats: Arc<DatabaseStats>, config: &Config) -> Self {
        Self {
            stale: StaleSet::new(),
            window: Mutex::new(WriteWindow::new(Instant::now(), 0)),
            writer,
            stats,
            enabled: AtomicBool::new(true),
            flush_interval: config.flush_interval,
            partial_interval: config.partial_write_interval(),
            lock_timeout: config.lock_timeout,
            write_attempts: config.document_write_attempts.max(1),
        }
    }

    /// Queues a document for writing.
    pub fn mark_stale(&self, document: Arc<Document>) {
        self.stale.push(document);
    }

    /// Drops the queued version of a document.
    pub fn unmark(&self, key: &DocumentKey) -> Option<Arc<Document>> {
        self.stale.remove(key)
    }

    /// Returns how many documents wait to be written.
    pub fn pending_count(&self) -> usize {
        self.stale.len()
    }

    /// Enables or disables scheduled ticks.
    ///
    /// Forced full writes work either way.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    /// Returns whether scheduled ticks run.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Runs one scheduled tick now.
    pub fn tick(&self) -> FlushOutcome {
        self.tick_at(Instant::now())
    }

    /// Runs one scheduled tick as if the time were `now`.
    ///
    /// Returns immediately if another write holds the lock.
    pub fn tick_at(&self, now: Instant) -> FlushOutcome {
        if !self.is_enabled() {
            return FlushOutcome::Idle;
        }

        let Some(mut window) = self.window.try_lock() else {
            return FlushOutcome::Idle;
        };

        if window.full_write_due(now, self.flush_interval) {
            let written = self.full_write(&mut window, now);
            FlushOutcome::Full { written }
        } else if window.partial_write_due(now, self.partial_interval) {
            window.mark_partial(now);
            let target = window.target(now, self.flush_interval, self.stale.len());
            if target == 0 {
                return FlushOutcome::Idle;
            }

            let written = self.write_pass(target);
            window.record_written(written);
            if written > 0 {
                self.stats.record_partial_flush();
            }
            debug!(target, written, "partial write");
            FlushOutcome::Partial { written }
        } else {
            FlushOutcome::Idle
        }
    }

    /// Writes every stale document now.
    ///
    /// Waits up to the configured lock timeout for a running write to finish.
    /// Returns the number of documents written.
    ///
    /// # Errors
    ///
    /// Returns `LockTimeout` if the write lock could not be acquired.
    pub fn force_full_write(&self) -> CoreResult<usize> {
        let mut window = self
            .window
            .try_lock_for(self.lock_timeout)
            .ok_or(CoreError::LockTimeout {
                timeout: self.lock_timeout,
            })?;

        Ok(self.full_write(&mut window, Instant::now()))
    }

    /// Runs `f` while holding the write lock, after dropping everything stale.
    ///
    /// # Errors
    ///
    /// Returns `LockTimeout` if the write lock could not be acquired.
    pub fn exclusive<R>(&self, f: impl FnOnce() -> R) -> CoreResult<R> {
        let mut window = self
            .window
            .try_lock_for(self.lock_timeout)
            .ok_or(CoreError::LockTimeout {
                timeout: self.lock_timeout,
            })?;

        self.stale.clear();
        window.reset(Instant::now(), 0);
        Ok(f())
    }

    /// Starts a new pacing window at `now` over what is currently stale.
    pub fn start_window_at(&self, now: Instant) {
        self.window.lock().reset(now, self.stale.len());
    }

    /// Drops everything stale without writing it.
    pub fn clear(&self) {
        self.stale.clear();
    }

    fn full_write(&self, window: &mut WriteWindow, now: Instant) -> usize {
        window.restart_clock(now);

        let pending = self.stale.len();
        let written = self.write_pass(pending);

        window.reset(now, self.stale.len());
        self.stats.record_full_flush();
        debug!(pending, written, "full write");
        written
    }

    /// Takes up to `limit` documents and writes them.
    ///
    /// Documents that still fail after every attempt go back into the stale
    /// set once the pass is over, unless they were deleted or replaced in
    /// the meantime. Returns the number written.
    fn write_pass(&self, limit: usize) -> usize {
        let mut written = 0;
        let mut failed = Vec::new();

        for _ in 0..limit {
            let Some(document) = self.stale.pop() else {
                break;
            };

            match self.persist_with_retries(&document) {
                Ok(true) => {
                    written += 1;
                    self.stats.record_document_written();
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(
                        collection = document.collection(),
                        id = %document.id(),
                        error = %e,
                        "failed to write document; will retry next cycle"
                    );
                    self.stats.record_write_failure();
                    failed.push(document);
                }
            }
        }

        for document in failed {
            self.stale.requeue(document);
        }
        written
    }

    fn persist_with_retries(&self, document: &Document) -> CoreResult<bool> {
        let mut attempt = 1;
        loop {
            match document.persist(&self.writer) {
                Err(e) if e.is_transient() && attempt < self.write_attempts => {
                    debug!(id = %document.id(), attempt, error = %e, "retrying document write");
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}
