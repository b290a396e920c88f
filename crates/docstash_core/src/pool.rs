//! Per-type pools of pre-constructed record instances.
//!
//! Selecting documents hands out copies of the cached payloads. Copies are
//! made into instances taken from a lock-free free list so that large
//! selects do not pay for construction on the calling thread. Free lists are
//! refilled in the background once they drop below half their size.

use crate::catalog::{Payload, TypeSchema};
use crate::error::{CoreError, CoreResult};
use crate::stats::DatabaseStats;
use crossbeam_channel::{unbounded, Receiver, Sender};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Minimum time between two replenishment checks.
pub const REPLENISH_INTERVAL: Duration = Duration::from_secs(1);

struct PoolEntry {
    schema: Arc<TypeSchema>,
    sender: Sender<Payload>,
    receiver: Receiver<Payload>,
    refilling: AtomicBool,
}

impl PoolEntry {
    fn new(schema: Arc<TypeSchema>) -> Self {
        let (sender, receiver) = unbounded();
        Self {
            schema,
            sender,
            receiver,
            refilling: AtomicBool::new(false),
        }
    }

    /// Constructs instances until the free list holds `target`.
    fn fill(&self, target: usize) -> usize {
        let mut added = 0;
        while self.receiver.len() < target {
            if self.sender.send(self.schema.construct()).is_err() {
                break;
            }
            added += 1;
        }
        added
    }
}

/// Object pool shared by every collection of one database.
///
/// An instance is either in a free list or owned by exactly one caller;
/// instances are never handed out twice.
pub struct ObjectPool {
    entries: DashMap<String, Arc<PoolEntry>>,
    pool_size: usize,
    last_check: Mutex<Option<Instant>>,
    stats: Arc<DatabaseStats>,
}

impl ObjectPool {
    /// Creates an empty pool keeping `pool_size` instances per type.
    pub fn new(pool_size: usize, stats: Arc<DatabaseStats>) -> Self {
        Self {
            entries: DashMap::new(),
            pool_size,
            last_check: Mutex::new(None),
            stats,
        }
    }

    /// Registers a type and fills its free list.
    ///
    /// Registering a type again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `ConflictingRegistration` if another type already uses the
    /// same stable name.
    pub fn register_type(&self, schema: &Arc<TypeSchema>) -> CoreResult<()> {
        let entry = Arc::clone(
            self.entries
                .entry(schema.type_name().to_string())
                .or_insert_with(|| Arc::new(PoolEntry::new(Arc::clone(schema))))
                .value(),
        );

        if entry.schema.rust_type_id() != schema.rust_type_id() {
            return Err(CoreError::conflicting_registration(schema.type_name()));
        }

        let added = entry.fill(self.pool_size);
        if added > 0 {
            debug!(type_name = schema.type_name(), added, "filled object pool");
        }
        Ok(())
    }

    /// Returns whether `type_name` has been registered.
    pub fn is_registered(&self, type_name: &str) -> bool {
        self.entries.contains_key(type_name)
    }

    fn entry(&self, type_name: &str) -> CoreResult<Arc<PoolEntry>> {
        self.entries
            .get(type_name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| CoreError::unregistered_type(type_name))
    }

    /// Takes a zero-state instance, constructing one if the free list is empty.
    ///
    /// # Errors
    ///
    /// Returns `UnregisteredType` if the type was never registered.
    pub fn get_instance(&self, type_name: &str) -> CoreResult<Payload> {
        let entry = self.entry(type_name)?;
        Ok(self.take(&entry))
    }

    fn take(&self, entry: &PoolEntry) -> Payload {
        match entry.receiver.try_recv() {
            Ok(instance) => {
                self.stats.record_pool_hit();
                instance
            }
            Err(_) => {
                self.stats.record_pool_miss();
                entry.schema.construct()
            }
        }
    }

    /// Copies every persistable field of `source` into a pooled instance.
    ///
    /// The identifier is copied last.
    ///
    /// # Errors
    ///
    /// Returns `UnregisteredType` if the type was never registered, or an
    /// error if `source` is not an instance of it.
    pub fn clone_object(&self, source: &dyn Any, type_name: &str) -> CoreResult<Payload> {
        let entry = self.entry(type_name)?;
        let mut instance = self.take(&entry);
        entry.schema.copy_fields(source, instance.as_mut())?;
        Ok(instance)
    }

    /// Refills low free lists in the background.
    ///
    /// Runs at most once per [`REPLENISH_INTERVAL`]; calls in between return
    /// immediately. Every free list below half the pool size gets a
    /// background refill, unless one is already running for that type.
    /// Returns the number of refills started.
    pub fn replenish_check(&self) -> usize {
        {
            let mut last_check = self.last_check.lock();
            let now = Instant::now();
            if last_check.is_some_and(|last| now.duration_since(last) < REPLENISH_INTERVAL) {
                return 0;
            }
            *last_check = Some(now);
        }

        let low: Vec<Arc<PoolEntry>> = self
            .entries
            .iter()
            .filter(|entry| entry.receiver.len() < self.pool_size / 2)
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut started = 0;
        for entry in low {
            if entry
                .refilling
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                continue;
            }

            let target = self.pool_size;
            let stats = Arc::clone(&self.stats);
            let worker = Arc::clone(&entry);
            let spawned = thread::Builder::new()
                .name("docstash-pool".to_string())
                .spawn(move || {
                    let added = worker.fill(target);
                    worker.refilling.store(false, Ordering::Release);
                    stats.record_pool_replenishment();
                    debug!(type_name = worker.schema.type_name(), added, "replenished object pool");
                });

            match spawned {
                Ok(_) => started += 1,
                Err(e) => {
                    entry.refilling.store(false, Ordering::Release);
                    warn!(type_name = entry.schema.type_name(), error = %e, "could not start pool refill");
                }
            }
        }
        started
    }

    /// Returns the free list length of a type, if registered.
    pub fn free_count(&self, type_name: &str) -> Option<usize> {
        self.entries.get(type_name).map(|entry| entry.receiver.len())
    }

    /// Returns the configured size of each free list.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Drops every free list.
    pub fn clear(&self) {
        self.entries.clear();
        *self.last_check.lock() = None;
    }
}
