//! Background ticker.
//!
//! Two threads: the ticker wakes up every tick interval, hands a flush job
//! to the flush worker and runs the pool replenishment check. Jobs are
//! offered on a rendezvous channel, so a tick that arrives while the worker
//! is still flushing is dropped instead of queued and the cadence never
//! stretches with flush duration.

use crate::cache::WriteBehindCache;
use crate::error::CoreResult;
use crate::pool::ObjectPool;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Handle to the running ticker threads.
///
/// Dropping the handle stops the threads.
pub struct Ticker {
    shutdown: Option<Sender<()>>,
    ticker: Option<JoinHandle<()>>,
    worker: Option<JoinHandle<()>>,
}

impl Ticker {
    /// Starts ticking every `interval`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if a thread cannot be spawned.
    pub fn start(
        cache: Arc<WriteBehindCache>,
        pool: Arc<ObjectPool>,
        interval: Duration,
    ) -> CoreResult<Self> {
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);
        let (jobs_tx, jobs_rx) = bounded::<()>(0);

        let worker = thread::Builder::new()
            .name("docstash-flush".to_string())
            .spawn(move || flush_loop(&cache, &jobs_rx))?;

        let ticker = thread::Builder::new()
            .name("docstash-ticker".to_string())
            .spawn(move || tick_loop(&pool, &shutdown_rx, &jobs_tx, interval));

        let ticker = match ticker {
            Ok(handle) => handle,
            Err(e) => {
                // The job sender went down with the closure, so the worker exits.
                let _ = worker.join();
                return Err(e.into());
            }
        };

        debug!(?interval, "ticker started");
        Ok(Self {
            shutdown: Some(shutdown_tx),
            ticker: Some(ticker),
            worker: Some(worker),
        })
    }

    /// Stops both threads, waiting for an in-flight flush to finish.
    ///
    /// Calling this more than once is a no-op.
    pub fn stop(&mut self) {
        // Disconnecting the channel wakes the ticker immediately.
        self.shutdown.take();

        if let Some(ticker) = self.ticker.take() {
            if ticker.join().is_err() {
                warn!("ticker thread panicked");
            }
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("flush worker panicked");
            }
        }
    }

    /// Returns whether the threads are running.
    pub fn is_running(&self) -> bool {
        self.shutdown.is_some()
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn tick_loop(pool: &ObjectPool, shutdown: &Receiver<()>, jobs: &Sender<()>, interval: Duration) {
    loop {
        match shutdown.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }

        // Fails while the worker is busy; that tick is skipped.
        let _ = jobs.try_send(());
        pool.replenish_check();
    }
    debug!("ticker stopped");
}

fn flush_loop(cache: &WriteBehindCache, jobs: &Receiver<()>) {
    for () in jobs.iter() {
        cache.tick();
    }
    debug!("flush worker stopped");
}
