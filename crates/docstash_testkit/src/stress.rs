//! Stress tests for docstash.
//!
//! These helpers drive a database from several threads at once while a
//! flusher writes behind them.

use crate::records::Player;
use docstash_core::Database;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Operations per thread.
    pub operations: usize,
    /// Number of writer threads.
    pub threads: usize,
    /// Number of distinct player ids per thread.
    pub players_per_thread: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 2_000,
            threads: 4,
            players_per_thread: 50,
        }
    }
}

/// Id of a player written by [`stress_concurrent_inserts`].
pub fn stress_player_id(thread: usize, index: usize) -> String {
    format!("t{thread}-p{index}")
}

/// Inserts players from several threads while another thread keeps forcing
/// full writes.
///
/// Each thread cycles over its own `players_per_thread` ids; the last
/// operation on each id stores `level = operation index`.
pub fn stress_concurrent_inserts(db: &Arc<Database>, config: &StressConfig) -> StressTestResult {
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let done = Arc::new(AtomicBool::new(false));

    let start = Instant::now();

    let flusher = {
        let db = Arc::clone(db);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            while !done.load(Ordering::Acquire) {
                let _ = db.force_full_write();
                thread::sleep(Duration::from_millis(1));
            }
        })
    };

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let db = Arc::clone(db);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let operations = config.operations;
            let players = config.players_per_thread.max(1);

            thread::spawn(move || {
                for i in 0..operations {
                    let mut player = Player {
                        id: stress_player_id(t, i % players),
                        name: format!("thread {t}"),
                        level: u32::try_from(i).unwrap_or(u32::MAX),
                        ..Player::default()
                    };
                    match db.insert(&mut player) {
                        Ok(_) => successful.fetch_add(1, Ordering::Relaxed),
                        Err(_) => failed.fetch_add(1, Ordering::Relaxed),
                    };
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Writer thread panicked");
    }
    done.store(true, Ordering::Release);
    flusher.join().expect("Flusher thread panicked");

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

/// Runs `readers` threads selecting everything for `duration`, returning
/// how many selects completed.
pub fn stress_concurrent_selects(db: &Arc<Database>, readers: usize, duration: Duration) -> StressTestResult {
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    let handles: Vec<_> = (0..readers)
        .map(|_| {
            let db = Arc::clone(db);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);

            thread::spawn(move || {
                while start.elapsed() < duration {
                    match db.select(|_: &Player| true) {
                        Ok(_) => successful.fetch_add(1, Ordering::Relaxed),
                        Err(_) => failed.fetch_add(1, Ordering::Relaxed),
                    };
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Reader thread panicked");
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}
