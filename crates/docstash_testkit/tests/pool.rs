//! Object pool behavior seen from outside the engine.

use docstash_core::{CoreResult, DatabaseStats, ObjectPool, TypeSchema};
use docstash_testkit::prelude::*;
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Level no generated operation stores; written into every copy a worker
/// selects, so it shows up in the cache if a copy aliases a cached payload.
const SCRIBBLE: u32 = u32::MAX;

fn player_pool(size: usize) -> (ObjectPool, Arc<DatabaseStats>) {
    let stats = Arc::new(DatabaseStats::new());
    let pool = ObjectPool::new(size, Arc::clone(&stats));
    pool.register_type(&Arc::new(TypeSchema::of::<Player>())).unwrap();
    (pool, stats)
}

proptest! {
    #[test]
    fn instances_are_never_handed_out_twice(size in 0usize..32, takes in 0usize..64) {
        let (pool, stats) = player_pool(size);

        let mut instances = Vec::new();
        for i in 0..takes {
            let mut instance = pool.get_instance("Player").unwrap();
            let player = instance.downcast_mut::<Player>().unwrap();
            prop_assert_eq!(&*player, &Player::default());
            player.level = u32::try_from(i).unwrap();
            instances.push(instance);
        }

        // Every instance kept its own write.
        for (i, instance) in instances.iter().enumerate() {
            let player = instance.downcast_ref::<Player>().unwrap();
            prop_assert_eq!(player.level, u32::try_from(i).unwrap());
        }

        let hits = takes.min(size);
        prop_assert_eq!(stats.pool_hits(), hits as u64);
        prop_assert_eq!(stats.pool_misses(), (takes - hits) as u64);
        prop_assert_eq!(pool.free_count("Player"), Some(size - hits));
    }

    #[test]
    fn clones_are_independent(player in player_strategy()) {
        let (pool, _) = player_pool(4);

        let mut copy = pool.clone_object(&player, "Player").unwrap();
        prop_assert_eq!(copy.downcast_ref::<Player>().unwrap(), &player);

        copy.downcast_mut::<Player>().unwrap().name.push('!');
        prop_assert_ne!(copy.downcast_ref::<Player>().unwrap(), &player);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn concurrent_workloads_never_share_payloads(
        workloads in prop::collection::vec(op_sequence_strategy(40), 2..5)
    ) {
        let db = Arc::new(TestDisk::new().open(player_catalog()));

        let readers = {
            let db = Arc::clone(&db);
            thread::spawn(move || stress_concurrent_selects(&db, 2, Duration::from_millis(20)))
        };

        let workers: Vec<_> = workloads
            .into_iter()
            .map(|ops| {
                let db = Arc::clone(&db);
                thread::spawn(move || -> CoreResult<()> {
                    for op in &ops {
                        apply_op(&db, op)?;
                        let mut copies = db.select(|_: &Player| true)?;
                        for copy in &mut copies {
                            copy.level = SCRIBBLE;
                        }
                    }
                    Ok(())
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap().unwrap();
        }
        prop_assert_eq!(readers.join().unwrap().failed_ops, 0);

        // Every live document owns a distinct payload no copy ever reached.
        let live = db.select_refs(|_: &Player| true).unwrap();
        prop_assert_eq!(live.len(), db.count::<Player>().unwrap());
        let live_payloads: HashSet<usize> = live.iter().map(|p| Arc::as_ptr(p) as usize).collect();
        prop_assert_eq!(live_payloads.len(), live.len());
        prop_assert!(live.iter().all(|p| p.level != SCRIBBLE));

        // Nothing on the free list is live, and everything on it is zero-state.
        let free = db.pool().free_count("Player").unwrap_or(0);
        let taken: Vec<_> = (0..free)
            .map(|_| db.pool().get_instance("Player").unwrap())
            .collect();
        for instance in &taken {
            let player = instance.downcast_ref::<Player>().unwrap();
            prop_assert_eq!(player, &Player::default());
            prop_assert!(!live_payloads.contains(&(player as *const Player as usize)));
        }
    }
}

#[test]
fn unknown_types_are_rejected() {
    let (pool, _) = player_pool(4);
    assert!(pool.get_instance("Item").is_err());
    assert!(pool.clone_object(&Item::default(), "Item").is_err());
}

#[test]
fn database_copies_come_from_the_pool() {
    let disk = TestDisk::new();
    let db = disk.open(player_catalog());
    db.insert(&mut Player::named("ada")).unwrap();

    let before = db.stats();
    let first = db.select(|_: &Player| true).unwrap();
    let second = db.select(|_: &Player| true).unwrap();
    let after = db.stats();

    assert_eq!(first, second);
    let taken = (after.pool_hits + after.pool_misses) - (before.pool_hits + before.pool_misses);
    assert_eq!(taken, 2);
}
