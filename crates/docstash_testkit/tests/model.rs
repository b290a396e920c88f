//! Generated workloads checked against a reference model.

use docstash_testkit::prelude::*;
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn cache_matches_model(ops in op_sequence_strategy(40)) {
        let disk = TestDisk::new();
        let db = disk.open(player_catalog());
        let mut model = Model::new();

        for op in &ops {
            apply_op(&db, op).unwrap();
            model.apply(op);
        }

        prop_assert_eq!(&observe(&db).unwrap(), model.players());
    }

    #[test]
    fn disk_matches_model_after_restart(ops in op_sequence_strategy(40)) {
        let disk = TestDisk::new();
        let db = disk.open(player_catalog());
        let mut model = Model::new();

        for op in &ops {
            apply_op(&db, op).unwrap();
            model.apply(op);
        }
        db.shutdown().unwrap();

        for slot in 0..SLOTS {
            let id = slot_id(slot);
            let stored = disk.read_json("players", &id);
            match model.players().get(&id) {
                Some(level) => {
                    let stored = stored.unwrap();
                    prop_assert_eq!(stored["level"].as_u64(), Some(u64::from(*level)));
                }
                None => prop_assert!(stored.is_none(), "{} should be deleted", id),
            }
        }

        let db = disk.open(player_catalog());
        prop_assert_eq!(&observe(&db).unwrap(), model.players());
    }
}
