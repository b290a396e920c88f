//! Restart, merge and crash behavior over a shared disk.

use docstash_core::Config;
use docstash_storage::FileProvider;
use docstash_testkit::prelude::*;
use serde_json::json;

#[test]
fn documents_survive_restart() {
    let disk = TestDisk::new();
    let db = disk.open(player_catalog());

    let mut ada = Player::named("ada").with_level(12);
    ada.inventory = vec!["sword".to_string(), "rope".to_string()];
    ada.guild = Some("owls".to_string());
    db.insert(&mut ada).unwrap();

    let mut lamp = Item::new("lamp", 1.5);
    db.insert(&mut lamp).unwrap();
    db.shutdown().unwrap();

    let db = disk.open(player_catalog());
    assert_eq!(db.select(|p: &Player| p.id == ada.id).unwrap(), vec![ada.clone()]);
    assert_eq!(db.select(|i: &Item| i.id == lamp.id).unwrap(), vec![lamp.clone()]);
    assert_eq!(
        db.collection_names(),
        vec!["items".to_string(), "players".to_string()]
    );
}

#[test]
fn narrowed_type_keeps_fields_it_no_longer_declares() {
    let disk = TestDisk::new();

    let db = disk.open(player_catalog());
    let mut ada = Player::named("ada").with_level(3);
    ada.health = 42;
    ada.inventory = vec!["map".to_string()];
    ada.guild = Some("owls".to_string());
    db.insert(&mut ada).unwrap();
    db.shutdown().unwrap();

    // The application now only knows id, name and level.
    let db = disk.open(player_v2_catalog());
    let mut slim = db.select_one(|p: &PlayerV2| p.id == ada.id).unwrap().unwrap();
    assert_eq!(slim.level, 3);
    slim.level = 4;
    db.insert(&mut slim).unwrap();
    db.shutdown().unwrap();

    let stored = disk.read_json("players", &ada.id).unwrap();
    assert_eq!(stored["level"], 4);
    assert_eq!(stored["health"], 42);
    assert_eq!(stored["inventory"], json!(["map"]));
    assert_eq!(stored["guild"], "owls");

    // Going back to the wide type sees both the old and the new data.
    let db = disk.open(player_catalog());
    let wide = db.select_one(|p: &Player| p.id == ada.id).unwrap().unwrap();
    assert_eq!(wide.level, 4);
    assert_eq!(wide.health, 42);
    assert_eq!(wide.inventory, vec!["map".to_string()]);
}

#[test]
fn disabling_merge_drops_undeclared_fields() {
    let disk = TestDisk::new();

    let db = disk.open(player_catalog());
    let mut ada = Player::named("ada");
    ada.guild = Some("owls".to_string());
    db.insert(&mut ada).unwrap();
    db.shutdown().unwrap();

    let db = disk.open_with(test_config().merge_on_write(false), player_v2_catalog());
    let mut slim = db.select_one(|p: &PlayerV2| p.id == ada.id).unwrap().unwrap();
    db.insert(&mut slim).unwrap();
    db.shutdown().unwrap();

    let stored = disk.read_json("players", &ada.id).unwrap();
    assert_eq!(stored["name"], "ada");
    assert!(stored.get("guild").is_none());
    assert!(stored.get("health").is_none());
}

#[test]
fn stored_field_names_match_case_insensitively() {
    let disk = TestDisk::new();
    disk.provider()
        .write_file(
            "docstash/players/definition.txt",
            r#"{"name":"players","document_type":"Player","id_field":"id"}"#,
        )
        .unwrap();
    disk.write_json(
        "players",
        "p1",
        &json!({ "ID": "p1", "Name": "ada", "LEVEL": 9, "unrelated": true }),
    );

    let db = disk.open(player_catalog());
    let ada = db.select_one(|p: &Player| p.id == "p1").unwrap().unwrap();
    assert_eq!(ada.name, "ada");
    assert_eq!(ada.level, 9);
    assert_eq!(ada.health, 0);
}

#[test]
fn collection_with_mismatched_file_name_is_skipped() {
    let disk = TestDisk::new();
    {
        let db = disk.open(player_catalog());
        db.insert(&mut Item::new("lamp", 1.0)).unwrap();
    }
    disk.provider()
        .write_file(
            "docstash/players/definition.txt",
            r#"{"name":"players","document_type":"Player","id_field":"id"}"#,
        )
        .unwrap();
    disk.write_json("players", "renamed", &json!({ "id": "original", "name": "ada" }));

    let db = disk.open(player_catalog());
    assert_eq!(db.collection_names(), vec!["items".to_string()]);
    assert_eq!(db.count::<Item>().unwrap(), 1);
    assert_eq!(db.count::<Player>().unwrap(), 0);
}

#[test]
fn crash_keeps_flushed_documents_only() {
    let disk = TestDisk::new();
    let db = disk.open(player_catalog());

    let saved = db.insert(&mut Player::named("saved")).unwrap();
    db.force_full_write().unwrap();
    let mut replaced = Player::named("replaced");
    db.insert(&mut replaced).unwrap();
    db.force_full_write().unwrap();

    replaced.level = 50;
    db.insert(&mut replaced).unwrap();
    let lost = db.insert(&mut Player::named("lost")).unwrap();
    crash(db);

    let db = disk.open(player_catalog());
    assert!(db.any(|p: &Player| p.id == saved.as_str()).unwrap());
    assert!(!db.any(|p: &Player| p.id == lost.as_str()).unwrap());

    // The replacement never reached disk; the earlier version did.
    let survivor = db.select_one(|p: &Player| p.id == replaced.id).unwrap().unwrap();
    assert_eq!(survivor.level, 1);
}

#[test]
fn file_database_round_trip() {
    let test_db = TestDatabase::file(player_catalog());
    let path = test_db.path().unwrap();

    let mut ada = Player::named("ada").with_level(7);
    test_db.insert(&mut ada).unwrap();
    test_db.force_full_write().unwrap();

    let file = path.join("docstash").join("players").join(&ada.id);
    let text = std::fs::read_to_string(file).unwrap();
    assert!(text.contains("\"ada\""));

    let test_db = test_db.reopen(player_catalog());
    assert_eq!(test_db.select(|p: &Player| p.id == ada.id).unwrap(), vec![ada.clone()]);
}

#[test]
fn compact_json_when_indent_disabled() {
    let disk = TestDisk::new();
    let config = Config::default()
        .ticker_enabled(false)
        .startup_messages(false)
        .indent_json(false);
    let db = disk.open_with(config, player_catalog());
    let id = db.insert(&mut Player::named("ada")).unwrap();
    db.force_full_write().unwrap();

    let text = disk
        .provider()
        .read_file(&TestDisk::document_path("players", id.as_str()))
        .unwrap()
        .unwrap();
    assert!(!text.contains('\n'));
}
