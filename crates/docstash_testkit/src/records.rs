//! Sample record types.
//!
//! [`Player`] and [`PlayerV2`] share the stable name `"Player"` and the
//! `players` collection: `PlayerV2` is what `Player` looks like after an
//! application drops most of its fields. Register only one of them per
//! catalog.

use docstash_core::{PropertyCatalog, Record, Schema};
use uuid::Uuid;

/// A game player with a string id.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Player {
    /// Identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Level.
    pub level: u32,
    /// Hit points.
    pub health: i64,
    /// Item labels.
    pub inventory: Vec<String>,
    /// Guild, if any.
    pub guild: Option<String>,
}

impl Player {
    /// Creates a level 1 player without an id.
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            level: 1,
            health: 100,
            ..Self::default()
        }
    }

    /// Sets the level.
    #[must_use]
    pub fn with_level(mut self, level: u32) -> Self {
        self.level = level;
        self
    }
}

impl Record for Player {
    fn schema() -> Schema<Self> {
        Schema::<Self>::new("Player")
            .collection("players")
            .id("id", |p| &p.id, |p| &mut p.id)
            .field("name", |p| &p.name, |p| &mut p.name)
            .field("level", |p| &p.level, |p| &mut p.level)
            .field("health", |p| &p.health, |p| &mut p.health)
            .field("inventory", |p| &p.inventory, |p| &mut p.inventory)
            .field("guild", |p| &p.guild, |p| &mut p.guild)
    }
}

/// The narrowed version of [`Player`]: only id, name and level remain.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PlayerV2 {
    /// Identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Level.
    pub level: u32,
}

impl Record for PlayerV2 {
    fn schema() -> Schema<Self> {
        Schema::<Self>::new("Player")
            .collection("players")
            .id("id", |p| &p.id, |p| &mut p.id)
            .field("name", |p| &p.name, |p| &mut p.name)
            .field("level", |p| &p.level, |p| &mut p.level)
    }
}

/// An item keyed by UUID.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Item {
    /// Identifier; nil means unassigned.
    pub id: Uuid,
    /// Label.
    pub label: String,
    /// Weight in kilograms.
    pub weight: f64,
}

impl Item {
    /// Creates an item without an id.
    pub fn new(label: &str, weight: f64) -> Self {
        Self {
            id: Uuid::nil(),
            label: label.to_string(),
            weight,
        }
    }
}

impl Record for Item {
    fn schema() -> Schema<Self> {
        Schema::<Self>::new("Item")
            .collection("items")
            .id("id", |i| &i.id, |i| &mut i.id)
            .field("label", |i| &i.label, |i| &mut i.label)
            .field("weight", |i| &i.weight, |i| &mut i.weight)
    }
}

/// A catalog knowing [`Player`] and [`Item`].
pub fn player_catalog() -> PropertyCatalog {
    PropertyCatalog::new()
        .with::<Player>()
        .and_then(|catalog| catalog.with::<Item>())
        .expect("sample types register cleanly")
}

/// A catalog knowing [`PlayerV2`] (as `"Player"`) and [`Item`].
pub fn player_v2_catalog() -> PropertyCatalog {
    PropertyCatalog::new()
        .with::<PlayerV2>()
        .and_then(|catalog| catalog.with::<Item>())
        .expect("sample types register cleanly")
}
