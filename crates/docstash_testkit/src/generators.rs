//! Property-based test generators using proptest.
//!
//! Provides strategies for generating records and operation sequences, and a
//! reference model the database must agree with after any sequence.

use crate::records::Player;
use docstash_core::{CoreResult, Database};
use proptest::prelude::*;
use std::collections::BTreeMap;

/// Number of distinct player ids the operation strategies use.
pub const SLOTS: usize = 8;

/// Strategy for generating player names.
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,11}").expect("Invalid regex")
}

/// Strategy for generating players without an id.
pub fn player_strategy() -> impl Strategy<Value = Player> {
    (
        name_strategy(),
        0u32..100,
        -1000i64..1000,
        prop::collection::vec(name_strategy(), 0..4),
        prop::option::of(name_strategy()),
    )
        .prop_map(|(name, level, health, inventory, guild)| Player {
            id: String::new(),
            name,
            level,
            health,
            inventory,
            guild,
        })
}

/// One step of a generated workload.
#[derive(Debug, Clone)]
pub enum Op {
    /// Insert (or replace) the player in a slot.
    Insert {
        /// Slot index, see [`slot_id`].
        slot: usize,
        /// Level to store.
        level: u32,
    },
    /// Delete the player in a slot, if present.
    Delete {
        /// Slot index.
        slot: usize,
    },
    /// Run one scheduled tick.
    Tick,
    /// Write everything stale.
    Flush,
}

/// Strategy for generating a single operation.
pub fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..SLOTS, 0u32..1000).prop_map(|(slot, level)| Op::Insert { slot, level }),
        2 => (0..SLOTS).prop_map(|slot| Op::Delete { slot }),
        1 => Just(Op::Tick),
        1 => Just(Op::Flush),
    ]
}

/// Strategy for generating operation sequences.
pub fn op_sequence_strategy(max_len: usize) -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(op_strategy(), 1..max_len)
}

/// The id used for a slot.
pub fn slot_id(slot: usize) -> String {
    format!("player-{slot}")
}

/// Expected contents of the `players` collection: id → level.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Model {
    players: BTreeMap<String, u32>,
}

impl Model {
    /// Creates an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one operation to the model.
    pub fn apply(&mut self, op: &Op) {
        match op {
            Op::Insert { slot, level } => {
                self.players.insert(slot_id(*slot), *level);
            }
            Op::Delete { slot } => {
                self.players.remove(&slot_id(*slot));
            }
            Op::Tick | Op::Flush => {}
        }
    }

    /// Returns the expected players.
    pub fn players(&self) -> &BTreeMap<String, u32> {
        &self.players
    }
}

/// Applies one operation to a database.
///
/// # Errors
///
/// Propagates the database's error.
pub fn apply_op(db: &Database, op: &Op) -> CoreResult<()> {
    match op {
        Op::Insert { slot, level } => {
            let mut player = Player {
                id: slot_id(*slot),
                name: format!("p{slot}"),
                level: *level,
                ..Player::default()
            };
            db.insert(&mut player)?;
        }
        Op::Delete { slot } => {
            let id = slot_id(*slot);
            db.delete(|p: &Player| p.id == id)?;
        }
        Op::Tick => {
            db.tick()?;
        }
        Op::Flush => {
            db.force_full_write()?;
        }
    }
    Ok(())
}

/// Returns what the database holds, in the model's shape.
///
/// # Errors
///
/// Propagates the database's error.
pub fn observe(db: &Database) -> CoreResult<BTreeMap<String, u32>> {
    Ok(db
        .select(|_: &Player| true)?
        .into_iter()
        .map(|player| (player.id, player.level))
        .collect())
}
