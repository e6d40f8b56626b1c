//! Remote game interfaces — what the job core consumes.
//!
//! - `character` — the character snapshot and skills
//! - `action` — the action executor trait and its closed error taxonomy
//! - `catalog` — read-only metadata oracles (items, resources, monsters, maps, bank)
//! - `combat` — local fight forecast used before committing to a fight
//! - `client` — HTTP implementation of both traits

pub mod action;
pub mod catalog;
pub mod character;
pub mod client;
pub mod combat;

pub use action::{Action, ActionError, ActionExecutor, ActionResult, Cooldown, ErrorKind};
pub use catalog::{
    BankDetails, Catalog, CraftInfo, DropRate, ItemFilter, ItemInfo, MapTile, MonsterFilter,
    MonsterInfo, Page, ResourceFilter, ResourceInfo,
};
pub use character::{CharacterState, CombatStats, Elements, InventorySlot, Skill, TaskState};
pub use client::GameClient;
pub use combat::{FightForecast, simulate};

use serde::{Deserialize, Serialize};

/// An item code with a quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleItem {
    pub code: String,
    pub quantity: u32,
}

impl SimpleItem {
    pub fn new(code: impl Into<String>, quantity: u32) -> Self {
        Self {
            code: code.into(),
            quantity,
        }
    }
}
