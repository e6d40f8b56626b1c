//! Character snapshot.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Skills a character can level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Skill {
    Combat,
    Mining,
    Woodcutting,
    Fishing,
    Alchemy,
    Weaponcrafting,
    Gearcrafting,
    Jewelrycrafting,
    Cooking,
}

impl Skill {
    /// Skills levelled by harvesting resources.
    pub fn is_gathering(&self) -> bool {
        matches!(
            self,
            Self::Mining | Self::Woodcutting | Self::Fishing | Self::Alchemy
        )
    }

    /// Skills levelled at a workshop.
    pub fn is_crafting(&self) -> bool {
        matches!(
            self,
            Self::Weaponcrafting
                | Self::Gearcrafting
                | Self::Jewelrycrafting
                | Self::Cooking
                | Self::Mining
                | Self::Woodcutting
                | Self::Alchemy
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Combat => "combat",
            Self::Mining => "mining",
            Self::Woodcutting => "woodcutting",
            Self::Fishing => "fishing",
            Self::Alchemy => "alchemy",
            Self::Weaponcrafting => "weaponcrafting",
            Self::Gearcrafting => "gearcrafting",
            Self::Jewelrycrafting => "jewelrycrafting",
            Self::Cooking => "cooking",
        }
    }
}

impl fmt::Display for Skill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Skill {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let skill = match s.trim().to_lowercase().as_str() {
            "combat" => Self::Combat,
            "mining" => Self::Mining,
            "woodcutting" => Self::Woodcutting,
            "fishing" => Self::Fishing,
            "alchemy" => Self::Alchemy,
            "weaponcrafting" => Self::Weaponcrafting,
            "gearcrafting" => Self::Gearcrafting,
            "jewelrycrafting" => Self::Jewelrycrafting,
            "cooking" => Self::Cooking,
            other => return Err(format!("unknown skill {other}")),
        };
        Ok(skill)
    }
}

/// Per-element combat values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Elements {
    #[serde(default)]
    pub fire: i64,
    #[serde(default)]
    pub earth: i64,
    #[serde(default)]
    pub water: i64,
    #[serde(default)]
    pub air: i64,
}

impl Elements {
    pub fn new(fire: i64, earth: i64, water: i64, air: i64) -> Self {
        Self {
            fire,
            earth,
            water,
            air,
        }
    }

    pub fn values(&self) -> [i64; 4] {
        [self.fire, self.earth, self.water, self.air]
    }
}

/// Combat-relevant stats of a character with its current gear.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatStats {
    #[serde(default)]
    pub max_hp: i64,
    #[serde(default)]
    pub attack: Elements,
    /// Percent damage bonus per element.
    #[serde(default)]
    pub damage: Elements,
    /// Percent resistance per element.
    #[serde(default)]
    pub resistance: Elements,
}

/// One inventory stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventorySlot {
    pub code: String,
    pub quantity: u32,
}

/// The task-board contract a character currently holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskState {
    pub code: String,
    /// `items` or `monsters`.
    pub task_type: String,
    pub progress: u32,
    pub total: u32,
}

impl TaskState {
    pub fn is_done(&self) -> bool {
        self.progress >= self.total
    }

    pub fn remaining(&self) -> u32 {
        self.total.saturating_sub(self.progress)
    }
}

/// Latest known remote state of a character.
///
/// Replaced wholesale from every successful action result; objectives only
/// ever read it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CharacterState {
    pub name: String,
    #[serde(default)]
    pub level: u32,
    #[serde(default)]
    pub gold: u64,
    #[serde(default)]
    pub hp: i64,
    #[serde(default)]
    pub x: i32,
    #[serde(default)]
    pub y: i32,
    #[serde(default)]
    pub skills: BTreeMap<Skill, u32>,
    #[serde(default)]
    pub stats: CombatStats,
    #[serde(default)]
    pub inventory: Vec<InventorySlot>,
    #[serde(default)]
    pub inventory_max_items: u32,
    /// Equipment slot name → item code.
    #[serde(default)]
    pub equipment: BTreeMap<String, String>,
    #[serde(default)]
    pub task: Option<TaskState>,
    #[serde(default)]
    pub cooldown_expiration: Option<DateTime<Utc>>,
}

impl CharacterState {
    /// Level of a skill; combat uses the character level.
    pub fn skill_level(&self, skill: Skill) -> u32 {
        match skill {
            Skill::Combat => self.level,
            other => self.skills.get(&other).copied().unwrap_or(1),
        }
    }

    /// Held quantity of an item code.
    pub fn quantity_of(&self, code: &str) -> u32 {
        self.inventory
            .iter()
            .filter(|slot| slot.code == code)
            .map(|slot| slot.quantity)
            .sum()
    }

    /// Total units carried across all stacks.
    pub fn total_items(&self) -> u32 {
        self.inventory.iter().map(|slot| slot.quantity).sum()
    }

    pub fn free_space(&self) -> u32 {
        self.inventory_max_items.saturating_sub(self.total_items())
    }

    /// Fraction of carrying capacity in use.
    pub fn fill_ratio(&self) -> f64 {
        if self.inventory_max_items == 0 {
            return 1.0;
        }
        f64::from(self.total_items()) / f64::from(self.inventory_max_items)
    }

    /// Non-empty stacks, in inventory order.
    pub fn held_items(&self) -> impl Iterator<Item = &InventorySlot> {
        self.inventory
            .iter()
            .filter(|slot| !slot.code.is_empty() && slot.quantity > 0)
    }

    pub fn is_at(&self, x: i32, y: i32) -> bool {
        self.x == x && self.y == y
    }

    /// Item equipped in a slot, if any.
    pub fn equipped(&self, slot: &str) -> Option<&str> {
        self.equipment
            .get(slot)
            .map(String::as_str)
            .filter(|code| !code.is_empty())
    }
}
