//! Read-only catalog oracles.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::SimpleItem;
use super::action::ActionError;
use super::character::{Elements, Skill};

/// One page of a paged lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub page: u32,
    pub pages: u32,
}

impl<T> Page<T> {
    pub fn single(data: Vec<T>) -> Self {
        Self {
            data,
            page: 1,
            pages: 1,
        }
    }

    pub fn is_last(&self) -> bool {
        self.page >= self.pages
    }
}

/// Crafting recipe of an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CraftInfo {
    pub skill: Skill,
    pub level: u32,
    pub items: Vec<SimpleItem>,
    /// Units produced per craft.
    #[serde(default = "one")]
    pub quantity: u32,
}

fn one() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemInfo {
    pub code: String,
    pub level: u32,
    /// `weapon`, `resource`, `consumable`, ...
    pub item_type: String,
    #[serde(default)]
    pub craft: Option<CraftInfo>,
}

impl ItemInfo {
    const GEAR_TYPES: &'static [&'static str] = &[
        "weapon",
        "shield",
        "helmet",
        "body_armor",
        "leg_armor",
        "boots",
        "ring",
        "amulet",
    ];

    /// Wearable equipment.
    pub fn is_gear(&self) -> bool {
        Self::GEAR_TYPES.contains(&self.item_type.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropRate {
    pub code: String,
    /// One in `rate` chance per action.
    pub rate: u32,
    pub min_quantity: u32,
    pub max_quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceInfo {
    pub code: String,
    pub skill: Skill,
    pub level: u32,
    #[serde(default)]
    pub drops: Vec<DropRate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonsterInfo {
    pub code: String,
    pub level: u32,
    pub hp: i64,
    #[serde(default)]
    pub attack: Elements,
    #[serde(default)]
    pub resistance: Elements,
    #[serde(default)]
    pub drops: Vec<DropRate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapTile {
    pub x: i32,
    pub y: i32,
    /// `monster`, `resource`, `workshop`, `bank`, `tasks_master`, ...
    pub content_type: String,
    pub content_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankDetails {
    pub slots: u32,
    pub expansions: u32,
    pub next_expansion_cost: u64,
    pub gold: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemFilter {
    pub craft_skill: Option<Skill>,
    pub craft_material: Option<String>,
    pub item_type: Option<String>,
    pub min_level: Option<u32>,
    pub max_level: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceFilter {
    pub skill: Option<Skill>,
    pub drop: Option<String>,
    pub min_level: Option<u32>,
    pub max_level: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonsterFilter {
    pub drop: Option<String>,
    pub min_level: Option<u32>,
    pub max_level: Option<u32>,
}

/// Metadata lookups. Unknown codes yield an `ErrorKind::NotFound` error.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn item(&self, code: &str) -> Result<ItemInfo, ActionError>;

    async fn items(&self, filter: &ItemFilter, page: u32) -> Result<Page<ItemInfo>, ActionError>;

    async fn resources(
        &self,
        filter: &ResourceFilter,
        page: u32,
    ) -> Result<Page<ResourceInfo>, ActionError>;

    async fn monster(&self, code: &str) -> Result<MonsterInfo, ActionError>;

    async fn monsters(
        &self,
        filter: &MonsterFilter,
        page: u32,
    ) -> Result<Page<MonsterInfo>, ActionError>;

    /// Map tiles holding the given content.
    async fn maps(
        &self,
        content_type: &str,
        content_code: Option<&str>,
    ) -> Result<Vec<MapTile>, ActionError>;

    async fn bank_details(&self) -> Result<BankDetails, ActionError>;

    async fn bank_items(&self, page: u32) -> Result<Page<SimpleItem>, ActionError>;

    /// Every page of `items`.
    async fn all_items(&self, filter: &ItemFilter) -> Result<Vec<ItemInfo>, ActionError> {
        let mut out = Vec::new();
        let mut page = 1;
        loop {
            let batch = self.items(filter, page).await?;
            let last = batch.is_last();
            out.extend(batch.data);
            if last {
                return Ok(out);
            }
            page += 1;
        }
    }

    /// Every page of `resources`.
    async fn all_resources(&self, filter: &ResourceFilter) -> Result<Vec<ResourceInfo>, ActionError> {
        let mut out = Vec::new();
        let mut page = 1;
        loop {
            let batch = self.resources(filter, page).await?;
            let last = batch.is_last();
            out.extend(batch.data);
            if last {
                return Ok(out);
            }
            page += 1;
        }
    }

    /// Every page of `monsters`.
    async fn all_monsters(&self, filter: &MonsterFilter) -> Result<Vec<MonsterInfo>, ActionError> {
        let mut out = Vec::new();
        let mut page = 1;
        loop {
            let batch = self.monsters(filter, page).await?;
            let last = batch.is_last();
            out.extend(batch.data);
            if last {
                return Ok(out);
            }
            page += 1;
        }
    }

    /// Every page of `bank_items`.
    async fn all_bank_items(&self) -> Result<Vec<SimpleItem>, ActionError> {
        let mut out = Vec::new();
        let mut page = 1;
        loop {
            let batch = self.bank_items(page).await?;
            let last = batch.is_last();
            out.extend(batch.data);
            if last {
                return Ok(out);
            }
            page += 1;
        }
    }
}
