//! HTTP client for the remote game API.
//!
//! Implements [`ActionExecutor`] and [`Catalog`]. Non-2xx responses are mapped
//! onto the closed [`ErrorKind`] taxonomy by status code.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::SimpleItem;
use super::action::{
    Action, ActionError, ActionExecutor, ActionResult, Cooldown, ErrorKind, FightResult,
};
use super::catalog::{
    BankDetails, Catalog, CraftInfo, DropRate, ItemFilter, ItemInfo, MapTile, MonsterFilter,
    MonsterInfo, Page, ResourceFilter, ResourceInfo,
};
use super::character::{CharacterState, CombatStats, Elements, InventorySlot, Skill, TaskState};
use crate::error::{self, ApiError};

const PAGE_SIZE: u32 = 100;

const EQUIPMENT_SLOTS: &[&str] = &[
    "weapon",
    "shield",
    "helmet",
    "body_armor",
    "leg_armor",
    "boots",
    "ring1",
    "ring2",
    "amulet",
    "artifact1",
    "artifact2",
    "artifact3",
    "utility1",
    "utility2",
];

/// Map an API status code onto the error taxonomy.
pub fn classify_status(status: u16) -> ErrorKind {
    match status {
        404 | 598 => ErrorKind::NotFound,
        486 => ErrorKind::ActionInProgress,
        429 | 499 => ErrorKind::RateLimited,
        473..=478 | 483..=485 | 487..=489 | 491..=493 | 496 | 497 => {
            ErrorKind::InsufficientResources
        }
        _ => ErrorKind::Unknown,
    }
}

/// Pull the first decimal number out of a message such as
/// `"Character in cooldown: 12.5 seconds left."`.
fn parse_remaining_seconds(message: &str) -> Option<Duration> {
    let start = message.find(|c: char| c.is_ascii_digit())?;
    let number: String = message[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    number
        .parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
}

pub struct GameClient {
    token: String,
    client: Client,
    base_url: String,
}

impl GameClient {
    /// Create a client pointing at `base_url` (no trailing slash).
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> error::Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(ApiError::from)?;
        Ok(Self {
            token: token.into(),
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ActionError> {
        let response = self
            .client
            .get(format!("{}{path}", self.base_url))
            .bearer_auth(&self.token)
            .query(query)
            .send()
            .await
            .map_err(ApiError::from)?;
        Self::decode(response).await
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T, ActionError> {
        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::from)?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ActionError> {
        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| ApiError::Parse(e.to_string()).into());
        }

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs);
        let message = match response.json::<ErrorEnvelope>().await {
            Ok(envelope) => envelope.error.message,
            Err(_) => status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_string(),
        };

        let kind = classify_status(status.as_u16());
        let mut err = ActionError::new(kind, format!("HTTP {}: {message}", status.as_u16()));
        if kind == ErrorKind::RateLimited {
            let wait = if status == StatusCode::TOO_MANY_REQUESTS {
                retry_after
            } else {
                parse_remaining_seconds(&message)
            };
            if let Some(wait) = wait {
                err = err.with_cooldown(wait);
            }
        }
        Err(err)
    }
}

fn action_body(action: &Action) -> serde_json::Value {
    use serde_json::json;
    match action {
        Action::Move { x, y } => json!({ "x": x, "y": y }),
        Action::Craft { code, quantity }
        | Action::Recycle { code, quantity }
        | Action::DeleteItem { code, quantity }
        | Action::DepositItem { code, quantity }
        | Action::WithdrawItem { code, quantity }
        | Action::Buy { code, quantity }
        | Action::Sell { code, quantity }
        | Action::TaskTrade { code, quantity } => json!({ "code": code, "quantity": quantity }),
        Action::Equip {
            code,
            slot,
            quantity,
        } => json!({ "code": code, "slot": slot, "quantity": quantity }),
        Action::Unequip { slot, quantity } => json!({ "slot": slot, "quantity": quantity }),
        Action::DepositGold { quantity } | Action::WithdrawGold { quantity } => {
            json!({ "quantity": quantity })
        }
        Action::Rest
        | Action::Fight
        | Action::Gather
        | Action::BuyBankExpansion
        | Action::AcceptTask
        | Action::CompleteTask => json!({}),
    }
}

#[async_trait]
impl ActionExecutor for GameClient {
    async fn execute(&self, character: &str, action: &Action) -> Result<ActionResult, ActionError> {
        tracing::debug!(character, action = action.name(), "Executing action");
        let envelope: Envelope<ActionData> = self
            .post(
                &format!("/my/{character}/action/{}", action.name()),
                action_body(action),
            )
            .await?;
        let data = envelope.data;
        Ok(ActionResult {
            character: data.character.into(),
            cooldown: Cooldown::new(
                Duration::from_secs_f64(data.cooldown.total_seconds.max(0.0)),
                data.cooldown.reason,
            ),
            fight: data.fight.map(|f| {
                if f.result == "win" {
                    FightResult::Win
                } else {
                    FightResult::Loss
                }
            }),
        })
    }

    async fn character(&self, name: &str) -> Result<CharacterState, ActionError> {
        let envelope: Envelope<WireCharacter> =
            self.get(&format!("/characters/{name}"), &[]).await?;
        Ok(envelope.data.into())
    }
}

fn push_opt(query: &mut Vec<(&'static str, String)>, key: &'static str, value: Option<String>) {
    if let Some(value) = value {
        query.push((key, value));
    }
}

fn paging(page: u32) -> Vec<(&'static str, String)> {
    vec![("page", page.to_string()), ("size", PAGE_SIZE.to_string())]
}

#[async_trait]
impl Catalog for GameClient {
    async fn item(&self, code: &str) -> Result<ItemInfo, ActionError> {
        let envelope: Envelope<WireItem> = self.get(&format!("/items/{code}"), &[]).await?;
        Ok(envelope.data.into())
    }

    async fn items(&self, filter: &ItemFilter, page: u32) -> Result<Page<ItemInfo>, ActionError> {
        let mut query = paging(page);
        push_opt(&mut query, "craft_skill", filter.craft_skill.map(|s| s.to_string()));
        push_opt(&mut query, "craft_material", filter.craft_material.clone());
        push_opt(&mut query, "type", filter.item_type.clone());
        push_opt(&mut query, "min_level", filter.min_level.map(|l| l.to_string()));
        push_opt(&mut query, "max_level", filter.max_level.map(|l| l.to_string()));
        let paged: Paged<WireItem> = self.get("/items", &query).await?;
        Ok(paged.into_page())
    }

    async fn resources(
        &self,
        filter: &ResourceFilter,
        page: u32,
    ) -> Result<Page<ResourceInfo>, ActionError> {
        let mut query = paging(page);
        push_opt(&mut query, "skill", filter.skill.map(|s| s.to_string()));
        push_opt(&mut query, "drop", filter.drop.clone());
        push_opt(&mut query, "min_level", filter.min_level.map(|l| l.to_string()));
        push_opt(&mut query, "max_level", filter.max_level.map(|l| l.to_string()));
        let paged: Paged<ResourceInfo> = self.get("/resources", &query).await?;
        Ok(paged.into_page())
    }

    async fn monster(&self, code: &str) -> Result<MonsterInfo, ActionError> {
        let envelope: Envelope<WireMonster> = self.get(&format!("/monsters/{code}"), &[]).await?;
        Ok(envelope.data.into())
    }

    async fn monsters(
        &self,
        filter: &MonsterFilter,
        page: u32,
    ) -> Result<Page<MonsterInfo>, ActionError> {
        let mut query = paging(page);
        push_opt(&mut query, "drop", filter.drop.clone());
        push_opt(&mut query, "min_level", filter.min_level.map(|l| l.to_string()));
        push_opt(&mut query, "max_level", filter.max_level.map(|l| l.to_string()));
        let paged: Paged<WireMonster> = self.get("/monsters", &query).await?;
        Ok(paged.into_page())
    }

    async fn maps(
        &self,
        content_type: &str,
        content_code: Option<&str>,
    ) -> Result<Vec<MapTile>, ActionError> {
        let mut tiles = Vec::new();
        let mut page = 1;
        loop {
            let mut query = paging(page);
            query.push(("content_type", content_type.to_string()));
            push_opt(&mut query, "content_code", content_code.map(str::to_string));
            let paged: Paged<WireMap> = self.get("/maps", &query).await?;
            let last = paged.page.unwrap_or(1) >= paged.pages.unwrap_or(1);
            tiles.extend(paged.data.into_iter().filter_map(WireMap::into_tile));
            if last {
                return Ok(tiles);
            }
            page += 1;
        }
    }

    async fn bank_details(&self) -> Result<BankDetails, ActionError> {
        let envelope: Envelope<BankDetails> = self.get("/my/bank", &[]).await?;
        Ok(envelope.data)
    }

    async fn bank_items(&self, page: u32) -> Result<Page<SimpleItem>, ActionError> {
        let paged: Paged<SimpleItem> = self.get("/my/bank/items", &paging(page)).await?;
        Ok(paged.into_page())
    }
}

// ── Wire formats ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct Paged<T> {
    data: Vec<T>,
    #[serde(default)]
    page: Option<u32>,
    #[serde(default)]
    pages: Option<u32>,
}

impl<T> Paged<T> {
    fn into_page<U: From<T>>(self) -> Page<U> {
        Page {
            data: self.data.into_iter().map(U::from).collect(),
            page: self.page.unwrap_or(1),
            pages: self.pages.unwrap_or(1),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct WireCooldown {
    total_seconds: f64,
    #[serde(default)]
    reason: String,
}

#[derive(Debug, Deserialize)]
struct WireFight {
    result: String,
}

#[derive(Debug, Deserialize)]
struct ActionData {
    cooldown: WireCooldown,
    character: WireCharacter,
    #[serde(default)]
    fight: Option<WireFight>,
}

#[derive(Debug, Deserialize)]
struct WireSlot {
    #[serde(default)]
    code: String,
    #[serde(default)]
    quantity: u32,
}

/// Flat character schema as served by the API.
#[derive(Debug, Deserialize)]
struct WireCharacter {
    name: String,
    #[serde(default)]
    level: u32,
    #[serde(default)]
    gold: u64,
    #[serde(default)]
    hp: i64,
    #[serde(default)]
    max_hp: i64,
    #[serde(default)]
    x: i32,
    #[serde(default)]
    y: i32,
    #[serde(default)]
    inventory_max_items: u32,
    #[serde(default)]
    inventory: Vec<WireSlot>,
    #[serde(default)]
    task: String,
    #[serde(default)]
    task_type: String,
    #[serde(default)]
    task_progress: u32,
    #[serde(default)]
    task_total: u32,
    #[serde(default)]
    cooldown_expiration: Option<DateTime<Utc>>,
    /// Skill levels, stats and `*_slot` fields.
    #[serde(flatten)]
    rest: BTreeMap<String, serde_json::Value>,
}

impl WireCharacter {
    fn int(&self, key: &str) -> i64 {
        self.rest.get(key).and_then(|v| v.as_i64()).unwrap_or(0)
    }

    fn elements(&self, prefix: &str) -> Elements {
        Elements::new(
            self.int(&format!("{prefix}_fire")),
            self.int(&format!("{prefix}_earth")),
            self.int(&format!("{prefix}_water")),
            self.int(&format!("{prefix}_air")),
        )
    }
}

impl From<WireCharacter> for CharacterState {
    fn from(wire: WireCharacter) -> Self {
        let skills = [
            Skill::Mining,
            Skill::Woodcutting,
            Skill::Fishing,
            Skill::Alchemy,
            Skill::Weaponcrafting,
            Skill::Gearcrafting,
            Skill::Jewelrycrafting,
            Skill::Cooking,
        ]
        .into_iter()
        .map(|skill| (skill, wire.int(&format!("{skill}_level")).max(1) as u32))
        .collect();

        let equipment = EQUIPMENT_SLOTS
            .iter()
            .map(|slot| {
                let code = wire
                    .rest
                    .get(&format!("{slot}_slot"))
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                (slot.to_string(), code)
            })
            .collect();

        let stats = CombatStats {
            max_hp: wire.max_hp,
            attack: wire.elements("attack"),
            damage: wire.elements("dmg"),
            resistance: wire.elements("res"),
        };

        let task = (!wire.task.is_empty()).then(|| TaskState {
            code: wire.task.clone(),
            task_type: wire.task_type.clone(),
            progress: wire.task_progress,
            total: wire.task_total,
        });

        CharacterState {
            name: wire.name,
            level: wire.level,
            gold: wire.gold,
            hp: wire.hp,
            x: wire.x,
            y: wire.y,
            skills,
            stats,
            inventory: wire
                .inventory
                .into_iter()
                .filter(|slot| !slot.code.is_empty())
                .map(|slot| InventorySlot {
                    code: slot.code,
                    quantity: slot.quantity,
                })
                .collect(),
            inventory_max_items: wire.inventory_max_items,
            equipment,
            task,
            cooldown_expiration: wire.cooldown_expiration,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireItem {
    code: String,
    level: u32,
    #[serde(rename = "type")]
    item_type: String,
    #[serde(default)]
    craft: Option<CraftInfo>,
}

impl From<WireItem> for ItemInfo {
    fn from(wire: WireItem) -> Self {
        ItemInfo {
            code: wire.code,
            level: wire.level,
            item_type: wire.item_type,
            craft: wire.craft,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireMonster {
    code: String,
    level: u32,
    hp: i64,
    #[serde(default)]
    drops: Vec<DropRate>,
    #[serde(flatten)]
    rest: BTreeMap<String, serde_json::Value>,
}

impl From<WireMonster> for MonsterInfo {
    fn from(wire: WireMonster) -> Self {
        let int = |key: &str| wire.rest.get(key).and_then(|v| v.as_i64()).unwrap_or(0);
        MonsterInfo {
            attack: Elements::new(
                int("attack_fire"),
                int("attack_earth"),
                int("attack_water"),
                int("attack_air"),
            ),
            resistance: Elements::new(
                int("res_fire"),
                int("res_earth"),
                int("res_water"),
                int("res_air"),
            ),
            code: wire.code,
            level: wire.level,
            hp: wire.hp,
            drops: wire.drops,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireContent {
    #[serde(rename = "type")]
    content_type: String,
    code: String,
}

#[derive(Debug, Deserialize)]
struct WireMap {
    x: i32,
    y: i32,
    #[serde(default)]
    content: Option<WireContent>,
}

impl WireMap {
    fn into_tile(self) -> Option<MapTile> {
        let content = self.content?;
        Some(MapTile {
            x: self.x,
            y: self.y,
            content_type: content.content_type,
            content_code: content.code,
        })
    }
}
