//! Objective records — the persisted, introspectable half of a job.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::{FailureCause, ObjectiveStatus};
use crate::error::JobError;
use crate::game::Skill;

/// `deposit` target code that empties the whole inventory.
pub const DEPOSIT_ALL: &str = "all";
/// Target code addressing gold instead of an item.
pub const GOLD: &str = "gold";

/// Stable arena key, assigned from a per-queue sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobKey(pub u64);

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which variant logic runs for an objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveKind {
    Fight,
    Gather,
    Craft,
    Deposit,
    Withdraw,
    ExpandBank,
    Trade,
    TrainSkill,
    ItemTask,
    MonsterTask,
    TidyBank,
    Recycle,
    Unequip,
    DeleteItem,
    Idle,
}

impl ObjectiveKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fight => "fight",
            Self::Gather => "gather",
            Self::Craft => "craft",
            Self::Deposit => "deposit",
            Self::Withdraw => "withdraw",
            Self::ExpandBank => "expand_bank",
            Self::Trade => "trade",
            Self::TrainSkill => "train_skill",
            Self::ItemTask => "item_task",
            Self::MonsterTask => "monster_task",
            Self::TidyBank => "tidy_bank",
            Self::Recycle => "recycle",
            Self::Unequip => "unequip",
            Self::DeleteItem => "delete_item",
            Self::Idle => "idle",
        }
    }

    /// Kinds whose progress counts units toward `target.quantity`.
    pub fn is_counting(&self) -> bool {
        matches!(
            self,
            Self::Fight
                | Self::Gather
                | Self::Craft
                | Self::Withdraw
                | Self::Trade
                | Self::ItemTask
                | Self::MonsterTask
                | Self::Recycle
                | Self::DeleteItem
        )
    }
}

impl fmt::Display for ObjectiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectiveKind {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.trim().to_string())).map_err(|_| {
            JobError::InvalidTarget {
                kind: s.to_string(),
                reason: "unknown objective kind".to_string(),
            }
        })
    }
}

/// Direction of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeSide {
    Buy,
    Sell,
}

/// What an objective drives toward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub code: String,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trade: Option<TradeSide>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill: Option<Skill>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<String>,
}

impl Target {
    pub fn new(code: impl Into<String>, quantity: u32) -> Self {
        Self {
            code: code.into(),
            quantity,
            trade: None,
            skill: None,
            slot: None,
        }
    }

    /// Raise `skill` to `level`.
    pub fn skill_level(skill: Skill, level: u32) -> Self {
        Self {
            skill: Some(skill),
            ..Self::new(skill.as_str(), level)
        }
    }

    /// Empty the whole inventory into the bank.
    pub fn deposit_all() -> Self {
        Self::new(DEPOSIT_ALL, 0)
    }

    pub fn with_trade(mut self, side: TradeSide) -> Self {
        self.trade = Some(side);
        self
    }

    pub fn with_slot(mut self, slot: impl Into<String>) -> Self {
        self.slot = Some(slot.into());
        self
    }

    /// Check the payload carries what `kind` needs.
    pub fn validate(&self, kind: ObjectiveKind) -> Result<(), JobError> {
        let invalid = |reason: &str| {
            Err(JobError::InvalidTarget {
                kind: kind.to_string(),
                reason: reason.to_string(),
            })
        };
        match kind {
            ObjectiveKind::ExpandBank | ObjectiveKind::TidyBank | ObjectiveKind::Idle => Ok(()),
            ObjectiveKind::Deposit if self.code.is_empty() => invalid("code is required"),
            ObjectiveKind::Deposit => Ok(()),
            ObjectiveKind::TrainSkill if self.skill.is_none() => invalid("skill is required"),
            ObjectiveKind::TrainSkill if self.quantity == 0 => invalid("target level is required"),
            ObjectiveKind::TrainSkill => Ok(()),
            ObjectiveKind::Unequip if self.slot.as_deref().is_none_or(str::is_empty) => {
                invalid("slot is required")
            }
            ObjectiveKind::Unequip => Ok(()),
            ObjectiveKind::Trade if self.trade.is_none() => invalid("trade side is required"),
            ObjectiveKind::ItemTask | ObjectiveKind::MonsterTask if self.quantity == 0 => {
                invalid("quantity must be positive")
            }
            ObjectiveKind::ItemTask | ObjectiveKind::MonsterTask => Ok(()),
            _ if self.code.is_empty() => invalid("code is required"),
            _ if self.quantity == 0 => invalid("quantity must be positive"),
            _ => Ok(()),
        }
    }
}

/// Derive an objective id: kind and target, suffixed with the queue sequence so
/// two identical goals never share an id.
pub fn derive_id(kind: ObjectiveKind, target: &Target, key: JobKey) -> String {
    if target.code.is_empty() {
        format!("{kind}#{key}")
    } else {
        format!("{kind}_{}_{}#{key}", target.quantity, target.code)
    }
}

/// Persisted and introspected state of one objective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveRecord {
    pub key: JobKey,
    pub id: String,
    pub kind: ObjectiveKind,
    pub target: Target,
    pub status: ObjectiveStatus,
    pub progress: u32,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub error: Option<FailureCause>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ObjectiveRecord {
    pub fn new(key: JobKey, kind: ObjectiveKind, target: Target, parent_id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            key,
            id: derive_id(kind, &target, key),
            kind,
            target,
            status: ObjectiveStatus::NotStarted,
            progress: 0,
            parent_id,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Store progress, clamped to the target for counting kinds.
    pub fn set_progress(&mut self, progress: u32) {
        self.progress = if self.kind.is_counting() {
            progress.min(self.target.quantity)
        } else {
            progress
        };
        self.updated_at = Utc::now();
    }

    /// Units still to do for counting kinds.
    pub fn remaining(&self) -> u32 {
        self.target.quantity.saturating_sub(self.progress)
    }
}

/// `{id, parent_id, status}` row of the control surface.
///
/// Only one objective sends actions at a time. An `in_progress` row with
/// `suspended` set is a parent waiting on its inline child.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: String,
    pub parent_id: Option<String>,
    pub status: ObjectiveStatus,
    #[serde(default)]
    pub suspended: bool,
}

impl From<&ObjectiveRecord> for JobSummary {
    fn from(record: &ObjectiveRecord) -> Self {
        Self {
            id: record.id.clone(),
            parent_id: record.parent_id.clone(),
            status: record.status,
            suspended: false,
        }
    }
}
