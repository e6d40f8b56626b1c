//! Action executor interface.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::character::CharacterState;

/// A single remote action. Exactly one may be in flight per character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Move { x: i32, y: i32 },
    Rest,
    Fight,
    Gather,
    Craft { code: String, quantity: u32 },
    Recycle { code: String, quantity: u32 },
    Equip { code: String, slot: String, quantity: u32 },
    Unequip { slot: String, quantity: u32 },
    DeleteItem { code: String, quantity: u32 },
    DepositItem { code: String, quantity: u32 },
    DepositGold { quantity: u64 },
    WithdrawItem { code: String, quantity: u32 },
    WithdrawGold { quantity: u64 },
    BuyBankExpansion,
    Buy { code: String, quantity: u32 },
    Sell { code: String, quantity: u32 },
    AcceptTask,
    TaskTrade { code: String, quantity: u32 },
    CompleteTask,
}

impl Action {
    /// Short name used in logs and request paths.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Move { .. } => "move",
            Self::Rest => "rest",
            Self::Fight => "fight",
            Self::Gather => "gathering",
            Self::Craft { .. } => "crafting",
            Self::Recycle { .. } => "recycling",
            Self::Equip { .. } => "equip",
            Self::Unequip { .. } => "unequip",
            Self::DeleteItem { .. } => "delete",
            Self::DepositItem { .. } => "bank/deposit/item",
            Self::DepositGold { .. } => "bank/deposit/gold",
            Self::WithdrawItem { .. } => "bank/withdraw/item",
            Self::WithdrawGold { .. } => "bank/withdraw/gold",
            Self::BuyBankExpansion => "bank/buy_expansion",
            Self::Buy { .. } => "npc/buy",
            Self::Sell { .. } => "npc/sell",
            Self::AcceptTask => "task/new",
            Self::TaskTrade { .. } => "task/trade",
            Self::CompleteTask => "task/complete",
        }
    }
}

/// Mandatory wait before the next action may be attempted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cooldown {
    pub duration: Duration,
    pub reason: String,
}

impl Cooldown {
    pub fn new(duration: Duration, reason: impl Into<String>) -> Self {
        Self {
            duration,
            reason: reason.into(),
        }
    }
}

/// Result of a fight action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FightResult {
    Win,
    Loss,
}

/// Successful action result.
#[derive(Debug, Clone)]
pub struct ActionResult {
    /// Character state after the action.
    pub character: CharacterState,
    pub cooldown: Cooldown,
    /// Present for fight actions.
    pub fight: Option<FightResult>,
}

/// Closed taxonomy of action failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Target code or location does not exist.
    NotFound,
    /// Another action is already pending for the character.
    ActionInProgress,
    /// Missing materials, gold, level or space.
    InsufficientResources,
    /// Character is on cooldown or the API is throttling.
    RateLimited,
    /// Network or server fault, or anything unclassified.
    Unknown,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotFound => "not_found",
            Self::ActionInProgress => "action_in_progress",
            Self::InsufficientResources => "insufficient_resources",
            Self::RateLimited => "rate_limited",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// Classified action failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ActionError {
    pub kind: ErrorKind,
    pub message: String,
    /// Wait signaled by the service before retrying, if any.
    pub cooldown: Option<Duration>,
}

impl ActionError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            cooldown: None,
        }
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = Some(cooldown);
        self
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn insufficient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InsufficientResources, message)
    }
}

impl From<crate::error::ApiError> for ActionError {
    fn from(err: crate::error::ApiError) -> Self {
        Self::new(ErrorKind::Unknown, err.to_string())
    }
}

/// Executes remote actions for a named character.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Perform one action. On success the returned cooldown must elapse before
    /// the next action.
    async fn execute(&self, character: &str, action: &Action) -> Result<ActionResult, ActionError>;

    /// Fetch the current character state without acting.
    async fn character(&self, name: &str) -> Result<CharacterState, ActionError>;
}
