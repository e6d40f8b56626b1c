//! Configuration types.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::game::Skill;

/// What a character does when its queue runs dry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", content = "skill", rename_all = "snake_case")]
pub enum CharacterRole {
    /// Completes monster tasks.
    Fighter,
    /// Trains a gathering skill.
    Gatherer(Skill),
    /// Trains a crafting skill.
    Crafter(Skill),
    /// Completes item tasks.
    Tasker,
}

impl FromStr for CharacterRole {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: "role".to_string(),
            message,
        };
        let (name, skill) = match s.split_once(':') {
            Some((name, skill)) => (name, Some(skill)),
            None => (s, None),
        };
        let parse_skill = |skill: Option<&str>| -> Result<Skill, ConfigError> {
            let skill = skill.ok_or_else(|| invalid(format!("role {name} needs a skill")))?;
            skill
                .parse::<Skill>()
                .map_err(|_| invalid(format!("unknown skill {skill}")))
        };
        match name.trim() {
            "fighter" => Ok(Self::Fighter),
            "tasker" => Ok(Self::Tasker),
            "gatherer" => {
                let skill = parse_skill(skill)?;
                if !skill.is_gathering() {
                    return Err(invalid(format!("{skill} is not a gathering skill")));
                }
                Ok(Self::Gatherer(skill))
            }
            "crafter" => {
                let skill = parse_skill(skill)?;
                if !skill.is_crafting() {
                    return Err(invalid(format!("{skill} is not a crafting skill")));
                }
                Ok(Self::Crafter(skill))
            }
            other => Err(invalid(format!("unknown role {other}"))),
        }
    }
}

/// A character managed by this runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterConfig {
    pub name: String,
    pub role: CharacterRole,
}

/// Runner configuration shared by every character worker.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Base URL of the remote game API.
    pub api_url: String,
    /// Bearer token for the remote game API.
    pub api_token: String,
    /// Characters to drive.
    pub characters: Vec<CharacterConfig>,
    /// Directory holding one queue snapshot per character.
    pub state_dir: PathBuf,
    /// Port of the control REST surface.
    pub http_port: u16,
    /// Attempt budget of every objective run loop.
    pub max_retries: u32,
    /// Base delay for backoff when an error carries no cooldown.
    pub retry_base_delay: Duration,
    /// Bank fullness ratio (items held / slots) that triggers an expansion.
    pub bank_full_ratio: f64,
    /// Minimum share of gold that must remain after buying an expansion.
    pub bank_gold_guard_ratio: f64,
    /// Copies of each piece of gear kept in the bank before recycling the rest.
    pub retain_gear_quantity: u32,
    /// Inventory fill ratio at which objectives deposit before working.
    pub inventory_full_ratio: f64,
    /// Units produced per inline child while training a skill.
    pub train_batch: u32,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.artifactsmmo.com".to_string(),
            api_token: String::new(),
            characters: Vec::new(),
            state_dir: PathBuf::from("./data/queues"),
            http_port: 8080,
            max_retries: 3,
            retry_base_delay: Duration::from_millis(1000),
            bank_full_ratio: 0.9,
            bank_gold_guard_ratio: 0.25,
            retain_gear_quantity: 5,
            inventory_full_ratio: 0.9,
            train_batch: 10,
        }
    }
}

impl RunnerConfig {
    /// Load configuration from `RUNNER_*` environment variables, falling back
    /// to defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let api_token = std::env::var("RUNNER_API_TOKEN")
            .map_err(|_| ConfigError::MissingEnvVar("RUNNER_API_TOKEN".to_string()))?;

        let characters = std::env::var("RUNNER_CHARACTERS")
            .map_err(|_| ConfigError::MissingEnvVar("RUNNER_CHARACTERS".to_string()))
            .and_then(|raw| parse_characters(&raw))?;

        Ok(Self {
            api_url: std::env::var("RUNNER_API_URL").unwrap_or(defaults.api_url),
            api_token,
            characters,
            state_dir: std::env::var("RUNNER_STATE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.state_dir),
            http_port: env_parse("RUNNER_HTTP_PORT", defaults.http_port)?,
            max_retries: env_parse("RUNNER_MAX_RETRIES", defaults.max_retries)?,
            retry_base_delay: Duration::from_millis(env_parse(
                "RUNNER_RETRY_BASE_MS",
                defaults.retry_base_delay.as_millis() as u64,
            )?),
            bank_full_ratio: env_parse("RUNNER_BANK_FULL_RATIO", defaults.bank_full_ratio)?,
            bank_gold_guard_ratio: env_parse(
                "RUNNER_BANK_GOLD_GUARD",
                defaults.bank_gold_guard_ratio,
            )?,
            retain_gear_quantity: env_parse("RUNNER_RETAIN_GEAR", defaults.retain_gear_quantity)?,
            inventory_full_ratio: env_parse(
                "RUNNER_INVENTORY_FULL_RATIO",
                defaults.inventory_full_ratio,
            )?,
            train_batch: env_parse("RUNNER_TRAIN_BATCH", defaults.train_batch)?,
        })
    }

    /// Backoff delay for the given 1-based attempt: base * 2^(attempt - 1).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.retry_base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("cannot parse {raw:?}"),
        }),
        Err(_) => Ok(default),
    }
}

/// Parse `name[:role[:skill]]` entries separated by commas.
pub fn parse_characters(raw: &str) -> Result<Vec<CharacterConfig>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|entry| {
            let (name, role) = match entry.split_once(':') {
                Some((name, role)) => (name.trim(), role.parse()?),
                None => (entry, CharacterRole::Fighter),
            };
            if name.is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: "RUNNER_CHARACTERS".to_string(),
                    message: format!("empty character name in {entry:?}"),
                });
            }
            Ok(CharacterConfig {
                name: name.to_string(),
                role,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = RunnerConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.bank_full_ratio, 0.9);
        assert_eq!(config.bank_gold_guard_ratio, 0.25);
        assert!(config.characters.is_empty());
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let config = RunnerConfig {
            retry_base_delay: Duration::from_millis(500),
            ..Default::default()
        };
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(500));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(1000));
        assert_eq!(config.delay_for_attempt(4), Duration::from_millis(4000));
    }

    #[test]
    fn parses_character_list() {
        let chars = parse_characters("alice, bob:gatherer:mining ,carol:crafter:cooking,dave:tasker")
            .unwrap();
        assert_eq!(chars.len(), 4);
        assert_eq!(chars[0].role, CharacterRole::Fighter);
        assert_eq!(chars[1].name, "bob");
        assert_eq!(chars[1].role, CharacterRole::Gatherer(Skill::Mining));
        assert_eq!(chars[2].role, CharacterRole::Crafter(Skill::Cooking));
        assert_eq!(chars[3].role, CharacterRole::Tasker);
    }

    #[test]
    fn rejects_mismatched_role_skill() {
        assert!("gatherer:cooking".parse::<CharacterRole>().is_err());
        assert!("crafter".parse::<CharacterRole>().is_err());
        assert!("wizard".parse::<CharacterRole>().is_err());
    }
}
