//! Persistence layer — one JSON queue snapshot per character.

pub mod file;
pub mod memory;
pub mod traits;

pub use file::JsonFileStore;
pub use memory::MemoryStore;
pub use traits::QueueStore;

use serde::{Deserialize, Serialize};

use crate::worker::objective::ObjectiveRecord;

/// Current on-disk layout version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Persisted job queue of one character.
///
/// Fields are additive-only: anything added later must carry `#[serde(default)]`
/// so older snapshots keep loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    #[serde(default = "default_version")]
    pub version: u32,
    pub character: String,
    /// Next sequence number to hand out.
    #[serde(default)]
    pub next_seq: u64,
    /// Every live objective, in creation order.
    #[serde(default)]
    pub jobs: Vec<ObjectiveRecord>,
    /// Ids of top-level objectives still waiting their FIFO turn, head first.
    #[serde(default)]
    pub pending: Vec<String>,
    #[serde(default)]
    pub cancelled: Vec<String>,
}

fn default_version() -> u32 {
    SNAPSHOT_VERSION
}

impl QueueSnapshot {
    pub fn empty(character: impl Into<String>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            character: character.into(),
            next_seq: 1,
            jobs: Vec::new(),
            pending: Vec::new(),
            cancelled: Vec::new(),
        }
    }
}
