//! In-memory store, for tests and runs without a state directory.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{QueueSnapshot, QueueStore};
use crate::error::StoreError;

#[derive(Default)]
pub struct MemoryStore {
    snapshots: RwLock<HashMap<String, QueueSnapshot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of characters with a stored snapshot.
    pub async fn len(&self) -> usize {
        self.snapshots.read().await.len()
    }
}

#[async_trait]
impl QueueStore for MemoryStore {
    async fn save(&self, snapshot: &QueueSnapshot) -> Result<(), StoreError> {
        self.snapshots
            .write()
            .await
            .insert(snapshot.character.clone(), snapshot.clone());
        Ok(())
    }

    async fn load(&self, character: &str) -> Result<Option<QueueSnapshot>, StoreError> {
        Ok(self.snapshots.read().await.get(character).cloned())
    }
}
