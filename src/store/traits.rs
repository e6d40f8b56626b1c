//! `QueueStore` trait — async persistence seam for job queues.

use async_trait::async_trait;

use super::QueueSnapshot;
use crate::error::StoreError;

/// Durable storage for per-character queue snapshots.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Replace the stored snapshot for `snapshot.character`. Must be atomic:
    /// a crash mid-write leaves the previous snapshot intact.
    async fn save(&self, snapshot: &QueueSnapshot) -> Result<(), StoreError>;

    /// Load the snapshot for `character`, `None` if nothing was ever saved.
    async fn load(&self, character: &str) -> Result<Option<QueueSnapshot>, StoreError>;
}
