//! JSON file store: `{state_dir}/{character}.json`, written atomically.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use super::{QueueSnapshot, QueueStore};
use crate::error::StoreError;

pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Snapshot path for a character. Anything outside `[A-Za-z0-9_-]` is
    /// replaced so a name can never escape the state directory.
    pub fn path_for(&self, character: &str) -> PathBuf {
        let safe: String = character
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }
}

/// Temp file in the target directory, fsync, then rename over `path`.
fn atomic_write(path: &Path, data: &[u8]) -> Result<(), StoreError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(|e| StoreError::io(parent, e))?;
    tmp.write_all(data).map_err(|e| StoreError::io(tmp.path(), e))?;
    tmp.flush().map_err(|e| StoreError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| StoreError::io(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| StoreError::io(path, e.error))?;
    Ok(())
}

#[async_trait]
impl QueueStore for JsonFileStore {
    async fn save(&self, snapshot: &QueueSnapshot) -> Result<(), StoreError> {
        let path = self.path_for(&snapshot.character);
        let data = serde_json::to_vec_pretty(snapshot)?;
        let jobs = snapshot.jobs.len();

        tokio::task::spawn_blocking(move || {
            atomic_write(&path, &data)?;
            debug!(path = %path.display(), jobs, "Queue snapshot written");
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }

    async fn load(&self, character: &str) -> Result<Option<QueueSnapshot>, StoreError> {
        let path = self.path_for(character);
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(path, e)),
        };
        let snapshot: QueueSnapshot = serde_json::from_slice(&data)?;
        if snapshot.character != character {
            return Err(StoreError::Corrupt {
                character: character.to_string(),
                reason: format!("snapshot belongs to {}", snapshot.character),
            });
        }
        Ok(Some(snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        assert!(store.load("alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_overwrites_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("queues"));

        let mut snap = QueueSnapshot::empty("alice");
        store.save(&snap).await.unwrap();
        snap.next_seq = 42;
        store.save(&snap).await.unwrap();

        let loaded = store.load("alice").await.unwrap().unwrap();
        assert_eq!(loaded.next_seq, 42);

        // Only the final file remains, no stray temp files.
        let entries: Vec<_> = std::fs::read_dir(dir.path().join("queues"))
            .unwrap()
            .collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn path_is_sanitized() {
        let store = JsonFileStore::new("/tmp/q");
        assert_eq!(store.path_for("../evil"), PathBuf::from("/tmp/q/___evil.json"));
    }

    #[tokio::test]
    async fn garbage_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        std::fs::write(store.path_for("alice"), b"{not json").unwrap();
        assert!(matches!(
            store.load("alice").await,
            Err(StoreError::Serialization(_))
        ));
    }
}
