//! Character fleet — one worker task per character plus its control handle.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{CharacterConfig, RunnerConfig};
use crate::error::{self, JobError, StoreError};
use crate::game::{ActionExecutor, Catalog, CharacterState};
use crate::store::QueueStore;
use crate::worker::control::PauseControl;
use crate::worker::objective::{JobSummary, ObjectiveKind, ObjectiveRecord, Target};
use crate::worker::queue::{JobQueue, JobTree};
use crate::worker::worker::{Worker, WorkerDeps};

/// Control surface of one character. Cheap to clone.
#[derive(Clone)]
pub struct CharacterHandle {
    name: String,
    queue: Arc<JobQueue>,
    pause: PauseControl,
    store: Option<Arc<dyn QueueStore>>,
}

impl CharacterHandle {
    pub fn new(
        name: impl Into<String>,
        queue: Arc<JobQueue>,
        pause: PauseControl,
        store: Option<Arc<dyn QueueStore>>,
    ) -> Self {
        Self {
            name: name.into(),
            queue,
            pause,
            store,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    async fn persist(&self) {
        if let Err(e) = self.save_job_queue().await {
            tracing::warn!(character = %self.name, error = %e, "Failed to persist job queue");
        }
    }

    /// Enqueue an objective at the tail.
    pub async fn append_job(&self, kind: ObjectiveKind, target: Target) -> Result<ObjectiveRecord, JobError> {
        let record = self.queue.append(kind, target).await?;
        tracing::info!(character = %self.name, job_id = %record.id, "Job appended");
        self.persist().await;
        Ok(record)
    }

    /// Cancel a job and its live descendants; returns every affected id.
    pub async fn cancel_job_and_children(&self, id: &str) -> Result<Vec<String>, JobError> {
        let affected = self.queue.cancel(id).await?;
        tracing::info!(character = %self.name, job_id = %id, cancelled = affected.len(), "Job cancelled");
        self.persist().await;
        Ok(affected)
    }

    /// Suspend the active objective at its next checkpoint.
    pub fn pause_job(&self) {
        self.pause.pause();
        tracing::info!(character = %self.name, "Paused");
    }

    pub fn resume_job(&self) {
        self.pause.resume();
        tracing::info!(character = %self.name, "Resumed");
    }

    pub fn is_paused(&self) -> bool {
        self.pause.is_paused()
    }

    pub async fn list_objectives(&self) -> Vec<String> {
        self.queue.list_objectives().await
    }

    pub async fn list_objectives_with_parents(&self) -> Vec<JobSummary> {
        self.queue.list_with_parents().await
    }

    pub async fn get_job_chain(&self, root_id: &str) -> Result<Vec<String>, JobError> {
        self.queue.job_chain(root_id).await
    }

    pub async fn get_cancelled_jobs(&self) -> Vec<String> {
        self.queue.cancelled().await
    }

    /// Full record of a live or recently finished job, including its failure
    /// cause.
    pub async fn get_job(&self, id: &str) -> Result<ObjectiveRecord, JobError> {
        self.queue
            .record(id)
            .await
            .ok_or_else(|| JobError::NotFound { id: id.to_string() })
    }

    /// In-progress chain, root first. Every entry but the last is suspended.
    pub async fn active_chain(&self) -> Vec<ObjectiveRecord> {
        self.queue.read(JobTree::active_chain).await
    }

    /// The single objective currently sending actions, if any.
    pub async fn executing_job(&self) -> Option<ObjectiveRecord> {
        self.queue.executing().await
    }

    /// Flush the queue to the store out of band.
    pub async fn save_job_queue(&self) -> Result<(), StoreError> {
        match &self.store {
            Some(store) => self.queue.save_to(store.as_ref()).await,
            None => Ok(()),
        }
    }
}

/// Load a character's queue from the store, or start empty.
pub async fn restore_queue(store: Option<&Arc<dyn QueueStore>>, name: &str) -> Result<JobQueue, StoreError> {
    let Some(store) = store else {
        return Ok(JobQueue::new(name));
    };
    match store.load(name).await? {
        Some(snapshot) => {
            let tree = JobTree::from_snapshot(snapshot)?;
            tracing::info!(character = %name, jobs = tree.len(), "Job queue restored");
            Ok(JobQueue::from_tree(tree))
        }
        None => Ok(JobQueue::new(name)),
    }
}

struct TrackedWorker {
    handle: CharacterHandle,
    join: JoinHandle<()>,
}

/// Runs one independent worker per character.
pub struct Fleet {
    executor: Arc<dyn ActionExecutor>,
    catalog: Arc<dyn Catalog>,
    store: Option<Arc<dyn QueueStore>>,
    config: Arc<RunnerConfig>,
    workers: RwLock<BTreeMap<String, TrackedWorker>>,
    shutdown: CancellationToken,
}

impl Fleet {
    pub fn new(
        executor: Arc<dyn ActionExecutor>,
        catalog: Arc<dyn Catalog>,
        store: Option<Arc<dyn QueueStore>>,
        config: Arc<RunnerConfig>,
    ) -> Self {
        Self {
            executor,
            catalog,
            store,
            config,
            workers: RwLock::new(BTreeMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Restore the character's queue and start its worker.
    pub async fn spawn(&self, character: &CharacterConfig) -> error::Result<CharacterHandle> {
        if let Some(tracked) = self.workers.read().await.get(&character.name) {
            return Ok(tracked.handle.clone());
        }

        let queue = Arc::new(restore_queue(self.store.as_ref(), &character.name).await?);
        let pause = PauseControl::new();
        let deps = WorkerDeps {
            queue: queue.clone(),
            executor: self.executor.clone(),
            catalog: self.catalog.clone(),
            store: self.store.clone(),
            config: self.config.clone(),
            pause: pause.clone(),
            role: character.role.clone(),
        };
        let snapshot = CharacterState {
            name: character.name.clone(),
            ..Default::default()
        };
        let worker = Worker::new(snapshot, deps);
        let join = tokio::spawn(worker.run(self.shutdown.child_token()));

        let handle = CharacterHandle::new(&character.name, queue, pause, self.store.clone());
        self.workers.write().await.insert(
            character.name.clone(),
            TrackedWorker {
                handle: handle.clone(),
                join,
            },
        );
        tracing::info!(character = %character.name, role = ?character.role, "Character worker spawned");
        Ok(handle)
    }

    pub async fn handle(&self, name: &str) -> Result<CharacterHandle, JobError> {
        self.workers
            .read()
            .await
            .get(name)
            .map(|t| t.handle.clone())
            .ok_or_else(|| JobError::UnknownCharacter {
                name: name.to_string(),
            })
    }

    pub async fn characters(&self) -> Vec<String> {
        self.workers.read().await.keys().cloned().collect()
    }

    /// Check if a character's worker is still running.
    pub async fn is_running(&self, name: &str) -> bool {
        self.workers
            .read()
            .await
            .get(name)
            .is_some_and(|t| !t.join.is_finished())
    }

    /// Stop every worker and wait for them to save and exit.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let tracked: Vec<TrackedWorker> = {
            let mut workers = self.workers.write().await;
            std::mem::take(&mut *workers).into_values().collect()
        };
        for result in join_all(tracked.into_iter().map(|t| t.join)).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Character worker panicked");
            }
        }
    }
}
