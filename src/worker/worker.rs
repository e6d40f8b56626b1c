//! The per-character worker loop.

use std::sync::Arc;

use chrono::Utc;
use futures::future::BoxFuture;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::{CharacterRole, RunnerConfig};
use crate::game::{ActionExecutor, Catalog, CharacterState};
use crate::jobs;
use crate::store::QueueStore;
use crate::worker::context::JobContext;
use crate::worker::control::PauseControl;
use crate::worker::objective::{JobKey, ObjectiveKind, ObjectiveRecord, Target};
use crate::worker::queue::JobQueue;
use crate::worker::state::{FailureCause, ObjectiveStatus};

/// Shared dependencies for a character worker.
#[derive(Clone)]
pub struct WorkerDeps {
    pub queue: Arc<JobQueue>,
    pub executor: Arc<dyn ActionExecutor>,
    pub catalog: Arc<dyn Catalog>,
    pub store: Option<Arc<dyn QueueStore>>,
    pub config: Arc<RunnerConfig>,
    pub pause: PauseControl,
    pub role: CharacterRole,
}

/// Drives one character: the only writer of its snapshot and the only task
/// issuing its remote actions.
pub struct Worker {
    pub(crate) deps: WorkerDeps,
    pub(crate) character: CharacterState,
    /// Earliest instant the next action may be sent.
    pub(crate) ready_at: Option<Instant>,
    pub(crate) shutdown: CancellationToken,
}

impl Worker {
    pub fn new(character: CharacterState, deps: WorkerDeps) -> Self {
        let mut worker = Self {
            deps,
            character: CharacterState::default(),
            ready_at: None,
            shutdown: CancellationToken::new(),
        };
        worker.set_character(character);
        worker
    }

    pub fn name(&self) -> &str {
        &self.character.name
    }

    pub fn character(&self) -> &CharacterState {
        &self.character
    }

    pub fn deps(&self) -> &WorkerDeps {
        &self.deps
    }

    /// Replace the snapshot and derive the cooldown deadline from it.
    pub(crate) fn set_character(&mut self, character: CharacterState) {
        if let Some(expires) = character.cooldown_expiration {
            let remaining = (expires - Utc::now()).to_std().unwrap_or_default();
            self.ready_at = Some(Instant::now() + remaining);
        }
        self.character = character;
    }

    /// Re-read the snapshot from the remote service.
    pub async fn refresh(&mut self) -> bool {
        let name = self.character.name.clone();
        match self.deps.executor.character(&name).await {
            Ok(state) => {
                self.set_character(state);
                true
            }
            Err(e) => {
                tracing::warn!(character = %name, error = %e, "Failed to refresh character");
                false
            }
        }
    }

    /// Write the queue through to the store. Failures are logged only; the
    /// in-memory queue stays authoritative and the next write supersedes.
    pub async fn persist(&self) {
        let Some(store) = &self.deps.store else {
            return;
        };
        if let Err(e) = self.deps.queue.save_to(store.as_ref()).await {
            tracing::warn!(character = %self.character.name, error = %e, "Failed to persist job queue");
        }
    }

    /// Main loop: run queued objectives in order, idle when there are none,
    /// until `shutdown` fires.
    pub async fn run(mut self, shutdown: CancellationToken) {
        self.shutdown = shutdown;
        tracing::info!(character = %self.character.name, "Worker started");
        self.refresh().await;

        while !self.shutdown.is_cancelled() {
            if self.step().await.is_some() {
                continue;
            }
            let idle_ok = self.run_idle().await;
            if !idle_ok && !self.shutdown.is_cancelled() {
                let backoff = self.deps.config.retry_base_delay;
                tokio::select! {
                    _ = self.shutdown.cancelled() => {}
                    _ = tokio::time::sleep(backoff) => {}
                }
            }
        }

        self.persist().await;
        tracing::info!(character = %self.character.name, "Worker stopped");
    }

    /// Run the next queued objective to a terminal state. `None` when the
    /// queue has nothing runnable.
    pub async fn step(&mut self) -> Option<ObjectiveRecord> {
        let key = self.deps.queue.read(|t| t.next_runnable()).await?;
        self.run_objective(key, true).await;
        self.deps.queue.record_by_key(key).await
    }

    async fn run_idle(&mut self) -> bool {
        let inserted = self
            .deps
            .queue
            .update(|t| t.insert_root(ObjectiveKind::Idle, Target::new("", 0)))
            .await;
        match inserted {
            Ok(key) => self.run_objective(key, true).await,
            Err(e) => {
                tracing::error!(character = %self.character.name, error = %e, "Failed to create idle objective");
                false
            }
        }
    }

    /// Run one objective through prerequisites and its main loop, then record
    /// the outcome. `remove` evicts it once terminal.
    ///
    /// An objective interrupted by shutdown is left in progress so the next
    /// process resumes it.
    pub(crate) fn run_objective(&mut self, key: JobKey, remove: bool) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            let started = self.deps.queue.update(|t| t.begin(key)).await;
            let (record, token) = match started {
                Ok(started) => started,
                Err(e) => {
                    tracing::warn!(character = %self.character.name, error = %e, "Cannot start objective");
                    self.deps
                        .queue
                        .update(|t| t.finish(key, ObjectiveStatus::Failed, None, remove))
                        .await;
                    return false;
                }
            };
            tracing::info!(
                character = %self.character.name,
                job_id = %record.id,
                kind = %record.kind,
                progress = record.progress,
                "Objective started"
            );
            self.persist().await;

            let mut ctx = JobContext::new(self, record.clone(), token.clone());
            let ok = if jobs::prerequisites(&mut ctx).await {
                jobs::run(&mut ctx).await
            } else {
                if ctx.failure().is_none() {
                    ctx.set_failure(FailureCause::new(None, "prerequisites not met"));
                }
                false
            };
            let failure = ctx.take_failure();

            if !ok && self.shutdown.is_cancelled() && !token.is_cancelled() {
                tracing::info!(character = %self.character.name, job_id = %record.id, "Objective suspended by shutdown");
                return false;
            }

            let outcome = if token.is_cancelled() {
                ObjectiveStatus::Cancelled
            } else if ok {
                ObjectiveStatus::Completed
            } else {
                ObjectiveStatus::Failed
            };
            let cause = (outcome == ObjectiveStatus::Failed).then(|| {
                failure.unwrap_or_else(|| FailureCause::new(None, "objective gave up"))
            });
            let finished = self
                .deps
                .queue
                .update(|t| t.finish(key, outcome, cause, remove))
                .await;
            self.persist().await;

            let Some(finished) = finished else {
                return false;
            };
            match finished.status {
                ObjectiveStatus::Completed => tracing::info!(
                    character = %self.character.name,
                    job_id = %finished.id,
                    progress = finished.progress,
                    "Objective completed"
                ),
                ObjectiveStatus::Cancelled => tracing::info!(
                    character = %self.character.name,
                    job_id = %finished.id,
                    "Objective cancelled"
                ),
                _ => tracing::warn!(
                    character = %self.character.name,
                    job_id = %finished.id,
                    cause = %finished.error.as_ref().map(ToString::to_string).unwrap_or_default(),
                    "Objective failed"
                ),
            }
            finished.status == ObjectiveStatus::Completed
        })
    }
}
