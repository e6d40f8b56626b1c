//! Execution context handed to a running objective.

use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::{CharacterRole, RunnerConfig};
use crate::game::{Action, ActionError, ActionResult, Catalog, CharacterState, ErrorKind, MapTile};
use crate::worker::control::checkpoint;
use crate::worker::objective::{JobKey, ObjectiveKind, ObjectiveRecord, Target};
use crate::worker::state::FailureCause;
use crate::worker::worker::Worker;

/// What a running objective may touch: the character snapshot (read-only),
/// the executor through [`JobContext::perform`], inline children and its own
/// progress.
pub struct JobContext<'a> {
    worker: &'a mut Worker,
    record: ObjectiveRecord,
    token: CancellationToken,
    retries_left: u32,
    /// Set when a `stop_on_fail` child failed.
    stopped: bool,
    failure: Option<FailureCause>,
}

impl<'a> JobContext<'a> {
    pub(crate) fn new(worker: &'a mut Worker, record: ObjectiveRecord, token: CancellationToken) -> Self {
        let retries_left = worker.deps.config.max_retries;
        Self {
            worker,
            record,
            token,
            retries_left,
            stopped: false,
            failure: None,
        }
    }

    pub fn key(&self) -> JobKey {
        self.record.key
    }

    pub fn id(&self) -> &str {
        &self.record.id
    }

    pub fn kind(&self) -> ObjectiveKind {
        self.record.kind
    }

    pub fn target(&self) -> &Target {
        &self.record.target
    }

    pub fn progress(&self) -> u32 {
        self.record.progress
    }

    /// Units left for counting objectives.
    pub fn remaining(&self) -> u32 {
        self.record.remaining()
    }

    pub fn character(&self) -> &CharacterState {
        &self.worker.character
    }

    pub fn catalog(&self) -> Arc<dyn Catalog> {
        self.worker.deps.catalog.clone()
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.worker.deps.config
    }

    pub fn role(&self) -> &CharacterRole {
        &self.worker.deps.role
    }

    pub fn retries_left(&self) -> u32 {
        self.retries_left
    }

    /// Spend one attempt outside of an action call (e.g. a simulation that
    /// came out as a loss). Returns whether any budget is left.
    pub fn consume_attempt(&mut self) -> bool {
        self.retries_left = self.retries_left.saturating_sub(1);
        self.retries_left > 0
    }

    pub fn failure(&self) -> Option<&FailureCause> {
        self.failure.as_ref()
    }

    pub(crate) fn set_failure(&mut self, cause: FailureCause) {
        self.failure = Some(cause);
    }

    pub(crate) fn take_failure(&mut self) -> Option<FailureCause> {
        self.failure.take()
    }

    /// Record why the objective gives up and return `false` for the caller.
    pub fn fail(&mut self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        tracing::debug!(character = %self.worker.character.name, job_id = %self.record.id, %reason, "Objective giving up");
        self.failure = Some(FailureCause::new(None, reason));
        false
    }

    /// Record a classified action error as the failure cause.
    pub fn fail_on(&mut self, err: &ActionError) -> bool {
        self.failure = Some(FailureCause::new(Some(err.kind), err.message.clone()));
        false
    }

    /// The checkpoint: `false` once cancelled, stopped by a failed child or
    /// shutting down. Waits while paused; shutdown also ends the wait.
    pub async fn check_status(&self) -> bool {
        if self.stopped || self.worker.shutdown.is_cancelled() {
            return false;
        }
        tokio::select! {
            _ = self.worker.shutdown.cancelled() => false,
            ok = checkpoint(&self.token, &self.worker.deps.pause) => {
                ok && !self.worker.shutdown.is_cancelled()
            }
        }
    }

    /// Sleep until `deadline` unless cancelled or shut down first.
    async fn sleep_until(&self, deadline: Instant) -> bool {
        tokio::select! {
            _ = self.token.cancelled() => false,
            _ = self.worker.shutdown.cancelled() => false,
            _ = tokio::time::sleep_until(deadline) => true,
        }
    }

    async fn wait_cooldown(&self) -> bool {
        match self.worker.ready_at {
            Some(at) if at > Instant::now() => self.sleep_until(at).await,
            _ => true,
        }
    }

    /// One raw executor call: sends the action and adopts the returned
    /// snapshot. The caller has already waited out the cooldown.
    async fn send(&mut self, action: &Action) -> Result<ActionResult, ActionError> {
        let name = self.worker.character.name.clone();
        tracing::debug!(character = %name, job_id = %self.record.id, action = action.name(), "Sending action");

        let result = self.worker.deps.executor.execute(&name, action).await?;
        self.worker.character = result.character.clone();
        self.worker.ready_at = Some(Instant::now() + result.cooldown.duration);
        tracing::debug!(
            character = %name,
            cooldown_ms = result.cooldown.duration.as_millis() as u64,
            reason = %result.cooldown.reason,
            "Action done"
        );
        Ok(result)
    }

    /// Send `action` under the retry policy, with a checkpoint before and
    /// after. `None` means give up: cancelled, paused into shutdown, or an
    /// error that aborts or exhausts the attempt budget (recorded as the
    /// failure cause).
    pub async fn perform(&mut self, action: Action) -> Option<ActionResult> {
        let mut attempt = 0;
        loop {
            if !self.wait_cooldown().await || !self.check_status().await {
                return None;
            }
            attempt += 1;
            match self.send(&action).await {
                Ok(result) => {
                    // Holds the caller (and its progress write) while paused.
                    self.check_status().await;
                    return Some(result);
                }
                Err(err) => {
                    self.retries_left = self.retries_left.saturating_sub(1);
                    tracing::warn!(
                        character = %self.worker.character.name,
                        job_id = %self.record.id,
                        action = action.name(),
                        kind = %err.kind,
                        retries_left = self.retries_left,
                        error = %err.message,
                        "Action failed"
                    );
                    let retryable = matches!(
                        err.kind,
                        ErrorKind::RateLimited | ErrorKind::ActionInProgress | ErrorKind::Unknown
                    );
                    if !retryable || self.retries_left == 0 {
                        self.fail_on(&err);
                        return None;
                    }
                    let wait = err
                        .cooldown
                        .unwrap_or_else(|| self.worker.deps.config.delay_for_attempt(attempt));
                    if !self.sleep_until(Instant::now() + wait).await {
                        return None;
                    }
                }
            }
        }
    }

    /// Run a child objective inline and return whether it completed.
    ///
    /// With `stop_on_fail`, a failed child also fails this objective's next
    /// checkpoint. With `remove_on_completion` the child is evicted once
    /// terminal; otherwise its record stays under this objective.
    pub async fn execute_now(
        &mut self,
        kind: ObjectiveKind,
        target: Target,
        stop_on_fail: bool,
        remove_on_completion: bool,
    ) -> bool {
        if !self.check_status().await {
            return false;
        }
        let parent = self.record.key;
        let inserted = self
            .worker
            .deps
            .queue
            .update(|t| t.insert_child(parent, kind, target))
            .await;
        let child = match inserted {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!(character = %self.worker.character.name, job_id = %self.record.id, error = %e, "Cannot create inline objective");
                return false;
            }
        };

        let ok = self.worker.run_objective(child, remove_on_completion).await;
        if !ok && stop_on_fail {
            self.stopped = true;
            self.failure = Some(FailureCause::new(None, format!("inline {kind} failed")));
        }
        ok
    }

    /// Persist `progress` (clamped for counting kinds) and write the queue
    /// through.
    pub async fn set_progress(&mut self, progress: u32) {
        let key = self.record.key;
        let stored = self
            .worker
            .deps
            .queue
            .update(|t| t.set_progress(key, progress))
            .await;
        if let Some(stored) = stored {
            self.record.progress = stored;
            self.worker.persist().await;
        }
    }

    pub async fn add_progress(&mut self, n: u32) {
        let next = self.record.progress.saturating_add(n);
        self.set_progress(next).await;
    }

    /// Closest tile holding the given content.
    pub async fn locate(&mut self, content_type: &str, code: Option<&str>) -> Option<MapTile> {
        let catalog = self.catalog();
        match catalog.maps(content_type, code).await {
            Ok(tiles) => {
                let (x, y) = (self.worker.character.x, self.worker.character.y);
                let closest = tiles
                    .into_iter()
                    .min_by_key(|t| (t.x - x).abs() + (t.y - y).abs());
                if closest.is_none() {
                    self.fail(format!("no {content_type} tile for {}", code.unwrap_or("any")));
                }
                closest
            }
            Err(err) => {
                self.fail_on(&err);
                None
            }
        }
    }

    /// Walk to the closest tile holding the given content.
    pub async fn move_to(&mut self, content_type: &str, code: Option<&str>) -> bool {
        let Some(tile) = self.locate(content_type, code).await else {
            return false;
        };
        if self.worker.character.is_at(tile.x, tile.y) {
            return true;
        }
        self.perform(Action::Move { x: tile.x, y: tile.y }).await.is_some()
    }

    pub async fn move_to_bank(&mut self) -> bool {
        self.move_to("bank", None).await
    }
}
