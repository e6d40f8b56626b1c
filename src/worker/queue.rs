//! Per-character job tree.
//!
//! Objectives live in an arena keyed by [`JobKey`]; keys come from a
//! monotonically increasing sequence, so iterating the arena yields creation
//! order and a child's key is always greater than its parent's. Top-level
//! objectives waiting their turn sit in a FIFO of keys. Inline children are
//! never queued: the parent runs them directly.

use std::collections::{BTreeMap, HashMap, VecDeque};

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use super::objective::{JobKey, JobSummary, ObjectiveKind, ObjectiveRecord, Target};
use super::state::{FailureCause, ObjectiveStatus};
use crate::error::{JobError, StoreError};
use crate::store::{QueueSnapshot, QueueStore, SNAPSHOT_VERSION};

/// Maximum cancelled ids and finished records kept for introspection.
const MAX_HISTORY: usize = 200;

#[derive(Debug)]
struct JobNode {
    record: ObjectiveRecord,
    parent: Option<JobKey>,
    children: Vec<JobKey>,
    token: CancellationToken,
}

/// The job arena of one character.
#[derive(Debug)]
pub struct JobTree {
    character: String,
    nodes: BTreeMap<JobKey, JobNode>,
    index: HashMap<String, JobKey>,
    pending: VecDeque<JobKey>,
    next_seq: u64,
    cancelled: VecDeque<String>,
    finished: VecDeque<ObjectiveRecord>,
}

impl JobTree {
    pub fn new(character: impl Into<String>) -> Self {
        Self {
            character: character.into(),
            nodes: BTreeMap::new(),
            index: HashMap::new(),
            pending: VecDeque::new(),
            next_seq: 1,
            cancelled: VecDeque::new(),
            finished: VecDeque::new(),
        }
    }

    pub fn character(&self) -> &str {
        &self.character
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn not_found(id: impl ToString) -> JobError {
        JobError::NotFound { id: id.to_string() }
    }

    fn allocate(
        &mut self,
        kind: ObjectiveKind,
        target: Target,
        parent: Option<JobKey>,
    ) -> Result<JobKey, JobError> {
        target.validate(kind)?;
        let (parent_id, token) = match parent {
            Some(pk) => {
                let p = self.nodes.get(&pk).ok_or_else(|| Self::not_found(pk))?;
                (Some(p.record.id.clone()), p.token.child_token())
            }
            None => (None, CancellationToken::new()),
        };

        let key = JobKey(self.next_seq);
        self.next_seq += 1;
        let record = ObjectiveRecord::new(key, kind, target, parent_id);
        self.index.insert(record.id.clone(), key);
        if let Some(p) = parent.and_then(|pk| self.nodes.get_mut(&pk)) {
            p.children.push(key);
        }
        self.nodes.insert(
            key,
            JobNode {
                record,
                parent,
                children: Vec::new(),
                token,
            },
        );
        Ok(key)
    }

    /// Enqueue a top-level objective at the tail.
    pub fn append(&mut self, kind: ObjectiveKind, target: Target) -> Result<ObjectiveRecord, JobError> {
        let key = self.allocate(kind, target, None)?;
        self.pending.push_back(key);
        Ok(self.nodes[&key].record.clone())
    }

    /// Add a top-level objective that runs immediately instead of waiting in
    /// the FIFO (the idle fallback).
    pub fn insert_root(&mut self, kind: ObjectiveKind, target: Target) -> Result<JobKey, JobError> {
        self.allocate(kind, target, None)
    }

    /// Add an inline child under `parent`.
    ///
    /// A live child of the same kind and target code is reused instead, which
    /// is how a restored parent picks its unfinished child back up.
    pub fn insert_child(
        &mut self,
        parent: JobKey,
        kind: ObjectiveKind,
        target: Target,
    ) -> Result<JobKey, JobError> {
        let node = self.nodes.get(&parent).ok_or_else(|| Self::not_found(parent))?;
        let existing = node.children.iter().copied().find(|k| {
            self.nodes.get(k).is_some_and(|c| {
                c.record.status.is_active() && c.record.kind == kind && c.record.target.code == target.code
            })
        });
        match existing {
            Some(key) => Ok(key),
            None => self.allocate(kind, target, Some(parent)),
        }
    }

    /// Head of the FIFO.
    pub fn next_pending(&self) -> Option<JobKey> {
        self.pending.front().copied()
    }

    /// What the worker should run next: a top-level objective left in progress
    /// by a previous run, else the FIFO head.
    pub fn next_runnable(&self) -> Option<JobKey> {
        self.nodes
            .iter()
            .find(|(_, n)| n.parent.is_none() && n.record.status == ObjectiveStatus::InProgress)
            .map(|(k, _)| *k)
            .or_else(|| self.next_pending())
    }

    /// Mark an objective in progress and hand out its record and token.
    /// Re-entering an objective restored as in progress is allowed.
    pub fn begin(&mut self, key: JobKey) -> Result<(ObjectiveRecord, CancellationToken), JobError> {
        let node = self.nodes.get_mut(&key).ok_or_else(|| Self::not_found(key))?;
        match node.record.status {
            ObjectiveStatus::NotStarted => {
                node.record.status = ObjectiveStatus::InProgress;
                node.record.updated_at = Utc::now();
            }
            ObjectiveStatus::InProgress => {}
            other => {
                return Err(JobError::InvalidTransition {
                    id: node.record.id.clone(),
                    state: other.to_string(),
                    target: ObjectiveStatus::InProgress.to_string(),
                });
            }
        }
        let out = (node.record.clone(), node.token.clone());
        self.pending.retain(|k| *k != key);
        Ok(out)
    }

    /// Store progress for a live objective. Terminal records are left alone.
    pub fn set_progress(&mut self, key: JobKey, progress: u32) -> Option<u32> {
        let node = self.nodes.get_mut(&key)?;
        if node.record.status.is_terminal() {
            return None;
        }
        node.record.set_progress(progress);
        Some(node.record.progress)
    }

    /// Record a terminal outcome, optionally evicting the objective.
    ///
    /// An objective cancelled while it ran keeps `cancelled`. The final record
    /// is returned either way.
    pub fn finish(
        &mut self,
        key: JobKey,
        outcome: ObjectiveStatus,
        cause: Option<FailureCause>,
        remove: bool,
    ) -> Option<ObjectiveRecord> {
        let node = self.nodes.get_mut(&key)?;
        if node.record.status.can_transition_to(outcome) {
            node.record.status = outcome;
            node.record.error = cause;
            node.record.updated_at = Utc::now();
        }
        let record = node.record.clone();
        if remove {
            self.evict(key);
        }
        Some(record)
    }

    /// Remove an objective and every descendant still in the arena. Live
    /// descendants are abandoned: a parent that is done no longer waits on them.
    fn evict(&mut self, key: JobKey) {
        let Some(node) = self.detach(key) else {
            return;
        };
        for child in &node.children {
            if let Some(c) = self.nodes.get_mut(child) {
                c.parent = None;
                if c.record.status.is_active() {
                    c.record.status = if c.record.status.can_transition_to(ObjectiveStatus::Failed) {
                        ObjectiveStatus::Failed
                    } else {
                        ObjectiveStatus::Cancelled
                    };
                    c.record.error = Some(FailureCause::new(None, "abandoned by parent"));
                    c.record.updated_at = Utc::now();
                    c.token.cancel();
                }
            }
            self.evict(*child);
        }
        self.push_finished(node.record);
    }

    /// Unlink a node from the arena without touching its children, which
    /// become orphans.
    fn detach(&mut self, key: JobKey) -> Option<JobNode> {
        let node = self.nodes.remove(&key)?;
        self.index.remove(&node.record.id);
        self.pending.retain(|k| *k != key);
        if let Some(p) = node.parent.and_then(|pk| self.nodes.get_mut(&pk)) {
            p.children.retain(|c| *c != key);
        }
        for child in &node.children {
            if let Some(c) = self.nodes.get_mut(child) {
                c.parent = None;
            }
        }
        Some(node)
    }

    fn push_finished(&mut self, record: ObjectiveRecord) {
        self.finished.push_back(record);
        while self.finished.len() > MAX_HISTORY {
            self.finished.pop_front();
        }
    }

    fn subtree(&self, root: JobKey) -> Vec<JobKey> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(key) = stack.pop() {
            if let Some(node) = self.nodes.get(&key) {
                out.push(key);
                stack.extend(node.children.iter().copied());
            }
        }
        out.sort();
        out
    }

    /// Cancel `id` and every live descendant. Objectives that never started
    /// are removed at once; in-progress ones stay until the worker observes
    /// their token and unwinds. Terminal descendants are untouched.
    pub fn cancel(&mut self, id: &str) -> Result<Vec<String>, JobError> {
        let root = *self.index.get(id).ok_or_else(|| Self::not_found(id))?;

        let mut affected = Vec::new();
        let mut idle = Vec::new();
        for key in self.subtree(root) {
            let Some(node) = self.nodes.get_mut(&key) else {
                continue;
            };
            if node.record.status.is_terminal() {
                continue;
            }
            if node.record.status == ObjectiveStatus::NotStarted {
                idle.push(key);
            }
            node.record.status = ObjectiveStatus::Cancelled;
            node.record.updated_at = Utc::now();
            node.token.cancel();
            affected.push(node.record.id.clone());
        }

        for key in idle {
            if let Some(node) = self.detach(key) {
                self.push_finished(node.record);
            }
        }
        for id in &affected {
            self.cancelled.push_back(id.clone());
        }
        while self.cancelled.len() > MAX_HISTORY {
            self.cancelled.pop_front();
        }
        Ok(affected)
    }

    pub fn key_of(&self, id: &str) -> Option<JobKey> {
        self.index.get(id).copied()
    }

    /// Live record by key.
    pub fn get(&self, key: JobKey) -> Option<&ObjectiveRecord> {
        self.nodes.get(&key).map(|n| &n.record)
    }

    /// Live record by id, falling back to the finished history.
    pub fn record(&self, id: &str) -> Option<ObjectiveRecord> {
        match self.index.get(id) {
            Some(key) => self.nodes.get(key).map(|n| n.record.clone()),
            None => self.finished.iter().rev().find(|r| r.id == id).cloned(),
        }
    }

    /// Record by key, live or recently evicted.
    pub fn record_by_key(&self, key: JobKey) -> Option<ObjectiveRecord> {
        match self.nodes.get(&key) {
            Some(node) => Some(node.record.clone()),
            None => self.finished.iter().rev().find(|r| r.key == key).cloned(),
        }
    }

    /// Ids of every objective in the arena, in creation order.
    pub fn list_objectives(&self) -> Vec<String> {
        self.nodes.values().map(|n| n.record.id.clone()).collect()
    }

    pub fn list_with_parents(&self) -> Vec<JobSummary> {
        let executing = self.executing().map(|r| r.key);
        self.nodes
            .iter()
            .map(|(key, n)| JobSummary {
                suspended: n.record.status == ObjectiveStatus::InProgress && Some(*key) != executing,
                ..JobSummary::from(&n.record)
            })
            .collect()
    }

    /// `root_id` plus its descendants, in creation order.
    pub fn job_chain(&self, root_id: &str) -> Result<Vec<String>, JobError> {
        let root = self.key_of(root_id).ok_or_else(|| Self::not_found(root_id))?;
        Ok(self
            .subtree(root)
            .into_iter()
            .filter_map(|k| self.nodes.get(&k).map(|n| n.record.id.clone()))
            .collect())
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.cancelled.iter().cloned().collect()
    }

    /// Recently evicted records, oldest first.
    pub fn history(&self) -> Vec<ObjectiveRecord> {
        self.finished.iter().cloned().collect()
    }

    pub fn pending_ids(&self) -> Vec<String> {
        self.pending
            .iter()
            .filter_map(|k| self.nodes.get(k).map(|n| n.record.id.clone()))
            .collect()
    }

    /// In-progress objectives, root first.
    pub fn active_chain(&self) -> Vec<ObjectiveRecord> {
        self.nodes
            .values()
            .filter(|n| n.record.status == ObjectiveStatus::InProgress)
            .map(|n| n.record.clone())
            .collect()
    }

    /// The objective actually sending actions: the deepest in-progress node.
    /// Its in-progress ancestors are suspended in inline execution.
    pub fn executing(&self) -> Option<ObjectiveRecord> {
        self.nodes
            .values()
            .filter(|n| n.record.status == ObjectiveStatus::InProgress)
            .find(|n| {
                !n.children.iter().any(|c| {
                    self.nodes
                        .get(c)
                        .is_some_and(|c| c.record.status == ObjectiveStatus::InProgress)
                })
            })
            .map(|n| n.record.clone())
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            version: SNAPSHOT_VERSION,
            character: self.character.clone(),
            next_seq: self.next_seq,
            jobs: self.nodes.values().map(|n| n.record.clone()).collect(),
            pending: self.pending_ids(),
            cancelled: self.cancelled(),
        }
    }

    /// Rebuild a tree from a snapshot: first every node, then the edges.
    pub fn from_snapshot(snapshot: QueueSnapshot) -> Result<Self, StoreError> {
        let corrupt = |reason: String| StoreError::Corrupt {
            character: snapshot.character.clone(),
            reason,
        };

        let mut tree = Self::new(snapshot.character.clone());
        for record in &snapshot.jobs {
            if tree.index.insert(record.id.clone(), record.key).is_some() {
                return Err(corrupt(format!("duplicate job id {}", record.id)));
            }
            tree.nodes.insert(
                record.key,
                JobNode {
                    record: record.clone(),
                    parent: None,
                    children: Vec::new(),
                    token: CancellationToken::new(),
                },
            );
        }
        if tree.index.len() != tree.nodes.len() {
            return Err(corrupt("duplicate job key".to_string()));
        }

        // Parents always carry a smaller key, so walking in key order hands
        // every child a token derived from an already wired parent.
        let keys: Vec<JobKey> = tree.nodes.keys().copied().collect();
        for key in keys {
            let parent = tree.nodes[&key]
                .record
                .parent_id
                .as_ref()
                .and_then(|pid| tree.index.get(pid).copied());
            let Some(pk) = parent else {
                continue;
            };
            if pk >= key {
                return Err(corrupt(format!("job {key} precedes its parent {pk}")));
            }
            let token = tree.nodes[&pk].token.child_token();
            if let Some(p) = tree.nodes.get_mut(&pk) {
                p.children.push(key);
            }
            if let Some(node) = tree.nodes.get_mut(&key) {
                node.parent = Some(pk);
                node.token = token;
            }
        }

        for id in &snapshot.pending {
            let key = tree
                .index
                .get(id)
                .copied()
                .ok_or_else(|| corrupt(format!("pending job {id} is missing")))?;
            tree.pending.push_back(key);
        }
        tree.cancelled = snapshot.cancelled.iter().cloned().collect();

        let max_key = tree.nodes.keys().next_back().map_or(0, |k| k.0);
        tree.next_seq = snapshot.next_seq.max(max_key + 1);

        // A top-level objective saved after it turned terminal but before it
        // unwound has nobody left to evict it.
        let settled: Vec<JobKey> = tree
            .nodes
            .iter()
            .filter(|(_, n)| n.parent.is_none() && n.record.status.is_terminal())
            .map(|(k, _)| *k)
            .collect();
        for key in settled {
            if let Some(node) = tree.nodes.get(&key) {
                tracing::debug!(character = %tree.character, job_id = %node.record.id, status = %node.record.status, "Retiring settled job on restore");
            }
            tree.evict(key);
        }
        Ok(tree)
    }
}

/// Shared, lock-guarded job tree.
///
/// The worker and the control surface both go through here; the tree lock is
/// only held for in-memory edits, never across a remote call. Store writes
/// queue up on a separate lock so they land in snapshot order.
#[derive(Debug)]
pub struct JobQueue {
    tree: RwLock<JobTree>,
    save_lock: Mutex<()>,
}

impl JobQueue {
    pub fn new(character: impl Into<String>) -> Self {
        Self::from_tree(JobTree::new(character))
    }

    pub fn from_tree(tree: JobTree) -> Self {
        Self {
            tree: RwLock::new(tree),
            save_lock: Mutex::new(()),
        }
    }

    /// Run a closure against the tree under the read lock.
    pub async fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&JobTree) -> R,
    {
        f(&*self.tree.read().await)
    }

    /// Run a closure against the tree under the write lock.
    pub async fn update<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut JobTree) -> R,
    {
        f(&mut *self.tree.write().await)
    }

    pub async fn append(&self, kind: ObjectiveKind, target: Target) -> Result<ObjectiveRecord, JobError> {
        self.update(|t| t.append(kind, target)).await
    }

    pub async fn cancel(&self, id: &str) -> Result<Vec<String>, JobError> {
        self.update(|t| t.cancel(id)).await
    }

    pub async fn record(&self, id: &str) -> Option<ObjectiveRecord> {
        self.read(|t| t.record(id)).await
    }

    pub async fn record_by_key(&self, key: JobKey) -> Option<ObjectiveRecord> {
        self.read(|t| t.record_by_key(key)).await
    }

    pub async fn list_objectives(&self) -> Vec<String> {
        self.read(JobTree::list_objectives).await
    }

    pub async fn list_with_parents(&self) -> Vec<JobSummary> {
        self.read(JobTree::list_with_parents).await
    }

    pub async fn job_chain(&self, root_id: &str) -> Result<Vec<String>, JobError> {
        self.read(|t| t.job_chain(root_id)).await
    }

    pub async fn cancelled(&self) -> Vec<String> {
        self.read(JobTree::cancelled).await
    }

    pub async fn executing(&self) -> Option<ObjectiveRecord> {
        self.read(JobTree::executing).await
    }

    pub async fn snapshot(&self) -> QueueSnapshot {
        self.read(JobTree::snapshot).await
    }

    /// Snapshot and write the tree. The snapshot is taken after acquiring the
    /// save lock, so a later save never loses to an older one.
    pub async fn save_to(&self, store: &dyn QueueStore) -> Result<(), StoreError> {
        let _guard = self.save_lock.lock().await;
        let snapshot = self.snapshot().await;
        store.save(&snapshot).await
    }
}
