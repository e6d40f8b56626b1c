//! Worker system — per-character objective execution.
//!
//! Core components:
//! - `objective` — Objective kinds, targets and records
//! - `state` — Status machine (NotStarted → InProgress → Completed/Failed/Cancelled)
//! - `queue` — The job tree: FIFO roots, inline children, cancel cascade
//! - `control` — Pause switch and the checkpoint
//! - `context` — What a running objective sees; retry policy and inline children
//! - `worker` — The per-character loop
//! - `scheduler` — Fleet of workers and the per-character control handle

pub mod context;
pub mod control;
pub mod objective;
pub mod queue;
pub mod scheduler;
pub mod state;
pub mod worker;

pub use context::JobContext;
pub use control::PauseControl;
pub use objective::{JobKey, JobSummary, ObjectiveKind, ObjectiveRecord, Target, TradeSide};
pub use queue::{JobQueue, JobTree};
pub use scheduler::{CharacterHandle, Fleet};
pub use state::{FailureCause, ObjectiveStatus};
pub use worker::{Worker, WorkerDeps};
