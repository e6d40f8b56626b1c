//! End-to-end scenarios for the per-character worker against an in-memory
//! game world.

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

use artifacts_runner::config::{CharacterConfig, CharacterRole};
use artifacts_runner::error::{JobError, StoreError};
use artifacts_runner::game::{Action, ActionError, ErrorKind, InventorySlot};
use artifacts_runner::store::{JsonFileStore, MemoryStore, QueueSnapshot, QueueStore};
use artifacts_runner::worker::scheduler::restore_queue;
use artifacts_runner::worker::{
    CharacterHandle, Fleet, JobQueue, ObjectiveKind, ObjectiveStatus, PauseControl, Target,
};

use common::{FakeWorld, NAME, TEST_TIMEOUT, WorldState, deps, fast_config, worker};

fn slot(code: &str, quantity: u32) -> InventorySlot {
    InventorySlot {
        code: code.into(),
        quantity,
    }
}

fn is_gather(a: &Action) -> bool {
    matches!(a, Action::Gather)
}

/// Character standing on the copper rocks.
fn at_rocks() -> WorldState {
    let mut state = WorldState::basic();
    state.character.x = 2;
    state.character.y = 0;
    state
}

#[tokio::test]
async fn deposit_all_moves_every_stack_to_the_bank() {
    let mut state = WorldState::basic();
    state.character.inventory = vec![slot("iron_ore", 40), slot("feather", 3)];
    let world = FakeWorld::new(state);
    let queue = Arc::new(JobQueue::new(NAME));
    let record = queue
        .append(ObjectiveKind::Deposit, Target::deposit_all())
        .await
        .unwrap();

    let mut worker = worker(&world, deps(&world, queue.clone(), None, fast_config()));
    let done = timeout(TEST_TIMEOUT, worker.step())
        .await
        .expect("test timed out")
        .expect("objective ran");

    assert_eq!(done.id, record.id);
    assert_eq!(done.status, ObjectiveStatus::Completed);
    assert_eq!(
        world.bank(),
        BTreeMap::from([("feather".to_string(), 3), ("iron_ore".to_string(), 40)])
    );
    assert_eq!(world.character_state().total_items(), 0);
    assert_eq!(world.count(|a| matches!(a, Action::DepositItem { .. })), 2);
    assert!(queue.list_objectives().await.is_empty());
}

#[tokio::test]
async fn gather_gives_up_after_the_attempt_budget() {
    let world = FakeWorld::new(at_rocks());
    world.script((0..3).map(|_| ActionError::new(ErrorKind::Unknown, "server hiccup")));
    let queue = Arc::new(JobQueue::new(NAME));
    queue
        .append(ObjectiveKind::Gather, Target::new("copper_ore", 5))
        .await
        .unwrap();

    let mut worker = worker(&world, deps(&world, queue.clone(), None, fast_config()));
    let done = timeout(TEST_TIMEOUT, worker.step())
        .await
        .expect("test timed out")
        .expect("objective ran");

    assert_eq!(done.status, ObjectiveStatus::Failed);
    assert_eq!(done.progress, 0);
    assert_eq!(world.calls(), 3);
    let cause = done.error.expect("failure cause recorded");
    assert_eq!(cause.kind, Some(ErrorKind::Unknown));
}

#[tokio::test]
async fn rate_limited_retries_are_bounded() {
    let mut state = WorldState::basic();
    state.character.inventory = vec![slot("feather", 3)];
    let world = FakeWorld::new(state);
    world.script((0..5).map(|_| {
        ActionError::new(ErrorKind::RateLimited, "character in cooldown")
            .with_cooldown(Duration::from_millis(2))
    }));
    let queue = Arc::new(JobQueue::new(NAME));
    queue
        .append(ObjectiveKind::DeleteItem, Target::new("feather", 1))
        .await
        .unwrap();

    let mut worker = worker(&world, deps(&world, queue.clone(), None, fast_config()));
    let done = timeout(TEST_TIMEOUT, worker.step())
        .await
        .expect("test timed out")
        .expect("objective ran");

    assert_eq!(done.status, ObjectiveStatus::Failed);
    assert_eq!(world.calls(), 3);
    assert_eq!(
        done.error.and_then(|c| c.kind),
        Some(ErrorKind::RateLimited)
    );
    assert_eq!(world.state.lock().unwrap().script.len(), 2);
    assert_eq!(world.character_state().quantity_of("feather"), 3);
}

#[tokio::test]
async fn not_found_aborts_without_retrying() {
    let mut state = WorldState::basic();
    state.character.inventory = vec![slot("feather", 3)];
    let world = FakeWorld::new(state);
    world.script([ActionError::not_found("no such item")]);
    let queue = Arc::new(JobQueue::new(NAME));
    queue
        .append(ObjectiveKind::DeleteItem, Target::new("feather", 1))
        .await
        .unwrap();

    let mut worker = worker(&world, deps(&world, queue, None, fast_config()));
    let done = worker.step().await.expect("objective ran");

    assert_eq!(done.status, ObjectiveStatus::Failed);
    assert_eq!(world.calls(), 1);
    assert_eq!(done.error.and_then(|c| c.kind), Some(ErrorKind::NotFound));
}

#[tokio::test]
async fn bank_expansion_respects_the_gold_guard() {
    let mut state = WorldState::basic();
    for i in 0..95 {
        state.bank.insert(format!("item_{i:02}"), 1);
    }
    state.bank_slots = 100;
    state.bank_gold = 1000;
    state.expansion_cost = 900;
    let world = FakeWorld::new(state);
    let queue = Arc::new(JobQueue::new(NAME));
    queue
        .append(ObjectiveKind::ExpandBank, Target::new("", 0))
        .await
        .unwrap();

    let mut worker = worker(&world, deps(&world, queue, None, fast_config()));
    let done = worker.step().await.expect("objective ran");

    assert_eq!(done.status, ObjectiveStatus::Completed);
    assert_eq!(world.calls(), 0);
    assert_eq!(world.count(|a| matches!(a, Action::BuyBankExpansion)), 0);
}

#[tokio::test]
async fn bank_expansion_withdraws_gold_then_buys() {
    let mut state = WorldState::basic();
    for i in 0..95 {
        state.bank.insert(format!("item_{i:02}"), 1);
    }
    state.bank_slots = 100;
    state.bank_gold = 10_000;
    state.expansion_cost = 900;
    let world = FakeWorld::new(state);
    let queue = Arc::new(JobQueue::new(NAME));
    queue
        .append(ObjectiveKind::ExpandBank, Target::new("", 0))
        .await
        .unwrap();

    let mut worker = worker(&world, deps(&world, queue.clone(), None, fast_config()));
    let done = timeout(TEST_TIMEOUT, worker.step())
        .await
        .expect("test timed out")
        .expect("objective ran");

    assert_eq!(done.status, ObjectiveStatus::Completed);
    assert_eq!(world.count(|a| matches!(a, Action::WithdrawGold { quantity: 900 })), 1);
    assert_eq!(world.count(|a| matches!(a, Action::BuyBankExpansion)), 1);
    assert_eq!(world.state.lock().unwrap().bank_slots, 120);
    // The inline withdraw was evicted along with its parent.
    assert!(queue.list_objectives().await.is_empty());
}

#[tokio::test]
async fn failed_inline_child_stops_its_parent() {
    let mut state = WorldState::basic();
    state.resources.clear();
    let world = FakeWorld::new(state);
    let queue = Arc::new(JobQueue::new(NAME));
    let root = queue
        .append(ObjectiveKind::Craft, Target::new("copper_bar", 1))
        .await
        .unwrap();

    let mut worker = worker(&world, deps(&world, queue.clone(), None, fast_config()));
    let done = timeout(TEST_TIMEOUT, worker.step())
        .await
        .expect("test timed out")
        .expect("objective ran");

    assert_eq!(done.status, ObjectiveStatus::Failed);
    assert!(done.error.unwrap().message.contains("inline gather failed"));
    assert_eq!(world.count(|a| matches!(a, Action::Craft { .. })), 0);

    let child = queue
        .read(|t| t.history())
        .await
        .into_iter()
        .find(|r| r.parent_id.as_deref() == Some(root.id.as_str()))
        .expect("inline gather recorded");
    assert_eq!(child.kind, ObjectiveKind::Gather);
    assert_eq!(child.status, ObjectiveStatus::Failed);
}

#[tokio::test]
async fn cancelling_a_root_cancels_its_running_child() {
    let world = FakeWorld::with_cooldown(WorldState::basic(), Duration::from_millis(10));
    let queue = Arc::new(JobQueue::new(NAME));
    let root = queue
        .append(ObjectiveKind::Craft, Target::new("copper_bar", 1))
        .await
        .unwrap();

    let mut worker = worker(&world, deps(&world, queue.clone(), None, fast_config()));
    let running = tokio::spawn(async move { worker.step().await });

    let child_id = timeout(TEST_TIMEOUT, async {
        loop {
            let child = queue.list_with_parents().await.into_iter().find(|s| {
                s.parent_id.as_deref() == Some(root.id.as_str())
                    && s.status == ObjectiveStatus::InProgress
            });
            if let Some(child) = child {
                return child.id;
            }
            sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("inline gather never started");

    let affected = queue.cancel(&root.id).await.unwrap();
    assert_eq!(affected, vec![root.id.clone(), child_id.clone()]);

    let done = timeout(TEST_TIMEOUT, running)
        .await
        .expect("test timed out")
        .unwrap()
        .expect("objective ran");
    assert_eq!(done.status, ObjectiveStatus::Cancelled);

    let child = queue.record(&child_id).await.expect("child in history");
    assert_eq!(child.status, ObjectiveStatus::Cancelled);
    assert!(world.character_state().quantity_of("copper_ore") < 10);
    assert_eq!(world.count(|a| matches!(a, Action::Craft { .. })), 0);
    assert_eq!(queue.cancelled().await, vec![root.id, child_id]);
    assert!(queue.list_objectives().await.is_empty());
}

#[tokio::test]
async fn pause_freezes_actions_and_progress() {
    let world = FakeWorld::new(at_rocks());
    let queue = Arc::new(JobQueue::new(NAME));
    queue
        .append(ObjectiveKind::Gather, Target::new("copper_ore", 3))
        .await
        .unwrap();

    let deps = deps(&world, queue.clone(), None, fast_config());
    let pause = deps.pause.clone();
    let mut paused_once = false;
    world.on_action(move |action| {
        if matches!(action, Action::Gather) && !paused_once {
            paused_once = true;
            pause.pause();
        }
    });
    let pause = deps.pause.clone();
    let mut worker = worker(&world, deps);
    let running = tokio::spawn(async move { worker.step().await });

    timeout(TEST_TIMEOUT, async {
        while !pause.is_paused() {
            sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("first gather never happened");

    sleep(Duration::from_millis(50)).await;
    assert_eq!(world.count(is_gather), 1);
    let record = queue.list_with_parents().await.remove(0);
    assert_eq!(record.status, ObjectiveStatus::InProgress);
    let id = record.id;
    assert_eq!(queue.record(&id).await.unwrap().progress, 0);

    pause.resume();
    let done = timeout(TEST_TIMEOUT, running)
        .await
        .expect("test timed out")
        .unwrap()
        .expect("objective ran");
    assert_eq!(done.status, ObjectiveStatus::Completed);
    assert_eq!(done.progress, 3);
    assert_eq!(world.count(is_gather), 3);
}

#[tokio::test]
async fn interrupted_objective_resumes_from_saved_progress() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn QueueStore> = Arc::new(JsonFileStore::new(dir.path()));
    let world = FakeWorld::new(WorldState::basic());

    let queue = Arc::new(JobQueue::new(NAME));
    let gather = queue
        .append(ObjectiveKind::Gather, Target::new("copper_ore", 5))
        .await
        .unwrap();
    let deposit = queue
        .append(ObjectiveKind::Deposit, Target::deposit_all())
        .await
        .unwrap();

    let shutdown = CancellationToken::new();
    let stop = shutdown.clone();
    let mut gathers = 0;
    world.on_action(move |action| {
        if matches!(action, Action::Gather) {
            gathers += 1;
            if gathers == 2 {
                stop.cancel();
            }
        }
    });

    let first = worker(&world, deps(&world, queue, Some(store.clone()), fast_config()));
    timeout(TEST_TIMEOUT, first.run(shutdown))
        .await
        .expect("worker did not stop");

    let saved = store.load(NAME).await.unwrap().expect("snapshot written");
    let record = saved
        .jobs
        .iter()
        .find(|r| r.id == gather.id)
        .expect("gather persisted");
    assert_eq!(record.status, ObjectiveStatus::InProgress);
    assert_eq!(record.progress, 2);
    assert_eq!(saved.pending, vec![deposit.id.clone()]);

    // A new process picks up where the last one stopped.
    let restored = Arc::new(restore_queue(Some(&store), NAME).await.unwrap());
    assert_eq!(
        restored.list_objectives().await,
        vec![gather.id.clone(), deposit.id.clone()]
    );
    let mut second = worker(&world, deps(&world, restored.clone(), Some(store), fast_config()));
    let done = timeout(TEST_TIMEOUT, second.step())
        .await
        .expect("test timed out")
        .expect("objective ran");

    assert_eq!(done.id, gather.id);
    assert_eq!(done.status, ObjectiveStatus::Completed);
    assert_eq!(done.progress, 5);
    assert_eq!(world.count(is_gather), 5);
    assert_eq!(restored.list_objectives().await, vec![deposit.id]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fleet_runs_one_action_at_a_time_and_honours_cooldowns() {
    let cooldown = Duration::from_millis(15);
    let world = FakeWorld::with_cooldown(at_rocks(), cooldown);
    let store: Arc<dyn QueueStore> = Arc::new(MemoryStore::new());
    let config = artifacts_runner::config::RunnerConfig {
        retry_base_delay: Duration::from_millis(5),
        ..Default::default()
    };
    let fleet = Fleet::new(world.clone(), world.clone(), Some(store.clone()), Arc::new(config));

    let handle = fleet
        .spawn(&CharacterConfig {
            name: NAME.into(),
            role: CharacterRole::Fighter,
        })
        .await
        .unwrap();
    assert!(matches!(
        fleet.handle("bob").await,
        Err(JobError::UnknownCharacter { .. })
    ));

    let record = handle
        .append_job(ObjectiveKind::Gather, Target::new("copper_ore", 3))
        .await
        .unwrap();

    timeout(TEST_TIMEOUT, async {
        loop {
            if let Ok(job) = handle.get_job(&record.id).await {
                if job.status == ObjectiveStatus::Completed {
                    return;
                }
            }
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("gather never completed");

    fleet.shutdown().await;
    assert!(!fleet.is_running(NAME).await);

    assert_eq!(world.max_in_flight(), 1);
    let starts = world.call_starts();
    assert!(starts.len() >= 3);
    for pair in starts.windows(2) {
        assert!(pair[1] - pair[0] >= cooldown, "actions sent inside the cooldown");
    }
}

#[tokio::test]
async fn shutdown_while_paused_stops_the_worker() {
    let store: Arc<dyn QueueStore> = Arc::new(MemoryStore::new());
    let world = FakeWorld::new(at_rocks());
    let queue = Arc::new(JobQueue::new(NAME));
    let gather = queue
        .append(ObjectiveKind::Gather, Target::new("copper_ore", 5))
        .await
        .unwrap();

    let deps = deps(&world, queue.clone(), Some(store.clone()), fast_config());
    let pause = deps.pause.clone();
    world.on_action(move |action| {
        if matches!(action, Action::Gather) {
            pause.pause();
        }
    });
    let pause = deps.pause.clone();
    let shutdown = CancellationToken::new();
    let running = tokio::spawn(worker(&world, deps).run(shutdown.clone()));

    timeout(TEST_TIMEOUT, async {
        while !pause.is_paused() {
            sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("first gather never happened");
    sleep(Duration::from_millis(20)).await;

    shutdown.cancel();
    timeout(Duration::from_secs(2), running)
        .await
        .expect("worker hung while paused")
        .unwrap();

    assert!(pause.is_paused());
    assert_eq!(world.count(is_gather), 1);
    let record = queue.record(&gather.id).await.unwrap();
    assert_eq!(record.status, ObjectiveStatus::InProgress);
    let saved = store.load(NAME).await.unwrap().expect("snapshot written");
    assert_eq!(saved, queue.snapshot().await);
}

#[tokio::test]
async fn cancelled_in_progress_job_is_retired_on_restore() {
    let store: Arc<dyn QueueStore> = Arc::new(MemoryStore::new());
    let queue = JobQueue::new(NAME);
    let gather = queue
        .append(ObjectiveKind::Gather, Target::new("copper_ore", 5))
        .await
        .unwrap();
    queue.update(|t| t.begin(gather.key)).await.unwrap();
    // The process dies before the worker unwinds the cancellation.
    queue.cancel(&gather.id).await.unwrap();
    queue.save_to(store.as_ref()).await.unwrap();

    let restored = Arc::new(restore_queue(Some(&store), NAME).await.unwrap());
    assert!(restored.list_objectives().await.is_empty());
    assert_eq!(restored.cancelled().await, vec![gather.id.clone()]);
    assert_eq!(
        restored.record(&gather.id).await.unwrap().status,
        ObjectiveStatus::Cancelled
    );

    let world = FakeWorld::new(at_rocks());
    let mut worker = worker(&world, deps(&world, restored.clone(), Some(store), fast_config()));
    let ran = timeout(TEST_TIMEOUT, worker.step()).await.expect("test timed out");
    assert!(ran.is_none());
    assert_eq!(world.count(|_| true), 0);
}

/// A store whose every write fails.
struct BrokenStore;

#[async_trait::async_trait]
impl QueueStore for BrokenStore {
    async fn save(&self, _snapshot: &QueueSnapshot) -> Result<(), StoreError> {
        Err(StoreError::Task("disk full".into()))
    }

    async fn load(&self, _character: &str) -> Result<Option<QueueSnapshot>, StoreError> {
        Ok(None)
    }
}

#[tokio::test]
async fn failed_writes_leave_the_queue_intact() {
    let store: Arc<dyn QueueStore> = Arc::new(BrokenStore);
    let mut state = WorldState::basic();
    state.character.inventory = vec![slot("feather", 3)];
    let world = FakeWorld::new(state);
    let queue = Arc::new(JobQueue::new(NAME));
    let handle = CharacterHandle::new(NAME, queue.clone(), PauseControl::new(), Some(store.clone()));

    let deposit = handle
        .append_job(ObjectiveKind::Deposit, Target::deposit_all())
        .await
        .expect("append survives a failed write");
    let fight = handle
        .append_job(ObjectiveKind::Fight, Target::new("chicken", 2))
        .await
        .unwrap();
    assert_eq!(
        handle.list_objectives().await,
        vec![deposit.id.clone(), fight.id.clone()]
    );
    assert!(matches!(
        handle.save_job_queue().await,
        Err(StoreError::Task(_))
    ));

    let mut worker = worker(&world, deps(&world, queue.clone(), Some(store), fast_config()));
    let done = timeout(TEST_TIMEOUT, worker.step())
        .await
        .expect("test timed out")
        .expect("objective ran");
    assert_eq!(done.id, deposit.id);
    assert_eq!(done.status, ObjectiveStatus::Completed);
    assert_eq!(world.bank(), BTreeMap::from([("feather".to_string(), 3)]));
    assert_eq!(handle.list_objectives().await, vec![fight.id]);
}
