//! Task-board contracts. `quantity` is the number of tasks to hand in.
//!
//! Task progress is read from the character snapshot, never counted locally,
//! so a task picked up again after a restart continues where it stood.

use crate::game::{Action, TaskState};
use crate::worker::context::JobContext;
use crate::worker::objective::{ObjectiveKind, Target};

use super::common;

fn board(kind: ObjectiveKind) -> &'static str {
    match kind {
        ObjectiveKind::ItemTask => "items",
        _ => "monsters",
    }
}

/// Work the current task toward its total once; `false` gives up.
async fn advance(ctx: &mut JobContext<'_>, task: &TaskState) -> bool {
    let left = task.remaining();
    if ctx.kind() == ObjectiveKind::MonsterTask {
        return ctx
            .execute_now(ObjectiveKind::Fight, Target::new(&task.code, left), true, true)
            .await;
    }

    let space = ctx.character().free_space() + ctx.character().quantity_of(&task.code);
    let wanted = left.min(space.max(1));
    if !common::obtain(ctx, &task.code, wanted).await {
        return false;
    }
    let board = board(ctx.kind());
    if !ctx.move_to("tasks_master", Some(board)).await {
        return false;
    }
    let quantity = wanted.min(ctx.character().quantity_of(&task.code));
    if quantity == 0 {
        return ctx.fail(format!("no {} to hand over", task.code));
    }
    let action = Action::TaskTrade {
        code: task.code.clone(),
        quantity,
    };
    ctx.perform(action).await.is_some()
}

pub(super) async fn run(ctx: &mut JobContext<'_>) -> bool {
    let board = board(ctx.kind());

    while ctx.remaining() > 0 {
        if !ctx.check_status().await {
            return false;
        }

        let task = match ctx.character().task.clone() {
            Some(task) => task,
            None => {
                if !ctx.move_to("tasks_master", Some(board)).await {
                    return false;
                }
                if ctx.perform(Action::AcceptTask).await.is_none() {
                    return false;
                }
                match ctx.character().task.clone() {
                    Some(task) => task,
                    None => return ctx.fail("accepted task missing from character"),
                }
            }
        };
        if task.task_type != board {
            return ctx.fail(format!("character already holds a {} task", task.task_type));
        }

        if !task.is_done() {
            let before = task.progress;
            if !advance(ctx, &task).await {
                return false;
            }
            let after = ctx.character().task.as_ref().map_or(before, |t| t.progress);
            if after <= before && !ctx.consume_attempt() {
                return ctx.fail(format!("task {} is not advancing", task.code));
            }
            continue;
        }

        if !ctx.move_to("tasks_master", Some(board)).await {
            return false;
        }
        if ctx.perform(Action::CompleteTask).await.is_none() {
            return false;
        }
        tracing::info!(job_id = %ctx.id(), task = %task.code, "Task handed in");
        ctx.add_progress(1).await;
    }
    true
}
