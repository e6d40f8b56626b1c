//! Objective variants and their dispatch table.
//!
//! Each kind supplies `prerequisites` (run once, may inline children) and
//! `run` (the main loop). Both return `false` to give up; the cause is left on
//! the [`JobContext`].

mod bank;
mod common;
mod craft;
mod fight;
mod gather;
mod housekeeping;
mod idle;
mod task;
mod trade;
mod train;

use crate::worker::context::JobContext;
use crate::worker::objective::ObjectiveKind;

/// Checks performed once before `run`.
pub async fn prerequisites(ctx: &mut JobContext<'_>) -> bool {
    match ctx.kind() {
        ObjectiveKind::Fight => fight::prerequisites(ctx).await,
        ObjectiveKind::Craft => craft::prerequisites(ctx).await,
        ObjectiveKind::Gather
        | ObjectiveKind::Withdraw
        | ObjectiveKind::Trade
        | ObjectiveKind::Recycle
        | ObjectiveKind::Unequip
        | ObjectiveKind::ItemTask
        | ObjectiveKind::MonsterTask => common::ensure_room(ctx).await,
        ObjectiveKind::Deposit
        | ObjectiveKind::ExpandBank
        | ObjectiveKind::TrainSkill
        | ObjectiveKind::TidyBank
        | ObjectiveKind::DeleteItem
        | ObjectiveKind::Idle => true,
    }
}

/// The main loop of the objective.
pub async fn run(ctx: &mut JobContext<'_>) -> bool {
    match ctx.kind() {
        ObjectiveKind::Fight => fight::run(ctx).await,
        ObjectiveKind::Gather => gather::run(ctx).await,
        ObjectiveKind::Craft => craft::run(ctx).await,
        ObjectiveKind::Deposit => bank::deposit(ctx).await,
        ObjectiveKind::Withdraw => bank::withdraw(ctx).await,
        ObjectiveKind::ExpandBank => bank::expand(ctx).await,
        ObjectiveKind::Trade => trade::run(ctx).await,
        ObjectiveKind::TrainSkill => train::run(ctx).await,
        ObjectiveKind::ItemTask | ObjectiveKind::MonsterTask => task::run(ctx).await,
        ObjectiveKind::TidyBank => housekeeping::tidy_bank(ctx).await,
        ObjectiveKind::Recycle => housekeeping::recycle(ctx).await,
        ObjectiveKind::Unequip => housekeeping::unequip(ctx).await,
        ObjectiveKind::DeleteItem => housekeeping::delete_item(ctx).await,
        ObjectiveKind::Idle => idle::run(ctx).await,
    }
}
