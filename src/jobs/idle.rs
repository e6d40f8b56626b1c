//! Fallback when the queue is empty: housekeeping, then one batch of the
//! character's role.

use crate::config::CharacterRole;
use crate::worker::context::JobContext;
use crate::worker::objective::{ObjectiveKind, Target};

use super::train;

pub(super) async fn run(ctx: &mut JobContext<'_>) -> bool {
    // Housekeeping failures never end the idle turn.
    if ctx.character().total_items() > 0 {
        ctx.execute_now(ObjectiveKind::Deposit, Target::deposit_all(), false, true)
            .await;
    }
    ctx.execute_now(ObjectiveKind::ExpandBank, Target::new("", 0), false, true)
        .await;
    ctx.execute_now(ObjectiveKind::TidyBank, Target::new("", 0), false, true)
        .await;
    if !ctx.check_status().await {
        return false;
    }

    match ctx.role().clone() {
        CharacterRole::Fighter => {
            ctx.execute_now(ObjectiveKind::MonsterTask, Target::new("", 1), false, true)
                .await
        }
        CharacterRole::Tasker => {
            ctx.execute_now(ObjectiveKind::ItemTask, Target::new("", 1), false, true)
                .await
        }
        CharacterRole::Gatherer(skill) | CharacterRole::Crafter(skill) => {
            train::train_step(ctx, skill).await
        }
    }
}
