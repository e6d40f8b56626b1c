//! Fight N of a monster.

use crate::game::action::FightResult;
use crate::game::{Action, MonsterInfo, Skill, simulate};
use crate::worker::context::JobContext;
use crate::worker::objective::{ObjectiveKind, Target};

use super::common;

async fn monster(ctx: &mut JobContext<'_>) -> Option<MonsterInfo> {
    let catalog = ctx.catalog();
    let code = ctx.target().code.clone();
    match catalog.monster(&code).await {
        Ok(m) => Some(m),
        Err(err) => {
            ctx.fail_on(&err);
            None
        }
    }
}

/// Simulate against current gear; on a forecast loss train combat inline and
/// simulate again, within the attempt budget.
pub(super) async fn prerequisites(ctx: &mut JobContext<'_>) -> bool {
    if !common::ensure_room(ctx).await {
        return false;
    }
    let Some(monster) = monster(ctx).await else {
        return false;
    };

    loop {
        let forecast = simulate(ctx.character(), &monster);
        if forecast.win {
            tracing::debug!(job_id = %ctx.id(), turns = forecast.turns, hp_left = forecast.hp_left, "Fight forecast is a win");
            return true;
        }
        tracing::info!(job_id = %ctx.id(), monster = %monster.code, "Fight forecast is a loss, training combat");
        if !ctx.consume_attempt() {
            return ctx.fail(format!("cannot beat {} with current gear", monster.code));
        }
        let next = ctx.character().level + 1;
        if !ctx
            .execute_now(ObjectiveKind::TrainSkill, Target::skill_level(Skill::Combat, next), false, true)
            .await
            && !ctx.check_status().await
        {
            return false;
        }
    }
}

pub(super) async fn run(ctx: &mut JobContext<'_>) -> bool {
    let code = ctx.target().code.clone();
    if !ctx.move_to("monster", Some(&code)).await {
        return false;
    }

    while ctx.remaining() > 0 {
        if !ctx.check_status().await {
            return false;
        }
        if ctx.character().fill_ratio() >= ctx.config().inventory_full_ratio {
            common::ensure_room(ctx).await;
            if !ctx.move_to("monster", Some(&code)).await {
                return false;
            }
        }
        let low_hp = ctx.character().hp * 2 < ctx.character().stats.max_hp;
        if low_hp && ctx.perform(Action::Rest).await.is_none() {
            return false;
        }

        let Some(result) = ctx.perform(Action::Fight).await else {
            return false;
        };
        match result.fight {
            Some(FightResult::Loss) => {
                tracing::warn!(job_id = %ctx.id(), monster = %code, "Lost a fight");
                if !ctx.consume_attempt() {
                    return ctx.fail(format!("lost too many fights against {code}"));
                }
            }
            _ => ctx.add_progress(1).await,
        }
    }
    true
}
