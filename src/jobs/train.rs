//! Raise a skill to a target level.
//!
//! Each round picks the best level-appropriate monster, resource or recipe,
//! runs one inline batch of it and re-reads the level.

use crate::game::{ItemFilter, MonsterFilter, ResourceFilter, Skill, simulate};
use crate::worker::context::JobContext;
use crate::worker::objective::{ObjectiveKind, Target};

/// Highest-level monster the character is forecast to beat.
async fn best_monster(ctx: &mut JobContext<'_>) -> Option<String> {
    let catalog = ctx.catalog();
    let filter = MonsterFilter {
        max_level: Some(ctx.character().level),
        ..Default::default()
    };
    let monsters = match catalog.all_monsters(&filter).await {
        Ok(m) => m,
        Err(err) => {
            ctx.fail_on(&err);
            return None;
        }
    };
    let character = ctx.character();
    monsters
        .into_iter()
        .filter(|m| simulate(character, m).win)
        .max_by_key(|m| m.level)
        .map(|m| m.code)
}

/// Most common drop of the highest-level resource the skill can harvest.
async fn best_resource_drop(ctx: &mut JobContext<'_>, skill: Skill) -> Option<String> {
    let catalog = ctx.catalog();
    let filter = ResourceFilter {
        skill: Some(skill),
        max_level: Some(ctx.character().skill_level(skill)),
        ..Default::default()
    };
    let resources = match catalog.all_resources(&filter).await {
        Ok(r) => r,
        Err(err) => {
            ctx.fail_on(&err);
            return None;
        }
    };
    resources
        .into_iter()
        .max_by_key(|r| r.level)
        .and_then(|r| r.drops.into_iter().min_by_key(|d| d.rate))
        .map(|d| d.code)
}

/// Highest-level recipe of the skill the character can already craft.
async fn best_recipe(ctx: &mut JobContext<'_>, skill: Skill) -> Option<String> {
    let catalog = ctx.catalog();
    let filter = ItemFilter {
        craft_skill: Some(skill),
        max_level: Some(ctx.character().skill_level(skill)),
        ..Default::default()
    };
    let items = match catalog.all_items(&filter).await {
        Ok(i) => i,
        Err(err) => {
            ctx.fail_on(&err);
            return None;
        }
    };
    let level = ctx.character().skill_level(skill);
    items
        .into_iter()
        .filter(|i| i.craft.as_ref().is_some_and(|c| c.level <= level))
        .max_by_key(|i| i.level)
        .map(|i| i.code)
}

/// One training batch for `skill` as an inline child.
pub(super) async fn train_step(ctx: &mut JobContext<'_>, skill: Skill) -> bool {
    let batch = ctx.config().train_batch.max(1);
    let pick = if skill == Skill::Combat {
        best_monster(ctx).await.map(|c| (ObjectiveKind::Fight, c))
    } else if skill.is_gathering() {
        best_resource_drop(ctx, skill).await.map(|c| (ObjectiveKind::Gather, c))
    } else {
        best_recipe(ctx, skill).await.map(|c| (ObjectiveKind::Craft, c))
    };
    let Some((kind, code)) = pick else {
        if ctx.failure().is_none() {
            ctx.fail(format!("nothing to train {skill} on"));
        }
        return false;
    };
    tracing::debug!(job_id = %ctx.id(), %skill, %kind, %code, "Training batch");
    ctx.execute_now(kind, Target::new(code, batch), false, true).await
}

pub(super) async fn run(ctx: &mut JobContext<'_>) -> bool {
    let Some(skill) = ctx.target().skill else {
        return ctx.fail("skill missing");
    };
    let goal = ctx.target().quantity;

    loop {
        let level = ctx.character().skill_level(skill);
        if level != ctx.progress() {
            ctx.set_progress(level).await;
        }
        if level >= goal {
            return true;
        }
        if !ctx.check_status().await {
            return false;
        }
        if !train_step(ctx, skill).await {
            if !ctx.check_status().await {
                return false;
            }
            if !ctx.consume_attempt() {
                if ctx.failure().is_none() {
                    ctx.fail(format!("{skill} stalled at level {level}"));
                }
                return false;
            }
        }
    }
}
