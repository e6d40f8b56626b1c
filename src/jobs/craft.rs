//! Craft N of an item: gather the ingredients, walk to the workshop, craft.

use crate::game::{Action, CraftInfo};
use crate::worker::context::JobContext;
use crate::worker::objective::{ObjectiveKind, Target};

use super::common;

async fn recipe(ctx: &mut JobContext<'_>) -> Option<CraftInfo> {
    let code = ctx.target().code.clone();
    let info = common::item_info(ctx, &code).await?;
    if info.craft.is_none() {
        ctx.fail(format!("{code} cannot be crafted"));
    }
    info.craft
}

/// The recipe must exist and the crafting skill must be high enough; a low
/// skill is trained inline first.
pub(super) async fn prerequisites(ctx: &mut JobContext<'_>) -> bool {
    if !common::ensure_room(ctx).await {
        return false;
    }
    let Some(craft) = recipe(ctx).await else {
        return false;
    };
    if ctx.character().skill_level(craft.skill) >= craft.level {
        return true;
    }
    tracing::info!(job_id = %ctx.id(), skill = %craft.skill, level = craft.level, "Crafting skill too low, training");
    ctx.execute_now(
        ObjectiveKind::TrainSkill,
        Target::skill_level(craft.skill, craft.level),
        true,
        true,
    )
    .await
}

/// How many crafts fit in the inventory at once.
fn batch_size(free_slots: u32, craft: &CraftInfo, crafts_needed: u32) -> u32 {
    let per_craft: u32 = craft.items.iter().map(|i| i.quantity).sum::<u32>().max(1);
    (free_slots / per_craft).clamp(1, crafts_needed.max(1))
}

pub(super) async fn run(ctx: &mut JobContext<'_>) -> bool {
    let code = ctx.target().code.clone();
    let Some(craft) = recipe(ctx).await else {
        return false;
    };
    let per_craft = craft.quantity.max(1);

    while ctx.remaining() > 0 {
        if !ctx.check_status().await {
            return false;
        }
        let crafts_needed = ctx.remaining().div_ceil(per_craft);
        // Ingredients already held count toward the space a batch needs.
        let held: u32 = craft
            .items
            .iter()
            .map(|i| ctx.character().quantity_of(&i.code))
            .sum();
        let batch = batch_size(ctx.character().free_space() + held, &craft, crafts_needed);

        for ingredient in &craft.items {
            if !common::obtain(ctx, &ingredient.code, ingredient.quantity * batch).await {
                if ctx.failure().is_none() {
                    ctx.fail(format!("missing {} for {code}", ingredient.code));
                }
                return false;
            }
        }

        if !ctx.move_to("workshop", Some(craft.skill.as_str())).await {
            return false;
        }
        let action = Action::Craft {
            code: code.clone(),
            quantity: batch,
        };
        if ctx.perform(action).await.is_none() {
            return false;
        }
        ctx.add_progress(batch * per_craft).await;
    }
    true
}
