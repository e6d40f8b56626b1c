//! Gather N of an item from the resource that drops it.

use crate::game::{Action, ResourceFilter, ResourceInfo};
use crate::worker::context::JobContext;

use super::common;

/// Lowest-level resource dropping `code` that the character can harvest.
async fn pick_resource(ctx: &mut JobContext<'_>, code: &str) -> Option<ResourceInfo> {
    let catalog = ctx.catalog();
    let filter = ResourceFilter {
        drop: Some(code.to_string()),
        ..Default::default()
    };
    let resources = match catalog.all_resources(&filter).await {
        Ok(r) => r,
        Err(err) => {
            ctx.fail_on(&err);
            return None;
        }
    };
    if resources.is_empty() {
        ctx.fail(format!("no resource drops {code}"));
        return None;
    }
    let character = ctx.character();
    let pick = resources
        .into_iter()
        .filter(|r| r.level <= character.skill_level(r.skill))
        .min_by_key(|r| r.level);
    if pick.is_none() {
        ctx.fail(format!("skill too low to gather {code}"));
    }
    pick
}

pub(super) async fn run(ctx: &mut JobContext<'_>) -> bool {
    let code = ctx.target().code.clone();
    let Some(resource) = pick_resource(ctx, &code).await else {
        return false;
    };
    if !ctx.move_to("resource", Some(&resource.code)).await {
        return false;
    }

    while ctx.remaining() > 0 {
        if !ctx.check_status().await {
            return false;
        }
        if ctx.character().free_space() == 0 {
            common::ensure_room(ctx).await;
            if !ctx.move_to("resource", Some(&resource.code)).await {
                return false;
            }
        }
        let before = ctx.character().quantity_of(&code);
        if ctx.perform(Action::Gather).await.is_none() {
            return false;
        }
        let gained = ctx.character().quantity_of(&code).saturating_sub(before);
        if gained > 0 {
            ctx.add_progress(gained).await;
        }
    }
    true
}
