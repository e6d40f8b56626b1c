//! Opportunistic bank and inventory upkeep.

use std::collections::HashMap;

use crate::game::{Action, ItemFilter, ItemInfo};
use crate::worker::context::JobContext;
use crate::worker::objective::{ObjectiveKind, Target};

use super::common;

/// Best intermediate product craftable purely from bank stock, with how many
/// crafts the stock allows.
fn best_conversion<'a>(
    products: &'a [ItemInfo],
    stock: &HashMap<String, u32>,
    skill_level: impl Fn(&ItemInfo) -> u32,
) -> Option<(&'a ItemInfo, u32)> {
    products
        .iter()
        .filter(|p| p.item_type == "resource")
        .filter_map(|p| {
            let craft = p.craft.as_ref()?;
            if craft.level > skill_level(p) {
                return None;
            }
            let crafts = craft
                .items
                .iter()
                .map(|i| stock.get(&i.code).copied().unwrap_or(0) / i.quantity.max(1))
                .min()?;
            (crafts > 0).then_some((p, crafts))
        })
        .max_by_key(|(p, _)| p.level)
}

/// Craft raw materials sitting in the bank into products, then recycle
/// surplus gear above the retained floor. Every step is best effort.
pub(super) async fn tidy_bank(ctx: &mut JobContext<'_>) -> bool {
    let catalog = ctx.catalog();
    let bank = match catalog.all_bank_items().await {
        Ok(items) => items,
        Err(err) => return ctx.fail_on(&err),
    };
    let mut stock: HashMap<String, u32> = HashMap::new();
    for item in &bank {
        *stock.entry(item.code.clone()).or_default() += item.quantity;
    }

    let mut infos = Vec::with_capacity(bank.len());
    for item in &bank {
        match catalog.item(&item.code).await {
            Ok(info) => infos.push(info),
            Err(err) => tracing::debug!(code = %item.code, error = %err, "Skipping unknown bank item"),
        }
    }

    // Raw materials into products.
    for material in infos.iter().filter(|i| i.item_type == "resource") {
        if !ctx.check_status().await {
            return false;
        }
        let filter = ItemFilter {
            craft_material: Some(material.code.clone()),
            ..Default::default()
        };
        let products = match catalog.all_items(&filter).await {
            Ok(p) => p,
            Err(err) => {
                tracing::debug!(code = %material.code, error = %err, "No products for material");
                continue;
            }
        };
        let character = ctx.character().clone();
        let space = character.free_space();
        let Some((product, crafts)) = best_conversion(&products, &stock, |p| {
            p.craft
                .as_ref()
                .map_or(0, |c| character.skill_level(c.skill))
        }) else {
            continue;
        };
        let Some(craft) = product.craft.as_ref() else {
            continue;
        };
        let per_craft: u32 = craft.items.iter().map(|i| i.quantity).sum::<u32>().max(1);
        let crafts = crafts.min(space / per_craft);
        if crafts == 0 {
            continue;
        }
        for ingredient in &craft.items {
            if let Some(held) = stock.get_mut(&ingredient.code) {
                *held = held.saturating_sub(ingredient.quantity * crafts);
            }
        }
        let quantity = crafts * craft.quantity.max(1);
        tracing::info!(job_id = %ctx.id(), product = %product.code, quantity, "Converting bank materials");
        ctx.execute_now(ObjectiveKind::Craft, Target::new(&product.code, quantity), false, true)
            .await;
        ctx.execute_now(ObjectiveKind::Deposit, Target::deposit_all(), false, true)
            .await;
    }

    // Surplus gear.
    let retain = ctx.config().retain_gear_quantity;
    for info in infos.iter().filter(|i| i.is_gear() && i.craft.is_some()) {
        let held = stock.get(&info.code).copied().unwrap_or(0);
        if held <= retain {
            continue;
        }
        if !ctx.check_status().await {
            return false;
        }
        ctx.execute_now(
            ObjectiveKind::Recycle,
            Target::new(&info.code, held - retain),
            false,
            true,
        )
        .await;
    }
    ctx.check_status().await
}

/// Recycle `quantity` of `code`, withdrawing it from the bank if needed.
pub(super) async fn recycle(ctx: &mut JobContext<'_>) -> bool {
    let code = ctx.target().code.clone();
    let Some(info) = common::item_info(ctx, &code).await else {
        return false;
    };
    let Some(craft) = info.craft else {
        return ctx.fail(format!("{code} cannot be recycled"));
    };

    while ctx.remaining() > 0 {
        if !ctx.check_status().await {
            return false;
        }
        let held = ctx.character().quantity_of(&code);
        if held < ctx.remaining() {
            let Some(banked) = common::bank_quantity(ctx, &code).await else {
                return false;
            };
            let take = (ctx.remaining() - held)
                .min(banked)
                .min(ctx.character().free_space());
            if take > 0
                && !ctx
                    .execute_now(ObjectiveKind::Withdraw, Target::new(&code, take), true, true)
                    .await
            {
                return false;
            }
        }
        let quantity = ctx.remaining().min(ctx.character().quantity_of(&code));
        if quantity == 0 {
            return ctx.fail(format!("no {code} to recycle"));
        }
        if !ctx.move_to("workshop", Some(craft.skill.as_str())).await {
            return false;
        }
        let action = Action::Recycle {
            code: code.clone(),
            quantity,
        };
        if ctx.perform(action).await.is_none() {
            return false;
        }
        ctx.add_progress(quantity).await;
    }
    true
}

/// Unequip a slot. An empty slot is already done.
pub(super) async fn unequip(ctx: &mut JobContext<'_>) -> bool {
    let Some(slot) = ctx.target().slot.clone() else {
        return ctx.fail("slot missing");
    };
    if ctx.character().equipped(&slot).is_none() {
        tracing::debug!(job_id = %ctx.id(), %slot, "Slot already empty");
        return true;
    }
    let quantity = ctx.target().quantity.max(1);
    ctx.perform(Action::Unequip { slot, quantity }).await.is_some()
}

/// Delete up to `quantity` of `code` from the inventory.
pub(super) async fn delete_item(ctx: &mut JobContext<'_>) -> bool {
    let code = ctx.target().code.clone();
    let quantity = ctx.remaining().min(ctx.character().quantity_of(&code));
    if quantity == 0 {
        tracing::debug!(job_id = %ctx.id(), %code, "Nothing held to delete");
        return true;
    }
    let action = Action::DeleteItem {
        code: code.clone(),
        quantity,
    };
    if ctx.perform(action).await.is_none() {
        return false;
    }
    ctx.add_progress(quantity).await;
    true
}
