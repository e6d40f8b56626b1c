//! Helpers shared by several variants.

use crate::game::ItemInfo;
use crate::worker::context::JobContext;
use crate::worker::objective::{ObjectiveKind, Target};

/// Empty the inventory into the bank when it is nearly full. A failed deposit
/// is not fatal; only cancellation stops the caller.
pub(super) async fn ensure_room(ctx: &mut JobContext<'_>) -> bool {
    if ctx.character().fill_ratio() >= ctx.config().inventory_full_ratio {
        tracing::debug!(job_id = %ctx.id(), "Inventory nearly full, depositing");
        ctx.execute_now(ObjectiveKind::Deposit, Target::deposit_all(), false, true)
            .await;
    }
    ctx.check_status().await
}

/// Quantity of `code` held in the bank. `None` when the lookup failed.
pub(super) async fn bank_quantity(ctx: &mut JobContext<'_>, code: &str) -> Option<u32> {
    let catalog = ctx.catalog();
    match catalog.all_bank_items().await {
        Ok(items) => Some(
            items
                .iter()
                .filter(|i| i.code == code)
                .map(|i| i.quantity)
                .sum(),
        ),
        Err(err) => {
            ctx.fail_on(&err);
            None
        }
    }
}

pub(super) async fn item_info(ctx: &mut JobContext<'_>, code: &str) -> Option<ItemInfo> {
    let catalog = ctx.catalog();
    match catalog.item(code).await {
        Ok(info) => Some(info),
        Err(err) => {
            ctx.fail_on(&err);
            None
        }
    }
}

/// Make sure `quantity` of `code` is held: withdraw what the bank has, then
/// craft or gather the rest through inline children.
pub(super) async fn obtain(ctx: &mut JobContext<'_>, code: &str, quantity: u32) -> bool {
    let held = ctx.character().quantity_of(code);
    if held >= quantity {
        return true;
    }
    let mut missing = quantity - held;

    let Some(banked) = bank_quantity(ctx, code).await else {
        return false;
    };
    let take = banked.min(missing);
    if take > 0 {
        if !ctx
            .execute_now(ObjectiveKind::Withdraw, Target::new(code, take), true, true)
            .await
        {
            return false;
        }
        missing -= take;
    }
    if missing == 0 {
        return true;
    }

    let Some(info) = item_info(ctx, code).await else {
        return false;
    };
    let kind = if info.craft.is_some() {
        ObjectiveKind::Craft
    } else {
        ObjectiveKind::Gather
    };
    ctx.execute_now(kind, Target::new(code, missing), true, true).await
}
