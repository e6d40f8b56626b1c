//! Bank objectives: deposit, withdraw, expand.

use crate::game::Action;
use crate::worker::context::JobContext;
use crate::worker::objective::{DEPOSIT_ALL, GOLD, ObjectiveKind, Target};

use super::common;

async fn deposit_item(ctx: &mut JobContext<'_>, code: &str, quantity: u32) -> bool {
    // Not held any more: nothing to do.
    let quantity = quantity.min(ctx.character().quantity_of(code));
    if quantity == 0 {
        return true;
    }
    let action = Action::DepositItem {
        code: code.to_string(),
        quantity,
    };
    if ctx.perform(action).await.is_none() {
        return false;
    }
    ctx.add_progress(quantity).await;
    true
}

/// `code = "all"` empties the inventory, `code = "gold"` deposits gold, and
/// `quantity = 0` means everything held of `code`.
pub(super) async fn deposit(ctx: &mut JobContext<'_>) -> bool {
    let target = ctx.target().clone();
    if target.code == DEPOSIT_ALL && ctx.character().total_items() == 0 {
        return true;
    }
    if !ctx.move_to_bank().await {
        return false;
    }

    match target.code.as_str() {
        DEPOSIT_ALL => {
            let held: Vec<(String, u32)> = ctx
                .character()
                .held_items()
                .map(|slot| (slot.code.clone(), slot.quantity))
                .collect();
            for (code, quantity) in held {
                if !deposit_item(ctx, &code, quantity).await {
                    return false;
                }
            }
            true
        }
        GOLD => {
            let gold = ctx.character().gold;
            let quantity = match target.quantity {
                0 => gold,
                n => u64::from(n).min(gold),
            };
            if quantity == 0 {
                return true;
            }
            ctx.perform(Action::DepositGold { quantity }).await.is_some()
        }
        code => {
            let quantity = match target.quantity {
                0 => ctx.character().quantity_of(code),
                n => n,
            };
            deposit_item(ctx, code, quantity).await
        }
    }
}

/// Withdraw `quantity` of `code` (or gold) from the bank.
pub(super) async fn withdraw(ctx: &mut JobContext<'_>) -> bool {
    let code = ctx.target().code.clone();
    if !ctx.move_to_bank().await {
        return false;
    }

    if code == GOLD {
        let quantity = u64::from(ctx.remaining());
        if ctx.perform(Action::WithdrawGold { quantity }).await.is_none() {
            return false;
        }
        let remaining = ctx.remaining();
        ctx.add_progress(remaining).await;
        return true;
    }

    while ctx.remaining() > 0 {
        if !ctx.check_status().await {
            return false;
        }
        let Some(banked) = common::bank_quantity(ctx, &code).await else {
            return false;
        };
        let quantity = ctx.remaining().min(banked).min(ctx.character().free_space());
        if quantity == 0 {
            return if banked == 0 {
                ctx.fail(format!("bank holds no {code}"))
            } else {
                ctx.fail("inventory is full")
            };
        }
        let action = Action::WithdrawItem {
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

/// Buy a bank expansion only when the bank is nearly full and enough gold is
/// left after paying; otherwise succeed without buying.
pub(super) async fn expand(ctx: &mut JobContext<'_>) -> bool {
    let catalog = ctx.catalog();
    let details = match catalog.bank_details().await {
        Ok(d) => d,
        Err(err) => return ctx.fail_on(&err),
    };
    let items = match catalog.all_bank_items().await {
        Ok(items) => items,
        Err(err) => return ctx.fail_on(&err),
    };

    let cost = details.next_expansion_cost;
    let total_gold = details.gold + ctx.character().gold;
    if !should_expand(
        items.len(),
        details.slots,
        total_gold,
        cost,
        ctx.config().bank_full_ratio,
        ctx.config().bank_gold_guard_ratio,
    ) {
        tracing::debug!(
            job_id = %ctx.id(),
            used = items.len(),
            slots = details.slots,
            total_gold,
            cost,
            "Bank expansion not needed or not affordable"
        );
        return true;
    }

    let short = cost.saturating_sub(ctx.character().gold);
    if short > 0 {
        let short = u32::try_from(short).unwrap_or(u32::MAX);
        if !ctx
            .execute_now(ObjectiveKind::Withdraw, Target::new(GOLD, short), true, true)
            .await
        {
            return false;
        }
    }
    if !ctx.move_to_bank().await {
        return false;
    }
    tracing::info!(job_id = %ctx.id(), cost, "Buying bank expansion");
    ctx.perform(Action::BuyBankExpansion).await.is_some()
}

/// Fullness trigger plus leftover-gold guard.
fn should_expand(
    used: usize,
    slots: u32,
    total_gold: u64,
    cost: u64,
    full_ratio: f64,
    guard_ratio: f64,
) -> bool {
    let fill = if slots == 0 {
        1.0
    } else {
        used as f64 / f64::from(slots)
    };
    if fill < full_ratio || cost > total_gold {
        return false;
    }
    (total_gold - cost) as f64 >= guard_ratio * total_gold as f64
}
