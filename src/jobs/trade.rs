//! Buy or sell at the exchange.

use crate::game::Action;
use crate::worker::context::JobContext;
use crate::worker::objective::TradeSide;

use super::common;

const EXCHANGE: &str = "grand_exchange";

pub(super) async fn run(ctx: &mut JobContext<'_>) -> bool {
    let code = ctx.target().code.clone();
    let Some(side) = ctx.target().trade else {
        return ctx.fail("trade side missing");
    };

    while ctx.remaining() > 0 {
        if !ctx.check_status().await {
            return false;
        }
        let quantity = match side {
            TradeSide::Sell => {
                if ctx.character().quantity_of(&code) == 0 {
                    let wanted = ctx.remaining();
                    if !common::obtain(ctx, &code, wanted).await {
                        return false;
                    }
                }
                ctx.remaining().min(ctx.character().quantity_of(&code))
            }
            TradeSide::Buy => ctx.remaining().min(ctx.character().free_space()),
        };
        if quantity == 0 {
            return ctx.fail(format!("nothing to {} for {code}", side_name(side)));
        }

        if !ctx.move_to(EXCHANGE, None).await {
            return false;
        }
        let action = match side {
            TradeSide::Buy => Action::Buy {
                code: code.clone(),
                quantity,
            },
            TradeSide::Sell => Action::Sell {
                code: code.clone(),
                quantity,
            },
        };
        if ctx.perform(action).await.is_none() {
            return false;
        }
        ctx.add_progress(quantity).await;
    }
    true
}

fn side_name(side: TradeSide) -> &'static str {
    match side {
        TradeSide::Buy => "buy",
        TradeSide::Sell => "sell",
    }
}
