//! One-shot commands that never open a conversation, plus the idle payment
//! handler for notifications arriving after their purchase flow ended.

use crate::bot::purchase::complete_payment;
use crate::dialogue::Scratch;
use crate::engine::{EventPattern, Guard, HandlerResult, Machine, Outcome, TurnCtx};
use crate::errors::AppError;
use crate::event::{Event, EventPayload};

pub const MACHINE: &str = "commands";

pub fn machine() -> Machine {
    Machine::builder(MACHINE)
        .entry(EventPattern::Command("start"), Guard::Anyone, start)
        .entry(EventPattern::Command("help"), Guard::Anyone, help)
        .entry(EventPattern::Command("cancel"), Guard::Anyone, cancel_idle)
        .entry(EventPattern::Payment, Guard::Anyone, idle_payment)
        .build()
}

async fn start(ctx: TurnCtx, _event: Event, scratch: Scratch) -> HandlerResult {
    let key = if ctx.is_operator() {
        "start-welcome-operator"
    } else {
        "start-welcome"
    };
    ctx.gateway().send_text(ctx.chat, &ctx.t(key)).await?;
    Ok(Outcome::stay(scratch))
}

async fn help(ctx: TurnCtx, _event: Event, scratch: Scratch) -> HandlerResult {
    let key = if ctx.is_operator() {
        "help-operator"
    } else {
        "help-text"
    };
    ctx.gateway().send_text(ctx.chat, &ctx.t(key)).await?;
    Ok(Outcome::stay(scratch))
}

async fn cancel_idle(ctx: TurnCtx, _event: Event, scratch: Scratch) -> HandlerResult {
    ctx.gateway()
        .send_text(ctx.chat, &ctx.t("nothing-to-cancel"))
        .await?;
    Ok(Outcome::stay(scratch))
}

/// A payment can land with no conversation open, e.g. when the purchase
/// flow was cancelled after the invoice went out. It still settles.
async fn idle_payment(ctx: TurnCtx, event: Event, scratch: Scratch) -> HandlerResult {
    let EventPayload::PaymentDone(notice) = &event.payload else {
        return Err(AppError::Internal("payment pattern matched non-payment".to_string()));
    };
    complete_payment(&ctx, notice).await?;
    Ok(Outcome::stay(scratch))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_entry_is_stateless() {
        let machine = machine();
        assert_eq!(machine.entry_points().len(), 4);
        assert!(!machine.has_state("anything"));
    }
}
