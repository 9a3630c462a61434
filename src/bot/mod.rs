//! The wizard machines and their shared building blocks.
//!
//! Each submodule declares one machine; [`build_registry`] assembles them in
//! entry-point priority order. Every machine gets the same fallback chain
//! appended by [`with_standard_fallbacks`], so cancellation and stray events
//! behave identically everywhere.

pub mod add_tour;
pub mod browse;
pub mod commands;
pub mod delete_tour;
pub mod edit_tour;
pub mod keyboards;
pub mod media_group;
pub mod pricing;
pub mod purchase;
pub mod section;
pub mod selectors;

use tracing::debug;

use crate::dialogue::Scratch;
use crate::engine::{EventPattern, HandlerResult, MachineBuilder, Outcome, Registry, TurnCtx};
use crate::errors::AppError;
use crate::event::{Event, EventPayload};

use self::selectors::acknowledge_pick;

/// The fallback chain every wizard carries, in match order:
/// `/cancel` and the inline Cancel button abort the flow, payments and job
/// completions that outlive their state are still honored, other commands
/// are refused while busy, and anything else gets a gentle nudge.
pub fn with_standard_fallbacks(builder: MachineBuilder) -> MachineBuilder {
    builder
        .fallback(EventPattern::Command("cancel"), cancel)
        .fallback(
            EventPattern::Callback {
                ns: "flow",
                action: Some("abort"),
            },
            abort,
        )
        .fallback(EventPattern::Payment, payment_mid_flow)
        .fallback(EventPattern::Job("transcode"), stale_job)
        .fallback(EventPattern::AnyCommand, busy)
        .fallback(EventPattern::Any, mismatch)
}

async fn cancel(ctx: TurnCtx, _event: Event, scratch: Scratch) -> HandlerResult {
    ctx.gateway().send_text(ctx.chat, &ctx.t("cancelled")).await?;
    Ok(Outcome::end(scratch))
}

async fn abort(ctx: TurnCtx, event: Event, scratch: Scratch) -> HandlerResult {
    acknowledge_pick(&ctx, &event, &ctx.t("cancelled")).await?;
    Ok(Outcome::end(scratch))
}

/// A payment landing mid-wizard still grants access; the conversation is
/// left exactly where it was.
async fn payment_mid_flow(ctx: TurnCtx, event: Event, scratch: Scratch) -> HandlerResult {
    let EventPayload::PaymentDone(notice) = &event.payload else {
        return Err(AppError::Internal("payment pattern matched non-payment".to_string()));
    };
    purchase::complete_payment(&ctx, notice).await?;
    Ok(Outcome::stay(scratch))
}

/// A conversion finishing after its wait state was left has nowhere to go.
async fn stale_job(ctx: TurnCtx, _event: Event, scratch: Scratch) -> HandlerResult {
    debug!(user_id = %ctx.user, "Dropping job completion outside its wait state");
    Ok(Outcome::stay(scratch))
}

async fn busy(ctx: TurnCtx, _event: Event, scratch: Scratch) -> HandlerResult {
    ctx.gateway().send_text(ctx.chat, &ctx.t("flow-busy")).await?;
    Ok(Outcome::stay(scratch))
}

async fn mismatch(ctx: TurnCtx, _event: Event, scratch: Scratch) -> HandlerResult {
    ctx.gateway()
        .send_text(ctx.chat, &ctx.t("input-mismatch"))
        .await?;
    Ok(Outcome::stay(scratch))
}

/// All machines, in the order their entry points are consulted.
pub fn build_registry() -> Registry {
    Registry::new(vec![
        commands::machine(),
        add_tour::machine(),
        edit_tour::machine(),
        pricing::machine(),
        delete_tour::machine(),
        purchase::machine(),
        browse::machine(),
    ])
}
