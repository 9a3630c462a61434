//! The delete-tour flow: pick a translation, confirm, and the whole tour
//! goes away in every language, together with its sections, products and
//! subscriptions. Paid invoices are snapshots and survive.

use crate::bot::keyboards::{confirm_delete_keyboard, translation_keyboard};
use crate::bot::selectors::{acknowledge_pick, on_picked, owned_translation_pick_block};
use crate::bot::with_standard_fallbacks;
use crate::db::TourTranslation;
use crate::dialogue::{Scratch, TourRemovalScratch};
use crate::engine::{EventPattern, Guard, HandlerResult, Machine, Outcome, StateId, TurnCtx};
use crate::errors::AppError;
use crate::event::Event;
use tracing::info;

pub const MACHINE: &str = "tour_del";

const PICK: StateId = "del_pick";
const CONFIRM: StateId = "del_confirm";

pub fn machine() -> Machine {
    let builder = Machine::builder(MACHINE)
        .entry(EventPattern::Command("deletetour"), Guard::Operators, start)
        .merge(owned_translation_pick_block(
            PICK,
            "del",
            on_picked(pick_translation),
        ))
        .on(
            CONFIRM,
            EventPattern::Callback {
                ns: "del",
                action: Some("confirm"),
            },
            confirm_delete,
        )
        .on(
            CONFIRM,
            EventPattern::Callback {
                ns: "del",
                action: Some("abort"),
            },
            abort_delete,
        );
    with_standard_fallbacks(builder).build()
}

async fn start(ctx: TurnCtx, _event: Event, _scratch: Scratch) -> HandlerResult {
    let translations = ctx.content().translations_for_operator(ctx.user).await?;
    if translations.is_empty() {
        ctx.gateway()
            .send_text(ctx.chat, &ctx.t("no-tours-yet"))
            .await?;
        return Ok(Outcome::stay(Scratch::None));
    }
    ctx.gateway()
        .send_text_with_keyboard(
            ctx.chat,
            &ctx.t("deletetour-pick-tour"),
            &translation_keyboard("del", &translations, ctx.lang.as_deref()),
        )
        .await?;
    Ok(Outcome::goto(
        PICK,
        Scratch::TourRemoval(TourRemovalScratch::default()),
    ))
}

async fn pick_translation(
    ctx: TurnCtx,
    _event: Event,
    translation: TourTranslation,
    mut scratch: Scratch,
) -> HandlerResult {
    let removal = scratch.tour_removal_mut()?;
    removal.tour_id = Some(translation.tour_id);

    let text = ctx.t_args("delete-confirm", &[("title", translation.title.as_str())]);
    ctx.gateway()
        .send_text_with_keyboard(ctx.chat, &text, &confirm_delete_keyboard(ctx.lang.as_deref()))
        .await?;
    Ok(Outcome::goto(CONFIRM, scratch))
}

async fn confirm_delete(ctx: TurnCtx, event: Event, mut scratch: Scratch) -> HandlerResult {
    let tour_id = scratch
        .tour_removal_mut()?
        .tour_id
        .ok_or_else(|| AppError::Internal("delete confirmation with no tour".to_string()))?;

    let deleted = ctx.content().delete_tour(tour_id).await?;
    if deleted {
        info!(user_id = %ctx.user, tour_id = tour_id, "Tour deleted");
    }
    let key = if deleted { "tour-deleted" } else { "tour-already-gone" };
    acknowledge_pick(&ctx, &event, &ctx.t(key)).await?;
    Ok(Outcome::end(scratch))
}

async fn abort_delete(ctx: TurnCtx, event: Event, scratch: Scratch) -> HandlerResult {
    acknowledge_pick(&ctx, &event, &ctx.t("delete-aborted")).await?;
    Ok(Outcome::end(scratch))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{CallbackData, EventPayload};

    #[test]
    fn confirm_state_handles_both_buttons() {
        let machine = machine();
        let confirm = EventPayload::Callback(CallbackData::new("del", "confirm"));
        let abort = EventPayload::Callback(CallbackData::new("del", "abort"));
        assert!(machine.resolve(CONFIRM, &confirm).is_some());
        assert!(machine.resolve(CONFIRM, &abort).is_some());
    }

    #[test]
    fn stray_pick_in_confirm_state_is_caught_by_fallback() {
        let machine = machine();
        // An old keyboard press matches no CONFIRM transition; the catch-all
        // fallback must still answer it.
        let stale = EventPayload::Callback(CallbackData::with_arg("del", "pick", 9));
        assert!(machine.resolve(CONFIRM, &stale).is_some());
    }
}
