//! Reusable selector states.
//!
//! Several wizards start by picking one of the operator's (or the shop's)
//! tour translations from an inline keyboard. The waiting state is the same
//! everywhere: match the `<ns>:pick:<id>` button, re-fetch the row, and only
//! the continuation differs per wizard. Flows merge this block into their
//! own table, so the selection shares the parent conversation.

use std::future::Future;
use std::sync::Arc;

use crate::db::TourTranslation;
use crate::dialogue::Scratch;
use crate::engine::{
    handler, EventPattern, HandlerFuture, HandlerResult, Outcome, StateId, TransitionBlock,
    TurnCtx,
};
use crate::errors::AppError;
use crate::event::Event;

/// What a wizard does once the user picked a translation.
pub type TranslationPicked =
    Arc<dyn Fn(TurnCtx, Event, TourTranslation, Scratch) -> HandlerFuture + Send + Sync>;

/// Box a plain async fn into a [`TranslationPicked`] continuation.
pub fn on_picked<F, Fut>(f: F) -> TranslationPicked
where
    F: Fn(TurnCtx, Event, TourTranslation, Scratch) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |ctx, event, translation, scratch| Box::pin(f(ctx, event, translation, scratch)))
}

/// A single state waiting for a `<ns>:pick:<translation-id>` press.
///
/// The translation is re-fetched on every press; one that vanished since the
/// keyboard was sent ends the conversation with an explanation.
pub fn translation_pick_block(
    state: StateId,
    ns: &'static str,
    picked: TranslationPicked,
) -> TransitionBlock {
    let mut block = TransitionBlock::new();
    let pick_handler = handler(move |ctx: TurnCtx, event: Event, scratch: Scratch| {
        let picked = picked.clone();
        async move {
            let id = event
                .callback()
                .and_then(|data| data.id_arg())
                .ok_or_else(|| AppError::Internal("pick callback without an id".to_string()))?;
            match ctx.content().get_translation(id).await? {
                Some(translation) => picked(ctx, event, translation, scratch).await,
                None => {
                    ctx.gateway()
                        .send_text(ctx.chat, &ctx.t("tour-vanished"))
                        .await?;
                    Ok(Outcome::end(scratch))
                }
            }
        }
    });
    block.push(
        state,
        EventPattern::Callback {
            ns,
            action: Some("pick"),
        },
        pick_handler,
    );
    block
}

/// Like [`translation_pick_block`], but the continuation only runs when the
/// picked translation's tour belongs to the pressing operator. A forged or
/// stale press into someone else's tour is answered as if the tour were gone.
pub fn owned_translation_pick_block(
    state: StateId,
    ns: &'static str,
    picked: TranslationPicked,
) -> TransitionBlock {
    let guarded = on_picked(
        move |ctx: TurnCtx, event: Event, translation: TourTranslation, scratch: Scratch| {
            let picked = picked.clone();
            async move {
                let owned = match ctx.content().get_tour(translation.tour_id).await? {
                    Some(tour) => tour.operator_id == ctx.user,
                    None => false,
                };
                if !owned {
                    ctx.gateway()
                        .send_text(ctx.chat, &ctx.t("tour-vanished"))
                        .await?;
                    return Ok(Outcome::end(scratch));
                }
                picked(ctx, event, translation, scratch).await
            }
        },
    );
    translation_pick_block(state, ns, guarded)
}

/// Acknowledge a pick by rewriting the keyboard message when its id is
/// known, falling back to a fresh message.
pub async fn acknowledge_pick(ctx: &TurnCtx, event: &Event, text: &str) -> crate::errors::AppResult<()> {
    match event.message_id {
        Some(message_id) => ctx.gateway().edit_text(ctx.chat, message_id, text).await,
        None => ctx.gateway().send_text(ctx.chat, text).await,
    }
}
