//! The viewing flow: guests list their active subscriptions and get a
//! tour's assembled content replayed into the chat, section by section, in
//! the stored order.

use chrono::Utc;

use crate::bot::keyboards::{abort_row, translation_keyboard};
use crate::bot::selectors::{acknowledge_pick, on_picked, translation_pick_block};
use crate::bot::with_standard_fallbacks;
use crate::db::{ContentBody, TourTranslation};
use crate::dialogue::Scratch;
use crate::engine::{EventPattern, Guard, HandlerResult, Machine, Outcome, StateId, TurnCtx};
use crate::errors::{AppError, AppResult};
use crate::event::{CallbackData, Event, MediaKind};
use crate::gateway::{Button, Keyboard, OutgoingMedia};

pub const MACHINE: &str = "view";

const TOUR: StateId = "view_tour";
const LANGUAGE: StateId = "view_language";

pub fn machine() -> Machine {
    let builder = Machine::builder(MACHINE)
        .entry(EventPattern::Command("mytours"), Guard::Anyone, start)
        .on(
            TOUR,
            EventPattern::Callback {
                ns: "view",
                action: Some("tour"),
            },
            pick_tour,
        )
        .merge(translation_pick_block(
            LANGUAGE,
            "view",
            on_picked(deliver_picked),
        ));
    with_standard_fallbacks(builder).build()
}

async fn start(ctx: TurnCtx, _event: Event, _scratch: Scratch) -> HandlerResult {
    let now = Utc::now();
    let subscriptions = ctx.content().subscriptions_of_user(ctx.user).await?;

    let mut keyboard = Keyboard::new();
    let mut any = false;
    for subscription in subscriptions.iter().filter(|s| s.is_active(now)) {
        let translations = ctx
            .content()
            .translations_of_tour(subscription.tour_id)
            .await?;
        let Some(label) = pick_title(&translations, ctx.lang.as_deref()) else {
            continue;
        };
        keyboard = keyboard.row(vec![Button::new(
            label,
            CallbackData::with_arg("view", "tour", subscription.tour_id),
        )]);
        any = true;
    }
    if !any {
        ctx.gateway()
            .send_text(ctx.chat, &ctx.t("mytours-none"))
            .await?;
        return Ok(Outcome::stay(Scratch::None));
    }

    keyboard = keyboard.row(abort_row(ctx.lang.as_deref()));
    ctx.gateway()
        .send_text_with_keyboard(ctx.chat, &ctx.t("mytours-pick"), &keyboard)
        .await?;
    Ok(Outcome::goto(TOUR, Scratch::None))
}

/// The tour's title in the viewer's language when it has one, otherwise in
/// the first language it was authored in.
pub(crate) fn pick_title(
    translations: &[TourTranslation],
    lang: Option<&str>,
) -> Option<String> {
    lang.and_then(|code| translations.iter().find(|t| t.language == code))
        .or_else(|| translations.first())
        .map(|t| t.title.clone())
}

async fn pick_tour(ctx: TurnCtx, event: Event, scratch: Scratch) -> HandlerResult {
    let tour_id = event
        .callback()
        .and_then(|data| data.id_arg())
        .ok_or_else(|| AppError::Internal("tour pick without an id".to_string()))?;

    if !has_active_subscription(&ctx, tour_id).await? {
        acknowledge_pick(&ctx, &event, &ctx.t("view-expired")).await?;
        return Ok(Outcome::end(scratch));
    }

    let translations = ctx.content().translations_of_tour(tour_id).await?;
    match translations.as_slice() {
        [] => {
            acknowledge_pick(&ctx, &event, &ctx.t("tour-vanished")).await?;
            Ok(Outcome::end(scratch))
        }
        [only] => {
            acknowledge_pick(&ctx, &event, &ctx.t("view-delivering")).await?;
            deliver(&ctx, only).await?;
            Ok(Outcome::end(scratch))
        }
        many => {
            ctx.gateway()
                .send_text_with_keyboard(
                    ctx.chat,
                    &ctx.t("view-pick-language"),
                    &translation_keyboard("view", many, ctx.lang.as_deref()),
                )
                .await?;
            Ok(Outcome::goto(LANGUAGE, scratch))
        }
    }
}

async fn deliver_picked(
    ctx: TurnCtx,
    event: Event,
    translation: TourTranslation,
    scratch: Scratch,
) -> HandlerResult {
    // The subscription may have lapsed while the keyboard sat unused.
    if !has_active_subscription(&ctx, translation.tour_id).await? {
        acknowledge_pick(&ctx, &event, &ctx.t("view-expired")).await?;
        return Ok(Outcome::end(scratch));
    }
    acknowledge_pick(&ctx, &event, &ctx.t("view-delivering")).await?;
    deliver(&ctx, &translation).await?;
    Ok(Outcome::end(scratch))
}

async fn has_active_subscription(ctx: &TurnCtx, tour_id: i64) -> AppResult<bool> {
    let subscription = ctx.content().subscription_of(ctx.user, tour_id).await?;
    Ok(subscription.is_some_and(|s| s.is_active(Utc::now())))
}

/// Replay one translation into the chat: title and description first, then
/// each section's header and content rows in stored order.
async fn deliver(ctx: &TurnCtx, translation: &TourTranslation) -> AppResult<()> {
    let mut header = translation.title.clone();
    if let Some(description) = &translation.description {
        header.push_str("\n\n");
        header.push_str(description);
    }
    ctx.gateway().send_text(ctx.chat, &header).await?;

    let sections = ctx.content().sections_of_translation(translation.id).await?;
    for section in &sections {
        ctx.gateway().send_text(ctx.chat, &section.title).await?;
        let contents = ctx.content().contents_of_section(section.id).await?;
        for content in &contents {
            send_content(ctx, &content.body).await?;
        }
    }
    Ok(())
}

async fn send_content(ctx: &TurnCtx, body: &ContentBody) -> AppResult<()> {
    match body {
        ContentBody::Text { text } => ctx.gateway().send_text(ctx.chat, text).await,
        ContentBody::Location {
            latitude,
            longitude,
        } => {
            ctx.gateway()
                .send_location(ctx.chat, *latitude, *longitude)
                .await
        }
        ContentBody::Photo { file_id, caption } => {
            send_single(ctx, MediaKind::Photo, file_id, caption.clone()).await
        }
        ContentBody::Audio { file_id, caption } => {
            send_single(ctx, MediaKind::Audio, file_id, caption.clone()).await
        }
        ContentBody::Voice { file_id, caption } => {
            send_single(ctx, MediaKind::Voice, file_id, caption.clone()).await
        }
        ContentBody::Video { file_id, caption } => {
            send_single(ctx, MediaKind::Video, file_id, caption.clone()).await
        }
        ContentBody::Animation { file_id, caption } => {
            send_single(ctx, MediaKind::Animation, file_id, caption.clone()).await
        }
        ContentBody::VideoNote { file_id } => {
            send_single(ctx, MediaKind::VideoNote, file_id, None).await
        }
        ContentBody::MediaGroup { items, .. } => {
            let outgoing: Vec<OutgoingMedia> = items
                .iter()
                .map(|item| OutgoingMedia {
                    kind: item.kind,
                    file_id: item.file_id.clone(),
                    caption: item.caption.clone(),
                })
                .collect();
            ctx.gateway().send_media_group(ctx.chat, &outgoing).await
        }
    }
}

async fn send_single(
    ctx: &TurnCtx,
    kind: MediaKind,
    file_id: &str,
    caption: Option<String>,
) -> AppResult<()> {
    let media = OutgoingMedia {
        kind,
        file_id: file_id.to_string(),
        caption,
    };
    ctx.gateway().send_media(ctx.chat, &media).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn translation(id: i64, title: &str, language: &str) -> TourTranslation {
        TourTranslation {
            id,
            tour_id: 1,
            language: language.to_string(),
            title: title.to_string(),
            description: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn title_prefers_the_viewer_language() {
        let translations = vec![
            translation(1, "Old town", "en"),
            translation(2, "Vieille ville", "fr"),
        ];
        assert_eq!(
            pick_title(&translations, Some("fr")),
            Some("Vieille ville".to_string())
        );
        assert_eq!(
            pick_title(&translations, Some("de")),
            Some("Old town".to_string())
        );
        assert_eq!(pick_title(&[], Some("fr")), None);
    }

    #[test]
    fn machine_has_both_selection_states() {
        let machine = machine();
        assert!(machine.has_state(TOUR));
        assert!(machine.has_state(LANGUAGE));
    }
}
