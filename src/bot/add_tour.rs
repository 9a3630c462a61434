//! The add-tour wizard: pick a language, name the tour, optionally describe
//! it, then assemble sections through the shared section states.
//!
//! The tour row and its translation are only written once a valid title
//! arrives, so backing out before that point leaves nothing behind.

use crate::bot::keyboards::locale_keyboard;
use crate::bot::section::{self, cleanup_tour_draft, section_block};
use crate::bot::selectors::acknowledge_pick;
use crate::bot::with_standard_fallbacks;
use crate::dialogue::{Scratch, TourDraftScratch};
use crate::engine::{EventPattern, Guard, HandlerResult, Machine, Outcome, StateId, TurnCtx};
use crate::errors::AppError;
use crate::event::Event;
use crate::validation::{validate_tour_description, validate_tour_title};

pub const MACHINE: &str = "tour_add";

const LANGUAGE: StateId = "add_language";
const TITLE: StateId = "add_title";
const DESCRIPTION: StateId = "add_description";

pub fn machine() -> Machine {
    let builder = Machine::builder(MACHINE)
        .entry(EventPattern::Command("addtour"), Guard::Operators, start)
        .on(
            LANGUAGE,
            EventPattern::Callback {
                ns: "lang",
                action: Some("pick"),
            },
            pick_language,
        )
        .on(TITLE, EventPattern::AnyText, accept_title)
        .on(DESCRIPTION, EventPattern::AnyText, accept_description)
        .on(DESCRIPTION, EventPattern::Command("skip"), skip_description)
        .merge(section_block())
        .cleanup(cleanup_tour_draft);
    with_standard_fallbacks(builder).build()
}

async fn start(ctx: TurnCtx, _event: Event, _scratch: Scratch) -> HandlerResult {
    ctx.gateway()
        .send_text_with_keyboard(
            ctx.chat,
            &ctx.t("addtour-pick-language"),
            &locale_keyboard(&ctx.services.config.bot.tour_languages, ctx.lang.as_deref()),
        )
        .await?;
    Ok(Outcome::goto(
        LANGUAGE,
        Scratch::TourDraft(TourDraftScratch::default()),
    ))
}

async fn pick_language(ctx: TurnCtx, event: Event, mut scratch: Scratch) -> HandlerResult {
    let code = event
        .callback()
        .and_then(|data| data.arg.clone())
        .ok_or_else(|| AppError::Internal("language pick without a code".to_string()))?;
    if !ctx.services.config.bot.tour_languages.contains(&code) {
        // Forged or stale press; offer the list again.
        ctx.gateway()
            .send_text_with_keyboard(
                ctx.chat,
                &ctx.t("addtour-pick-language"),
                &locale_keyboard(&ctx.services.config.bot.tour_languages, ctx.lang.as_deref()),
            )
            .await?;
        return Ok(Outcome::stay(scratch));
    }

    let draft = scratch.tour_draft_mut()?;
    draft.language = Some(code);
    acknowledge_pick(&ctx, &event, &ctx.t("addtour-title-prompt")).await?;
    Ok(Outcome::goto(TITLE, scratch))
}

async fn accept_title(ctx: TurnCtx, event: Event, mut scratch: Scratch) -> HandlerResult {
    let Some(text) = event.text() else {
        return Err(AppError::Internal("text pattern matched non-text".to_string()));
    };
    let title = match validate_tour_title(text) {
        Ok(title) => title.to_string(),
        Err(key) => {
            ctx.gateway().send_text(ctx.chat, &ctx.t(key)).await?;
            return Ok(Outcome::stay(scratch));
        }
    };

    let draft = scratch.tour_draft_mut()?;
    let language = draft
        .language
        .clone()
        .ok_or_else(|| AppError::Internal("tour title with no language picked".to_string()))?;
    let tour = ctx.content().create_tour(ctx.user).await?;
    let translation = ctx
        .content()
        .create_translation(tour.id, &language, &title, None)
        .await?;
    draft.tour_id = Some(tour.id);
    draft.translation_id = Some(translation.id);

    ctx.gateway()
        .send_text(ctx.chat, &ctx.t("addtour-description-prompt"))
        .await?;
    Ok(Outcome::goto(DESCRIPTION, scratch))
}

async fn accept_description(ctx: TurnCtx, event: Event, mut scratch: Scratch) -> HandlerResult {
    let Some(text) = event.text() else {
        return Err(AppError::Internal("text pattern matched non-text".to_string()));
    };
    let description = match validate_tour_description(text) {
        Ok(description) => description.to_string(),
        Err(key) => {
            ctx.gateway().send_text(ctx.chat, &ctx.t(key)).await?;
            return Ok(Outcome::stay(scratch));
        }
    };

    let draft = scratch.tour_draft_mut()?;
    let translation_id = draft
        .translation_id
        .ok_or_else(|| AppError::Internal("description with no translation".to_string()))?;
    ctx.content()
        .set_translation_description(translation_id, Some(&description))
        .await?;

    ctx.gateway()
        .send_text(ctx.chat, &ctx.t("addtour-section-prompt"))
        .await?;
    Ok(Outcome::goto(section::SECTION_TITLE, scratch))
}

async fn skip_description(ctx: TurnCtx, _event: Event, scratch: Scratch) -> HandlerResult {
    ctx.gateway()
        .send_text(ctx.chat, &ctx.t("addtour-section-prompt"))
        .await?;
    Ok(Outcome::goto(section::SECTION_TITLE, scratch))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventPayload;

    #[test]
    fn machine_contains_wizard_and_section_states() {
        let machine = machine();
        for state in [
            LANGUAGE,
            TITLE,
            DESCRIPTION,
            section::SECTION_TITLE,
            section::CONTENT,
            section::AUDIO_DECIDE,
            section::AUDIO_WAIT,
            section::AUDIO_FAILED,
        ] {
            assert!(machine.has_state(state), "missing state {state}");
        }
    }

    #[test]
    fn cancel_falls_back_in_every_state() {
        let machine = machine();
        let cancel = EventPayload::Command {
            name: "cancel".to_string(),
            args: String::new(),
        };
        assert!(machine.resolve(TITLE, &cancel).is_some());
        assert!(machine.resolve(section::AUDIO_WAIT, &cancel).is_some());
    }
}
