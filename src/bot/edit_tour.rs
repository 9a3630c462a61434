//! The edit-tour wizard: pick one of your translations, then keep appending
//! sections through the shared section states.

use crate::bot::keyboards::translation_keyboard;
use crate::bot::section::{self, cleanup_tour_draft, section_block};
use crate::bot::selectors::{acknowledge_pick, on_picked, owned_translation_pick_block};
use crate::bot::with_standard_fallbacks;
use crate::db::TourTranslation;
use crate::dialogue::{Scratch, TourDraftScratch};
use crate::engine::{EventPattern, Guard, HandlerResult, Machine, Outcome, StateId, TurnCtx};
use crate::event::Event;

pub const MACHINE: &str = "tour_edit";

const PICK: StateId = "edit_pick";

pub fn machine() -> Machine {
    let builder = Machine::builder(MACHINE)
        .entry(EventPattern::Command("edittour"), Guard::Operators, start)
        .merge(owned_translation_pick_block(
            PICK,
            "edit",
            on_picked(resume_translation),
        ))
        .merge(section_block())
        .cleanup(cleanup_tour_draft);
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
            &ctx.t("edittour-pick-tour"),
            &translation_keyboard("edit", &translations, ctx.lang.as_deref()),
        )
        .await?;
    Ok(Outcome::goto(
        PICK,
        Scratch::TourDraft(TourDraftScratch::default()),
    ))
}

/// Position the draft cursor after the translation's existing sections and
/// hand over to the shared section states.
async fn resume_translation(
    ctx: TurnCtx,
    event: Event,
    translation: TourTranslation,
    mut scratch: Scratch,
) -> HandlerResult {
    let sections = ctx.content().section_count(translation.id).await?;

    let draft = scratch.tour_draft_mut()?;
    draft.language = Some(translation.language.clone());
    draft.tour_id = Some(translation.tour_id);
    draft.translation_id = Some(translation.id);
    draft.next_section_pos = sections as i32;
    draft.editing = true;

    let text = ctx.t_args(
        "edittour-resume",
        &[
            ("title", translation.title.as_str()),
            ("sections", &sections.to_string()),
        ],
    );
    acknowledge_pick(&ctx, &event, &text).await?;
    Ok(Outcome::goto(section::SECTION_TITLE, scratch))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{CallbackData, EventPayload};

    #[test]
    fn machine_resumes_into_section_states() {
        let machine = machine();
        assert!(machine.has_state(PICK));
        assert!(machine.has_state(section::SECTION_TITLE));
        assert!(machine.has_state(section::CONTENT));

        let press = EventPayload::Callback(CallbackData::with_arg("edit", "pick", 5));
        assert!(machine.resolve(PICK, &press).is_some());
    }
}
