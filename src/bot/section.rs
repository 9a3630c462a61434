//! Section and content assembly shared by the add-tour and edit-tour
//! wizards.
//!
//! Both wizards funnel into the same states once a translation exists:
//! collect a section title, then content rows until `/done`, with the
//! audio-to-voice side quest in between. Position counters live in the
//! conversation scratch and only advance after a successful insert.

use tracing::debug;

use crate::bot::keyboards::{audio_choice_keyboard, audio_retry_keyboard};
use crate::bot::media_group::{self, GroupAppend};
use crate::bot::selectors::acknowledge_pick;
use crate::db::ContentBody;
use crate::dialogue::{Scratch, TourDraftScratch};
use crate::engine::{
    EventPattern, HandlerResult, MediaFilter, Outcome, StateId, TransitionBlock, TurnCtx,
};
use crate::errors::{AppError, AppResult};
use crate::event::{
    Event, EventPayload, JobOutcome, MediaItem, MediaKind, TranscodeResult,
};
use crate::validation::validate_section_title;

pub const SECTION_TITLE: StateId = "section_title";
pub const CONTENT: StateId = "section_content";
pub const AUDIO_DECIDE: StateId = "audio_decide";
pub const AUDIO_WAIT: StateId = "audio_wait";
pub const AUDIO_FAILED: StateId = "audio_failed";

/// The section-assembly states, ready to merge into a wizard.
pub fn section_block() -> TransitionBlock {
    TransitionBlock::new()
        .on(SECTION_TITLE, EventPattern::AnyText, handle_section_title)
        .on(SECTION_TITLE, EventPattern::Command("done"), finish_tour)
        .on(CONTENT, EventPattern::Command("done"), close_section)
        .on(CONTENT, EventPattern::AnyText, handle_text)
        .on(CONTENT, EventPattern::Location, handle_location)
        .on(CONTENT, EventPattern::Media(MediaFilter::Any), handle_media)
        .on(
            AUDIO_DECIDE,
            EventPattern::Callback {
                ns: "audio",
                action: Some("convert"),
            },
            start_transcode,
        )
        .on(
            AUDIO_DECIDE,
            EventPattern::Callback {
                ns: "audio",
                action: Some("keep"),
            },
            keep_audio,
        )
        .on(AUDIO_WAIT, EventPattern::Job("transcode"), handle_transcode_done)
        .on(AUDIO_WAIT, EventPattern::Command("retry"), retrigger_transcode)
        .on(AUDIO_WAIT, EventPattern::AnyText, still_converting)
        .on(
            AUDIO_FAILED,
            EventPattern::Callback {
                ns: "audio",
                action: Some("retry"),
            },
            retry_transcode,
        )
        .on(
            AUDIO_FAILED,
            EventPattern::Callback {
                ns: "audio",
                action: Some("keep"),
            },
            keep_audio,
        )
        .on(
            AUDIO_FAILED,
            EventPattern::Callback {
                ns: "audio",
                action: Some("discard"),
            },
            discard_audio,
        )
}

/// Cleanup hook for both tour wizards: a section abandoned with zero
/// content rows is removed so positions stay gapless.
pub async fn cleanup_tour_draft(ctx: TurnCtx, scratch: Scratch) -> AppResult<()> {
    let Scratch::TourDraft(draft) = scratch else {
        return Ok(());
    };
    if let Some(section_id) = draft.section_id {
        if ctx.content().content_count(section_id).await? == 0 {
            ctx.content().delete_section(section_id).await?;
            debug!(section_id = section_id, "Pruned empty section");
        }
    }
    Ok(())
}

fn draft_of(scratch: &mut Scratch) -> AppResult<&mut TourDraftScratch> {
    scratch.tour_draft_mut()
}

/// Insert a content row at the draft's cursor and advance it.
async fn append_row(
    ctx: &TurnCtx,
    draft: &mut TourDraftScratch,
    body: ContentBody,
) -> AppResult<()> {
    let section_id = draft
        .section_id
        .ok_or_else(|| AppError::Internal("content arrived with no open section".to_string()))?;
    ctx.content()
        .append_content(section_id, draft.next_content_pos, &body)
        .await?;
    draft.next_content_pos += 1;
    Ok(())
}

fn single_body(item: &MediaItem) -> ContentBody {
    let file_id = item.file_id.clone();
    let caption = item.caption.clone();
    match item.kind {
        MediaKind::Photo => ContentBody::Photo { file_id, caption },
        MediaKind::Audio => ContentBody::Audio { file_id, caption },
        MediaKind::Voice => ContentBody::Voice { file_id, caption },
        MediaKind::Video => ContentBody::Video { file_id, caption },
        MediaKind::VideoNote => ContentBody::VideoNote { file_id },
        MediaKind::Animation => ContentBody::Animation { file_id, caption },
    }
}

async fn handle_section_title(ctx: TurnCtx, event: Event, mut scratch: Scratch) -> HandlerResult {
    let Some(text) = event.text() else {
        return Err(AppError::Internal("text pattern matched non-text".to_string()));
    };
    let title = match validate_section_title(text) {
        Ok(title) => title.to_string(),
        Err(key) => {
            ctx.gateway().send_text(ctx.chat, &ctx.t(key)).await?;
            return Ok(Outcome::stay(scratch));
        }
    };

    let draft = draft_of(&mut scratch)?;
    let translation_id = draft
        .translation_id
        .ok_or_else(|| AppError::Internal("section title with no translation".to_string()))?;
    let section = ctx
        .content()
        .create_section(translation_id, &title, draft.next_section_pos)
        .await?;
    draft.section_id = Some(section.id);
    draft.next_section_pos += 1;
    draft.next_content_pos = 0;

    let prompt = ctx.t_args("section-opened", &[("title", &title)]);
    ctx.gateway().send_text(ctx.chat, &prompt).await?;
    Ok(Outcome::goto(CONTENT, scratch))
}

/// `/done` while a section title is expected finishes the whole tour, as
/// long as the translation has at least one saved section.
async fn finish_tour(ctx: TurnCtx, _event: Event, mut scratch: Scratch) -> HandlerResult {
    let draft = draft_of(&mut scratch)?;
    let translation_id = draft
        .translation_id
        .ok_or_else(|| AppError::Internal("finishing tour with no translation".to_string()))?;
    let sections = ctx.content().section_count(translation_id).await?;
    if sections == 0 {
        ctx.gateway()
            .send_text(ctx.chat, &ctx.t("tour-needs-section"))
            .await?;
        return Ok(Outcome::stay(scratch));
    }

    let summary = ctx.t_args("tour-saved", &[("sections", &sections.to_string())]);
    ctx.gateway().send_text(ctx.chat, &summary).await?;
    Ok(Outcome::end(scratch))
}

/// `/done` inside a section: refuse on an empty one, otherwise move back to
/// collecting the next title.
async fn close_section(ctx: TurnCtx, _event: Event, mut scratch: Scratch) -> HandlerResult {
    let draft = draft_of(&mut scratch)?;
    let section_id = draft
        .section_id
        .ok_or_else(|| AppError::Internal("closing section with none open".to_string()))?;
    if ctx.content().content_count(section_id).await? == 0 {
        ctx.gateway()
            .send_text(ctx.chat, &ctx.t("section-empty"))
            .await?;
        return Ok(Outcome::stay(scratch));
    }
    ctx.gateway()
        .send_text(ctx.chat, &ctx.t("section-done-next"))
        .await?;
    Ok(Outcome::goto(SECTION_TITLE, scratch))
}

async fn handle_text(ctx: TurnCtx, event: Event, mut scratch: Scratch) -> HandlerResult {
    let Some(text) = event.text() else {
        return Err(AppError::Internal("text pattern matched non-text".to_string()));
    };
    let body = ContentBody::Text {
        text: text.to_string(),
    };
    let draft = draft_of(&mut scratch)?;
    append_row(&ctx, draft, body).await?;
    ctx.gateway().send_text(ctx.chat, &ctx.t("content-added")).await?;
    Ok(Outcome::stay(scratch))
}

async fn handle_location(ctx: TurnCtx, event: Event, mut scratch: Scratch) -> HandlerResult {
    let EventPayload::Location {
        latitude,
        longitude,
    } = event.payload
    else {
        return Err(AppError::Internal("location pattern matched non-location".to_string()));
    };
    let draft = draft_of(&mut scratch)?;
    append_row(
        &ctx,
        draft,
        ContentBody::Location {
            latitude,
            longitude,
        },
    )
    .await?;
    ctx.gateway().send_text(ctx.chat, &ctx.t("content-added")).await?;
    Ok(Outcome::stay(scratch))
}

async fn handle_media(ctx: TurnCtx, event: Event, mut scratch: Scratch) -> HandlerResult {
    let Some(item) = event.media().cloned() else {
        return Err(AppError::Internal("media pattern matched non-media".to_string()));
    };

    // Only photos and videos arrive in platform albums; everything else is
    // stored one row per file even when the client tags a group id.
    let groupable = matches!(item.kind, MediaKind::Photo | MediaKind::Video);
    if item.media_group_id.is_some() && groupable {
        let draft = draft_of(&mut scratch)?;
        match media_group::store_grouped(&ctx, draft, &item).await? {
            GroupAppend::Created => {
                ctx.gateway().send_text(ctx.chat, &ctx.t("album-added")).await?;
            }
            GroupAppend::Merged | GroupAppend::Duplicate => {}
        }
        return Ok(Outcome::stay(scratch));
    }

    if item.kind == MediaKind::Audio && ctx.services.config.bot.suggest_voice_notes {
        let draft = draft_of(&mut scratch)?;
        draft.pending_audio = Some(item);
        ctx.gateway()
            .send_text_with_keyboard(
                ctx.chat,
                &ctx.t("audio-offer"),
                &audio_choice_keyboard(ctx.lang.as_deref()),
            )
            .await?;
        return Ok(Outcome::goto(AUDIO_DECIDE, scratch));
    }

    let body = single_body(&item);
    let draft = draft_of(&mut scratch)?;
    append_row(&ctx, draft, body).await?;
    ctx.gateway().send_text(ctx.chat, &ctx.t("content-added")).await?;
    Ok(Outcome::stay(scratch))
}

fn pending_audio(draft: &TourDraftScratch) -> AppResult<MediaItem> {
    draft
        .pending_audio
        .clone()
        .ok_or_else(|| AppError::Internal("audio decision with nothing pending".to_string()))
}

async fn start_transcode(ctx: TurnCtx, event: Event, mut scratch: Scratch) -> HandlerResult {
    let draft = draft_of(&mut scratch)?;
    let item = pending_audio(draft)?;
    ctx.services
        .jobs
        .spawn_transcode(ctx.user, ctx.chat, ctx.lang.clone(), item.file_id);
    acknowledge_pick(&ctx, &event, &ctx.t("audio-converting")).await?;
    Ok(Outcome::goto(AUDIO_WAIT, scratch))
}

/// `/retry` while waiting: the job may have died with the process.
async fn retrigger_transcode(ctx: TurnCtx, _event: Event, mut scratch: Scratch) -> HandlerResult {
    let draft = draft_of(&mut scratch)?;
    let item = pending_audio(draft)?;
    ctx.services
        .jobs
        .spawn_transcode(ctx.user, ctx.chat, ctx.lang.clone(), item.file_id);
    ctx.gateway().send_text(ctx.chat, &ctx.t("audio-converting")).await?;
    Ok(Outcome::stay(scratch))
}

async fn retry_transcode(ctx: TurnCtx, event: Event, mut scratch: Scratch) -> HandlerResult {
    let draft = draft_of(&mut scratch)?;
    let item = pending_audio(draft)?;
    ctx.services
        .jobs
        .spawn_transcode(ctx.user, ctx.chat, ctx.lang.clone(), item.file_id);
    acknowledge_pick(&ctx, &event, &ctx.t("audio-converting")).await?;
    Ok(Outcome::goto(AUDIO_WAIT, scratch))
}

async fn keep_audio(ctx: TurnCtx, event: Event, mut scratch: Scratch) -> HandlerResult {
    let draft = draft_of(&mut scratch)?;
    let item = pending_audio(draft)?;
    draft.pending_audio = None;
    let body = ContentBody::Audio {
        file_id: item.file_id,
        caption: item.caption,
    };
    append_row(&ctx, draft, body).await?;
    acknowledge_pick(&ctx, &event, &ctx.t("audio-kept")).await?;
    Ok(Outcome::goto(CONTENT, scratch))
}

async fn discard_audio(ctx: TurnCtx, event: Event, mut scratch: Scratch) -> HandlerResult {
    let draft = draft_of(&mut scratch)?;
    draft.pending_audio = None;
    acknowledge_pick(&ctx, &event, &ctx.t("audio-discarded")).await?;
    Ok(Outcome::goto(CONTENT, scratch))
}

async fn still_converting(ctx: TurnCtx, _event: Event, scratch: Scratch) -> HandlerResult {
    ctx.gateway().send_text(ctx.chat, &ctx.t("audio-wait-hold")).await?;
    Ok(Outcome::stay(scratch))
}

async fn handle_transcode_done(ctx: TurnCtx, event: Event, mut scratch: Scratch) -> HandlerResult {
    let EventPayload::JobDone(JobOutcome::Transcode(result)) = &event.payload else {
        return Err(AppError::Internal("job pattern matched non-job event".to_string()));
    };
    match result {
        TranscodeResult::Converted { voice_file_id } => {
            let draft = draft_of(&mut scratch)?;
            let caption = draft.pending_audio.as_ref().and_then(|a| a.caption.clone());
            draft.pending_audio = None;
            let body = ContentBody::Voice {
                file_id: voice_file_id.clone(),
                caption,
            };
            append_row(&ctx, draft, body).await?;
            ctx.gateway().send_text(ctx.chat, &ctx.t("voice-added")).await?;
            Ok(Outcome::goto(CONTENT, scratch))
        }
        TranscodeResult::Failed { stage, error } => {
            debug!(stage = %stage, error = error.as_str(), "Offering transcode recovery");
            let text = ctx.t_args("audio-failed", &[("stage", &stage.to_string())]);
            ctx.gateway()
                .send_text_with_keyboard(ctx.chat, &text, &audio_retry_keyboard(ctx.lang.as_deref()))
                .await?;
            Ok(Outcome::goto(AUDIO_FAILED, scratch))
        }
    }
}
