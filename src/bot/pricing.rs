//! The pricing wizard: a question chain that ends in one product row.
//!
//! Answers accumulate in the scratch and nothing is written until the final
//! step, where the new product supersedes the previously available one of
//! the same (tour, language, guests) scope in a single transaction.

use crate::bot::keyboards::translation_keyboard;
use crate::bot::selectors::{acknowledge_pick, on_picked, owned_translation_pick_block};
use crate::bot::with_standard_fallbacks;
use crate::currency::{price_from_telegram, price_to_telegram, validate_price_bounds, CurrencyEntry};
use crate::db::TourTranslation;
use crate::dialogue::{PriceDraftScratch, Scratch};
use crate::engine::{EventPattern, Guard, HandlerResult, Machine, Outcome, StateId, TurnCtx};
use crate::errors::AppError;
use crate::event::Event;
use crate::validation::{
    parse_duration_days, parse_guest_count, validate_product_description, validate_product_title,
};

pub const MACHINE: &str = "tour_price";

const PICK: StateId = "price_pick";
const GUESTS: StateId = "price_guests";
const CURRENCY: StateId = "price_currency";
const AMOUNT: StateId = "price_amount";
const DURATION: StateId = "price_duration";
const TITLE: StateId = "price_title";
const DESCRIPTION: StateId = "price_description";

pub fn machine() -> Machine {
    let builder = Machine::builder(MACHINE)
        .entry(EventPattern::Command("setprice"), Guard::Operators, start)
        .merge(owned_translation_pick_block(
            PICK,
            "price",
            on_picked(pick_translation),
        ))
        .on(GUESTS, EventPattern::AnyText, accept_guests)
        .on(CURRENCY, EventPattern::AnyText, accept_currency)
        .on(AMOUNT, EventPattern::AnyText, accept_amount)
        .on(DURATION, EventPattern::AnyText, accept_duration)
        .on(TITLE, EventPattern::AnyText, accept_title)
        .on(DESCRIPTION, EventPattern::AnyText, accept_description);
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
            &ctx.t("setprice-pick-tour"),
            &translation_keyboard("price", &translations, ctx.lang.as_deref()),
        )
        .await?;
    Ok(Outcome::goto(
        PICK,
        Scratch::PriceDraft(PriceDraftScratch::default()),
    ))
}

async fn pick_translation(
    ctx: TurnCtx,
    event: Event,
    translation: TourTranslation,
    mut scratch: Scratch,
) -> HandlerResult {
    let draft = scratch.price_draft_mut()?;
    draft.tour_id = Some(translation.tour_id);
    draft.language = Some(translation.language.clone());
    acknowledge_pick(&ctx, &event, &ctx.t("price-guests-prompt")).await?;
    Ok(Outcome::goto(GUESTS, scratch))
}

async fn accept_guests(ctx: TurnCtx, event: Event, mut scratch: Scratch) -> HandlerResult {
    let Some(text) = event.text() else {
        return Err(AppError::Internal("text pattern matched non-text".to_string()));
    };
    let guests = match parse_guest_count(text) {
        Ok(guests) => guests,
        Err(key) => {
            ctx.gateway().send_text(ctx.chat, &ctx.t(key)).await?;
            return Ok(Outcome::stay(scratch));
        }
    };
    let draft = scratch.price_draft_mut()?;
    draft.guests = Some(guests);
    ctx.gateway()
        .send_text(ctx.chat, &ctx.t("price-currency-prompt"))
        .await?;
    Ok(Outcome::goto(CURRENCY, scratch))
}

async fn accept_currency(ctx: TurnCtx, event: Event, mut scratch: Scratch) -> HandlerResult {
    let Some(text) = event.text() else {
        return Err(AppError::Internal("text pattern matched non-text".to_string()));
    };
    let code = text.trim().to_uppercase();
    let table = ctx.services.currencies.get_or_refresh().await;
    if table.get(&code).is_none() {
        ctx.gateway()
            .send_text(ctx.chat, &ctx.t("currency-unknown"))
            .await?;
        return Ok(Outcome::stay(scratch));
    }

    let draft = scratch.price_draft_mut()?;
    draft.currency = Some(code.clone());
    ctx.gateway()
        .send_text(
            ctx.chat,
            &ctx.t_args("price-amount-prompt", &[("currency", &code)]),
        )
        .await?;
    Ok(Outcome::goto(AMOUNT, scratch))
}

async fn accept_amount(ctx: TurnCtx, event: Event, mut scratch: Scratch) -> HandlerResult {
    let Some(text) = event.text() else {
        return Err(AppError::Internal("text pattern matched non-text".to_string()));
    };
    let currency = scratch
        .price_draft_mut()?
        .currency
        .clone()
        .ok_or_else(|| AppError::Internal("amount arrived with no currency".to_string()))?;

    let table = ctx.services.currencies.get_or_refresh().await;
    let Some(entry) = table.get(&currency) else {
        // The platform dropped the currency between turns; pick again.
        ctx.gateway()
            .send_text(ctx.chat, &ctx.t("currency-unknown"))
            .await?;
        return Ok(Outcome::goto(CURRENCY, scratch));
    };

    let amount_minor = match price_to_telegram(entry, text) {
        Ok(amount) => amount,
        Err(key) => {
            ctx.gateway().send_text(ctx.chat, &ctx.t(key)).await?;
            return Ok(Outcome::stay(scratch));
        }
    };
    if let Err(key) = validate_price_bounds(entry, amount_minor) {
        let bound = violated_bound(entry, key);
        ctx.gateway()
            .send_text(ctx.chat, &ctx.t_args(key, &[("bound", &bound)]))
            .await?;
        return Ok(Outcome::stay(scratch));
    }

    scratch.price_draft_mut()?.amount_minor = Some(amount_minor);
    ctx.gateway()
        .send_text(ctx.chat, &ctx.t("price-duration-prompt"))
        .await?;
    Ok(Outcome::goto(DURATION, scratch))
}

/// The bound the amount just violated, rendered in display form.
fn violated_bound(entry: &CurrencyEntry, key: &str) -> String {
    let bound = if key == "price-too-low" {
        entry.min_amount_minor()
    } else {
        entry.max_amount_minor()
    };
    bound
        .map(|minor| price_from_telegram(entry, minor))
        .unwrap_or_default()
}

async fn accept_duration(ctx: TurnCtx, event: Event, mut scratch: Scratch) -> HandlerResult {
    let Some(text) = event.text() else {
        return Err(AppError::Internal("text pattern matched non-text".to_string()));
    };
    let days = match parse_duration_days(text) {
        Ok(days) => days,
        Err(key) => {
            ctx.gateway().send_text(ctx.chat, &ctx.t(key)).await?;
            return Ok(Outcome::stay(scratch));
        }
    };
    let draft = scratch.price_draft_mut()?;
    draft.duration_days = Some(days);
    ctx.gateway()
        .send_text(ctx.chat, &ctx.t("price-title-prompt"))
        .await?;
    Ok(Outcome::goto(TITLE, scratch))
}

async fn accept_title(ctx: TurnCtx, event: Event, mut scratch: Scratch) -> HandlerResult {
    let Some(text) = event.text() else {
        return Err(AppError::Internal("text pattern matched non-text".to_string()));
    };
    let title = match validate_product_title(text) {
        Ok(title) => title.to_string(),
        Err(key) => {
            ctx.gateway().send_text(ctx.chat, &ctx.t(key)).await?;
            return Ok(Outcome::stay(scratch));
        }
    };
    let draft = scratch.price_draft_mut()?;
    draft.title = Some(title);
    ctx.gateway()
        .send_text(ctx.chat, &ctx.t("price-description-prompt"))
        .await?;
    Ok(Outcome::goto(DESCRIPTION, scratch))
}

async fn accept_description(ctx: TurnCtx, event: Event, mut scratch: Scratch) -> HandlerResult {
    let Some(text) = event.text() else {
        return Err(AppError::Internal("text pattern matched non-text".to_string()));
    };
    let description = match validate_product_description(text) {
        Ok(description) => description.to_string(),
        Err(key) => {
            ctx.gateway().send_text(ctx.chat, &ctx.t(key)).await?;
            return Ok(Outcome::stay(scratch));
        }
    };

    let draft = scratch.price_draft_mut()?;
    let tour_id = draft
        .tour_id
        .ok_or_else(|| AppError::Internal("price draft missing tour".to_string()))?;
    let language = draft
        .language
        .clone()
        .ok_or_else(|| AppError::Internal("price draft missing language".to_string()))?;
    let guests = draft
        .guests
        .ok_or_else(|| AppError::Internal("price draft missing guests".to_string()))?;
    let currency = draft
        .currency
        .clone()
        .ok_or_else(|| AppError::Internal("price draft missing currency".to_string()))?;
    let amount_minor = draft
        .amount_minor
        .ok_or_else(|| AppError::Internal("price draft missing amount".to_string()))?;
    let duration_days = draft
        .duration_days
        .ok_or_else(|| AppError::Internal("price draft missing duration".to_string()))?;
    let title = draft
        .title
        .clone()
        .ok_or_else(|| AppError::Internal("price draft missing title".to_string()))?;

    let product = ctx
        .content()
        .create_product_superseding(
            tour_id,
            &language,
            &currency,
            amount_minor,
            guests,
            duration_days,
            &title,
            &description,
        )
        .await?;

    let table = ctx.services.currencies.get_or_refresh().await;
    let price = match table.get(&product.currency) {
        Some(entry) => price_from_telegram(entry, product.amount_minor),
        None => format!("{} {}", product.amount_minor, product.currency),
    };
    let text = ctx.t_args(
        "price-saved",
        &[("title", product.title.as_str()), ("price", &price)],
    );
    ctx.gateway().send_text(ctx.chat, &text).await?;
    Ok(Outcome::end(scratch))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventPayload;

    #[test]
    fn machine_chains_through_every_question() {
        let machine = machine();
        for state in [PICK, GUESTS, CURRENCY, AMOUNT, DURATION, TITLE, DESCRIPTION] {
            assert!(machine.has_state(state), "missing state {state}");
        }
        let text = EventPayload::Text("4".to_string());
        assert!(machine.resolve(GUESTS, &text).is_some());
        assert!(machine.resolve(AMOUNT, &text).is_some());
    }
}
