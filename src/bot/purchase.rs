//! The guest purchase flow: browse what is on sale, pick an offer, pay.
//!
//! An invoice row snapshots the product terms the moment the checkout goes
//! out, so later repricing or tour deletion never changes what the guest is
//! paying for. Payment completion is reachable from three places (this
//! machine's wait state, the mid-flow fallback, and the idle entry) and all
//! of them funnel through [`complete_payment`].

use crate::bot::keyboards::{product_keyboard, translation_keyboard};
use crate::bot::selectors::{acknowledge_pick, on_picked, translation_pick_block};
use crate::bot::with_standard_fallbacks;
use crate::db::{Invoice, TourTranslation};
use crate::dialogue::{PurchaseScratch, Scratch};
use crate::engine::{EventPattern, Guard, HandlerResult, Machine, Outcome, StateId, TurnCtx};
use crate::errors::{AppError, AppResult};
use crate::event::{Event, EventPayload, PaymentNotice};
use crate::gateway::InvoiceSpec;
use tracing::{debug, info, warn};

pub const MACHINE: &str = "purchase";

const PICK: StateId = "buy_tour";
const PRODUCT: StateId = "buy_product";
const PAYMENT: StateId = "buy_payment";

pub fn machine() -> Machine {
    let builder = Machine::builder(MACHINE)
        .entry(EventPattern::Command("tours"), Guard::Anyone, start)
        .merge(translation_pick_block(PICK, "buy", on_picked(pick_tour)))
        .on(
            PRODUCT,
            EventPattern::Callback {
                ns: "prod",
                action: Some("pick"),
            },
            pick_product,
        )
        .on(PAYMENT, EventPattern::Payment, payment_received)
        .on(PAYMENT, EventPattern::AnyText, awaiting_payment);
    with_standard_fallbacks(builder).build()
}

async fn start(ctx: TurnCtx, _event: Event, _scratch: Scratch) -> HandlerResult {
    let translations = ctx.content().translations_on_sale().await?;
    if translations.is_empty() {
        ctx.gateway()
            .send_text(ctx.chat, &ctx.t("tours-none-on-sale"))
            .await?;
        return Ok(Outcome::stay(Scratch::None));
    }
    ctx.gateway()
        .send_text_with_keyboard(
            ctx.chat,
            &ctx.t("tours-pick"),
            &translation_keyboard("buy", &translations, ctx.lang.as_deref()),
        )
        .await?;
    Ok(Outcome::goto(
        PICK,
        Scratch::Purchase(PurchaseScratch::default()),
    ))
}

async fn pick_tour(
    ctx: TurnCtx,
    event: Event,
    translation: TourTranslation,
    mut scratch: Scratch,
) -> HandlerResult {
    let products = ctx
        .content()
        .available_products(translation.tour_id, &translation.language)
        .await?;
    if products.is_empty() {
        acknowledge_pick(&ctx, &event, &ctx.t("buy-offer-gone")).await?;
        return Ok(Outcome::end(scratch));
    }

    let purchase = scratch.purchase_mut()?;
    purchase.tour_id = Some(translation.tour_id);
    purchase.language = Some(translation.language.clone());

    let table = ctx.services.currencies.get_or_refresh().await;
    ctx.gateway()
        .send_text_with_keyboard(
            ctx.chat,
            &ctx.t("buy-pick-product"),
            &product_keyboard(&products, &table, ctx.lang.as_deref()),
        )
        .await?;
    Ok(Outcome::goto(PRODUCT, scratch))
}

async fn pick_product(ctx: TurnCtx, event: Event, mut scratch: Scratch) -> HandlerResult {
    let id = event
        .callback()
        .and_then(|data| data.id_arg())
        .ok_or_else(|| AppError::Internal("product pick without an id".to_string()))?;

    let product = match ctx.content().get_product(id).await? {
        Some(product) if product.available => product,
        // Superseded or deleted between the keyboard and the press.
        _ => {
            acknowledge_pick(&ctx, &event, &ctx.t("buy-offer-gone")).await?;
            return Ok(Outcome::end(scratch));
        }
    };

    let invoice = ctx.content().create_invoice(ctx.user, &product).await?;
    let purchase = scratch.purchase_mut()?;
    purchase.product_id = Some(product.id);
    purchase.invoice_id = Some(invoice.id);

    let spec = InvoiceSpec {
        title: product.title.clone(),
        description: product.description.clone(),
        payload: invoice.payload(),
        currency: product.currency.clone(),
        amount_minor: product.amount_minor,
        price_label: ctx.t("buy-price-label"),
    };
    ctx.gateway().send_invoice(ctx.chat, &spec).await?;
    info!(
        user_id = %ctx.user,
        invoice_id = invoice.id,
        product_id = product.id,
        "Invoice sent"
    );

    acknowledge_pick(&ctx, &event, &ctx.t("buy-invoice-sent")).await?;
    Ok(Outcome::goto(PAYMENT, scratch))
}

async fn payment_received(ctx: TurnCtx, event: Event, scratch: Scratch) -> HandlerResult {
    let EventPayload::PaymentDone(notice) = &event.payload else {
        return Err(AppError::Internal("payment pattern matched non-payment".to_string()));
    };
    complete_payment(&ctx, notice).await?;
    Ok(Outcome::end(scratch))
}

async fn awaiting_payment(ctx: TurnCtx, _event: Event, scratch: Scratch) -> HandlerResult {
    ctx.gateway()
        .send_text(ctx.chat, &ctx.t("buy-awaiting-payment"))
        .await?;
    Ok(Outcome::stay(scratch))
}

/// Settle a successful payment: match it to its invoice, record the charge
/// exactly once, and grant or extend the subscription.
///
/// Unmatched payments are answered apologetically but never retried; a
/// charge id seen before means the platform re-delivered a notification we
/// already settled, and the whole call is a silent no-op.
pub async fn complete_payment(ctx: &TurnCtx, notice: &PaymentNotice) -> AppResult<()> {
    let invoice_id = match Invoice::id_from_payload(&notice.payload) {
        Some(id) => id,
        None => {
            warn!(payload = notice.payload.as_str(), "Payment with unparseable payload");
            ctx.gateway()
                .send_text(ctx.chat, &ctx.t("payment-unmatched"))
                .await?;
            return Ok(());
        }
    };
    let invoice = match ctx.content().get_invoice(invoice_id).await? {
        Some(invoice) => invoice,
        None => {
            warn!(invoice_id = invoice_id, "Payment for unknown invoice");
            ctx.gateway()
                .send_text(ctx.chat, &ctx.t("payment-unmatched"))
                .await?;
            return Ok(());
        }
    };

    if !ctx
        .content()
        .record_payment(invoice.id, &notice.charge_id)
        .await?
    {
        debug!(
            invoice_id = invoice.id,
            charge_id = notice.charge_id.as_str(),
            "Duplicate charge notification ignored"
        );
        return Ok(());
    }

    let subscription = ctx
        .content()
        .extend_subscription(invoice.user_id, invoice.tour_id, invoice.duration_days)
        .await?;
    info!(
        user_id = %invoice.user_id,
        invoice_id = invoice.id,
        tour_id = invoice.tour_id,
        expires_at = %subscription.expires_at,
        "Payment recorded"
    );

    let expires = subscription.expires_at.format("%Y-%m-%d").to_string();
    let text = ctx.t_args(
        "payment-thanks",
        &[("title", invoice.title.as_str()), ("expires", &expires)],
    );
    ctx.gateway().send_text(ctx.chat, &text).await?;
    // Marked only after the message went out; the periodic scan re-sends
    // announcements that never made it.
    ctx.content()
        .mark_subscription_notified(subscription.id)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::CallbackData;

    #[test]
    fn payment_state_accepts_the_notification() {
        let machine = machine();
        let paid = EventPayload::PaymentDone(PaymentNotice {
            payload: "inv:1".to_string(),
            currency: "EUR".to_string(),
            total_amount: 500,
            charge_id: "ch_1".to_string(),
        });
        assert!(machine.resolve(PAYMENT, &paid).is_some());
    }

    #[test]
    fn product_state_matches_its_own_namespace_only() {
        let machine = machine();
        let states = [PICK, PRODUCT, PAYMENT];
        for state in states {
            assert!(machine.has_state(state), "missing state {state}");
        }
        let press = EventPayload::Callback(CallbackData::with_arg("prod", "pick", 2));
        assert!(machine.resolve(PRODUCT, &press).is_some());
    }
}
