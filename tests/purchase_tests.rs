//! The guest checkout flow and payment settlement, including re-delivered
//! and orphaned payment notifications.

mod test_helpers;

use test_helpers::*;
use tourguide_bot::db::ContentStore;
use tourguide_bot::event::CallbackData;
use tourguide_bot::localization::{t_args_lang, t_lang};

#[tokio::test]
async fn nothing_on_sale_says_so() {
    let bot = TestBot::new();
    // A tour without an available product is not on sale.
    seed_tour(&bot.db, OPERATOR, "en", "Old Town Walk").await;

    bot.command(GUEST, "tours").await;

    assert_eq!(
        bot.gateway.last_text(),
        t_lang("tours-none-on-sale", Some("en"))
    );
    assert_eq!(bot.state(GUEST).await, None);
}

#[tokio::test]
async fn a_guest_buys_a_tour() {
    let bot = TestBot::new();
    let (tour_id, translation_id, product_id) =
        seed_tour_on_sale(&bot.db, OPERATOR, "en", "Old Town Walk").await;

    bot.command(GUEST, "tours").await;
    let keyboard = bot.gateway.last_keyboard().expect("tour keyboard");
    assert!(keyboard.labels().iter().any(|l| l.contains("Old Town Walk")));

    bot.press(GUEST, CallbackData::with_arg("buy", "pick", translation_id)).await;
    assert_eq!(bot.gateway.last_text(), t_lang("buy-pick-product", Some("en")));

    bot.press(GUEST, CallbackData::with_arg("prod", "pick", product_id)).await;
    let invoices = bot.gateway.invoices();
    assert_eq!(invoices.len(), 1);
    let spec = &invoices[0];
    assert_eq!(spec.title, "Day pass");
    assert_eq!(spec.currency, "EUR");
    assert_eq!(spec.amount_minor, 500);
    assert!(spec.payload.starts_with("inv:"));
    assert_eq!(
        bot.state(GUEST).await,
        Some(("purchase".to_string(), "buy_payment".to_string()))
    );

    bot.text(GUEST, "paying now").await;
    assert_eq!(
        bot.gateway.last_text(),
        t_lang("buy-awaiting-payment", Some("en"))
    );

    bot.send(payment(GUEST, &spec.payload, "ch_001")).await;

    let subscription = bot
        .db
        .subscription_of(GUEST, tour_id)
        .await
        .unwrap()
        .expect("subscription granted");
    let expires = subscription.expires_at.format("%Y-%m-%d").to_string();
    assert_eq!(
        bot.gateway.last_text(),
        t_args_lang(
            "payment-thanks",
            &[("title", "Day pass"), ("expires", &expires)],
            Some("en")
        )
    );
    assert_eq!(bot.state(GUEST).await, None);
    // The thank-you message doubles as the announcement.
    assert!(bot.db.unnotified_subscriptions().await.unwrap().is_empty());
}

/// The platform may re-deliver a payment notification; the charge id keys
/// the no-op.
#[tokio::test]
async fn duplicate_payment_notification_is_ignored() {
    let bot = TestBot::new();
    let (tour_id, translation_id, product_id) =
        seed_tour_on_sale(&bot.db, OPERATOR, "en", "Old Town Walk").await;

    bot.command(GUEST, "tours").await;
    bot.press(GUEST, CallbackData::with_arg("buy", "pick", translation_id)).await;
    bot.press(GUEST, CallbackData::with_arg("prod", "pick", product_id)).await;
    let payload = bot.gateway.invoices()[0].payload.clone();

    bot.send(payment(GUEST, &payload, "ch_001")).await;
    let first_expiry = bot
        .db
        .subscription_of(GUEST, tour_id)
        .await
        .unwrap()
        .unwrap()
        .expires_at;
    let replies = bot.gateway.texts().len();

    bot.send(payment(GUEST, &payload, "ch_001")).await;

    assert_eq!(bot.gateway.texts().len(), replies);
    let second_expiry = bot
        .db
        .subscription_of(GUEST, tour_id)
        .await
        .unwrap()
        .unwrap()
        .expires_at;
    assert_eq!(second_expiry, first_expiry);
}

/// A payment arriving after the purchase conversation ended still settles
/// through the idle entry point.
#[tokio::test]
async fn idle_payment_still_grants_access() {
    let bot = TestBot::new();
    let (tour_id, _, product_id) =
        seed_tour_on_sale(&bot.db, OPERATOR, "en", "Old Town Walk").await;
    let product = bot.db.get_product(product_id).await.unwrap().unwrap();
    let invoice = bot.db.create_invoice(GUEST, &product).await.unwrap();

    bot.send(payment(GUEST, &invoice.payload(), "ch_late")).await;

    let subscription = bot.db.subscription_of(GUEST, tour_id).await.unwrap();
    assert!(subscription.is_some());
    assert_eq!(bot.state(GUEST).await, None);
}

#[tokio::test]
async fn unmatched_payments_are_answered() {
    let bot = TestBot::new();

    bot.send(payment(GUEST, "garbage", "ch_001")).await;
    assert_eq!(
        bot.gateway.last_text(),
        t_lang("payment-unmatched", Some("en"))
    );

    bot.send(payment(GUEST, "inv:9999", "ch_002")).await;
    assert_eq!(
        bot.gateway.last_text(),
        t_lang("payment-unmatched", Some("en"))
    );
}

/// A product superseded between the keyboard and the press is refused.
#[tokio::test]
async fn a_stale_offer_press_is_refused() {
    let bot = TestBot::new();
    let (tour_id, translation_id, old_product) =
        seed_tour_on_sale(&bot.db, OPERATOR, "en", "Old Town Walk").await;

    bot.command(GUEST, "tours").await;
    bot.press(GUEST, CallbackData::with_arg("buy", "pick", translation_id)).await;

    // Repriced while the guest was looking at the keyboard.
    bot.db
        .create_product_superseding(tour_id, "en", "EUR", 700, 2, 30, "Day pass", "New route")
        .await
        .unwrap();

    bot.press(GUEST, CallbackData::with_arg("prod", "pick", old_product)).await;

    assert_eq!(bot.gateway.last_text(), t_lang("buy-offer-gone", Some("en")));
    assert_eq!(bot.state(GUEST).await, None);
    assert!(bot.gateway.invoices().is_empty());
}

/// A payment landing while another wizard is open settles without
/// disturbing that wizard.
#[tokio::test]
async fn payment_mid_wizard_leaves_the_wizard_alone() {
    let bot = TestBot::new();
    let (tour_id, _, product_id) =
        seed_tour_on_sale(&bot.db, OPERATOR, "en", "Old Town Walk").await;
    let product = bot.db.get_product(product_id).await.unwrap().unwrap();
    let invoice = bot.db.create_invoice(OPERATOR, &product).await.unwrap();

    bot.command(OPERATOR, "addtour").await;
    bot.send(payment(OPERATOR, &invoice.payload(), "ch_003")).await;

    assert!(bot.db.subscription_of(OPERATOR, tour_id).await.unwrap().is_some());
    assert_eq!(
        bot.state(OPERATOR).await,
        Some(("tour_add".to_string(), "add_language".to_string()))
    );
}
