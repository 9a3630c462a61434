//! The pricing question chain, from tour pick to the product row it writes.

mod test_helpers;

use test_helpers::*;
use tourguide_bot::db::ContentStore;
use tourguide_bot::event::CallbackData;
use tourguide_bot::localization::{t_args_lang, t_lang};

#[tokio::test]
async fn pricing_needs_a_tour_first() {
    let bot = TestBot::new();

    bot.command(OPERATOR, "setprice").await;

    assert_eq!(bot.gateway.last_text(), t_lang("no-tours-yet", Some("en")));
    assert_eq!(bot.state(OPERATOR).await, None);
}

#[tokio::test]
async fn the_full_chain_creates_an_available_product() {
    let bot = TestBot::new();
    let (tour_id, translation_id) = seed_tour(&bot.db, OPERATOR, "en", "Old Town Walk").await;

    bot.command(OPERATOR, "setprice").await;
    bot.press(OPERATOR, CallbackData::with_arg("price", "pick", translation_id)).await;
    assert_eq!(
        bot.gateway.last_text(),
        t_lang("price-guests-prompt", Some("en"))
    );

    bot.text(OPERATOR, "2").await;
    bot.text(OPERATOR, "eur").await;
    assert_eq!(
        bot.gateway.last_text(),
        t_args_lang("price-amount-prompt", &[("currency", "EUR")], Some("en"))
    );

    bot.text(OPERATOR, "19.99").await;
    bot.text(OPERATOR, "30 days").await;
    bot.text(OPERATOR, "Day pass").await;
    bot.text(OPERATOR, "Full access for one day.").await;

    assert_eq!(
        bot.gateway.last_text(),
        t_args_lang(
            "price-saved",
            &[("title", "Day pass"), ("price", "19,99 €")],
            Some("en")
        )
    );
    assert_eq!(bot.state(OPERATOR).await, None);

    let products = bot.db.available_products(tour_id, "en").await.unwrap();
    assert_eq!(products.len(), 1);
    let product = &products[0];
    assert_eq!(product.currency, "EUR");
    assert_eq!(product.amount_minor, 1999);
    assert_eq!(product.guests, 2);
    assert_eq!(product.duration_days, 30);
    assert_eq!(product.title, "Day pass");
    assert!(product.available);
}

#[tokio::test]
async fn wrong_answers_reprompt_without_advancing() {
    let bot = TestBot::new();
    let (_, translation_id) = seed_tour(&bot.db, OPERATOR, "en", "Old Town Walk").await;

    bot.command(OPERATOR, "setprice").await;
    bot.press(OPERATOR, CallbackData::with_arg("price", "pick", translation_id)).await;

    bot.text(OPERATOR, "a few").await;
    assert_eq!(bot.gateway.last_text(), t_lang("guests-invalid", Some("en")));
    bot.text(OPERATOR, "0").await;
    assert_eq!(
        bot.gateway.last_text(),
        t_lang("guests-out-of-range", Some("en"))
    );
    assert_eq!(
        bot.state(OPERATOR).await,
        Some(("tour_price".to_string(), "price_guests".to_string()))
    );

    bot.text(OPERATOR, "2").await;
    bot.text(OPERATOR, "XXX").await;
    assert_eq!(bot.gateway.last_text(), t_lang("currency-unknown", Some("en")));

    bot.text(OPERATOR, "eur").await;
    bot.text(OPERATOR, "soon").await;
    assert_eq!(bot.gateway.last_text(), t_lang("price-invalid", Some("en")));
    bot.text(OPERATOR, "0").await;
    assert_eq!(
        bot.gateway.last_text(),
        t_args_lang("price-too-low", &[("bound", "0,01 €")], Some("en"))
    );
    assert_eq!(
        bot.state(OPERATOR).await,
        Some(("tour_price".to_string(), "price_amount".to_string()))
    );

    bot.text(OPERATOR, "19.99").await;
    bot.text(OPERATOR, "sometime next week").await;
    assert_eq!(bot.gateway.last_text(), t_lang("duration-invalid", Some("en")));
    bot.text(OPERATOR, "0").await;
    assert_eq!(
        bot.gateway.last_text(),
        t_lang("duration-out-of-range", Some("en"))
    );

    bot.text(OPERATOR, "30").await;
    assert_eq!(
        bot.state(OPERATOR).await,
        Some(("tour_price".to_string(), "price_title".to_string()))
    );
}

/// A second offer for the same tour, language and party size replaces the
/// first; guests pressing the old keyboard button are told it is gone.
#[tokio::test]
async fn a_new_price_supersedes_the_old_offer() {
    let bot = TestBot::new();
    let (tour_id, translation_id, old_product) =
        seed_tour_on_sale(&bot.db, OPERATOR, "en", "Old Town Walk").await;

    bot.command(OPERATOR, "setprice").await;
    bot.press(OPERATOR, CallbackData::with_arg("price", "pick", translation_id)).await;
    bot.text(OPERATOR, "2").await;
    bot.text(OPERATOR, "eur").await;
    bot.text(OPERATOR, "24.50").await;
    bot.text(OPERATOR, "30").await;
    bot.text(OPERATOR, "Day pass").await;
    bot.text(OPERATOR, "Now with the evening route.").await;

    let products = bot.db.available_products(tour_id, "en").await.unwrap();
    assert_eq!(products.len(), 1);
    assert_eq!(products[0].amount_minor, 2450);
    assert_ne!(products[0].id, old_product);

    let old = bot.db.get_product(old_product).await.unwrap().unwrap();
    assert!(!old.available);
}
