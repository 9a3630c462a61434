//! Editing an existing tour and deleting one, including stale and forged
//! keyboard presses.

mod test_helpers;

use test_helpers::*;
use tourguide_bot::db::ContentStore;
use tourguide_bot::event::CallbackData;
use tourguide_bot::localization::{t_args_lang, t_lang};

#[tokio::test]
async fn editing_needs_a_tour_first() {
    let bot = TestBot::new();

    bot.command(OPERATOR, "edittour").await;

    assert_eq!(bot.gateway.last_text(), t_lang("no-tours-yet", Some("en")));
    assert_eq!(bot.state(OPERATOR).await, None);
}

#[tokio::test]
async fn editing_appends_after_the_existing_sections() {
    let bot = TestBot::new();
    let (_, translation_id) = seed_tour(&bot.db, OPERATOR, "en", "Old Town Walk").await;
    seed_text_section(&bot.db, translation_id, 0, "Meeting point").await;
    seed_text_section(&bot.db, translation_id, 1, "The cathedral").await;

    bot.command(OPERATOR, "edittour").await;
    let keyboard = bot.gateway.last_keyboard().expect("tour keyboard");
    assert!(keyboard.labels().iter().any(|l| l.contains("Old Town Walk")));

    bot.press(OPERATOR, CallbackData::with_arg("edit", "pick", translation_id)).await;
    assert_eq!(
        bot.gateway.last_text(),
        t_args_lang(
            "edittour-resume",
            &[("title", "Old Town Walk"), ("sections", "2")],
            Some("en")
        )
    );
    assert_eq!(
        bot.state(OPERATOR).await,
        Some(("tour_edit".to_string(), "section_title".to_string()))
    );

    bot.text(OPERATOR, "Hidden courtyards").await;
    bot.text(OPERATOR, "Three yards most visitors never find.").await;
    bot.command(OPERATOR, "done").await;
    bot.command(OPERATOR, "done").await;

    assert_eq!(
        bot.gateway.last_text(),
        t_args_lang("tour-saved", &[("sections", "3")], Some("en"))
    );
    assert_eq!(bot.state(OPERATOR).await, None);

    let sections = bot.db.sections_of_translation(translation_id).await.unwrap();
    assert_eq!(sections.len(), 3);
    assert_eq!(sections[2].title, "Hidden courtyards");
    assert_eq!(sections[2].position, 2);
}

/// A press naming a translation whose tour belongs to someone else is
/// answered as if the tour were gone, without leaking that it exists.
#[tokio::test]
async fn foreign_translation_pick_is_refused() {
    let bot = TestBot::new();
    seed_tour(&bot.db, OPERATOR, "en", "Old Town Walk").await;
    let (_, foreign_translation) = seed_tour(&bot.db, 999, "en", "Somebody else's tour").await;

    bot.command(OPERATOR, "edittour").await;
    bot.press(OPERATOR, CallbackData::with_arg("edit", "pick", foreign_translation)).await;

    assert_eq!(bot.gateway.last_text(), t_lang("tour-vanished", Some("en")));
    assert_eq!(bot.state(OPERATOR).await, None);
}

#[tokio::test]
async fn deleting_removes_one_tour_and_spares_the_rest() {
    let bot = TestBot::new();
    let (doomed_tour, doomed_translation) =
        seed_tour(&bot.db, OPERATOR, "en", "Old Town Walk").await;
    seed_text_section(&bot.db, doomed_translation, 0, "Meeting point").await;
    let (kept_tour, _) = seed_tour(&bot.db, OPERATOR, "en", "River Cruise").await;

    bot.command(OPERATOR, "deletetour").await;
    bot.press(OPERATOR, CallbackData::with_arg("del", "pick", doomed_translation)).await;
    assert_eq!(
        bot.gateway.last_text(),
        t_args_lang("delete-confirm", &[("title", "Old Town Walk")], Some("en"))
    );

    bot.press(OPERATOR, CallbackData::new("del", "confirm")).await;

    assert_eq!(bot.gateway.last_text(), t_lang("tour-deleted", Some("en")));
    assert_eq!(bot.state(OPERATOR).await, None);
    assert!(bot.db.get_tour(doomed_tour).await.unwrap().is_none());
    assert!(bot.db.get_tour(kept_tour).await.unwrap().is_some());

    let remaining = bot.db.translations_for_operator(OPERATOR).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].title, "River Cruise");
}

#[tokio::test]
async fn aborting_the_confirmation_keeps_the_tour() {
    let bot = TestBot::new();
    let (tour_id, translation_id) = seed_tour(&bot.db, OPERATOR, "en", "Old Town Walk").await;

    bot.command(OPERATOR, "deletetour").await;
    bot.press(OPERATOR, CallbackData::with_arg("del", "pick", translation_id)).await;
    bot.press(OPERATOR, CallbackData::new("del", "abort")).await;

    assert_eq!(bot.gateway.last_text(), t_lang("delete-aborted", Some("en")));
    assert_eq!(bot.state(OPERATOR).await, None);
    assert!(bot.db.get_tour(tour_id).await.unwrap().is_some());
}

/// Confirming after the tour vanished through another path still closes
/// the flow cleanly.
#[tokio::test]
async fn confirming_an_already_deleted_tour() {
    let bot = TestBot::new();
    let (tour_id, translation_id) = seed_tour(&bot.db, OPERATOR, "en", "Old Town Walk").await;

    bot.command(OPERATOR, "deletetour").await;
    bot.press(OPERATOR, CallbackData::with_arg("del", "pick", translation_id)).await;
    bot.db.delete_tour(tour_id).await.unwrap();

    bot.press(OPERATOR, CallbackData::new("del", "confirm")).await;

    assert_eq!(bot.gateway.last_text(), t_lang("tour-already-gone", Some("en")));
    assert_eq!(bot.state(OPERATOR).await, None);
}
