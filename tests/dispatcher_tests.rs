//! Dispatch behavior around the edges of any one wizard: idle chatter,
//! permission guards, busy-flow refusals and recovery from stale records.

mod test_helpers;

use test_helpers::*;
use tourguide_bot::dialogue::{PurchaseScratch, Scratch, SCRATCH_SCHEMA_VERSION};
use tourguide_bot::engine::{ConversationRecord, ConversationStore};
use tourguide_bot::localization::t_lang;

#[tokio::test]
async fn unknown_command_while_idle_gets_a_reply() {
    let bot = TestBot::new();

    bot.command(GUEST, "frobnicate").await;

    assert_eq!(bot.gateway.last_text(), t_lang("unknown-command", Some("en")));
    assert_eq!(bot.state(GUEST).await, None);
}

#[tokio::test]
async fn plain_text_while_idle_is_ignored() {
    let bot = TestBot::new();

    bot.text(GUEST, "hello there").await;

    assert!(bot.gateway.sent().is_empty());
    assert_eq!(bot.state(GUEST).await, None);
}

#[tokio::test]
async fn operator_commands_refuse_guests() {
    let bot = TestBot::new();

    for name in ["addtour", "edittour", "setprice", "deletetour"] {
        bot.command(GUEST, name).await;
        assert_eq!(
            bot.gateway.last_text(),
            t_lang("operators-only", Some("en")),
            "command {name} should be refused"
        );
        assert_eq!(bot.state(GUEST).await, None);
        bot.gateway.clear();
    }
}

#[tokio::test]
async fn cancel_while_idle_has_nothing_to_do() {
    let bot = TestBot::new();

    bot.command(GUEST, "cancel").await;

    assert_eq!(bot.gateway.last_text(), t_lang("nothing-to-cancel", Some("en")));
}

#[tokio::test]
async fn start_greets_operators_differently() {
    let bot = TestBot::new();

    bot.command(GUEST, "start").await;
    assert_eq!(bot.gateway.last_text(), t_lang("start-welcome", Some("en")));

    bot.command(OPERATOR, "start").await;
    assert_eq!(
        bot.gateway.last_text(),
        t_lang("start-welcome-operator", Some("en"))
    );

    // One-shot commands never leave a conversation behind.
    assert_eq!(bot.state(GUEST).await, None);
    assert_eq!(bot.state(OPERATOR).await, None);
}

#[tokio::test]
async fn help_matches_the_audience() {
    let bot = TestBot::new();

    bot.command(GUEST, "help").await;
    assert_eq!(bot.gateway.last_text(), t_lang("help-text", Some("en")));

    bot.command(OPERATOR, "help").await;
    assert_eq!(bot.gateway.last_text(), t_lang("help-operator", Some("en")));
}

#[tokio::test]
async fn other_commands_are_refused_mid_wizard() {
    let bot = TestBot::new();

    bot.command(OPERATOR, "addtour").await;
    assert_eq!(
        bot.state(OPERATOR).await,
        Some(("tour_add".to_string(), "add_language".to_string()))
    );

    bot.command(OPERATOR, "help").await;

    assert_eq!(bot.gateway.last_text(), t_lang("flow-busy", Some("en")));
    assert_eq!(
        bot.state(OPERATOR).await,
        Some(("tour_add".to_string(), "add_language".to_string()))
    );
}

#[tokio::test]
async fn offtopic_input_mid_wizard_gets_a_nudge() {
    let bot = TestBot::new();

    bot.command(OPERATOR, "addtour").await;
    // A language pick is expected, not free text.
    bot.text(OPERATOR, "english please").await;

    assert_eq!(bot.gateway.last_text(), t_lang("input-mismatch", Some("en")));
    assert_eq!(
        bot.state(OPERATOR).await,
        Some(("tour_add".to_string(), "add_language".to_string()))
    );
}

/// A record naming a machine that no longer exists is dropped on contact and
/// the event is handled as if the user were idle.
#[tokio::test]
async fn record_for_a_retired_machine_is_dropped() {
    let bot = TestBot::new();
    let record = ConversationRecord {
        user_id: GUEST,
        machine: "legacy_wizard".to_string(),
        state: "somewhere".to_string(),
        scratch_json: Scratch::None.encode().unwrap(),
        schema_version: SCRATCH_SCHEMA_VERSION,
    };
    bot.db.save(&record).await.unwrap();

    bot.command(GUEST, "start").await;

    assert_eq!(bot.gateway.last_text(), t_lang("start-welcome", Some("en")));
    assert_eq!(bot.state(GUEST).await, None);
}

#[tokio::test]
async fn record_with_a_newer_schema_is_dropped() {
    let bot = TestBot::new();
    let record = ConversationRecord {
        user_id: GUEST,
        machine: "purchase".to_string(),
        state: "buy_payment".to_string(),
        scratch_json: Scratch::Purchase(PurchaseScratch::default()).encode().unwrap(),
        schema_version: SCRATCH_SCHEMA_VERSION + 1,
    };
    bot.db.save(&record).await.unwrap();

    // Were the record honored, this text would draw the waiting reminder.
    bot.text(GUEST, "did it work?").await;

    assert!(bot.gateway.sent().is_empty());
    assert_eq!(bot.state(GUEST).await, None);
}

#[tokio::test]
async fn record_in_an_unknown_state_is_dropped() {
    let bot = TestBot::new();
    let record = ConversationRecord {
        user_id: OPERATOR,
        machine: "tour_add".to_string(),
        state: "renamed_state".to_string(),
        scratch_json: Scratch::None.encode().unwrap(),
        schema_version: SCRATCH_SCHEMA_VERSION,
    };
    bot.db.save(&record).await.unwrap();

    bot.command(OPERATOR, "addtour").await;

    // The stale conversation is gone and the wizard started over.
    assert_eq!(
        bot.state(OPERATOR).await,
        Some(("tour_add".to_string(), "add_language".to_string()))
    );
    assert_eq!(
        bot.gateway.last_text(),
        t_lang("addtour-pick-language", Some("en"))
    );
}

/// A handler failure mid-turn apologizes but keeps the conversation where
/// it was, so the user can try the same step again.
#[tokio::test]
async fn handler_error_keeps_the_conversation() {
    let bot = TestBot::new();
    // An add-tour record whose scratch belongs to another wizard makes the
    // title handler fail without touching the store.
    let record = ConversationRecord {
        user_id: OPERATOR,
        machine: "tour_add".to_string(),
        state: "add_title".to_string(),
        scratch_json: Scratch::Purchase(PurchaseScratch::default()).encode().unwrap(),
        schema_version: SCRATCH_SCHEMA_VERSION,
    };
    bot.db.save(&record).await.unwrap();

    bot.text(OPERATOR, "Old Town Walk").await;

    assert_eq!(bot.gateway.last_text(), t_lang("error-generic", Some("en")));
    assert_eq!(
        bot.state(OPERATOR).await,
        Some(("tour_add".to_string(), "add_title".to_string()))
    );
}
