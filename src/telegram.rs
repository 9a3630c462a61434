//! Platform adapter: long-polls the Bot API, converts supported updates
//! into engine [`Event`]s and feeds them to the intake queue.
//!
//! The adapter answers callback queries and pre-checkout queries inline,
//! because both have platform deadlines; everything else is queued and
//! processed by the per-user workers.

use std::sync::Arc;

use teloxide::dispatching::UpdateFilterExt;
use teloxide::prelude::*;
use teloxide::types::{BotCommand, MaybeInaccessibleMessage, PreCheckoutQuery};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::db::{ContentStore, Invoice};
use crate::errors::AppResult;
use crate::event::{
    parse_command, CallbackData, Event, EventPayload, MediaItem, MediaKind, PaymentNotice,
};
use crate::localization::t_lang;

/// Register the public command menu. Operator commands are deliberately
/// left out of it; they still work when typed.
pub async fn set_command_menu(bot: &Bot) -> AppResult<()> {
    let commands = vec![
        BotCommand::new("start", "What this bot does"),
        BotCommand::new("tours", "Browse tours on sale"),
        BotCommand::new("mytours", "Open a tour you bought"),
        BotCommand::new("help", "List available commands"),
        BotCommand::new("cancel", "Abort the current operation"),
    ];
    bot.set_my_commands(commands).await?;
    Ok(())
}

/// Long-poll the platform until shutdown, feeding the intake queue.
pub async fn run_polling(bot: Bot, intake: UnboundedSender<Event>, content: Arc<dyn ContentStore>) {
    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint({
            let intake = intake.clone();
            move |msg: Message| {
                let intake = intake.clone();
                async move {
                    if let Some(event) = message_event(&msg) {
                        if intake.send(event).is_err() {
                            warn!("Event intake closed; dropping message");
                        }
                    }
                    respond(())
                }
            }
        }))
        .branch(Update::filter_callback_query().endpoint({
            let intake = intake.clone();
            move |bot: Bot, q: CallbackQuery| {
                let intake = intake.clone();
                async move {
                    // Stop the button spinner right away; the handler runs
                    // later, behind the user's queue.
                    if let Err(err) = bot.answer_callback_query(q.id.clone()).await {
                        debug!(error = %err, "Failed to answer callback query");
                    }
                    if let Some(event) = callback_event(&q) {
                        if intake.send(event).is_err() {
                            warn!("Event intake closed; dropping callback");
                        }
                    }
                    respond(())
                }
            }
        }))
        .branch(Update::filter_pre_checkout_query().endpoint({
            let content = Arc::clone(&content);
            move |bot: Bot, query: PreCheckoutQuery| {
                let content = Arc::clone(&content);
                async move {
                    answer_pre_checkout(&bot, content.as_ref(), query).await;
                    respond(())
                }
            }
        }));

    info!("Starting long polling");
    Dispatcher::builder(bot, handler)
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

/// Answer a pre-checkout query within the platform deadline. The terms were
/// frozen on the invoice row at checkout time, so the check is only that the
/// invoice still exists and its tour is still around.
async fn answer_pre_checkout(bot: &Bot, content: &dyn ContentStore, query: PreCheckoutQuery) {
    let ok = checkout_acceptable(content, &query.invoice_payload).await;
    debug!(
        payload = query.invoice_payload.as_str(),
        ok = ok,
        "Answering pre-checkout"
    );
    let result = if ok {
        bot.answer_pre_checkout_query(query.id, true).await
    } else {
        let message = t_lang("buy-offer-gone", query.from.language_code.as_deref());
        bot.answer_pre_checkout_query(query.id, false)
            .error_message(message)
            .await
    };
    if let Err(err) = result {
        warn!(error = %err, "Failed to answer pre-checkout query");
    }
}

async fn checkout_acceptable(content: &dyn ContentStore, payload: &str) -> bool {
    let Some(invoice_id) = Invoice::id_from_payload(payload) else {
        return false;
    };
    let invoice = match content.get_invoice(invoice_id).await {
        Ok(Some(invoice)) => invoice,
        Ok(None) => return false,
        Err(err) => {
            // A refused checkout can be retried.
            warn!(error = %err, invoice_id = invoice_id, "Invoice lookup failed during pre-checkout");
            return false;
        }
    };
    match content.get_tour(invoice.tour_id).await {
        Ok(tour) => tour.is_some(),
        Err(err) => {
            warn!(error = %err, tour_id = invoice.tour_id, "Tour lookup failed during pre-checkout");
            false
        }
    }
}

/// The engine event carried by a message, if it carries one we support.
fn message_event(msg: &Message) -> Option<Event> {
    let from = msg.from.as_ref()?;
    if from.is_bot {
        return None;
    }
    let payload = message_payload(msg)?;
    Some(Event {
        user: from.id.0 as i64,
        chat: msg.chat.id.0,
        language_code: from.language_code.clone(),
        message_id: Some(msg.id.0),
        payload,
    })
}

fn message_payload(msg: &Message) -> Option<EventPayload> {
    if let Some(payment) = msg.successful_payment() {
        return Some(EventPayload::PaymentDone(PaymentNotice {
            payload: payment.invoice_payload.clone(),
            currency: payment.currency.to_string(),
            total_amount: i64::from(payment.total_amount),
            charge_id: payment.provider_payment_charge_id.clone(),
        }));
    }
    if let Some(text) = msg.text() {
        return Some(match parse_command(text) {
            Some((name, args)) => EventPayload::Command { name, args },
            None => EventPayload::Text(text.to_string()),
        });
    }
    if let Some(location) = msg.location() {
        return Some(EventPayload::Location {
            latitude: location.latitude,
            longitude: location.longitude,
        });
    }
    media_item(msg).map(EventPayload::Media)
}

/// One media attachment per message; albums arrive as a burst of these
/// sharing a `media_group_id`. The message id doubles as the ordinal that
/// keeps album items in their original order.
fn media_item(msg: &Message) -> Option<MediaItem> {
    let (kind, file_id) = if let Some(sizes) = msg.photo() {
        (MediaKind::Photo, sizes.last()?.file.id.0.clone())
    } else if let Some(audio) = msg.audio() {
        (MediaKind::Audio, audio.file.id.0.clone())
    } else if let Some(voice) = msg.voice() {
        (MediaKind::Voice, voice.file.id.0.clone())
    } else if let Some(video) = msg.video() {
        (MediaKind::Video, video.file.id.0.clone())
    } else if let Some(note) = msg.video_note() {
        (MediaKind::VideoNote, note.file.id.0.clone())
    } else if let Some(animation) = msg.animation() {
        (MediaKind::Animation, animation.file.id.0.clone())
    } else {
        return None;
    };
    Some(MediaItem {
        kind,
        file_id,
        media_group_id: msg.media_group_id().map(|group| group.to_string()),
        ordinal: msg.id.0,
        caption: msg.caption().map(|caption| caption.to_string()),
    })
}

/// The engine event for a button press. Presses with data we never
/// generated are dropped here.
fn callback_event(q: &CallbackQuery) -> Option<Event> {
    let data = q.data.as_deref().and_then(CallbackData::parse)?;
    let (chat, message_id) = match q.message.as_ref() {
        Some(MaybeInaccessibleMessage::Regular(msg)) => (msg.chat.id.0, Some(msg.id.0)),
        // Without a reachable origin message the reply goes to the private
        // chat and nothing gets edited in place.
        Some(MaybeInaccessibleMessage::Inaccessible(_)) | None => (q.from.id.0 as i64, None),
    };
    Some(Event {
        user: q.from.id.0 as i64,
        chat,
        language_code: q.from.language_code.clone(),
        message_id,
        payload: EventPayload::Callback(data),
    })
}
