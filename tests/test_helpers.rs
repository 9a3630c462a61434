//! Shared fixtures for the integration suite: an in-memory bot wired to a
//! gateway that records every outbound call instead of talking to Telegram.

// Each test binary compiles this module separately and uses its own slice.
#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver};

use tourguide_bot::bot::build_registry;
use tourguide_bot::config::AppConfig;
use tourguide_bot::currency::CurrencyCache;
use tourguide_bot::db::{ContentStore, MemoryDb};
use tourguide_bot::engine::{ConversationStore, Dispatcher, Services};
use tourguide_bot::errors::{AppError, AppResult};
use tourguide_bot::event::{
    CallbackData, Event, EventPayload, JobOutcome, MediaItem, MediaKind, PaymentNotice,
};
use tourguide_bot::gateway::{InvoiceSpec, Keyboard, MessagingGateway, OutgoingMedia};
use tourguide_bot::jobs::JobRunner;

pub const OPERATOR: i64 = 100;
pub const GUEST: i64 = 200;

/// One outbound call, as the handlers issued it.
#[derive(Clone, Debug)]
pub enum Sent {
    Text {
        chat: i64,
        text: String,
    },
    Prompt {
        chat: i64,
        text: String,
        keyboard: Keyboard,
        message_id: i32,
    },
    Edit {
        chat: i64,
        message_id: i32,
        text: String,
    },
    Location {
        chat: i64,
    },
    Media {
        chat: i64,
        media: OutgoingMedia,
    },
    MediaGroup {
        chat: i64,
        items: Vec<OutgoingMedia>,
    },
    Invoice {
        chat: i64,
        spec: InvoiceSpec,
    },
}

/// Gateway double that records calls in order. Prompt message ids count up
/// from 1000 so tests can tell them apart from inbound message ids.
#[derive(Default)]
pub struct RecordingGateway {
    log: Mutex<Vec<Sent>>,
    next_message_id: Mutex<i32>,
}

impl RecordingGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            log: Mutex::new(Vec::new()),
            next_message_id: Mutex::new(1000),
        })
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.log.lock().clone()
    }

    /// Every text the user saw (plain, prompt or edit), in order.
    pub fn texts(&self) -> Vec<String> {
        self.log
            .lock()
            .iter()
            .filter_map(|s| match s {
                Sent::Text { text, .. }
                | Sent::Prompt { text, .. }
                | Sent::Edit { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn last_text(&self) -> String {
        self.texts().last().cloned().unwrap_or_default()
    }

    pub fn last_keyboard(&self) -> Option<Keyboard> {
        self.log.lock().iter().rev().find_map(|s| match s {
            Sent::Prompt { keyboard, .. } => Some(keyboard.clone()),
            _ => None,
        })
    }

    pub fn invoices(&self) -> Vec<InvoiceSpec> {
        self.log
            .lock()
            .iter()
            .filter_map(|s| match s {
                Sent::Invoice { spec, .. } => Some(spec.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn media_groups(&self) -> Vec<Vec<OutgoingMedia>> {
        self.log
            .lock()
            .iter()
            .filter_map(|s| match s {
                Sent::MediaGroup { items, .. } => Some(items.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.log.lock().clear();
    }
}

#[async_trait]
impl MessagingGateway for RecordingGateway {
    async fn send_text(&self, chat: i64, text: &str) -> AppResult<()> {
        self.log.lock().push(Sent::Text {
            chat,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn send_text_with_keyboard(
        &self,
        chat: i64,
        text: &str,
        keyboard: &Keyboard,
    ) -> AppResult<i32> {
        let message_id = {
            let mut next = self.next_message_id.lock();
            *next += 1;
            *next
        };
        self.log.lock().push(Sent::Prompt {
            chat,
            text: text.to_string(),
            keyboard: keyboard.clone(),
            message_id,
        });
        Ok(message_id)
    }

    async fn edit_text(&self, chat: i64, message_id: i32, text: &str) -> AppResult<()> {
        self.log.lock().push(Sent::Edit {
            chat,
            message_id,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn send_location(&self, chat: i64, _latitude: f64, _longitude: f64) -> AppResult<()> {
        self.log.lock().push(Sent::Location { chat });
        Ok(())
    }

    async fn send_media(&self, chat: i64, media: &OutgoingMedia) -> AppResult<()> {
        self.log.lock().push(Sent::Media {
            chat,
            media: media.clone(),
        });
        Ok(())
    }

    async fn send_media_group(&self, chat: i64, items: &[OutgoingMedia]) -> AppResult<()> {
        self.log.lock().push(Sent::MediaGroup {
            chat,
            items: items.to_vec(),
        });
        Ok(())
    }

    async fn send_invoice(&self, chat: i64, spec: &InvoiceSpec) -> AppResult<()> {
        self.log.lock().push(Sent::Invoice {
            chat,
            spec: spec.clone(),
        });
        Ok(())
    }

    async fn download_file(&self, _file_id: &str, dest: &Path) -> AppResult<()> {
        std::fs::write(dest, []).map_err(|e| AppError::Gateway(e.to_string()))
    }

    async fn upload_voice(&self, _chat: i64, _path: &Path) -> AppResult<String> {
        Ok("uploaded-voice".to_string())
    }
}

/// The bot under test: registry, dispatcher, in-memory store, recording
/// gateway. Events go straight through the dispatcher; the intake queue and
/// per-user workers are not part of these tests.
pub struct TestBot {
    pub dispatcher: Dispatcher,
    pub gateway: Arc<RecordingGateway>,
    pub db: Arc<MemoryDb>,
    _intake: UnboundedReceiver<Event>,
}

impl TestBot {
    pub fn new() -> Self {
        let gateway = RecordingGateway::new();
        let db = Arc::new(MemoryDb::new());
        let (intake_tx, intake_rx) = mpsc::unbounded_channel();

        let mut config = AppConfig::default();
        config.bot.operator_ids = vec![OPERATOR];
        // A port nothing listens on, so the one refresh attempt fails fast
        // and the embedded table serves every lookup.
        config.currency.url = "http://127.0.0.1:9/currencies.json".to_string();

        let currencies = Arc::new(
            CurrencyCache::new(&config.currency).expect("embedded currency table must parse"),
        );
        let jobs = JobRunner::new(
            gateway.clone() as Arc<dyn MessagingGateway>,
            intake_tx,
            config.transcode.clone(),
        );
        let services = Arc::new(Services {
            gateway: gateway.clone(),
            content: db.clone(),
            currencies,
            jobs,
            config,
            content_lock: tokio::sync::Mutex::new(()),
        });
        let dispatcher = Dispatcher::new(build_registry(), db.clone(), services);

        Self {
            dispatcher,
            gateway,
            db,
            _intake: intake_rx,
        }
    }

    pub async fn send(&self, event: Event) {
        self.dispatcher.dispatch(event).await;
    }

    pub async fn command(&self, user: i64, name: &str) {
        self.send(command(user, name)).await;
    }

    pub async fn text(&self, user: i64, body: &str) {
        self.send(text(user, body)).await;
    }

    pub async fn press(&self, user: i64, data: CallbackData) {
        self.send(press(user, data)).await;
    }

    /// The machine and state of the user's open conversation, if any.
    pub async fn state(&self, user: i64) -> Option<(String, String)> {
        self.db
            .active_for_user(user)
            .await
            .expect("memory store never fails")
            .map(|r| (r.machine, r.state))
    }
}

fn event(user: i64, payload: EventPayload) -> Event {
    Event {
        user,
        chat: user,
        language_code: Some("en".to_string()),
        message_id: Some(1),
        payload,
    }
}

pub fn command(user: i64, name: &str) -> Event {
    event(
        user,
        EventPayload::Command {
            name: name.to_string(),
            args: String::new(),
        },
    )
}

pub fn text(user: i64, body: &str) -> Event {
    event(user, EventPayload::Text(body.to_string()))
}

pub fn press(user: i64, data: CallbackData) -> Event {
    let mut e = event(user, EventPayload::Callback(data));
    e.message_id = Some(77);
    e
}

pub fn location(user: i64) -> Event {
    event(
        user,
        EventPayload::Location {
            latitude: 48.8584,
            longitude: 2.2945,
        },
    )
}

pub fn media(user: i64, kind: MediaKind, file_id: &str) -> Event {
    event(
        user,
        EventPayload::Media(MediaItem {
            kind,
            file_id: file_id.to_string(),
            media_group_id: None,
            ordinal: 1,
            caption: None,
        }),
    )
}

pub fn grouped_photo(user: i64, file_id: &str, group: &str, ordinal: i32) -> Event {
    event(
        user,
        EventPayload::Media(MediaItem {
            kind: MediaKind::Photo,
            file_id: file_id.to_string(),
            media_group_id: Some(group.to_string()),
            ordinal,
            caption: None,
        }),
    )
}

pub fn payment(user: i64, payload: &str, charge_id: &str) -> Event {
    event(
        user,
        EventPayload::PaymentDone(PaymentNotice {
            payload: payload.to_string(),
            currency: "EUR".to_string(),
            total_amount: 500,
            charge_id: charge_id.to_string(),
        }),
    )
}

pub fn job_done(user: i64, outcome: JobOutcome) -> Event {
    let mut e = event(user, EventPayload::JobDone(outcome));
    e.message_id = None;
    e
}

/// A tour with one translation, returned as (tour id, translation id).
pub async fn seed_tour(db: &MemoryDb, operator: i64, language: &str, title: &str) -> (i64, i64) {
    let tour = db.create_tour(operator).await.expect("create tour");
    let translation = db
        .create_translation(tour.id, language, title, Some("A stroll through town"))
        .await
        .expect("create translation");
    (tour.id, translation.id)
}

/// Add one section holding a single text block.
pub async fn seed_text_section(db: &MemoryDb, translation_id: i64, position: i32, title: &str) {
    let section = db
        .create_section(translation_id, title, position)
        .await
        .expect("create section");
    db.append_content(
        section.id,
        0,
        &tourguide_bot::db::ContentBody::Text {
            text: format!("About {title}"),
        },
    )
    .await
    .expect("append content");
}

/// A tour on sale: tour, translation, one section and an available product.
pub async fn seed_tour_on_sale(
    db: &MemoryDb,
    operator: i64,
    language: &str,
    title: &str,
) -> (i64, i64, i64) {
    let (tour_id, translation_id) = seed_tour(db, operator, language, title).await;
    seed_text_section(db, translation_id, 0, "Meeting point").await;
    let product = db
        .create_product_superseding(tour_id, language, "EUR", 500, 2, 30, "Day pass", "One day")
        .await
        .expect("create product");
    (tour_id, translation_id, product.id)
}
