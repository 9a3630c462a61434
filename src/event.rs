//! Inbound event model shared by every event source.
//!
//! The Telegram adapter, the background jobs and the tests all describe what
//! happened as an [`Event`]; the dispatch engine never sees platform types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single inbound event for one user-chat.
#[derive(Clone, Debug)]
pub struct Event {
    /// Platform user id of the sender.
    pub user: i64,
    /// Chat the reply should go to. Private-chat bots have `chat == user`.
    pub chat: i64,
    /// Language code reported by the platform for this user, if any.
    pub language_code: Option<String>,
    /// Message the event originated from. Callback events carry the id of
    /// the message holding the pressed keyboard, so handlers can edit it.
    pub message_id: Option<i32>,
    pub payload: EventPayload,
}

impl Event {
    /// Commands get an "unknown command" reply when nothing matches; every
    /// other unmatched event is dropped quietly.
    pub fn is_command(&self) -> bool {
        matches!(self.payload, EventPayload::Command { .. })
    }

    pub fn text(&self) -> Option<&str> {
        match &self.payload {
            EventPayload::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn callback(&self) -> Option<&CallbackData> {
        match &self.payload {
            EventPayload::Callback(data) => Some(data),
            _ => None,
        }
    }

    pub fn media(&self) -> Option<&MediaItem> {
        match &self.payload {
            EventPayload::Media(item) => Some(item),
            _ => None,
        }
    }
}

/// What the event carries, normalized across sources.
#[derive(Clone, Debug)]
pub enum EventPayload {
    /// A slash command; `name` is lowercased, stripped of the leading slash
    /// and of any `@botname` suffix.
    Command { name: String, args: String },
    /// Free text that is not a command.
    Text(String),
    /// One media attachment. Files of a batch upload arrive as separate
    /// events sharing a `media_group_id`.
    Media(MediaItem),
    Location { latitude: f64, longitude: f64 },
    /// An inline-keyboard button press, already split per the wire protocol.
    Callback(CallbackData),
    /// A completed checkout reported by the platform.
    PaymentDone(PaymentNotice),
    /// Synthetic event posted onto the inbound queue by a background job.
    JobDone(JobOutcome),
}

/// Parse a raw message text as a command, if it looks like one.
///
/// Returns the lowercased command name without the slash or `@botname`
/// suffix, plus the remainder of the line.
pub fn parse_command(text: &str) -> Option<(String, String)> {
    let text = text.trim();
    let rest = text.strip_prefix('/')?;
    if rest.is_empty() {
        return None;
    }
    let (head, args) = match rest.split_once(char::is_whitespace) {
        Some((head, args)) => (head, args.trim().to_string()),
        None => (rest, String::new()),
    };
    let name = head.split('@').next().unwrap_or(head).to_lowercase();
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    Some((name, args))
}

/// Media kinds a tour section can hold. `media_group` rows are assembled
/// from photo/video items sharing a group id, so it is not a kind here.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Photo,
    Audio,
    Voice,
    Video,
    VideoNote,
    Animation,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Photo => "photo",
            MediaKind::Audio => "audio",
            MediaKind::Voice => "voice",
            MediaKind::Video => "video",
            MediaKind::VideoNote => "video_note",
            MediaKind::Animation => "animation",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One uploaded file as the platform reported it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    pub kind: MediaKind,
    pub file_id: String,
    /// Present when the file belongs to a batch upload.
    pub media_group_id: Option<String>,
    /// Platform message id. Batch members are kept sorted by this value,
    /// which reflects send order rather than delivery order.
    pub ordinal: i32,
    pub caption: Option<String>,
}

/// Successful-payment notification, provider specifics already stripped.
#[derive(Clone, Debug, PartialEq)]
pub struct PaymentNotice {
    /// The invoice payload we generated at checkout time.
    pub payload: String,
    pub currency: String,
    pub total_amount: i64,
    /// Provider charge id; the paid-exactly-once key.
    pub charge_id: String,
}

/// Result of a detached background job, delivered as a synthetic event.
#[derive(Clone, Debug, PartialEq)]
pub enum JobOutcome {
    Transcode(TranscodeResult),
}

impl JobOutcome {
    /// Tag used by [`EventPattern::Job`](crate::engine::EventPattern) matching.
    pub fn kind(&self) -> &'static str {
        match self {
            JobOutcome::Transcode(_) => "transcode",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TranscodeResult {
    Converted { voice_file_id: String },
    Failed { stage: TranscodeStage, error: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TranscodeStage {
    Download,
    Convert,
    Upload,
}

impl fmt::Display for TranscodeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TranscodeStage::Download => "download",
            TranscodeStage::Convert => "convert",
            TranscodeStage::Upload => "upload",
        })
    }
}

/// Callback-data wire protocol: `"<namespace>:<action>[:<arg>]"`.
///
/// Keyboards encode these into button callback data; the adapter parses the
/// raw string back before dispatch. Telegram caps callback data at 64 bytes,
/// so namespaces and actions stay short and args are ids, not payloads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallbackData {
    pub ns: String,
    pub action: String,
    pub arg: Option<String>,
}

impl CallbackData {
    pub fn new(ns: &str, action: &str) -> Self {
        Self {
            ns: ns.to_string(),
            action: action.to_string(),
            arg: None,
        }
    }

    pub fn with_arg(ns: &str, action: &str, arg: impl fmt::Display) -> Self {
        Self {
            ns: ns.to_string(),
            action: action.to_string(),
            arg: Some(arg.to_string()),
        }
    }

    /// Parse a raw callback-data string. Anything that does not carry at
    /// least a namespace and an action is rejected.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.splitn(3, ':');
        let ns = parts.next()?;
        let action = parts.next()?;
        if ns.is_empty() || action.is_empty() {
            return None;
        }
        Some(Self {
            ns: ns.to_string(),
            action: action.to_string(),
            arg: parts.next().map(|s| s.to_string()),
        })
    }

    pub fn encode(&self) -> String {
        let encoded = match &self.arg {
            Some(arg) => format!("{}:{}:{}", self.ns, self.action, arg),
            None => format!("{}:{}", self.ns, self.action),
        };
        debug_assert!(encoded.len() <= 64, "callback data too long: {encoded}");
        encoded
    }

    /// The argument parsed as a database id, when present and numeric.
    pub fn id_arg(&self) -> Option<i64> {
        self.arg.as_deref().and_then(|a| a.parse().ok())
    }
}

impl fmt::Display for CallbackData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}
