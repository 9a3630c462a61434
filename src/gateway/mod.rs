//! Outbound messaging seam.
//!
//! Handlers talk to chats through [`MessagingGateway`]; the one production
//! implementation wraps the Telegram client, tests record calls instead.

pub mod telegram;

use std::path::Path;

use crate::errors::AppResult;
use crate::event::{CallbackData, MediaKind};
use async_trait::async_trait;

pub use telegram::TelegramGateway;

/// An inline keyboard, expressed in domain terms.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

impl Keyboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one row of buttons.
    pub fn row(mut self, row: Vec<Button>) -> Self {
        self.rows.push(row);
        self
    }

    /// One button per row, in order.
    pub fn single_column(buttons: Vec<Button>) -> Self {
        Self {
            rows: buttons.into_iter().map(|b| vec![b]).collect(),
        }
    }

    /// All labels in reading order. Test assertions use this.
    pub fn labels(&self) -> Vec<&str> {
        self.rows
            .iter()
            .flat_map(|row| row.iter().map(|b| b.label.as_str()))
            .collect()
    }
}

/// One pressable inline button.
#[derive(Clone, Debug, PartialEq)]
pub struct Button {
    pub label: String,
    pub data: CallbackData,
}

impl Button {
    pub fn new(label: impl Into<String>, data: CallbackData) -> Self {
        Self {
            label: label.into(),
            data,
        }
    }
}

/// Everything a checkout message needs. Amounts are minor units of
/// `currency`.
#[derive(Clone, Debug, PartialEq)]
pub struct InvoiceSpec {
    pub title: String,
    pub description: String,
    /// Echoed back verbatim in the payment notification.
    pub payload: String,
    pub currency: String,
    pub amount_minor: i64,
    /// Label shown next to the single price line.
    pub price_label: String,
}

/// One media attachment to deliver, by platform file id.
#[derive(Clone, Debug, PartialEq)]
pub struct OutgoingMedia {
    pub kind: MediaKind,
    pub file_id: String,
    pub caption: Option<String>,
}

/// Chat-facing side effects available to handlers and background tasks.
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    async fn send_text(&self, chat: i64, text: &str) -> AppResult<()>;

    /// Send text with an inline keyboard; returns the new message id so a
    /// later turn can edit the prompt in place.
    async fn send_text_with_keyboard(
        &self,
        chat: i64,
        text: &str,
        keyboard: &Keyboard,
    ) -> AppResult<i32>;

    /// Replace the text of an earlier message, dropping its keyboard.
    async fn edit_text(&self, chat: i64, message_id: i32, text: &str) -> AppResult<()>;

    async fn send_location(&self, chat: i64, latitude: f64, longitude: f64) -> AppResult<()>;

    async fn send_media(&self, chat: i64, media: &OutgoingMedia) -> AppResult<()>;

    /// Send photos and videos as one album, in slice order.
    async fn send_media_group(&self, chat: i64, items: &[OutgoingMedia]) -> AppResult<()>;

    async fn send_invoice(&self, chat: i64, spec: &InvoiceSpec) -> AppResult<()>;

    /// Fetch a platform file into `dest`.
    async fn download_file(&self, file_id: &str, dest: &Path) -> AppResult<()>;

    /// Upload a local OGG/Opus file as a voice message and return the file
    /// id the platform assigned to it.
    async fn upload_voice(&self, chat: i64, path: &Path) -> AppResult<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyboard_collects_labels_in_reading_order() {
        let keyboard = Keyboard::new()
            .row(vec![
                Button::new("A", CallbackData::new("t", "a")),
                Button::new("B", CallbackData::new("t", "b")),
            ])
            .row(vec![Button::new("C", CallbackData::new("t", "c"))]);
        assert_eq!(keyboard.labels(), vec!["A", "B", "C"]);
    }

    #[test]
    fn single_column_keeps_order() {
        let keyboard = Keyboard::single_column(vec![
            Button::new("First", CallbackData::new("t", "1")),
            Button::new("Second", CallbackData::new("t", "2")),
        ]);
        assert_eq!(keyboard.rows.len(), 2);
        assert_eq!(keyboard.rows[0].len(), 1);
    }
}
