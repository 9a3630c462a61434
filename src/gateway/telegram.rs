//! Telegram implementation of the messaging gateway.

use std::path::Path;

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{
    FileId, InlineKeyboardButton, InlineKeyboardMarkup, InputFile, InputMedia, InputMediaPhoto,
    InputMediaVideo, LabeledPrice, MessageId,
};
use tracing::debug;

use crate::errors::{AppError, AppResult};
use crate::event::MediaKind;
use crate::gateway::{InvoiceSpec, Keyboard, MessagingGateway, OutgoingMedia};

/// Gateway backed by the Bot API client.
#[derive(Clone)]
pub struct TelegramGateway {
    bot: Bot,
    provider_token: String,
}

impl TelegramGateway {
    pub fn new(bot: Bot, provider_token: String) -> Self {
        Self {
            bot,
            provider_token,
        }
    }
}

fn to_markup(keyboard: &Keyboard) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(keyboard.rows.iter().map(|row| {
        row.iter()
            .map(|b| InlineKeyboardButton::callback(b.label.clone(), b.data.encode()))
            .collect::<Vec<_>>()
    }))
}

fn input_file(file_id: &str) -> InputFile {
    InputFile::file_id(FileId(file_id.to_string()))
}

fn minor_units(amount_minor: i64) -> AppResult<u32> {
    u32::try_from(amount_minor)
        .map_err(|_| AppError::Gateway(format!("invoice amount out of range: {amount_minor}")))
}

#[async_trait]
impl MessagingGateway for TelegramGateway {
    async fn send_text(&self, chat: i64, text: &str) -> AppResult<()> {
        self.bot.send_message(ChatId(chat), text).await?;
        Ok(())
    }

    async fn send_text_with_keyboard(
        &self,
        chat: i64,
        text: &str,
        keyboard: &Keyboard,
    ) -> AppResult<i32> {
        let msg = self
            .bot
            .send_message(ChatId(chat), text)
            .reply_markup(to_markup(keyboard))
            .await?;
        Ok(msg.id.0)
    }

    async fn edit_text(&self, chat: i64, message_id: i32, text: &str) -> AppResult<()> {
        self.bot
            .edit_message_text(ChatId(chat), MessageId(message_id), text)
            .await?;
        Ok(())
    }

    async fn send_location(&self, chat: i64, latitude: f64, longitude: f64) -> AppResult<()> {
        self.bot
            .send_location(ChatId(chat), latitude, longitude)
            .await?;
        Ok(())
    }

    async fn send_media(&self, chat: i64, media: &OutgoingMedia) -> AppResult<()> {
        let chat = ChatId(chat);
        let file = input_file(&media.file_id);
        let caption = media.caption.clone();
        match media.kind {
            MediaKind::Photo => {
                let mut req = self.bot.send_photo(chat, file);
                req.caption = caption;
                req.await?;
            }
            MediaKind::Audio => {
                let mut req = self.bot.send_audio(chat, file);
                req.caption = caption;
                req.await?;
            }
            MediaKind::Voice => {
                let mut req = self.bot.send_voice(chat, file);
                req.caption = caption;
                req.await?;
            }
            MediaKind::Video => {
                let mut req = self.bot.send_video(chat, file);
                req.caption = caption;
                req.await?;
            }
            MediaKind::VideoNote => {
                self.bot.send_video_note(chat, file).await?;
            }
            MediaKind::Animation => {
                let mut req = self.bot.send_animation(chat, file);
                req.caption = caption;
                req.await?;
            }
        }
        Ok(())
    }

    async fn send_media_group(&self, chat: i64, items: &[OutgoingMedia]) -> AppResult<()> {
        let mut media = Vec::with_capacity(items.len());
        for item in items {
            let file = input_file(&item.file_id);
            let entry = match item.kind {
                MediaKind::Photo => {
                    let mut photo = InputMediaPhoto::new(file);
                    photo.caption = item.caption.clone();
                    InputMedia::Photo(photo)
                }
                MediaKind::Video => {
                    let mut video = InputMediaVideo::new(file);
                    video.caption = item.caption.clone();
                    InputMedia::Video(video)
                }
                other => {
                    return Err(AppError::Gateway(format!(
                        "cannot send {} inside a media group",
                        other
                    )));
                }
            };
            media.push(entry);
        }
        self.bot.send_media_group(ChatId(chat), media).await?;
        Ok(())
    }

    async fn send_invoice(&self, chat: i64, spec: &InvoiceSpec) -> AppResult<()> {
        debug!(chat_id = chat, payload = spec.payload.as_str(), "Sending invoice");
        let prices = vec![LabeledPrice {
            label: spec.price_label.clone(),
            amount: minor_units(spec.amount_minor)?,
        }];
        let mut req = self.bot.send_invoice(
            ChatId(chat),
            spec.title.clone(),
            spec.description.clone(),
            spec.payload.clone(),
            spec.currency.clone(),
            prices,
        );
        req.provider_token = Some(self.provider_token.clone());
        req.await?;
        Ok(())
    }

    async fn download_file(&self, file_id: &str, dest: &Path) -> AppResult<()> {
        let file = self.bot.get_file(FileId(file_id.to_string())).await?;
        let url = format!(
            "https://api.telegram.org/file/bot{}/{}",
            self.bot.token(),
            file.path
        );
        let response = reqwest::get(&url)
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AppError::Gateway(format!("file download failed: {e}")))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::Gateway(format!("file download failed: {e}")))?;
        tokio::fs::write(dest, &bytes)
            .await
            .map_err(|e| AppError::Gateway(format!("writing download failed: {e}")))?;
        debug!(file_id = file_id, bytes = bytes.len(), "Downloaded file");
        Ok(())
    }

    async fn upload_voice(&self, chat: i64, path: &Path) -> AppResult<String> {
        let msg = self
            .bot
            .send_voice(ChatId(chat), InputFile::file(path.to_path_buf()))
            .await?;
        let voice = msg
            .voice()
            .ok_or_else(|| AppError::Gateway("voice upload returned no voice".to_string()))?;
        Ok(voice.file.id.0.clone())
    }
}
