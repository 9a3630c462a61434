//! # Tourguide Bot
//!
//! A Telegram bot for tour operators: author multilingual tours in chat,
//! sell timed access to them through the platform's payment flow, and
//! deliver the content to paying guests.

pub mod bot;
pub mod config;
pub mod currency;
pub mod db;
pub mod dialogue;
pub mod engine;
pub mod errors;
pub mod event;
pub mod gateway;
pub mod jobs;
pub mod localization;
pub mod notifier;
pub mod telegram;
pub mod validation;

// Re-export the error types most call sites name
pub use errors::{AppError, AppResult};
