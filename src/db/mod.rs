//! Content store: domain models and the persistence seam.
//!
//! Handlers never hold these entities across turns; every transition
//! re-fetches by the ids kept in conversation scratch.

pub mod memory;
pub mod postgres;

use crate::errors::AppResult;
use crate::event::MediaKind;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use memory::MemoryDb;
pub use postgres::{init_database_schema, PostgresDb};

/// A logical tour; all display data lives on its translations.
#[derive(Debug, Clone, PartialEq)]
pub struct Tour {
    pub id: i64,
    pub operator_id: i64,
    pub created_at: DateTime<Utc>,
}

/// One language rendition of a tour.
#[derive(Debug, Clone, PartialEq)]
pub struct TourTranslation {
    pub id: i64,
    pub tour_id: i64,
    pub language: String,
    pub title: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// An ordered chapter of a translation. Positions are 0-based and gapless
/// within the translation.
#[derive(Debug, Clone, PartialEq)]
pub struct TourSection {
    pub id: i64,
    pub translation_id: i64,
    pub title: String,
    pub position: i32,
}

/// One content row of a section. Positions are 0-based and gapless within
/// the section.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionContent {
    pub id: i64,
    pub section_id: i64,
    pub position: i32,
    pub body: ContentBody,
}

/// What a content row carries. Media groups hold their member files inline,
/// sorted by original send order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBody {
    Text {
        text: String,
    },
    Location {
        latitude: f64,
        longitude: f64,
    },
    Photo {
        file_id: String,
        caption: Option<String>,
    },
    Audio {
        file_id: String,
        caption: Option<String>,
    },
    Voice {
        file_id: String,
        caption: Option<String>,
    },
    Video {
        file_id: String,
        caption: Option<String>,
    },
    VideoNote {
        file_id: String,
    },
    Animation {
        file_id: String,
        caption: Option<String>,
    },
    MediaGroup {
        group_id: String,
        items: Vec<GroupItem>,
    },
}

impl ContentBody {
    /// Tag stored in the content row's kind column.
    pub fn kind(&self) -> &'static str {
        match self {
            ContentBody::Text { .. } => "text",
            ContentBody::Location { .. } => "location",
            ContentBody::Photo { .. } => "photo",
            ContentBody::Audio { .. } => "audio",
            ContentBody::Voice { .. } => "voice",
            ContentBody::Video { .. } => "video",
            ContentBody::VideoNote { .. } => "video_note",
            ContentBody::Animation { .. } => "animation",
            ContentBody::MediaGroup { .. } => "media_group",
        }
    }

    /// The platform group id, for media-group rows.
    pub fn media_group_id(&self) -> Option<&str> {
        match self {
            ContentBody::MediaGroup { group_id, .. } => Some(group_id),
            _ => None,
        }
    }
}

/// Member file of a media group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupItem {
    pub kind: MediaKind,
    pub file_id: String,
    /// Platform message id; the sort key reflecting send order.
    pub ordinal: i32,
    pub caption: Option<String>,
}

/// A purchasable offer scoped to (tour, language, guest tier). At most one
/// row per scope is `available`; superseded rows keep their terms for
/// historical invoices.
#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    pub id: i64,
    pub tour_id: i64,
    pub language: String,
    pub currency: String,
    pub amount_minor: i64,
    pub guests: i32,
    pub duration_days: i32,
    pub title: String,
    pub description: String,
    pub available: bool,
    pub created_at: DateTime<Utc>,
}

/// Snapshot of product terms taken when an invoice goes out. Kept without
/// foreign keys so deleting a tour never rewrites purchase history.
#[derive(Debug, Clone, PartialEq)]
pub struct Invoice {
    pub id: i64,
    pub user_id: i64,
    pub product_id: i64,
    pub tour_id: i64,
    pub language: String,
    pub currency: String,
    pub amount_minor: i64,
    pub guests: i32,
    pub duration_days: i32,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

impl Invoice {
    /// Wire payload carried by the checkout and echoed back on payment.
    pub fn payload(&self) -> String {
        format!("inv:{}", self.id)
    }

    /// Parse an invoice id back out of a checkout payload.
    pub fn id_from_payload(payload: &str) -> Option<i64> {
        payload.strip_prefix("inv:")?.parse().ok()
    }
}

/// A guest's time-bounded access grant to one tour.
#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    pub id: i64,
    pub user_id: i64,
    pub tour_id: i64,
    pub expires_at: DateTime<Utc>,
    pub notified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Relational persistence for tours, products and subscriptions.
#[async_trait]
pub trait ContentStore: Send + Sync {
    // Tours
    async fn create_tour(&self, operator_id: i64) -> AppResult<Tour>;
    async fn get_tour(&self, id: i64) -> AppResult<Option<Tour>>;
    /// Cascades to translations, sections, content, products and
    /// subscriptions. Invoices are snapshots and stay.
    async fn delete_tour(&self, id: i64) -> AppResult<bool>;

    // Translations
    async fn create_translation(
        &self,
        tour_id: i64,
        language: &str,
        title: &str,
        description: Option<&str>,
    ) -> AppResult<TourTranslation>;
    async fn get_translation(&self, id: i64) -> AppResult<Option<TourTranslation>>;
    async fn set_translation_description(
        &self,
        translation_id: i64,
        description: Option<&str>,
    ) -> AppResult<()>;
    async fn find_translation(&self, tour_id: i64, language: &str)
        -> AppResult<Option<TourTranslation>>;
    async fn translations_of_tour(&self, tour_id: i64) -> AppResult<Vec<TourTranslation>>;
    /// Translations of every tour owned by this operator, tour id order.
    async fn translations_for_operator(&self, operator_id: i64)
        -> AppResult<Vec<TourTranslation>>;
    /// Translations that currently have at least one available product.
    async fn translations_on_sale(&self) -> AppResult<Vec<TourTranslation>>;

    // Sections
    async fn create_section(
        &self,
        translation_id: i64,
        title: &str,
        position: i32,
    ) -> AppResult<TourSection>;
    async fn get_section(&self, id: i64) -> AppResult<Option<TourSection>>;
    async fn sections_of_translation(&self, translation_id: i64) -> AppResult<Vec<TourSection>>;
    async fn section_count(&self, translation_id: i64) -> AppResult<i64>;
    async fn delete_section(&self, id: i64) -> AppResult<bool>;

    // Section content
    async fn append_content(
        &self,
        section_id: i64,
        position: i32,
        body: &ContentBody,
    ) -> AppResult<SectionContent>;
    async fn contents_of_section(&self, section_id: i64) -> AppResult<Vec<SectionContent>>;
    async fn content_count(&self, section_id: i64) -> AppResult<i64>;
    /// The one media-group row for (section, group id), if it exists.
    async fn find_media_group(
        &self,
        section_id: i64,
        group_id: &str,
    ) -> AppResult<Option<SectionContent>>;
    async fn update_content_body(&self, content_id: i64, body: &ContentBody) -> AppResult<()>;

    // Products
    /// Insert the new product and flip the prior available one of the same
    /// (tour, language, guests) scope, in one transaction.
    #[allow(clippy::too_many_arguments)]
    async fn create_product_superseding(
        &self,
        tour_id: i64,
        language: &str,
        currency: &str,
        amount_minor: i64,
        guests: i32,
        duration_days: i32,
        title: &str,
        description: &str,
    ) -> AppResult<Product>;
    async fn get_product(&self, id: i64) -> AppResult<Option<Product>>;
    async fn available_products(&self, tour_id: i64, language: &str) -> AppResult<Vec<Product>>;
    async fn products_of_tour(&self, tour_id: i64) -> AppResult<Vec<Product>>;

    // Invoices and payments
    async fn create_invoice(&self, user_id: i64, product: &Product) -> AppResult<Invoice>;
    async fn get_invoice(&self, id: i64) -> AppResult<Option<Invoice>>;
    /// Record a completed charge. Returns false when the charge id was
    /// already recorded (platform retry), in which case nothing changed.
    async fn record_payment(&self, invoice_id: i64, charge_id: &str) -> AppResult<bool>;

    // Subscriptions
    /// Grant or extend access: an active grant gains `days` on top of its
    /// current expiry, a lapsed or missing one restarts from now.
    async fn extend_subscription(
        &self,
        user_id: i64,
        tour_id: i64,
        days: i32,
    ) -> AppResult<Subscription>;
    async fn subscription_of(&self, user_id: i64, tour_id: i64)
        -> AppResult<Option<Subscription>>;
    async fn subscriptions_of_user(&self, user_id: i64) -> AppResult<Vec<Subscription>>;
    async fn unnotified_subscriptions(&self) -> AppResult<Vec<Subscription>>;
    async fn mark_subscription_notified(&self, subscription_id: i64) -> AppResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invoice_payload_round_trips() {
        assert_eq!(Invoice::id_from_payload("inv:42"), Some(42));
        assert_eq!(Invoice::id_from_payload("inv:"), None);
        assert_eq!(Invoice::id_from_payload("order:42"), None);
    }

    #[test]
    fn content_body_kind_tags() {
        let body = ContentBody::Text {
            text: "hello".to_string(),
        };
        assert_eq!(body.kind(), "text");
        assert_eq!(body.media_group_id(), None);

        let group = ContentBody::MediaGroup {
            group_id: "g1".to_string(),
            items: vec![],
        };
        assert_eq!(group.kind(), "media_group");
        assert_eq!(group.media_group_id(), Some("g1"));
    }
}
