//! Typed scratch data carried across the turns of a durable conversation.

use crate::errors::{AppError, AppResult};
use crate::event::MediaItem;
use serde::{Deserialize, Serialize};

/// Bumped whenever a scratch variant changes shape. Records written under a
/// different version no longer decode reliably and are dropped on contact.
pub const SCRATCH_SCHEMA_VERSION: i32 = 1;

/// Per-wizard working data, persisted alongside the conversation state.
///
/// Each wizard owns one variant; the dispatcher round-trips the whole enum
/// through the store between turns, so handlers never keep domain entities
/// in memory across events.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum Scratch {
    #[default]
    None,
    TourDraft(TourDraftScratch),
    PriceDraft(PriceDraftScratch),
    TourRemoval(TourRemovalScratch),
    Purchase(PurchaseScratch),
}

impl Scratch {
    /// Schema-versioned encode half; the version itself is stored in a
    /// separate column by the conversation store.
    pub fn encode(&self) -> AppResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(raw: &str) -> AppResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn tour_draft_mut(&mut self) -> AppResult<&mut TourDraftScratch> {
        match self {
            Scratch::TourDraft(draft) => Ok(draft),
            other => Err(scratch_mismatch("tour draft", other)),
        }
    }

    pub fn price_draft_mut(&mut self) -> AppResult<&mut PriceDraftScratch> {
        match self {
            Scratch::PriceDraft(draft) => Ok(draft),
            other => Err(scratch_mismatch("price draft", other)),
        }
    }

    pub fn tour_removal_mut(&mut self) -> AppResult<&mut TourRemovalScratch> {
        match self {
            Scratch::TourRemoval(removal) => Ok(removal),
            other => Err(scratch_mismatch("tour removal", other)),
        }
    }

    pub fn purchase_mut(&mut self) -> AppResult<&mut PurchaseScratch> {
        match self {
            Scratch::Purchase(purchase) => Ok(purchase),
            other => Err(scratch_mismatch("purchase", other)),
        }
    }
}

fn scratch_mismatch(wanted: &str, got: &Scratch) -> AppError {
    AppError::Internal(format!(
        "conversation scratch does not hold a {} (got {:?})",
        wanted, got
    ))
}

/// Working data of the add-tour and edit-tour wizards.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TourDraftScratch {
    /// Language of the translation under construction.
    pub language: Option<String>,
    pub tour_id: Option<i64>,
    pub translation_id: Option<i64>,
    /// Section currently receiving content, once one is open.
    pub section_id: Option<i64>,
    /// Position the next section takes, 0-based within the translation.
    /// Incremented after each successful section insert; re-derived from the
    /// store when amending an existing translation.
    pub next_section_pos: i32,
    /// Position the next content row takes, 0-based within the open section.
    /// Reset to 0 whenever a new section opens.
    pub next_content_pos: i32,
    /// Audio upload parked while the user decides convert-vs-keep.
    pub pending_audio: Option<MediaItem>,
    /// True when amending an existing tour rather than creating one.
    pub editing: bool,
}

/// Working data of the pricing wizard. Fields fill front to back as the
/// chain advances; the product row is only written at the final step.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceDraftScratch {
    pub tour_id: Option<i64>,
    pub language: Option<String>,
    pub guests: Option<i32>,
    pub currency: Option<String>,
    /// Price in the currency's minor units.
    pub amount_minor: Option<i64>,
    pub duration_days: Option<i32>,
    pub title: Option<String>,
}

/// Working data of the delete-tour confirmation flow.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TourRemovalScratch {
    pub tour_id: Option<i64>,
}

/// Working data of the guest purchase flow.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PurchaseScratch {
    pub tour_id: Option<i64>,
    pub language: Option<String>,
    pub product_id: Option<i64>,
    /// Snapshot row created when the invoice goes out.
    pub invoice_id: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scratch_encodes_and_decodes() {
        let scratch = Scratch::TourDraft(TourDraftScratch {
            language: Some("en".to_string()),
            tour_id: Some(7),
            translation_id: Some(9),
            section_id: Some(11),
            next_section_pos: 2,
            next_content_pos: 3,
            pending_audio: None,
            editing: false,
        });
        let raw = scratch.encode().unwrap();
        assert_eq!(Scratch::decode(&raw).unwrap(), scratch);
    }

    #[test]
    fn default_scratch_is_none() {
        assert_eq!(Scratch::default(), Scratch::None);
    }

    #[test]
    fn variant_accessors_reject_wrong_kind() {
        let mut scratch = Scratch::None;
        assert!(scratch.tour_draft_mut().is_err());
        assert!(scratch.purchase_mut().is_err());

        let mut scratch = Scratch::PriceDraft(PriceDraftScratch::default());
        assert!(scratch.price_draft_mut().is_ok());
        assert!(scratch.tour_removal_mut().is_err());
    }
}
