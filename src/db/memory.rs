//! In-memory store used by the integration tests.
//!
//! Mirrors the Postgres semantics the handlers rely on: cascading tour
//! deletion, charge-id idempotency, subscription upsert with expiry
//! extension, and most-recently-touched conversation lookup.

use std::collections::HashMap;

use chrono::{Duration, Utc};
use parking_lot::Mutex;

use crate::db::{
    ContentBody, ContentStore, Invoice, Product, SectionContent, Subscription, Tour,
    TourSection, TourTranslation,
};
use crate::engine::{ConversationRecord, ConversationStore};
use crate::errors::{AppError, AppResult};
use async_trait::async_trait;

#[derive(Default)]
struct Inner {
    next_id: i64,
    tours: HashMap<i64, Tour>,
    translations: HashMap<i64, TourTranslation>,
    sections: HashMap<i64, TourSection>,
    contents: HashMap<i64, SectionContent>,
    products: HashMap<i64, Product>,
    invoices: HashMap<i64, Invoice>,
    charges: HashMap<String, i64>,
    subscriptions: HashMap<i64, Subscription>,
    conversations: HashMap<(i64, String), (ConversationRecord, u64)>,
    touch_seq: u64,
}

impl Inner {
    fn id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Store backed by process-local maps.
#[derive(Default)]
pub struct MemoryDb {
    inner: Mutex<Inner>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContentStore for MemoryDb {
    async fn create_tour(&self, operator_id: i64) -> AppResult<Tour> {
        let mut inner = self.inner.lock();
        let tour = Tour {
            id: inner.id(),
            operator_id,
            created_at: Utc::now(),
        };
        inner.tours.insert(tour.id, tour.clone());
        Ok(tour)
    }

    async fn get_tour(&self, id: i64) -> AppResult<Option<Tour>> {
        Ok(self.inner.lock().tours.get(&id).cloned())
    }

    async fn delete_tour(&self, id: i64) -> AppResult<bool> {
        let mut inner = self.inner.lock();
        if inner.tours.remove(&id).is_none() {
            return Ok(false);
        }
        let translation_ids: Vec<i64> = inner
            .translations
            .values()
            .filter(|t| t.tour_id == id)
            .map(|t| t.id)
            .collect();
        inner.translations.retain(|_, t| t.tour_id != id);
        let section_ids: Vec<i64> = inner
            .sections
            .values()
            .filter(|s| translation_ids.contains(&s.translation_id))
            .map(|s| s.id)
            .collect();
        inner
            .sections
            .retain(|_, s| !translation_ids.contains(&s.translation_id));
        inner
            .contents
            .retain(|_, c| !section_ids.contains(&c.section_id));
        inner.products.retain(|_, p| p.tour_id != id);
        inner.subscriptions.retain(|_, s| s.tour_id != id);
        Ok(true)
    }

    async fn create_translation(
        &self,
        tour_id: i64,
        language: &str,
        title: &str,
        description: Option<&str>,
    ) -> AppResult<TourTranslation> {
        let mut inner = self.inner.lock();
        if inner
            .translations
            .values()
            .any(|t| t.tour_id == tour_id && t.language == language)
        {
            return Err(AppError::Database(format!(
                "translation for tour {} in {} already exists",
                tour_id, language
            )));
        }
        let translation = TourTranslation {
            id: inner.id(),
            tour_id,
            language: language.to_string(),
            title: title.to_string(),
            description: description.map(str::to_string),
            created_at: Utc::now(),
        };
        inner.translations.insert(translation.id, translation.clone());
        Ok(translation)
    }

    async fn get_translation(&self, id: i64) -> AppResult<Option<TourTranslation>> {
        Ok(self.inner.lock().translations.get(&id).cloned())
    }

    async fn set_translation_description(
        &self,
        translation_id: i64,
        description: Option<&str>,
    ) -> AppResult<()> {
        let mut inner = self.inner.lock();
        match inner.translations.get_mut(&translation_id) {
            Some(translation) => {
                translation.description = description.map(str::to_string);
                Ok(())
            }
            None => Err(AppError::Database(format!(
                "translation {} not found",
                translation_id
            ))),
        }
    }

    async fn find_translation(
        &self,
        tour_id: i64,
        language: &str,
    ) -> AppResult<Option<TourTranslation>> {
        Ok(self
            .inner
            .lock()
            .translations
            .values()
            .find(|t| t.tour_id == tour_id && t.language == language)
            .cloned())
    }

    async fn translations_of_tour(&self, tour_id: i64) -> AppResult<Vec<TourTranslation>> {
        let mut out: Vec<TourTranslation> = self
            .inner
            .lock()
            .translations
            .values()
            .filter(|t| t.tour_id == tour_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.language.cmp(&b.language));
        Ok(out)
    }

    async fn translations_for_operator(
        &self,
        operator_id: i64,
    ) -> AppResult<Vec<TourTranslation>> {
        let inner = self.inner.lock();
        let mut out: Vec<TourTranslation> = inner
            .translations
            .values()
            .filter(|t| {
                inner
                    .tours
                    .get(&t.tour_id)
                    .is_some_and(|tour| tour.operator_id == operator_id)
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| (a.tour_id, &a.language).cmp(&(b.tour_id, &b.language)));
        Ok(out)
    }

    async fn translations_on_sale(&self) -> AppResult<Vec<TourTranslation>> {
        let inner = self.inner.lock();
        let mut out: Vec<TourTranslation> = inner
            .translations
            .values()
            .filter(|t| {
                inner
                    .products
                    .values()
                    .any(|p| p.available && p.tour_id == t.tour_id && p.language == t.language)
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| (a.tour_id, &a.language).cmp(&(b.tour_id, &b.language)));
        Ok(out)
    }

    async fn create_section(
        &self,
        translation_id: i64,
        title: &str,
        position: i32,
    ) -> AppResult<TourSection> {
        let mut inner = self.inner.lock();
        let section = TourSection {
            id: inner.id(),
            translation_id,
            title: title.to_string(),
            position,
        };
        inner.sections.insert(section.id, section.clone());
        Ok(section)
    }

    async fn get_section(&self, id: i64) -> AppResult<Option<TourSection>> {
        Ok(self.inner.lock().sections.get(&id).cloned())
    }

    async fn sections_of_translation(&self, translation_id: i64) -> AppResult<Vec<TourSection>> {
        let mut out: Vec<TourSection> = self
            .inner
            .lock()
            .sections
            .values()
            .filter(|s| s.translation_id == translation_id)
            .cloned()
            .collect();
        out.sort_by_key(|s| s.position);
        Ok(out)
    }

    async fn section_count(&self, translation_id: i64) -> AppResult<i64> {
        Ok(self
            .inner
            .lock()
            .sections
            .values()
            .filter(|s| s.translation_id == translation_id)
            .count() as i64)
    }

    async fn delete_section(&self, id: i64) -> AppResult<bool> {
        let mut inner = self.inner.lock();
        if inner.sections.remove(&id).is_none() {
            return Ok(false);
        }
        inner.contents.retain(|_, c| c.section_id != id);
        Ok(true)
    }

    async fn append_content(
        &self,
        section_id: i64,
        position: i32,
        body: &ContentBody,
    ) -> AppResult<SectionContent> {
        let mut inner = self.inner.lock();
        if let Some(group_id) = body.media_group_id() {
            let clash = inner.contents.values().any(|c| {
                c.section_id == section_id && c.body.media_group_id() == Some(group_id)
            });
            if clash {
                return Err(AppError::Database(format!(
                    "media group {} already stored for section {}",
                    group_id, section_id
                )));
            }
        }
        let content = SectionContent {
            id: inner.id(),
            section_id,
            position,
            body: body.clone(),
        };
        inner.contents.insert(content.id, content.clone());
        Ok(content)
    }

    async fn contents_of_section(&self, section_id: i64) -> AppResult<Vec<SectionContent>> {
        let mut out: Vec<SectionContent> = self
            .inner
            .lock()
            .contents
            .values()
            .filter(|c| c.section_id == section_id)
            .cloned()
            .collect();
        out.sort_by_key(|c| c.position);
        Ok(out)
    }

    async fn content_count(&self, section_id: i64) -> AppResult<i64> {
        Ok(self
            .inner
            .lock()
            .contents
            .values()
            .filter(|c| c.section_id == section_id)
            .count() as i64)
    }

    async fn find_media_group(
        &self,
        section_id: i64,
        group_id: &str,
    ) -> AppResult<Option<SectionContent>> {
        Ok(self
            .inner
            .lock()
            .contents
            .values()
            .find(|c| c.section_id == section_id && c.body.media_group_id() == Some(group_id))
            .cloned())
    }

    async fn update_content_body(&self, content_id: i64, body: &ContentBody) -> AppResult<()> {
        let mut inner = self.inner.lock();
        match inner.contents.get_mut(&content_id) {
            Some(content) => {
                content.body = body.clone();
                Ok(())
            }
            None => Err(AppError::Database(format!(
                "content row {} not found",
                content_id
            ))),
        }
    }

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
    ) -> AppResult<Product> {
        let mut inner = self.inner.lock();
        for product in inner.products.values_mut() {
            if product.tour_id == tour_id
                && product.language == language
                && product.guests == guests
            {
                product.available = false;
            }
        }
        let product = Product {
            id: inner.id(),
            tour_id,
            language: language.to_string(),
            currency: currency.to_string(),
            amount_minor,
            guests,
            duration_days,
            title: title.to_string(),
            description: description.to_string(),
            available: true,
            created_at: Utc::now(),
        };
        inner.products.insert(product.id, product.clone());
        Ok(product)
    }

    async fn get_product(&self, id: i64) -> AppResult<Option<Product>> {
        Ok(self.inner.lock().products.get(&id).cloned())
    }

    async fn available_products(&self, tour_id: i64, language: &str) -> AppResult<Vec<Product>> {
        let mut out: Vec<Product> = self
            .inner
            .lock()
            .products
            .values()
            .filter(|p| p.available && p.tour_id == tour_id && p.language == language)
            .cloned()
            .collect();
        out.sort_by_key(|p| p.guests);
        Ok(out)
    }

    async fn products_of_tour(&self, tour_id: i64) -> AppResult<Vec<Product>> {
        let mut out: Vec<Product> = self
            .inner
            .lock()
            .products
            .values()
            .filter(|p| p.tour_id == tour_id)
            .cloned()
            .collect();
        out.sort_by_key(|p| p.id);
        Ok(out)
    }

    async fn create_invoice(&self, user_id: i64, product: &Product) -> AppResult<Invoice> {
        let mut inner = self.inner.lock();
        let invoice = Invoice {
            id: inner.id(),
            user_id,
            product_id: product.id,
            tour_id: product.tour_id,
            language: product.language.clone(),
            currency: product.currency.clone(),
            amount_minor: product.amount_minor,
            guests: product.guests,
            duration_days: product.duration_days,
            title: product.title.clone(),
            created_at: Utc::now(),
        };
        inner.invoices.insert(invoice.id, invoice.clone());
        Ok(invoice)
    }

    async fn get_invoice(&self, id: i64) -> AppResult<Option<Invoice>> {
        Ok(self.inner.lock().invoices.get(&id).cloned())
    }

    async fn record_payment(&self, invoice_id: i64, charge_id: &str) -> AppResult<bool> {
        let mut inner = self.inner.lock();
        if inner.charges.contains_key(charge_id) {
            return Ok(false);
        }
        inner.charges.insert(charge_id.to_string(), invoice_id);
        Ok(true)
    }

    async fn extend_subscription(
        &self,
        user_id: i64,
        tour_id: i64,
        days: i32,
    ) -> AppResult<Subscription> {
        let mut inner = self.inner.lock();
        let now = Utc::now();
        let existing = inner
            .subscriptions
            .values()
            .find(|s| s.user_id == user_id && s.tour_id == tour_id)
            .map(|s| s.id);
        match existing {
            Some(id) => {
                let sub = inner
                    .subscriptions
                    .get_mut(&id)
                    .ok_or_else(|| AppError::Database("subscription vanished".to_string()))?;
                let base = if sub.expires_at > now { sub.expires_at } else { now };
                sub.expires_at = base + Duration::days(days as i64);
                sub.notified_at = None;
                Ok(sub.clone())
            }
            None => {
                let sub = Subscription {
                    id: inner.id(),
                    user_id,
                    tour_id,
                    expires_at: now + Duration::days(days as i64),
                    notified_at: None,
                    created_at: now,
                };
                inner.subscriptions.insert(sub.id, sub.clone());
                Ok(sub)
            }
        }
    }

    async fn subscription_of(
        &self,
        user_id: i64,
        tour_id: i64,
    ) -> AppResult<Option<Subscription>> {
        Ok(self
            .inner
            .lock()
            .subscriptions
            .values()
            .find(|s| s.user_id == user_id && s.tour_id == tour_id)
            .cloned())
    }

    async fn subscriptions_of_user(&self, user_id: i64) -> AppResult<Vec<Subscription>> {
        let mut out: Vec<Subscription> = self
            .inner
            .lock()
            .subscriptions
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.expires_at.cmp(&a.expires_at));
        Ok(out)
    }

    async fn unnotified_subscriptions(&self) -> AppResult<Vec<Subscription>> {
        let now = Utc::now();
        let mut out: Vec<Subscription> = self
            .inner
            .lock()
            .subscriptions
            .values()
            .filter(|s| s.notified_at.is_none() && s.expires_at > now)
            .cloned()
            .collect();
        out.sort_by_key(|s| s.created_at);
        Ok(out)
    }

    async fn mark_subscription_notified(&self, subscription_id: i64) -> AppResult<()> {
        let mut inner = self.inner.lock();
        if let Some(sub) = inner.subscriptions.get_mut(&subscription_id) {
            sub.notified_at = Some(Utc::now());
        }
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for MemoryDb {
    async fn load(&self, user_id: i64, machine: &str) -> AppResult<Option<ConversationRecord>> {
        Ok(self
            .inner
            .lock()
            .conversations
            .get(&(user_id, machine.to_string()))
            .map(|(record, _)| record.clone()))
    }

    async fn active_for_user(&self, user_id: i64) -> AppResult<Option<ConversationRecord>> {
        Ok(self
            .inner
            .lock()
            .conversations
            .values()
            .filter(|(record, _)| record.user_id == user_id)
            .max_by_key(|(_, seq)| *seq)
            .map(|(record, _)| record.clone()))
    }

    async fn save(&self, record: &ConversationRecord) -> AppResult<()> {
        let mut inner = self.inner.lock();
        inner.touch_seq += 1;
        let seq = inner.touch_seq;
        inner
            .conversations
            .insert((record.user_id, record.machine.clone()), (record.clone(), seq));
        Ok(())
    }

    async fn clear(&self, user_id: i64, machine: &str) -> AppResult<()> {
        self.inner
            .lock()
            .conversations
            .remove(&(user_id, machine.to_string()));
        Ok(())
    }
}
