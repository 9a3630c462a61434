//! Postgres-backed stores.
//!
//! Schema setup runs at startup and is idempotent. All statements use
//! positional binds and read columns back by index.

use anyhow::{Context, Result};
use sqlx::postgres::PgPool;
use sqlx::Row;
use tracing::{debug, info};

use crate::db::{
    ContentBody, ContentStore, Invoice, Product, SectionContent, Subscription, Tour,
    TourSection, TourTranslation,
};
use crate::engine::{ConversationRecord, ConversationStore};
use crate::errors::{AppError, AppResult};
use async_trait::async_trait;

/// Create all tables and indexes if they do not exist yet.
pub async fn init_database_schema(pool: &PgPool) -> Result<()> {
    info!("Initializing database schema...");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tours (
            id BIGSERIAL PRIMARY KEY,
            operator_id BIGINT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create tours table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tour_translations (
            id BIGSERIAL PRIMARY KEY,
            tour_id BIGINT NOT NULL REFERENCES tours(id) ON DELETE CASCADE,
            language VARCHAR(10) NOT NULL,
            title VARCHAR(255) NOT NULL,
            description TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (tour_id, language)
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create tour_translations table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tour_sections (
            id BIGSERIAL PRIMARY KEY,
            translation_id BIGINT NOT NULL REFERENCES tour_translations(id) ON DELETE CASCADE,
            title VARCHAR(255) NOT NULL,
            position INT NOT NULL,
            UNIQUE (translation_id, position)
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create tour_sections table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tour_section_contents (
            id BIGSERIAL PRIMARY KEY,
            section_id BIGINT NOT NULL REFERENCES tour_sections(id) ON DELETE CASCADE,
            position INT NOT NULL,
            kind VARCHAR(20) NOT NULL,
            media_group_id VARCHAR(64),
            body TEXT NOT NULL,
            UNIQUE (section_id, position),
            UNIQUE (section_id, kind, media_group_id)
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create tour_section_contents table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS products (
            id BIGSERIAL PRIMARY KEY,
            tour_id BIGINT NOT NULL REFERENCES tours(id) ON DELETE CASCADE,
            language VARCHAR(10) NOT NULL,
            currency VARCHAR(8) NOT NULL,
            amount_minor BIGINT NOT NULL,
            guests INT NOT NULL,
            duration_days INT NOT NULL,
            title VARCHAR(32) NOT NULL,
            description VARCHAR(255) NOT NULL,
            available BOOLEAN NOT NULL DEFAULT TRUE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create products table")?;

    // Invoices snapshot product terms and carry no foreign keys, so purchase
    // history survives tour deletion.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS invoices (
            id BIGSERIAL PRIMARY KEY,
            user_id BIGINT NOT NULL,
            product_id BIGINT NOT NULL,
            tour_id BIGINT NOT NULL,
            language VARCHAR(10) NOT NULL,
            currency VARCHAR(8) NOT NULL,
            amount_minor BIGINT NOT NULL,
            guests INT NOT NULL,
            duration_days INT NOT NULL,
            title VARCHAR(32) NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create invoices table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS payments (
            id BIGSERIAL PRIMARY KEY,
            invoice_id BIGINT NOT NULL REFERENCES invoices(id),
            charge_id VARCHAR(128) NOT NULL UNIQUE,
            paid_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create payments table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS subscriptions (
            id BIGSERIAL PRIMARY KEY,
            user_id BIGINT NOT NULL,
            tour_id BIGINT NOT NULL REFERENCES tours(id) ON DELETE CASCADE,
            expires_at TIMESTAMPTZ NOT NULL,
            notified_at TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (user_id, tour_id)
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create subscriptions table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS conversations (
            user_id BIGINT NOT NULL,
            machine VARCHAR(64) NOT NULL,
            state VARCHAR(64) NOT NULL,
            scratch TEXT NOT NULL,
            schema_version INT NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (user_id, machine)
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create conversations table")?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_translations_tour ON tour_translations(tour_id)",
    )
    .execute(pool)
    .await
    .context("Failed to create tour_translations index")?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_sections_translation ON tour_sections(translation_id)",
    )
    .execute(pool)
    .await
    .context("Failed to create tour_sections index")?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_contents_section ON tour_section_contents(section_id)",
    )
    .execute(pool)
    .await
    .context("Failed to create tour_section_contents index")?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_products_scope ON products(tour_id, language, guests)",
    )
    .execute(pool)
    .await
    .context("Failed to create products index")?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_subscriptions_user ON subscriptions(user_id)",
    )
    .execute(pool)
    .await
    .context("Failed to create subscriptions index")?;

    info!("Database schema initialized successfully");
    Ok(())
}

/// Store implementation over a shared connection pool.
#[derive(Clone)]
pub struct PostgresDb {
    pool: PgPool,
}

impl PostgresDb {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn tour_from_row(row: &sqlx::postgres::PgRow) -> Tour {
    Tour {
        id: row.get(0),
        operator_id: row.get(1),
        created_at: row.get(2),
    }
}

fn translation_from_row(row: &sqlx::postgres::PgRow) -> TourTranslation {
    TourTranslation {
        id: row.get(0),
        tour_id: row.get(1),
        language: row.get(2),
        title: row.get(3),
        description: row.get(4),
        created_at: row.get(5),
    }
}

fn section_from_row(row: &sqlx::postgres::PgRow) -> TourSection {
    TourSection {
        id: row.get(0),
        translation_id: row.get(1),
        title: row.get(2),
        position: row.get(3),
    }
}

fn content_from_row(row: &sqlx::postgres::PgRow) -> AppResult<SectionContent> {
    let body_json: String = row.get(3);
    let body: ContentBody = serde_json::from_str(&body_json)?;
    Ok(SectionContent {
        id: row.get(0),
        section_id: row.get(1),
        position: row.get(2),
        body,
    })
}

fn product_from_row(row: &sqlx::postgres::PgRow) -> Product {
    Product {
        id: row.get(0),
        tour_id: row.get(1),
        language: row.get(2),
        currency: row.get(3),
        amount_minor: row.get(4),
        guests: row.get(5),
        duration_days: row.get(6),
        title: row.get(7),
        description: row.get(8),
        available: row.get(9),
        created_at: row.get(10),
    }
}

fn invoice_from_row(row: &sqlx::postgres::PgRow) -> Invoice {
    Invoice {
        id: row.get(0),
        user_id: row.get(1),
        product_id: row.get(2),
        tour_id: row.get(3),
        language: row.get(4),
        currency: row.get(5),
        amount_minor: row.get(6),
        guests: row.get(7),
        duration_days: row.get(8),
        title: row.get(9),
        created_at: row.get(10),
    }
}

fn subscription_from_row(row: &sqlx::postgres::PgRow) -> Subscription {
    Subscription {
        id: row.get(0),
        user_id: row.get(1),
        tour_id: row.get(2),
        expires_at: row.get(3),
        notified_at: row.get(4),
        created_at: row.get(5),
    }
}

#[async_trait]
impl ContentStore for PostgresDb {
    async fn create_tour(&self, operator_id: i64) -> AppResult<Tour> {
        debug!(operator_id = operator_id, "Creating tour");
        let row = sqlx::query(
            "INSERT INTO tours (operator_id) VALUES ($1) RETURNING id, operator_id, created_at",
        )
        .bind(operator_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(tour_from_row(&row))
    }

    async fn get_tour(&self, id: i64) -> AppResult<Option<Tour>> {
        let row = sqlx::query("SELECT id, operator_id, created_at FROM tours WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(tour_from_row))
    }

    async fn delete_tour(&self, id: i64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM tours WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        let deleted = result.rows_affected() > 0;
        if deleted {
            info!(tour_id = id, "Deleted tour");
        }
        Ok(deleted)
    }

    async fn create_translation(
        &self,
        tour_id: i64,
        language: &str,
        title: &str,
        description: Option<&str>,
    ) -> AppResult<TourTranslation> {
        debug!(tour_id = tour_id, language = language, "Creating tour translation");
        let row = sqlx::query(
            r#"
            INSERT INTO tour_translations (tour_id, language, title, description)
            VALUES ($1, $2, $3, $4)
            RETURNING id, tour_id, language, title, description, created_at
            "#,
        )
        .bind(tour_id)
        .bind(language)
        .bind(title)
        .bind(description)
        .fetch_one(&self.pool)
        .await?;
        Ok(translation_from_row(&row))
    }

    async fn get_translation(&self, id: i64) -> AppResult<Option<TourTranslation>> {
        let row = sqlx::query(
            "SELECT id, tour_id, language, title, description, created_at \
             FROM tour_translations WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(translation_from_row))
    }

    async fn set_translation_description(
        &self,
        translation_id: i64,
        description: Option<&str>,
    ) -> AppResult<()> {
        let result = sqlx::query("UPDATE tour_translations SET description = $1 WHERE id = $2")
            .bind(description)
            .bind(translation_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::Database(format!(
                "translation {} not found",
                translation_id
            )));
        }
        Ok(())
    }

    async fn find_translation(
        &self,
        tour_id: i64,
        language: &str,
    ) -> AppResult<Option<TourTranslation>> {
        let row = sqlx::query(
            "SELECT id, tour_id, language, title, description, created_at \
             FROM tour_translations WHERE tour_id = $1 AND language = $2",
        )
        .bind(tour_id)
        .bind(language)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(translation_from_row))
    }

    async fn translations_of_tour(&self, tour_id: i64) -> AppResult<Vec<TourTranslation>> {
        let rows = sqlx::query(
            "SELECT id, tour_id, language, title, description, created_at \
             FROM tour_translations WHERE tour_id = $1 ORDER BY language",
        )
        .bind(tour_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(translation_from_row).collect())
    }

    async fn translations_for_operator(
        &self,
        operator_id: i64,
    ) -> AppResult<Vec<TourTranslation>> {
        let rows = sqlx::query(
            r#"
            SELECT tt.id, tt.tour_id, tt.language, tt.title, tt.description, tt.created_at
            FROM tour_translations tt
            JOIN tours t ON t.id = tt.tour_id
            WHERE t.operator_id = $1
            ORDER BY tt.tour_id, tt.language
            "#,
        )
        .bind(operator_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(translation_from_row).collect())
    }

    async fn translations_on_sale(&self) -> AppResult<Vec<TourTranslation>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT tt.id, tt.tour_id, tt.language, tt.title, tt.description, tt.created_at
            FROM tour_translations tt
            JOIN products p ON p.tour_id = tt.tour_id AND p.language = tt.language
            WHERE p.available = TRUE
            ORDER BY tt.tour_id, tt.language
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(translation_from_row).collect())
    }

    async fn create_section(
        &self,
        translation_id: i64,
        title: &str,
        position: i32,
    ) -> AppResult<TourSection> {
        debug!(
            translation_id = translation_id,
            position = position,
            "Creating tour section"
        );
        let row = sqlx::query(
            r#"
            INSERT INTO tour_sections (translation_id, title, position)
            VALUES ($1, $2, $3)
            RETURNING id, translation_id, title, position
            "#,
        )
        .bind(translation_id)
        .bind(title)
        .bind(position)
        .fetch_one(&self.pool)
        .await?;
        Ok(section_from_row(&row))
    }

    async fn get_section(&self, id: i64) -> AppResult<Option<TourSection>> {
        let row = sqlx::query(
            "SELECT id, translation_id, title, position FROM tour_sections WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(section_from_row))
    }

    async fn sections_of_translation(&self, translation_id: i64) -> AppResult<Vec<TourSection>> {
        let rows = sqlx::query(
            "SELECT id, translation_id, title, position FROM tour_sections \
             WHERE translation_id = $1 ORDER BY position",
        )
        .bind(translation_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(section_from_row).collect())
    }

    async fn section_count(&self, translation_id: i64) -> AppResult<i64> {
        let row =
            sqlx::query("SELECT COUNT(*) FROM tour_sections WHERE translation_id = $1")
                .bind(translation_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(row.get(0))
    }

    async fn delete_section(&self, id: i64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM tour_sections WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn append_content(
        &self,
        section_id: i64,
        position: i32,
        body: &ContentBody,
    ) -> AppResult<SectionContent> {
        debug!(
            section_id = section_id,
            position = position,
            kind = body.kind(),
            "Appending section content"
        );
        let body_json = serde_json::to_string(body)?;
        let row = sqlx::query(
            r#"
            INSERT INTO tour_section_contents (section_id, position, kind, media_group_id, body)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, section_id, position, body
            "#,
        )
        .bind(section_id)
        .bind(position)
        .bind(body.kind())
        .bind(body.media_group_id())
        .bind(&body_json)
        .fetch_one(&self.pool)
        .await?;
        content_from_row(&row)
    }

    async fn contents_of_section(&self, section_id: i64) -> AppResult<Vec<SectionContent>> {
        let rows = sqlx::query(
            "SELECT id, section_id, position, body FROM tour_section_contents \
             WHERE section_id = $1 ORDER BY position",
        )
        .bind(section_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(content_from_row).collect()
    }

    async fn content_count(&self, section_id: i64) -> AppResult<i64> {
        let row =
            sqlx::query("SELECT COUNT(*) FROM tour_section_contents WHERE section_id = $1")
                .bind(section_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(row.get(0))
    }

    async fn find_media_group(
        &self,
        section_id: i64,
        group_id: &str,
    ) -> AppResult<Option<SectionContent>> {
        let row = sqlx::query(
            "SELECT id, section_id, position, body FROM tour_section_contents \
             WHERE section_id = $1 AND media_group_id = $2",
        )
        .bind(section_id)
        .bind(group_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(content_from_row).transpose()
    }

    async fn update_content_body(&self, content_id: i64, body: &ContentBody) -> AppResult<()> {
        let body_json = serde_json::to_string(body)?;
        let result = sqlx::query("UPDATE tour_section_contents SET body = $1 WHERE id = $2")
            .bind(&body_json)
            .bind(content_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::Database(format!(
                "content row {} not found",
                content_id
            )));
        }
        Ok(())
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
        debug!(
            tour_id = tour_id,
            language = language,
            guests = guests,
            "Creating product"
        );
        let mut tx = self.pool.begin().await?;

        let superseded = sqlx::query(
            "UPDATE products SET available = FALSE \
             WHERE tour_id = $1 AND language = $2 AND guests = $3 AND available = TRUE",
        )
        .bind(tour_id)
        .bind(language)
        .bind(guests)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let row = sqlx::query(
            r#"
            INSERT INTO products
                (tour_id, language, currency, amount_minor, guests, duration_days, title, description)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, tour_id, language, currency, amount_minor, guests, duration_days,
                      title, description, available, created_at
            "#,
        )
        .bind(tour_id)
        .bind(language)
        .bind(currency)
        .bind(amount_minor)
        .bind(guests)
        .bind(duration_days)
        .bind(title)
        .bind(description)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        let product = product_from_row(&row);
        info!(
            product_id = product.id,
            superseded = superseded,
            "Product committed"
        );
        Ok(product)
    }

    async fn get_product(&self, id: i64) -> AppResult<Option<Product>> {
        let row = sqlx::query(
            "SELECT id, tour_id, language, currency, amount_minor, guests, duration_days, \
             title, description, available, created_at FROM products WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(product_from_row))
    }

    async fn available_products(&self, tour_id: i64, language: &str) -> AppResult<Vec<Product>> {
        let rows = sqlx::query(
            "SELECT id, tour_id, language, currency, amount_minor, guests, duration_days, \
             title, description, available, created_at FROM products \
             WHERE tour_id = $1 AND language = $2 AND available = TRUE ORDER BY guests",
        )
        .bind(tour_id)
        .bind(language)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(product_from_row).collect())
    }

    async fn products_of_tour(&self, tour_id: i64) -> AppResult<Vec<Product>> {
        let rows = sqlx::query(
            "SELECT id, tour_id, language, currency, amount_minor, guests, duration_days, \
             title, description, available, created_at FROM products \
             WHERE tour_id = $1 ORDER BY id",
        )
        .bind(tour_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(product_from_row).collect())
    }

    async fn create_invoice(&self, user_id: i64, product: &Product) -> AppResult<Invoice> {
        debug!(user_id = user_id, product_id = product.id, "Creating invoice");
        let row = sqlx::query(
            r#"
            INSERT INTO invoices
                (user_id, product_id, tour_id, language, currency, amount_minor,
                 guests, duration_days, title)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id, user_id, product_id, tour_id, language, currency, amount_minor,
                      guests, duration_days, title, created_at
            "#,
        )
        .bind(user_id)
        .bind(product.id)
        .bind(product.tour_id)
        .bind(&product.language)
        .bind(&product.currency)
        .bind(product.amount_minor)
        .bind(product.guests)
        .bind(product.duration_days)
        .bind(&product.title)
        .fetch_one(&self.pool)
        .await?;
        Ok(invoice_from_row(&row))
    }

    async fn get_invoice(&self, id: i64) -> AppResult<Option<Invoice>> {
        let row = sqlx::query(
            "SELECT id, user_id, product_id, tour_id, language, currency, amount_minor, \
             guests, duration_days, title, created_at FROM invoices WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(invoice_from_row))
    }

    async fn record_payment(&self, invoice_id: i64, charge_id: &str) -> AppResult<bool> {
        let result = sqlx::query(
            "INSERT INTO payments (invoice_id, charge_id) VALUES ($1, $2) \
             ON CONFLICT (charge_id) DO NOTHING",
        )
        .bind(invoice_id)
        .bind(charge_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn extend_subscription(
        &self,
        user_id: i64,
        tour_id: i64,
        days: i32,
    ) -> AppResult<Subscription> {
        debug!(user_id = user_id, tour_id = tour_id, days = days, "Extending subscription");
        let row = sqlx::query(
            r#"
            INSERT INTO subscriptions (user_id, tour_id, expires_at)
            VALUES ($1, $2, NOW() + make_interval(days => $3))
            ON CONFLICT (user_id, tour_id) DO UPDATE
            SET expires_at = GREATEST(subscriptions.expires_at, NOW()) + make_interval(days => $3),
                notified_at = NULL
            RETURNING id, user_id, tour_id, expires_at, notified_at, created_at
            "#,
        )
        .bind(user_id)
        .bind(tour_id)
        .bind(days)
        .fetch_one(&self.pool)
        .await?;
        Ok(subscription_from_row(&row))
    }

    async fn subscription_of(
        &self,
        user_id: i64,
        tour_id: i64,
    ) -> AppResult<Option<Subscription>> {
        let row = sqlx::query(
            "SELECT id, user_id, tour_id, expires_at, notified_at, created_at \
             FROM subscriptions WHERE user_id = $1 AND tour_id = $2",
        )
        .bind(user_id)
        .bind(tour_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(subscription_from_row))
    }

    async fn subscriptions_of_user(&self, user_id: i64) -> AppResult<Vec<Subscription>> {
        let rows = sqlx::query(
            "SELECT id, user_id, tour_id, expires_at, notified_at, created_at \
             FROM subscriptions WHERE user_id = $1 ORDER BY expires_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(subscription_from_row).collect())
    }

    async fn unnotified_subscriptions(&self) -> AppResult<Vec<Subscription>> {
        let rows = sqlx::query(
            "SELECT id, user_id, tour_id, expires_at, notified_at, created_at \
             FROM subscriptions WHERE notified_at IS NULL AND expires_at > NOW() \
             ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(subscription_from_row).collect())
    }

    async fn mark_subscription_notified(&self, subscription_id: i64) -> AppResult<()> {
        sqlx::query("UPDATE subscriptions SET notified_at = NOW() WHERE id = $1")
            .bind(subscription_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for PostgresDb {
    async fn load(&self, user_id: i64, machine: &str) -> AppResult<Option<ConversationRecord>> {
        let row = sqlx::query(
            "SELECT user_id, machine, state, scratch, schema_version \
             FROM conversations WHERE user_id = $1 AND machine = $2",
        )
        .bind(user_id)
        .bind(machine)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|row| ConversationRecord {
            user_id: row.get(0),
            machine: row.get(1),
            state: row.get(2),
            scratch_json: row.get(3),
            schema_version: row.get(4),
        }))
    }

    async fn active_for_user(&self, user_id: i64) -> AppResult<Option<ConversationRecord>> {
        let row = sqlx::query(
            "SELECT user_id, machine, state, scratch, schema_version \
             FROM conversations WHERE user_id = $1 ORDER BY updated_at DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|row| ConversationRecord {
            user_id: row.get(0),
            machine: row.get(1),
            state: row.get(2),
            scratch_json: row.get(3),
            schema_version: row.get(4),
        }))
    }

    async fn save(&self, record: &ConversationRecord) -> AppResult<()> {
        debug!(
            user_id = record.user_id,
            machine = record.machine.as_str(),
            state = record.state.as_str(),
            "Saving conversation"
        );
        sqlx::query(
            r#"
            INSERT INTO conversations (user_id, machine, state, scratch, schema_version, updated_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            ON CONFLICT (user_id, machine) DO UPDATE
            SET state = $3, scratch = $4, schema_version = $5, updated_at = NOW()
            "#,
        )
        .bind(record.user_id)
        .bind(&record.machine)
        .bind(&record.state)
        .bind(&record.scratch_json)
        .bind(record.schema_version)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn clear(&self, user_id: i64, machine: &str) -> AppResult<()> {
        sqlx::query("DELETE FROM conversations WHERE user_id = $1 AND machine = $2")
            .bind(user_id)
            .bind(machine)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
