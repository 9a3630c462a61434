//! Process entry point: configuration, storage, the dispatch engine and the
//! platform adapter get wired together here.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use teloxide::Bot;
use tokio::sync::mpsc;
use tracing::{info, warn};

use tourguide_bot::bot::build_registry;
use tourguide_bot::config::AppConfig;
use tourguide_bot::currency::CurrencyCache;
use tourguide_bot::db::{self, PostgresDb};
use tourguide_bot::engine::{Dispatcher, EventRunner, Services};
use tourguide_bot::gateway::{MessagingGateway, TelegramGateway};
use tourguide_bot::jobs::JobRunner;
use tourguide_bot::{localization, notifier, telegram};

/// Structured logging to stderr. `LOG_FORMAT=json` switches to JSON lines
/// for log shippers; the default stays readable on a terminal.
fn init_tracing() -> Result<()> {
    use tracing_subscriber::prelude::*;

    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("tourguide_bot=info".parse()?)
        .add_directive("sqlx=warn".parse()?)
        .add_directive("teloxide=warn".parse()?);

    if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing()?;

    let config = AppConfig::from_env()?;
    config.validate()?;
    info!("{}", config.summary());

    localization::init_localization()?;

    info!("Connecting to database");
    let mut pool_options = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(config.database.connect_timeout_secs));
    if let Some(secs) = config.database.max_lifetime_secs {
        pool_options = pool_options.max_lifetime(Duration::from_secs(secs));
    }
    if let Some(secs) = config.database.idle_timeout_secs {
        pool_options = pool_options.idle_timeout(Duration::from_secs(secs));
    }
    let pool = pool_options.connect(&config.database.url).await?;
    db::init_database_schema(&pool).await?;
    let store = Arc::new(PostgresDb::new(pool));

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;
    let bot = Bot::with_client(config.bot.token.clone(), client);
    let gateway: Arc<dyn MessagingGateway> = Arc::new(TelegramGateway::new(
        bot.clone(),
        config.payment.provider_token.clone(),
    ));

    let (intake_tx, intake_rx) = mpsc::unbounded_channel();

    let jobs = JobRunner::new(
        Arc::clone(&gateway),
        intake_tx.clone(),
        config.transcode.clone(),
    );
    let currencies = Arc::new(CurrencyCache::new(&config.currency)?);

    let notify_interval_secs = config.payment.notify_interval_secs;
    let services = Arc::new(Services {
        gateway: Arc::clone(&gateway),
        content: store.clone(),
        currencies,
        jobs,
        config,
        content_lock: tokio::sync::Mutex::new(()),
    });

    let dispatcher = Arc::new(Dispatcher::new(build_registry(), store.clone(), services));
    tokio::spawn(EventRunner::new(dispatcher).run(intake_rx));

    if let Err(err) = telegram::set_command_menu(&bot).await {
        warn!(error = %err, "Failed to register the command menu");
    }
    let _notifier = notifier::start(store.clone(), Arc::clone(&gateway), notify_interval_secs);

    telegram::run_polling(bot, intake_tx, store).await;

    info!("Shutting down");
    Ok(())
}
