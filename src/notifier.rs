//! Periodic subscription announcer.
//!
//! Payment handling thanks the payer inline and then flips the
//! subscription's notified flag. When the process dies between recording a
//! payment and sending that message, the flag stays unset; this task sweeps
//! such subscriptions up and delivers the announcement late rather than
//! never.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::bot::browse::pick_title;
use crate::db::ContentStore;
use crate::errors::AppResult;
use crate::gateway::MessagingGateway;
use crate::localization::t_args_lang;

/// Start the periodic scan. Runs until the process exits.
pub fn start(
    content: Arc<dyn ContentStore>,
    gateway: Arc<dyn MessagingGateway>,
    interval_secs: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
        loop {
            interval.tick().await;
            match notify_pending(content.as_ref(), gateway.as_ref()).await {
                Ok(0) => {}
                Ok(sent) => info!(sent = sent, "Announced pending subscriptions"),
                Err(err) => error!(error = %err, "Subscription scan failed"),
            }
        }
    })
}

/// One scan pass: announce every active subscription nobody told the guest
/// about yet. Returns how many announcements went out.
pub async fn notify_pending(
    content: &dyn ContentStore,
    gateway: &dyn MessagingGateway,
) -> AppResult<usize> {
    let pending = content.unnotified_subscriptions().await?;
    let mut sent = 0;
    for subscription in pending {
        let translations = content.translations_of_tour(subscription.tour_id).await?;
        let title = match pick_title(&translations, None) {
            Some(title) => title,
            None => {
                // Tour went away mid-delete; the cascade will collect the row.
                debug!(
                    subscription_id = subscription.id,
                    tour_id = subscription.tour_id,
                    "Skipping subscription without a tour"
                );
                continue;
            }
        };
        // No stored language for the guest, so announcements use the
        // default locale.
        let expires = subscription.expires_at.format("%Y-%m-%d").to_string();
        let text = t_args_lang(
            "subscription-ready",
            &[("title", title.as_str()), ("expires", expires.as_str())],
            None,
        );
        gateway.send_text(subscription.user_id, &text).await?;
        content.mark_subscription_notified(subscription.id).await?;
        sent += 1;
    }
    Ok(sent)
}
