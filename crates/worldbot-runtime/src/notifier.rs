//! [`InteractionNotifier`] – posts item-use alerts to a Discord webhook.
//!
//! Delivery is best effort: one POST, no retry.  The service spawns each
//! post on its own task so a slow webhook never stalls chat handling.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;
use worldbot_bridge::InteractionNotice;
use worldbot_types::BotError;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct WebhookPayload<'a> {
    content: &'a str,
}

#[derive(Clone)]
pub struct InteractionNotifier {
    client: reqwest::Client,
    webhook_url: String,
    owner_pings: String,
}

impl fmt::Debug for InteractionNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InteractionNotifier")
            .field("webhook_url", &"<redacted>")
            .field("owner_pings", &self.owner_pings)
            .finish()
    }
}

impl InteractionNotifier {
    /// `None` when `webhook_url` is blank, i.e. notifications are off.
    ///
    /// `owner_ids` are Discord mentions such as `<@12345>`; they are pinged
    /// on every alert.
    pub fn new(webhook_url: &str, owner_ids: &[String]) -> Option<Self> {
        let webhook_url = webhook_url.trim();
        if webhook_url.is_empty() {
            return None;
        }
        let client = reqwest::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Some(Self {
            client,
            webhook_url: webhook_url.to_string(),
            owner_pings: owner_ids
                .iter()
                .map(|id| id.trim())
                .filter(|id| !id.is_empty())
                .collect::<Vec<_>>()
                .join(" "),
        })
    }

    /// Message body for `notice`, owner pings first.
    pub fn content(&self, notice: &InteractionNotice, at: DateTime<Utc>) -> String {
        format!("{}\n{}", self.owner_pings, format_alert(notice, at))
            .trim()
            .to_string()
    }

    /// POST one alert.
    ///
    /// # Errors
    ///
    /// [`BotError::Notification`] on transport failure or a non-2xx status.
    pub async fn notify(&self, notice: &InteractionNotice) -> Result<(), BotError> {
        let content = self.content(notice, Utc::now());
        self.client
            .post(&self.webhook_url)
            .json(&WebhookPayload { content: &content })
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| BotError::Notification(e.without_url().to_string()))?;
        debug!(item = %notice.item_id, "interaction alert delivered");
        Ok(())
    }
}

/// The alert text, without pings.
pub fn format_alert(notice: &InteractionNotice, at: DateTime<Utc>) -> String {
    format!(
        ":bell: **Item Interaction Alert** ({} UTC)\n\
         > **Player:** `{}` (ID: `{}`)\n\
         > **Item:** `{}` (ID: `{}`)",
        at.format("%Y-%m-%d %H:%M:%S"),
        notice.sender_name,
        notice.sender_id,
        notice.item_name,
        notice.item_id,
    )
}
