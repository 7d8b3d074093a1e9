//! # Alert delivery
//!
//! Every alert is written to the log. When `DISCORD_WEBHOOK_URL` is set the
//! alert is also posted to that webhook as a single embed.
//!
//! ## Discord Embed Structure
//!
//! - **Title**: "Tickets available: {film}"
//! - **Description**: the full alert body
//! - **URL**: the booking page that was checked
//! - **Fields**: film, venue, date, time, then the listing or showtimes found
//! - **Timestamp**: when the result was produced
//!
//! Discord caps embed field values at 1024 characters, so long showtime
//! lists are truncated.

use anyhow::Result;
use chrono::{DateTime, Utc};
use reqwest::Client;
use tracing::{error, info, warn};

use crate::alert::Alert;
use crate::models::{DiscordEmbed, DiscordField, DiscordMessage};

const FIELD_LIMIT: usize = 1024;

/// Sends alerts to the log and, optionally, a Discord channel.
#[derive(Clone)]
pub struct Notifier {
    client: Client,
    /// `None` disables the webhook; alerts are still logged.
    webhook_url: Option<String>,
}

impl Notifier {
    pub fn new(webhook_url: Option<String>) -> Self {
        if webhook_url.is_none() {
            warn!("DISCORD_WEBHOOK_URL not set - alerts will only be logged");
        }
        Self {
            client: Client::new(),
            webhook_url,
        }
    }

    pub fn from_env() -> Self {
        Self::new(std::env::var("DISCORD_WEBHOOK_URL").ok().filter(|url| !url.is_empty()))
    }

    /// Log the alert and post it to the webhook if one is configured.
    ///
    /// A webhook that answers with an error status is logged, not returned:
    /// the alert has already reached the log.
    pub async fn send(&self, alert: &Alert, checked_at: DateTime<Utc>) -> Result<()> {
        info!("{}\n{}", alert.title, alert.body);

        let Some(webhook_url) = &self.webhook_url else {
            return Ok(());
        };
        let message = embed(alert, checked_at);
        let response = self.client.post(webhook_url).json(&message).send().await?;

        if response.status().is_success() {
            info!("Discord notification sent for {}", alert.url);
        } else {
            error!("Failed to send Discord notification: {}", response.status());
        }
        Ok(())
    }
}

fn truncate(value: &str) -> String {
    if value.chars().count() <= FIELD_LIMIT {
        return value.to_string();
    }
    let mut out: String = value.chars().take(FIELD_LIMIT - 1).collect();
    out.push('…');
    out
}

pub fn embed(alert: &Alert, checked_at: DateTime<Utc>) -> DiscordMessage {
    let fields = alert
        .fields
        .iter()
        .map(|(name, value)| DiscordField {
            name: name.clone(),
            value: truncate(value),
            inline: !value.contains('\n'),
        })
        .collect();

    DiscordMessage {
        embeds: vec![DiscordEmbed {
            title: alert.title.clone(),
            description: format!("[Book now]({})", alert.url),
            url: alert.url.clone(),
            color: 0x0057_F287, // Discord green
            timestamp: checked_at.to_rfc3339(),
            fields,
        }],
    }
}
