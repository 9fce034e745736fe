//! Progress notifications.
//!
//! Notifications are fire-and-forget from the workflow's point of view: a
//! failing notifier is logged and never changes routing.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use reqwest::blocking::Client;
use serde_json::json;
use tracing::{info, warn};

pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Telegram rejects longer messages.
const TELEGRAM_MAX_CHARS: usize = 4096;

pub trait Notifier {
    fn notify(&self, text: &str) -> Result<()>;
}

/// Send `text`, logging instead of propagating failures.
pub fn notify_best_effort(notifier: &dyn Notifier, text: &str) {
    if let Err(err) = notifier.notify(text) {
        warn!(error = %format!("{err:#}"), "notification failed");
    }
}

/// Writes notifications to the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, text: &str) -> Result<()> {
        info!(message = text, "notification");
        Ok(())
    }
}

/// Telegram bot `sendMessage` notifier.
pub struct TelegramNotifier {
    client: Client,
    endpoint: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(api_base: &str, token: &str, chat_id: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("build telegram client")?;
        Ok(Self {
            client,
            endpoint: format!("{}/bot{token}/sendMessage", api_base.trim_end_matches('/')),
            chat_id: chat_id.into(),
        })
    }
}

impl Notifier for TelegramNotifier {
    fn notify(&self, text: &str) -> Result<()> {
        let text: String = text.chars().take(TELEGRAM_MAX_CHARS).collect();
        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "chat_id": self.chat_id, "text": text }))
            .send()
            // The endpoint embeds the bot token; keep it out of error chains.
            .map_err(|e| anyhow!("telegram request failed: {}", e.without_url()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(anyhow!("telegram returned {status}: {body}"));
        }
        Ok(())
    }
}
