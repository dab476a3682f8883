//! Telegram bot notifications
//!
//! Status messages for the start and end of a run. Delivery is best effort:
//! the orchestrator logs what comes back and never branches on it.

use anyhow::{Context, Result};
use reqwest::blocking::{Client, Request};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::NotificationConfig;
use crate::utils::timestamp::message_time;

/// Something that can deliver a text message
#[cfg_attr(test, mockall::automock)]
pub trait Notifier {
    /// Send `message`. Returns the HTTP status of the delivery attempt, or
    /// `None` when no endpoint is configured and nothing was sent.
    fn notify(&self, message: &str) -> Result<Option<u16>>;
}

/// `<time>: Backing Service for <server> has started`
pub fn started_message(server: &str) -> String {
    format!("{}: Backing Service for {} has started", message_time(), server)
}

/// `<time>: Backing Service for <server> has completed`
pub fn completed_message(server: &str) -> String {
    format!("{}: Backing Service for {} has completed", message_time(), server)
}

/// Sends messages through the Telegram bot API
pub struct TelegramNotifier {
    config: NotificationConfig,
    client: Client,
}

impl TelegramNotifier {
    pub fn new(config: NotificationConfig, timeout: Duration) -> Result<Self> {
        if config.accept_invalid_certs {
            warn!("TLS certificate validation is disabled for notifications");
        }

        let client = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { config, client })
    }

    pub fn is_enabled(&self) -> bool {
        self.config.is_configured()
    }

    /// `POST <api_base>/bot<id>/sendMessage?chat_id=<chat>&text=<message>`
    fn build_request(&self, message: &str) -> Result<Request> {
        let url = format!(
            "{}/bot{}/sendMessage",
            self.config.api_base.trim_end_matches('/'),
            self.config.telegram_bot_id
        );

        self.client
            .post(url)
            .query(&[
                ("chat_id", self.config.telegram_chat_id.as_str()),
                ("text", message),
            ])
            .build()
            .context("Failed to build notification request")
    }
}

impl Notifier for TelegramNotifier {
    fn notify(&self, message: &str) -> Result<Option<u16>> {
        if !self.is_enabled() {
            info!("Notification not sent (no bot configured): {}", message);
            return Ok(None);
        }

        let request = self.build_request(message)?;
        // the URL carries the bot token, keep it out of errors and logs
        let response = self
            .client
            .execute(request)
            .map_err(|e| anyhow::anyhow!("Failed to send notification: {}", e.without_url()))?;

        let status = response.status();
        if status.is_success() {
            debug!("Notification delivered ({})", status);
        } else {
            let body = response.text().unwrap_or_default();
            warn!("Notification rejected with status {}: {}", status, body);
        }

        Ok(Some(status.as_u16()))
    }
}
