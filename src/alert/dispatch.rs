//! Best-effort notification delivery.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;

use super::message;
use super::predicate::Alert;

/// Default bound on one send, including connection setup.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Default Telegram Bot API endpoint.
pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Errors from notification delivery.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Notification request failed: {0}")]
    Request(String),
    #[error("Notification rejected with HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Notification timed out after {0:?}")]
    Timeout(Duration),
    #[error("Notification channel disabled")]
    Disabled,
}

/// A text notification transport.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one message.
    async fn send(&self, text: &str) -> Result<(), NotifyError>;
}

/// Sends messages through the Telegram Bot API.
#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    client: Client,
    url: String,
    chat_id: String,
}

impl TelegramNotifier {
    /// Create a notifier for `chat_id` using `token` against `api_base`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        api_base: &str,
        token: &str,
        chat_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Request(e.to_string()))?;

        Ok(Self {
            client,
            url: format!("{}/bot{token}/sendMessage", api_base.trim_end_matches('/')),
            chat_id: chat_id.into(),
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        let body = serde_json::json!({
            "chat_id": self.chat_id,
            "text": text,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                // Strip the URL: it embeds the bot token.
                let e = e.without_url();
                if e.is_timeout() {
                    NotifyError::Request(format!("timed out: {e}"))
                } else {
                    NotifyError::Request(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(NotifyError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

/// Notifier for a channel without credentials. Every send fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledNotifier;

#[async_trait]
impl Notifier for DisabledNotifier {
    async fn send(&self, _text: &str) -> Result<(), NotifyError> {
        Err(NotifyError::Disabled)
    }
}

/// Formats alerts and sends them through a [`Notifier`].
///
/// Sends are bounded by a timeout and never retried.
#[derive(Clone)]
pub struct AlertDispatcher {
    notifier: Arc<dyn Notifier>,
    timeout: Duration,
    label: String,
}

impl std::fmt::Debug for AlertDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertDispatcher")
            .field("label", &self.label)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl AlertDispatcher {
    /// Create a dispatcher named `label` for log output.
    #[must_use]
    pub fn new(label: impl Into<String>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            notifier,
            timeout: DEFAULT_SEND_TIMEOUT,
            label: label.into(),
        }
    }

    /// Set the send timeout (builder pattern).
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Channel label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Send raw text. Returns `true` on delivery.
    pub async fn send_text(&self, text: &str) -> bool {
        let result = match tokio::time::timeout(self.timeout, self.notifier.send(text)).await {
            Ok(result) => result,
            Err(_) => Err(NotifyError::Timeout(self.timeout)),
        };

        match result {
            Ok(()) => {
                tracing::debug!(channel = %self.label, "Notification delivered");
                true
            }
            Err(NotifyError::Disabled) => {
                tracing::debug!(channel = %self.label, "Notification channel disabled, message dropped");
                false
            }
            Err(e) => {
                tracing::warn!(channel = %self.label, error = %e, "Notification failed");
                false
            }
        }
    }

    /// Render and send an alert. Returns `true` on delivery.
    pub async fn dispatch(&self, alert: &Alert) -> bool {
        let text = message::render(alert);
        let sent = self.send_text(&text).await;
        tracing::info!(
            channel = %self.label,
            category = %alert.category,
            key = %alert.key,
            sent,
            "Alert dispatched"
        );
        sent
    }
}
