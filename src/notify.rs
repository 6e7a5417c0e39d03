//! Status notifications.
//!
//! A long-running sync posts progress messages to an optional webhook so
//! an operator can watch it from elsewhere. Notification failures are
//! logged and swallowed; they must never abort the sync loop.

use tracing::warn;

/// Receiver of human-readable status messages.
pub trait Notifier: Send + Sync {
    /// Deliver one message. Infallible by contract: implementations
    /// handle their own failures.
    fn notify(&self, message: &str) -> impl std::future::Future<Output = ()> + Send;
}

/// POSTs `{timestamp, message}` JSON to a configured webhook.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    /// Create a notifier for the given webhook URL.
    #[must_use]
    pub fn new(url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.to_string(),
        }
    }
}

impl Notifier for WebhookNotifier {
    async fn notify(&self, message: &str) {
        let payload = serde_json::json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "message": message,
        });

        let result = self
            .client
            .post(&self.url)
            .json(&payload)
            .timeout(std::time::Duration::from_secs(5))
            .send()
            .await;

        match result {
            Ok(response) if !response.status().is_success() => {
                warn!("status notification returned {}", response.status());
            }
            Ok(_) => {}
            Err(e) => warn!("couldn't deliver status notification: {e}"),
        }
    }
}

/// Discards every message. Used when no webhook is configured.
pub struct NullNotifier;

impl Notifier for NullNotifier {
    async fn notify(&self, _message: &str) {}
}
