use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use tracing::info;

use super::Notification;
use super::error::DeliveryError;

/// Final destination of a notification (push gateway, SMS bridge, log, ...).
///
/// Called only from the [`DeliveryWorker`](super::DeliveryWorker), one
/// notification at a time.
pub trait NotificationSink: Send + Sync + 'static {
    /// Hands over one notification. An `Err` makes the worker retry it.
    fn deliver(
        &self,
        notification: &Notification,
    ) -> impl Future<Output = Result<(), DeliveryError>> + Send;
}

/// Writes each notification to the structured log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl NotificationSink for LogSink {
    async fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError> {
        info!(
            case = %notification.event.case_id,
            sequence = notification.event.sequence,
            event = %notification.event.event_type(),
            status = %notification.case_status,
            recipients = ?notification.recipients,
            "notification"
        );
        Ok(())
    }
}

/// POSTs each notification as JSON to a webhook.
///
/// HTTP 429 maps to [`DeliveryError::RateLimited`], any other non-2xx status to
/// [`DeliveryError::Rejected`].
pub struct WebhookSink {
    client: Client,
    url: String,
}

impl WebhookSink {
    /// Builds the HTTP client (5s connect timeout, 15s per request).
    pub fn new(url: String) -> Result<Self, DeliveryError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self { client, url })
    }
}

impl NotificationSink for WebhookSink {
    async fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError> {
        let response = self.client.post(&self.url).json(notification).send().await?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs.saturating_mul(1000))
                .unwrap_or(1000);
            return Err(DeliveryError::RateLimited {
                retry_after_ms: retry_after,
            });
        }

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        Ok(())
    }
}
