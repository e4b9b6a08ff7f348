//! Notification dispatch
//!
//! Fire-and-forget: a notifier never blocks or fails trade processing.

mod types;

pub use types::{EventType, Notification, Severity};

use std::time::Duration;
use tokio::sync::mpsc;

/// Accepts events for asynchronous delivery
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Writes every event to the log
#[derive(Debug, Default, Clone)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: Notification) {
        let event = format!("{:?}", notification.event_type);
        match notification.severity {
            Severity::Critical => {
                tracing::error!(%event, payload = %notification.payload, "CRITICAL alert")
            }
            Severity::Warning => tracing::warn!(%event, payload = %notification.payload, "Alert"),
            Severity::Info => tracing::info!(%event, payload = %notification.payload, "Event"),
        }
    }
}

/// Forwards events to an in-process consumer
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notification: Notification) {
        if self.tx.send(notification).is_err() {
            tracing::debug!("Notification consumer gone, dropping event");
        }
    }
}

/// POSTs events as JSON to a webhook, logging them as well
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    log: TracingNotifier,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
            log: TracingNotifier,
        })
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, notification: Notification) {
        self.log.notify(notification.clone());

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("No runtime for webhook delivery");
            return;
        };
        let client = self.client.clone();
        let url = self.url.clone();
        runtime.spawn(async move {
            let result = client
                .post(&url)
                .json(&notification)
                .send()
                .await
                .and_then(|r| r.error_for_status());
            if let Err(e) = result {
                tracing::warn!(error = %e, event = ?notification.event_type, "Webhook delivery failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_channel_notifier_delivers() {
        let (notifier, mut rx) = ChannelNotifier::new();
        notifier.notify(Notification::critical(
            EventType::TradeFailed,
            json!({"trade_id": "abc"}),
        ));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.event_type, EventType::TradeFailed);
        assert_eq!(received.severity, Severity::Critical);
        assert_eq!(received.payload["trade_id"], "abc");
    }

    #[test]
    fn test_channel_notifier_survives_dropped_consumer() {
        let (notifier, rx) = ChannelNotifier::new();
        drop(rx);
        notifier.notify(Notification::info(EventType::TradeOpened, json!({})));
    }

    #[tokio::test]
    async fn test_webhook_failure_is_not_fatal() {
        // Nothing listens on port 9
        let notifier = WebhookNotifier::new("http://127.0.0.1:9/hook").unwrap();
        notifier.notify(Notification::warning(EventType::StaleFeed, json!({})));
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[test]
    fn test_severity_order() {
        assert!(Severity::Critical > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
        let json = serde_json::to_string(&EventType::ExitCoverageMissing).unwrap();
        assert_eq!(json, "\"exit_coverage_missing\"");
    }
}
