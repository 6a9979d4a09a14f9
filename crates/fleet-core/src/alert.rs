//! Fire-and-forget alert sink.
//!
//! The engine pushes operator-facing alerts here; delivery and fan-out to
//! email/webhook subscribers is an external collaborator's responsibility.
//! `publish` must never block reconciliation.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

use crate::time::epoch_secs;

/// Alert categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertTopic {
    /// A resize action was taken (or failed).
    Resize,
    /// A pool observation could not be fetched.
    PoolFetch,
    /// A service state change was recorded.
    ServiceState,
    /// Repeated failure to terminate a scheduled machine.
    Termination,
}

/// A single operator-facing alert.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Alert {
    pub topic: AlertTopic,
    pub message: String,
    /// Unix timestamp (seconds) when the alert was raised.
    pub timestamp: u64,
}

impl Alert {
    pub fn new(topic: AlertTopic, message: impl Into<String>) -> Self {
        Self {
            topic,
            message: message.into(),
            timestamp: epoch_secs(),
        }
    }
}

/// Sink the engine publishes alerts to.
pub trait AlertSink: Send + Sync {
    fn publish(&self, alert: Alert);
}

/// Sink that writes alerts to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl AlertSink for LogSink {
    fn publish(&self, alert: Alert) {
        warn!(topic = ?alert.topic, message = %alert.message, "pool alert");
    }
}

/// Sink that forwards alerts onto an unbounded channel; a slow subscriber
/// never backs up reconciliation.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Alert>,
}

impl ChannelSink {
    /// Create a sink and the receiving end for subscribers.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Alert>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl AlertSink for ChannelSink {
    fn publish(&self, alert: Alert) {
        // A dropped receiver just discards alerts.
        let _ = self.tx.send(alert);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_sink_delivers_alerts() {
        let (sink, mut rx) = ChannelSink::new();
        sink.publish(Alert::new(AlertTopic::Resize, "scaled out by 2"));

        let alert = rx.try_recv().unwrap();
        assert_eq!(alert.topic, AlertTopic::Resize);
        assert_eq!(alert.message, "scaled out by 2");
        assert!(alert.timestamp > 0);
    }

    #[test]
    fn channel_sink_survives_dropped_receiver() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        // Must not panic or block.
        sink.publish(Alert::new(AlertTopic::PoolFetch, "listing failed"));
    }

    #[test]
    fn topic_serialization_is_screaming_snake() {
        let json = serde_json::to_string(&AlertTopic::PoolFetch).unwrap();
        assert_eq!(json, "\"POOL_FETCH\"");
    }
}
