//! Queue-backed alert publishing.
//!
//! The request path calls [`ChannelAlertPublisher::publish`], which only
//! does a `try_send`. A worker spawned with [`spawn_alert_worker`] drains
//! the queue into an [`AlertSink`].

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::ports::{AbuseAlert, AlertPublisher};

/// Default queue depth for [`ChannelAlertPublisher::channel`] callers.
pub const DEFAULT_ALERT_QUEUE: usize = 256;

/// Publisher that enqueues alerts on a bounded channel.
///
/// A full or closed queue drops the alert with a warning.
#[derive(Debug, Clone)]
pub struct ChannelAlertPublisher {
    tx: mpsc::Sender<AbuseAlert>,
}

impl ChannelAlertPublisher {
    /// Creates a publisher and the receiving end of its queue.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<AbuseAlert>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl AlertPublisher for ChannelAlertPublisher {
    fn publish(&self, alert: AbuseAlert) {
        if let Err(e) = self.tx.try_send(alert) {
            let (reason, alert) = match e {
                mpsc::error::TrySendError::Full(a) => ("queue full", a),
                mpsc::error::TrySendError::Closed(a) => ("queue closed", a),
            };
            tracing::warn!(kind = alert.kind(), reason, "Dropping abuse alert");
        }
    }
}

/// Destination for drained alerts (webhook, SIEM, log).
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn deliver(&self, alert: AbuseAlert);

    fn name(&self) -> &'static str;
}

/// Sink that writes each alert as a structured warning.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAlertSink;

#[async_trait]
impl AlertSink for TracingAlertSink {
    async fn deliver(&self, alert: AbuseAlert) {
        let payload = serde_json::to_string(&alert).unwrap_or_default();
        tracing::warn!(kind = alert.kind(), payload = %payload, "Abuse alert");
    }

    fn name(&self) -> &'static str {
        "TracingAlertSink"
    }
}

/// Drains `rx` into `sink` until every publisher is dropped.
pub fn spawn_alert_worker(
    mut rx: mpsc::Receiver<AbuseAlert>,
    sink: Arc<dyn AlertSink>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::debug!(sink = sink.name(), "Alert worker started");
        while let Some(alert) = rx.recv().await {
            sink.deliver(alert).await;
        }
        tracing::debug!(sink = sink.name(), "Alert worker stopped");
    })
}
