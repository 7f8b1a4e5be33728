//! Alert publisher that keeps every alert in memory.
//!
//! Intended for tests that assert which escalations fired.

use std::sync::Mutex;

use crate::ports::{AbuseAlert, AlertPublisher};

/// Captures published alerts for assertions.
#[derive(Debug, Default)]
pub struct RecordingAlertPublisher {
    published: Mutex<Vec<AbuseAlert>>,
}

impl RecordingAlertPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all published alerts.
    pub fn published_alerts(&self) -> Vec<AbuseAlert> {
        self.published
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn alert_count(&self) -> usize {
        self.published_alerts().len()
    }

    /// Checks if an alert of `kind` was published.
    pub fn has_alert(&self, kind: &str) -> bool {
        self.published_alerts().iter().any(|a| a.kind() == kind)
    }
}

impl AlertPublisher for RecordingAlertPublisher {
    fn publish(&self, alert: AbuseAlert) {
        self.published
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(alert);
    }
}
