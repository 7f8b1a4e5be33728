//! Alert publisher adapters.
//!
//! - `ChannelAlertPublisher` - bounded queue drained by a background worker
//! - `RecordingAlertPublisher` - captures alerts for test assertions
//! - `TracingAlertSink` - delivers drained alerts to the log

mod channel;
mod recording;

pub use channel::{
    spawn_alert_worker, AlertSink, ChannelAlertPublisher, TracingAlertSink, DEFAULT_ALERT_QUEUE,
};
pub use recording::RecordingAlertPublisher;
