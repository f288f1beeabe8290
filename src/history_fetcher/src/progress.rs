//! Observers of a scheduler run.

use std::sync::Mutex;

use tracing::{info, warn};

/// Receives progress notifications. Purely observational: implementations must not
/// block and cannot influence the run.
pub trait ProgressListener: Send + Sync {
    /// Share of requests submitted so far, `0.0..=100.0`.
    fn on_progress_percent(&self, percent: f64);

    /// Free-form status such as pacing waits or request corrections.
    fn on_information_message(&self, message: &str);

    /// A request failed at the provider.
    fn on_request_error(&self, symbol: &str, code: i32, message: &str);
}

/// Forwards every notification to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogListener;

impl ProgressListener for LogListener {
    fn on_progress_percent(&self, percent: f64) {
        info!(percent, "progress");
    }

    fn on_information_message(&self, message: &str) {
        info!("{message}");
    }

    fn on_request_error(&self, symbol: &str, code: i32, message: &str) {
        warn!(%symbol, code, "{message}");
    }
}

/// One recorded notification.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Percent(f64),
    Info(String),
    Error {
        symbol: String,
        code: i32,
        message: String,
    },
}

/// Keeps every notification in memory, for tests and post-run reports.
#[derive(Debug, Default)]
pub struct RecordingListener {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the notifications received so far.
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Information messages only.
    pub fn messages(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::Info(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: ProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl ProgressListener for RecordingListener {
    fn on_progress_percent(&self, percent: f64) {
        self.push(ProgressEvent::Percent(percent));
    }

    fn on_information_message(&self, message: &str) {
        self.push(ProgressEvent::Info(message.to_string()));
    }

    fn on_request_error(&self, symbol: &str, code: i32, message: &str) {
        self.push(ProgressEvent::Error {
            symbol: symbol.to_string(),
            code,
            message: message.to_string(),
        });
    }
}
