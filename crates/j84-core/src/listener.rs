//! Results listener seam
//!
//! Steps report through three separate channels: structured outcomes,
//! free-text progress messages and the results text stream (summary
//! tables). Outcomes are never echoed into the results stream.

use parking_lot::Mutex;

use crate::models::{Outcome, Severity};

/// Out-of-band message that needs operator attention
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrgentMessage {
    pub message: String,
    pub title: String,
    pub severity: Severity,
    pub detail: String,
}

/// Receiver for everything a step reports
pub trait ResultsListener: Send + Sync {
    /// Structured verdict
    fn on_outcome(&self, outcome: Outcome);

    /// Urgent operator message (e.g. a second device on the tool address)
    fn on_urgent_message(&self, message: &str, title: &str, severity: Severity, detail: &str);

    /// Free-text progress message
    fn on_progress(&self, message: &str);

    /// Text appended to the results stream
    fn on_result(&self, text: &str);
}

/// Listener that keeps everything in memory
#[derive(Debug, Default)]
pub struct RecordingListener {
    outcomes: Mutex<Vec<Outcome>>,
    urgent: Mutex<Vec<UrgentMessage>>,
    messages: Mutex<Vec<String>>,
    results: Mutex<Vec<String>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outcomes(&self) -> Vec<Outcome> {
        self.outcomes.lock().clone()
    }

    pub fn outcomes_with(&self, severity: Severity) -> Vec<Outcome> {
        self.outcomes
            .lock()
            .iter()
            .filter(|o| o.severity == severity)
            .cloned()
            .collect()
    }

    pub fn urgent_messages(&self) -> Vec<UrgentMessage> {
        self.urgent.lock().clone()
    }

    /// Progress messages joined by newlines
    pub fn messages(&self) -> String {
        self.messages.lock().join("\n")
    }

    /// Results stream joined by newlines
    pub fn results(&self) -> String {
        self.results.lock().join("\n")
    }
}

impl ResultsListener for RecordingListener {
    fn on_outcome(&self, outcome: Outcome) {
        self.outcomes.lock().push(outcome);
    }

    fn on_urgent_message(&self, message: &str, title: &str, severity: Severity, detail: &str) {
        self.urgent.lock().push(UrgentMessage {
            message: message.to_string(),
            title: title.to_string(),
            severity,
            detail: detail.to_string(),
        });
    }

    fn on_progress(&self, message: &str) {
        self.messages.lock().push(message.to_string());
    }

    fn on_result(&self, text: &str) {
        self.results.lock().push(text.to_string());
    }
}
