//! Bus activity log
//!
//! Every request attempt, reply and listen window the request engine
//! performs is appended here. Steps and tests use it to see how a
//! result was obtained.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;

/// One entry of bus activity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BusEvent {
    Request {
        pgn: u32,
        destination: u8,
        attempt: u32,
    },
    Response {
        pgn: u32,
        source: u8,
        length: usize,
    },
    NoResponse {
        pgn: u32,
        destination: u8,
        attempt: u32,
    },
    Listen {
        window_ms: u64,
        packets: usize,
    },
    TransportFault {
        pgn: u32,
        message: String,
    },
    /// A module other than the addressed one answered a direct request
    ForeignResponse {
        pgn: u32,
        destination: u8,
        source: u8,
    },
    Imposter,
}

/// Shared, append-only bus event log
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<BusEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: BusEvent) {
        self.events.lock().push(event);
    }

    pub fn listen(&self, window: Duration, packets: usize) {
        self.record(BusEvent::Listen {
            window_ms: window.as_millis() as u64,
            packets,
        });
    }

    pub fn snapshot(&self) -> Vec<BusEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Request attempts sent for `pgn` to `destination`
    pub fn request_count(&self, pgn: u32, destination: u8) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| {
                matches!(e, BusEvent::Request { pgn: p, destination: d, .. }
                    if *p == pgn && *d == destination)
            })
            .count()
    }

    /// Imposter warnings raised so far
    pub fn imposter_count(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| matches!(e, BusEvent::Imposter))
            .count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}
