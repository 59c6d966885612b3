//! Request engine
//!
//! Sits between the compliance steps and a [`TransportAdapter`]. Applies
//! the retry policy, separates replies of the addressed module from
//! foreign responders, tags packet origin and records every attempt in
//! the [`EventLog`].

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::{RequestPolicyConfig, TimingConfig};
use crate::events::{BusEvent, EventLog};
use crate::j1939::{pgn_display, Packet, PacketOrigin};
use crate::transport::{TransportAdapter, TransportError};

/// Per-PGN request behaviour
#[derive(Debug, Clone)]
pub struct RequestPolicy {
    retry_pgns: HashSet<u32>,
    multi_frame_pgns: HashSet<u32>,
}

impl RequestPolicy {
    pub fn from_config(config: &RequestPolicyConfig) -> Self {
        Self {
            retry_pgns: config.retry_pgns.iter().copied().collect(),
            multi_frame_pgns: config.multi_frame_pgns.iter().copied().collect(),
        }
    }

    /// A silent first attempt is re-issued once
    pub fn allows_retry(&self, pgn: u32) -> bool {
        self.retry_pgns.contains(&pgn)
    }

    /// Several replies from the addressed module form one answer
    pub fn allows_multi_frame(&self, pgn: u32) -> bool {
        self.multi_frame_pgns.contains(&pgn)
    }
}

impl Default for RequestPolicy {
    fn default() -> Self {
        Self::from_config(&RequestPolicyConfig::default())
    }
}

/// Outcome of a destination-specific request
#[derive(Debug, Clone)]
pub struct RequestResult {
    pub pgn: u32,
    pub destination: u8,
    /// Replies from the addressed module, in arrival order
    pub packets: Vec<Packet>,
    /// Request attempts issued (1 or 2)
    pub attempts: u32,
    /// Replies to the same PGN from other sources
    pub foreign: Vec<Packet>,
    /// Transport failure of the last attempt
    pub fault: Option<TransportError>,
}

impl RequestResult {
    /// No reply from the addressed module
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// A reply was only obtained on the second attempt
    pub fn retry_used(&self) -> bool {
        self.attempts > 1 && !self.packets.is_empty()
    }

    /// Latest reply from the addressed module
    pub fn packet(&self) -> Option<&Packet> {
        self.packets.last()
    }

    /// Replies beyond the first when the PGN is not multi-frame
    pub fn has_duplicates(&self) -> bool {
        self.packets.len() > 1
    }
}

/// A reply to a direct request that came from another module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignResponse {
    pub pgn: u32,
    pub destination: u8,
    pub source: u8,
}

/// Issues requests on behalf of the compliance steps
pub struct RequestEngine {
    transport: Arc<dyn TransportAdapter>,
    policy: RequestPolicy,
    timing: TimingConfig,
    events: EventLog,
    /// A reply claimed the tool's own source address
    tool_address_reply: AtomicBool,
    /// Foreign responders not yet taken by a step
    foreign: Mutex<Vec<ForeignResponse>>,
}

impl RequestEngine {
    pub fn new(transport: Arc<dyn TransportAdapter>, policy: RequestPolicy, timing: TimingConfig) -> Self {
        Self {
            transport,
            policy,
            timing,
            events: EventLog::new(),
            tool_address_reply: AtomicBool::new(false),
            foreign: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn timing(&self) -> &TimingConfig {
        &self.timing
    }

    pub fn policy(&self) -> &RequestPolicy {
        &self.policy
    }

    pub fn tool_address(&self) -> u8 {
        self.transport.tool_address()
    }

    pub fn bus_time(&self) -> Duration {
        self.transport.bus_time()
    }

    pub async fn is_connected(&self) -> bool {
        self.transport.is_connected().await
    }

    /// Request `pgn` from `destination`, retrying once for PGNs in the
    /// retry set when the first attempt gets no reply
    pub async fn request_direct(&self, pgn: u32, destination: u8) -> RequestResult {
        let max_attempts = if self.policy.allows_retry(pgn) { 2 } else { 1 };
        let mut result = RequestResult {
            pgn,
            destination,
            packets: Vec::new(),
            attempts: 0,
            foreign: Vec::new(),
            fault: None,
        };

        while result.attempts < max_attempts {
            result.attempts += 1;
            self.events.record(BusEvent::Request {
                pgn,
                destination,
                attempt: result.attempts,
            });
            debug!(
                pgn = %pgn_display(pgn),
                destination,
                attempt = result.attempts,
                "Direct request"
            );

            match self
                .transport
                .request_direct(pgn, destination, self.timing.response_timeout())
                .await
            {
                Ok(replies) => {
                    result.fault = None;
                    for packet in replies {
                        let packet = packet.with_origin(PacketOrigin::DirectRequest);
                        if packet.source == destination {
                            self.events.record(BusEvent::Response {
                                pgn,
                                source: packet.source,
                                length: packet.len(),
                            });
                            result.packets.push(packet);
                        } else {
                            warn!(
                                pgn = %pgn_display(pgn),
                                destination,
                                source = packet.source,
                                "Reply from unexpected source"
                            );
                            if packet.source == self.tool_address() {
                                self.tool_address_reply.store(true, Ordering::SeqCst);
                            } else {
                                self.events.record(BusEvent::ForeignResponse {
                                    pgn,
                                    destination,
                                    source: packet.source,
                                });
                                self.foreign.lock().push(ForeignResponse {
                                    pgn,
                                    destination,
                                    source: packet.source,
                                });
                            }
                            result.foreign.push(packet);
                        }
                    }
                }
                Err(e) => {
                    warn!(pgn = %pgn_display(pgn), destination, error = %e, "Transport fault");
                    self.events.record(BusEvent::TransportFault {
                        pgn,
                        message: e.to_string(),
                    });
                    result.fault = Some(e);
                }
            }

            if !result.packets.is_empty() {
                break;
            }
            self.events.record(BusEvent::NoResponse {
                pgn,
                destination,
                attempt: result.attempts,
            });
        }

        if result.packets.len() > 1 && self.policy.allows_multi_frame(pgn) {
            // One logical answer split over several messages
            let mut merged = result.packets[0].clone();
            for extra in &result.packets[1..] {
                merged.data.extend_from_slice(&extra.data);
                merged.timestamp = extra.timestamp;
                merged.ordinal = extra.ordinal;
            }
            result.packets = vec![merged];
        }

        if result.retry_used() {
            info!(pgn = %pgn_display(pgn), destination, "Reply obtained on retry");
        }
        result
    }

    /// Request `pgn` from all modules and collect replies for the global
    /// response window
    pub async fn request_global(&self, pgn: u32) -> Result<Vec<Packet>, TransportError> {
        self.events.record(BusEvent::Request {
            pgn,
            destination: j84_core::GLOBAL_ADDRESS,
            attempt: 1,
        });
        let window = self.timing.global_response_window();
        let packets: Vec<Packet> = match self.transport.request_global(pgn, window).await {
            Ok(packets) => packets
                .into_iter()
                .map(|p| p.with_origin(PacketOrigin::GlobalRequest))
                .collect(),
            Err(e) => {
                self.events.record(BusEvent::TransportFault {
                    pgn,
                    message: e.to_string(),
                });
                return Err(e);
            }
        };
        for packet in &packets {
            self.events.record(BusEvent::Response {
                pgn,
                source: packet.source,
                length: packet.len(),
            });
        }
        debug!(pgn = %pgn_display(pgn), replies = packets.len(), "Global request");
        Ok(packets)
    }

    /// Passively collect all traffic for `window`
    pub async fn read_bus(&self, window: Duration) -> Result<Vec<Packet>, TransportError> {
        let packets = self.transport.read_bus(window).await?;
        self.events.listen(window, packets.len());
        debug!(window_ms = window.as_millis() as u64, packets = packets.len(), "Bus listen complete");
        Ok(packets)
    }

    /// Foreign responders seen since the last call, in arrival order
    pub fn take_foreign_responses(&self) -> Vec<ForeignResponse> {
        std::mem::take(&mut *self.foreign.lock())
    }

    /// Another device is transmitting with the tool's source address
    pub fn imposter_detected(&self) -> bool {
        let detected = self.transport.imposter_detected()
            || self.tool_address_reply.load(Ordering::SeqCst);
        if detected {
            self.events.record(BusEvent::Imposter);
        }
        detected
    }
}
