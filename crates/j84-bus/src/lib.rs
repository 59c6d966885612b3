//! j84-bus - J1939 bus access for the J1939-84 compliance engine
//!
//! This crate owns everything between the compliance steps and the wire:
//! transport adapters, J1939 message codecs and the request engine that
//! adds retry and imposter tagging on top of a transport.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      RequestEngine                          │
//! │  direct / global requests, retry policy, bus listen         │
//! │                                                             │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐ │
//! │  │RequestPolicy│  │  EventLog   │  │ j1939 codecs        │ │
//! │  │ (retries)   │  │ (attempts)  │  │ DM1/DM5/DM24/SPNs   │ │
//! │  └─────────────┘  └─────────────┘  └─────────────────────┘ │
//! │                          │                                  │
//! │                 ┌────────┴────────┐                         │
//! │                 │TransportAdapter │                         │
//! │                 │ (mock / replay) │                         │
//! │                 └─────────────────┘                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod j1939;
pub mod request;
pub mod transport;

pub use config::{RequestPolicyConfig, TimingConfig, TransportConfig};
pub use error::CodecError;
pub use events::{BusEvent, EventLog};
pub use j1939::{Packet, PacketOrigin};
pub use request::{ForeignResponse, RequestEngine, RequestPolicy, RequestResult};
pub use transport::{create_transport, TransportAdapter, TransportError};
