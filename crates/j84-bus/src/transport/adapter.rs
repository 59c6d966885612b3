//! Transport adapter trait

use std::time::Duration;

use async_trait::async_trait;

use super::TransportError;
use crate::j1939::Packet;

/// Transport-agnostic access to a J1939 bus
///
/// Adapters deliver complete (reassembled) messages stamped with bus time
/// and a monotonic receive ordinal. Frames transmitted by the tool itself
/// are never returned.
#[async_trait]
pub trait TransportAdapter: Send + Sync {
    /// Source address the tool transmits from
    fn tool_address(&self) -> u8;

    /// Request `pgn` from one module and collect its replies until `timeout`
    ///
    /// Replies from other sources seen in the same window are returned as
    /// well; the caller decides what to keep.
    async fn request_direct(
        &self,
        pgn: u32,
        destination: u8,
        timeout: Duration,
    ) -> Result<Vec<Packet>, TransportError>;

    /// Request `pgn` from all modules and collect replies for `window`
    async fn request_global(&self, pgn: u32, window: Duration)
        -> Result<Vec<Packet>, TransportError>;

    /// Passively collect all traffic for `window`
    async fn read_bus(&self, window: Duration) -> Result<Vec<Packet>, TransportError>;

    /// Whether another device has transmitted using the tool's address
    fn imposter_detected(&self) -> bool;

    /// Current bus time relative to the start of the session
    fn bus_time(&self) -> Duration;

    /// Check if the transport is connected
    async fn is_connected(&self) -> bool;
}
