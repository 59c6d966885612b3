//! Mock transport adapter for testing
//!
//! Simulates a set of ECUs on a virtual clock. Requests are answered from
//! scripted one-shot replies first, then from standing replies; broadcasts
//! are generated for whatever window is read, so a 12 second listen costs
//! no wall time.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use j84_core::GLOBAL_ADDRESS;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use super::{TransportAdapter, TransportError};
use crate::config::{parse_hex, MockConfig};
use crate::j1939::Packet;

/// Spacing between replies from simulated modules
const REPLY_SPACING: Duration = Duration::from_millis(5);

#[derive(Debug, Clone)]
struct Broadcast {
    pgn: u32,
    source: u8,
    priority: u8,
    data: Vec<u8>,
    period: Duration,
    next_due: Duration,
}

/// Mock transport adapter for testing
pub struct MockTransportAdapter {
    tool_address: u8,
    latency: Duration,
    connected: AtomicBool,
    imposter: AtomicBool,
    clock: Mutex<Duration>,
    ordinal: AtomicU64,
    /// One-shot replies per (pgn, responder); an empty reply is silence
    scripted: RwLock<HashMap<(u32, u8), VecDeque<Vec<Vec<u8>>>>>,
    /// Replies used once the scripted queue is drained
    standing: RwLock<HashMap<(u32, u8), Vec<Vec<u8>>>>,
    /// Extra replies from other sources per (pgn, requested destination)
    crosstalk: RwLock<HashMap<(u32, u8), Vec<(u8, Vec<u8>)>>>,
    broadcasts: RwLock<Vec<Broadcast>>,
    requests: Mutex<Vec<(u32, u8)>>,
}

impl MockTransportAdapter {
    pub fn new(tool_address: u8) -> Self {
        Self {
            tool_address,
            latency: Duration::ZERO,
            connected: AtomicBool::new(true),
            imposter: AtomicBool::new(false),
            clock: Mutex::new(Duration::ZERO),
            ordinal: AtomicU64::new(0),
            scripted: RwLock::new(HashMap::new()),
            standing: RwLock::new(HashMap::new()),
            crosstalk: RwLock::new(HashMap::new()),
            broadcasts: RwLock::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Build a simulated vehicle from configuration
    pub fn from_config(config: &MockConfig) -> Result<Self, TransportError> {
        let mut adapter = Self::new(config.tool_address);
        adapter.latency = Duration::from_millis(config.latency_ms);
        adapter.set_imposter(config.imposter);

        for module in &config.modules {
            for response in &module.responses {
                let data = parse_hex(&response.data)?;
                if response.silent_attempts > 0 {
                    adapter.queue_silence(response.pgn, module.address, response.silent_attempts);
                }
                adapter.set_response(response.pgn, module.address, data);
            }
        }

        for broadcast in &config.broadcasts {
            if broadcast.period_ms == 0 {
                return Err(TransportError::InvalidConfig(format!(
                    "broadcast of PGN {} from 0x{:02X} has a zero period",
                    broadcast.pgn, broadcast.source
                )));
            }
            let data = parse_hex(&broadcast.data)?;
            adapter.add_broadcast_with_priority(
                broadcast.pgn,
                broadcast.source,
                broadcast.priority,
                data,
                Duration::from_millis(broadcast.period_ms),
            );
        }

        debug!(
            modules = config.modules.len(),
            broadcasts = config.broadcasts.len(),
            "Mock vehicle configured"
        );
        Ok(adapter)
    }

    /// Standing reply of `source` to requests for `pgn`
    pub fn set_response(&self, pgn: u32, source: u8, data: Vec<u8>) {
        self.standing.write().insert((pgn, source), vec![data]);
    }

    /// Standing multi-message reply (e.g. a module answering twice)
    pub fn set_responses(&self, pgn: u32, source: u8, replies: Vec<Vec<u8>>) {
        self.standing.write().insert((pgn, source), replies);
    }

    /// Remove the standing reply so the module stays silent
    pub fn clear_response(&self, pgn: u32, source: u8) {
        self.standing.write().remove(&(pgn, source));
    }

    /// One-shot reply consumed by the next request
    pub fn queue_reply(&self, pgn: u32, source: u8, replies: Vec<Vec<u8>>) {
        self.scripted
            .write()
            .entry((pgn, source))
            .or_default()
            .push_back(replies);
    }

    /// Ignore the next `attempts` requests for `pgn` to `source`
    pub fn queue_silence(&self, pgn: u32, source: u8, attempts: u32) {
        for _ in 0..attempts {
            self.queue_reply(pgn, source, Vec::new());
        }
    }

    /// `source` also answers requests for `pgn` sent to `destination`
    pub fn add_crosstalk(&self, pgn: u32, destination: u8, source: u8, data: Vec<u8>) {
        self.crosstalk
            .write()
            .entry((pgn, destination))
            .or_default()
            .push((source, data));
    }

    /// Periodic broadcast starting at the current bus time
    pub fn add_broadcast(&self, pgn: u32, source: u8, data: Vec<u8>, period: Duration) {
        self.add_broadcast_with_priority(pgn, source, 6, data, period);
    }

    fn add_broadcast_with_priority(
        &self,
        pgn: u32,
        source: u8,
        priority: u8,
        data: Vec<u8>,
        period: Duration,
    ) {
        let next_due = *self.clock.lock();
        self.broadcasts.write().push(Broadcast {
            pgn,
            source,
            priority,
            data,
            period: period.max(Duration::from_millis(1)),
            next_due,
        });
    }

    pub fn set_imposter(&self, imposter: bool) {
        self.imposter.store(imposter, Ordering::SeqCst);
    }

    /// Set connection state
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Requests sent so far as (pgn, destination)
    pub fn requests(&self) -> Vec<(u32, u8)> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self, pgn: u32, destination: u8) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|(p, d)| *p == pgn && *d == destination)
            .count()
    }

    fn next_reply(&self, pgn: u32, source: u8) -> Vec<Vec<u8>> {
        if let Some(queue) = self.scripted.write().get_mut(&(pgn, source)) {
            if let Some(reply) = queue.pop_front() {
                return reply;
            }
        }
        self.standing
            .read()
            .get(&(pgn, source))
            .cloned()
            .unwrap_or_default()
    }

    fn responders(&self, pgn: u32) -> BTreeSet<u8> {
        let scripted = self.scripted.read();
        let standing = self.standing.read();
        scripted
            .keys()
            .chain(standing.keys())
            .filter(|(p, _)| *p == pgn)
            .map(|(_, source)| *source)
            .collect()
    }

    fn stamp(&self, packet: Packet, timestamp: Duration) -> Packet {
        let ordinal = self.ordinal.fetch_add(1, Ordering::SeqCst) + 1;
        packet.with_timestamp(timestamp).with_ordinal(ordinal)
    }

    async fn check_connected(&self) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        Ok(())
    }

    fn advance(&self, by: Duration) -> Duration {
        let mut clock = self.clock.lock();
        let start = *clock;
        *clock += by;
        start
    }
}

#[async_trait]
impl TransportAdapter for MockTransportAdapter {
    fn tool_address(&self) -> u8 {
        self.tool_address
    }

    async fn request_direct(
        &self,
        pgn: u32,
        destination: u8,
        timeout: Duration,
    ) -> Result<Vec<Packet>, TransportError> {
        self.check_connected().await?;
        self.requests.lock().push((pgn, destination));

        let mut replies: Vec<(u8, Vec<u8>)> = self
            .next_reply(pgn, destination)
            .into_iter()
            .map(|data| (destination, data))
            .collect();
        if let Some(extra) = self.crosstalk.read().get(&(pgn, destination)) {
            replies.extend(extra.iter().cloned());
        }
        trace!(pgn, destination, replies = replies.len(), "Mock direct request");
        let start = self.advance(timeout);

        Ok(replies
            .into_iter()
            .enumerate()
            .map(|(i, (source, data))| {
                let packet = Packet::new(pgn, source, data).with_destination(self.tool_address);
                self.stamp(packet, start + REPLY_SPACING * (i as u32 + 1))
            })
            .collect())
    }

    async fn request_global(
        &self,
        pgn: u32,
        window: Duration,
    ) -> Result<Vec<Packet>, TransportError> {
        self.check_connected().await?;
        self.requests.lock().push((pgn, GLOBAL_ADDRESS));

        let start = self.advance(window);
        let mut packets = Vec::new();
        for source in self.responders(pgn) {
            for data in self.next_reply(pgn, source) {
                let offset = REPLY_SPACING * (packets.len() as u32 + 1);
                packets.push(self.stamp(Packet::new(pgn, source, data), start + offset));
            }
        }
        trace!(pgn, replies = packets.len(), "Mock global request");
        Ok(packets)
    }

    async fn read_bus(&self, window: Duration) -> Result<Vec<Packet>, TransportError> {
        self.check_connected().await?;

        let start = self.advance(window);
        let end = start + window;
        let mut frames = Vec::new();
        for broadcast in self.broadcasts.write().iter_mut() {
            if broadcast.next_due < start {
                broadcast.next_due = start;
            }
            while broadcast.next_due < end {
                let mut packet = Packet::new(broadcast.pgn, broadcast.source, broadcast.data.clone());
                packet.priority = broadcast.priority;
                frames.push((broadcast.next_due, packet));
                broadcast.next_due += broadcast.period;
            }
        }
        frames.sort_by_key(|(timestamp, packet)| (*timestamp, packet.source, packet.pgn));

        Ok(frames
            .into_iter()
            .map(|(timestamp, packet)| self.stamp(packet, timestamp))
            .collect())
    }

    fn imposter_detected(&self) -> bool {
        self.imposter.load(Ordering::SeqCst)
    }

    fn bus_time(&self) -> Duration {
        *self.clock.lock()
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SimulatedBroadcast, SimulatedModule, SimulatedResponse};
    use crate::j1939::pgn;

    const TIMEOUT: Duration = Duration::from_millis(750);

    #[tokio::test]
    async fn test_standing_reply() {
        let mock = MockTransportAdapter::new(0xF9);
        mock.set_response(pgn::DM24, 0x00, vec![0x5B, 0x00, 0x19, 0x02]);

        let packets = mock.request_direct(pgn::DM24, 0x00, TIMEOUT).await.unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].source, 0x00);
        assert_eq!(packets[0].destination, 0xF9);
        assert_eq!(packets[0].ordinal, 1);

        // Standing replies do not drain
        let again = mock.request_direct(pgn::DM24, 0x00, TIMEOUT).await.unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(mock.request_count(pgn::DM24, 0x00), 2);
    }

    #[tokio::test]
    async fn test_silence_then_reply() {
        let mock = MockTransportAdapter::new(0xF9);
        mock.set_response(pgn::DM5, 0x00, vec![0; 8]);
        mock.queue_silence(pgn::DM5, 0x00, 1);

        assert!(mock.request_direct(pgn::DM5, 0x00, TIMEOUT).await.unwrap().is_empty());
        assert_eq!(mock.request_direct(pgn::DM5, 0x00, TIMEOUT).await.unwrap().len(), 1);
        assert_eq!(mock.bus_time(), TIMEOUT * 2);
    }

    #[tokio::test]
    async fn test_global_request_collects_all_responders() {
        let mock = MockTransportAdapter::new(0xF9);
        mock.set_response(pgn::DM5, 0x00, vec![0; 8]);
        mock.set_response(pgn::DM5, 0x3D, vec![0; 8]);
        mock.set_response(pgn::DM24, 0x17, vec![0; 4]);

        let packets = mock
            .request_global(pgn::DM5, Duration::from_millis(1200))
            .await
            .unwrap();
        let sources: Vec<u8> = packets.iter().map(|p| p.source).collect();
        assert_eq!(sources, vec![0x00, 0x3D]);
        assert_eq!(mock.requests(), vec![(pgn::DM5, GLOBAL_ADDRESS)]);
    }

    #[tokio::test]
    async fn test_broadcast_schedule() {
        let mock = MockTransportAdapter::new(0xF9);
        mock.add_broadcast(61444, 0x00, vec![0xFF; 8], Duration::from_millis(100));
        mock.add_broadcast(65262, 0x00, vec![0xFF; 8], Duration::from_millis(1000));

        let packets = mock.read_bus(Duration::from_secs(1)).await.unwrap();
        assert_eq!(packets.iter().filter(|p| p.pgn == 61444).count(), 10);
        assert_eq!(packets.iter().filter(|p| p.pgn == 65262).count(), 1);
        assert!(packets.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

        // The schedule continues across windows
        let next = mock.read_bus(Duration::from_millis(250)).await.unwrap();
        assert_eq!(next.first().map(|p| p.timestamp), Some(Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn test_disconnected() {
        let mock = MockTransportAdapter::new(0xF9);
        mock.set_connected(false);
        assert!(!mock.is_connected().await);
        assert!(matches!(
            mock.read_bus(TIMEOUT).await,
            Err(TransportError::ConnectionClosed)
        ));
    }

    #[test]
    fn test_from_config() {
        let config = MockConfig {
            imposter: true,
            modules: vec![SimulatedModule {
                address: 0x00,
                responses: vec![SimulatedResponse {
                    pgn: pgn::DM24,
                    data: "5B 00 19 02".to_string(),
                    silent_attempts: 1,
                }],
            }],
            broadcasts: vec![SimulatedBroadcast {
                pgn: 61444,
                source: 0x00,
                data: "FFFFFFFFFFFFFFFF".to_string(),
                period_ms: 100,
                priority: 3,
            }],
            ..Default::default()
        };
        let mock = MockTransportAdapter::from_config(&config).unwrap();
        assert!(mock.imposter_detected());
        assert_eq!(mock.responders(pgn::DM24).len(), 1);
        assert_eq!(mock.broadcasts.read()[0].priority, 3);
    }

    #[test]
    fn test_zero_period_rejected() {
        let config = MockConfig {
            broadcasts: vec![SimulatedBroadcast {
                pgn: 61444,
                source: 0x00,
                data: "00".to_string(),
                period_ms: 0,
                priority: 6,
            }],
            ..Default::default()
        };
        assert!(matches!(
            MockTransportAdapter::from_config(&config),
            Err(TransportError::InvalidConfig(_))
        ));
    }
}
