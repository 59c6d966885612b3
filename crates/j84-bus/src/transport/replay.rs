//! Replay transport adapter
//!
//! Plays back a `candump -L` log as if it were a live bus. Requests sent
//! by the tool are matched against the requests found in the log, so a
//! recorded compliance session answers the same way on every run.

use std::time::Duration;

use async_trait::async_trait;
use j84_core::GLOBAL_ADDRESS;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::{TransportAdapter, TransportError};
use crate::config::{parse_hex, ReplayConfig};
use crate::j1939::tp::Reassembler;
use crate::j1939::{pgn, J1939Id, Packet};

/// A request transmitted by the tool in the recorded session
#[derive(Debug, Clone, PartialEq, Eq)]
struct LoggedRequest {
    timestamp: Duration,
    pgn: u32,
    destination: u8,
}

/// Parsed log content
#[derive(Debug, Default)]
struct Recording {
    traffic: Vec<Packet>,
    requests: Vec<LoggedRequest>,
    /// Frames sent from the tool address that the tool would not send
    imposter_frames: Vec<Duration>,
}

/// Replay transport adapter
pub struct ReplayTransportAdapter {
    tool_address: u8,
    recording: Recording,
    clock: Mutex<Duration>,
}

impl ReplayTransportAdapter {
    pub async fn open(config: &ReplayConfig) -> Result<Self, TransportError> {
        let text = tokio::fs::read_to_string(&config.path)
            .await
            .map_err(|e| TransportError::Log(format!("{}: {}", config.path.display(), e)))?;
        let adapter = Self::from_log(&text, config.tool_address, config.interface.as_deref())?;
        info!(
            path = %config.path.display(),
            frames = adapter.recording.traffic.len(),
            requests = adapter.recording.requests.len(),
            "Replay log loaded"
        );
        Ok(adapter)
    }

    /// Build from log text
    pub fn from_log(
        text: &str,
        tool_address: u8,
        interface: Option<&str>,
    ) -> Result<Self, TransportError> {
        Ok(Self {
            tool_address,
            recording: parse_log(text, tool_address, interface)?,
            clock: Mutex::new(Duration::ZERO),
        })
    }

    /// Traffic in [start, end)
    fn traffic_between(&self, start: Duration, end: Duration) -> impl Iterator<Item = &Packet> {
        self.recording
            .traffic
            .iter()
            .filter(move |p| p.timestamp >= start && p.timestamp < end)
    }

    /// Find the next logged request matching `pgn`/`destination` at or
    /// after the current clock, else use the clock
    fn request_anchor(&self, pgn: u32, destination: u8) -> Duration {
        let clock = *self.clock.lock();
        self.recording
            .requests
            .iter()
            .find(|r| r.timestamp >= clock && r.pgn == pgn && r.destination == destination)
            .map(|r| r.timestamp)
            .unwrap_or_else(|| {
                debug!(pgn, destination, "Request not found in log, using bus clock");
                clock
            })
    }

    fn collect_replies(&self, pgn: u32, start: Duration, window: Duration) -> Vec<Packet> {
        let end = start + window;
        let packets: Vec<Packet> = self
            .traffic_between(start, end)
            .filter(|p| {
                p.pgn == pgn
                    && (p.destination == self.tool_address || p.destination == GLOBAL_ADDRESS)
            })
            .cloned()
            .collect();
        *self.clock.lock() = end;
        packets
    }
}

#[async_trait]
impl TransportAdapter for ReplayTransportAdapter {
    fn tool_address(&self) -> u8 {
        self.tool_address
    }

    async fn request_direct(
        &self,
        pgn: u32,
        destination: u8,
        timeout: Duration,
    ) -> Result<Vec<Packet>, TransportError> {
        let start = self.request_anchor(pgn, destination);
        Ok(self.collect_replies(pgn, start, timeout))
    }

    async fn request_global(
        &self,
        pgn: u32,
        window: Duration,
    ) -> Result<Vec<Packet>, TransportError> {
        let start = self.request_anchor(pgn, GLOBAL_ADDRESS);
        Ok(self.collect_replies(pgn, start, window))
    }

    async fn read_bus(&self, window: Duration) -> Result<Vec<Packet>, TransportError> {
        let start = *self.clock.lock();
        let packets: Vec<Packet> = self.traffic_between(start, start + window).cloned().collect();
        *self.clock.lock() = start + window;
        Ok(packets)
    }

    fn imposter_detected(&self) -> bool {
        let clock = *self.clock.lock();
        self.recording.imposter_frames.iter().any(|t| *t <= clock)
    }

    fn bus_time(&self) -> Duration {
        *self.clock.lock()
    }

    async fn is_connected(&self) -> bool {
        true
    }
}

/// One frame of a `candump -L` line: `(1697040000.123456) can0 18FECA00#00FF...`
#[derive(Debug)]
struct LogFrame {
    seconds: f64,
    interface: String,
    id: u32,
    data: Vec<u8>,
}

fn parse_line(line: &str) -> Result<Option<LogFrame>, TransportError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let mut fields = line.split_whitespace();
    let (Some(stamp), Some(interface), Some(frame)) = (fields.next(), fields.next(), fields.next())
    else {
        return Err(TransportError::Log(format!("malformed line '{}'", line)));
    };

    let seconds = stamp
        .trim_start_matches('(')
        .trim_end_matches(')')
        .parse::<f64>()
        .map_err(|e| TransportError::Log(format!("bad timestamp in '{}': {}", line, e)))?;
    let Some((id, data)) = frame.split_once('#') else {
        return Err(TransportError::Log(format!("missing '#' in '{}'", line)));
    };
    // Standard 11-bit and remote frames are not J1939 traffic
    if id.len() <= 3 || data.starts_with('R') {
        return Ok(None);
    }
    let id = u32::from_str_radix(id, 16)
        .map_err(|e| TransportError::Log(format!("bad identifier in '{}': {}", line, e)))?;
    let data = parse_hex(data)?;

    Ok(Some(LogFrame {
        seconds,
        interface: interface.to_string(),
        id,
        data,
    }))
}

fn is_tool_traffic(pgn: u32) -> bool {
    matches!(
        pgn,
        pgn::REQUEST | pgn::TP_CM | pgn::TP_DT | pgn::ACKNOWLEDGMENT | pgn::ADDRESS_CLAIM
    )
}

fn parse_log(
    text: &str,
    tool_address: u8,
    interface: Option<&str>,
) -> Result<Recording, TransportError> {
    let mut recording = Recording::default();
    let mut reassembler = Reassembler::new();
    let mut base: Option<f64> = None;
    let mut ordinal = 0u64;

    for line in text.lines() {
        let Some(frame) = parse_line(line)? else {
            continue;
        };
        if interface.is_some_and(|i| i != frame.interface) {
            continue;
        }
        let base = *base.get_or_insert(frame.seconds);
        let timestamp = Duration::try_from_secs_f64((frame.seconds - base).max(0.0))
            .map_err(|e| TransportError::Log(format!("bad timestamp {}: {}", frame.seconds, e)))?;
        let id = J1939Id::from_raw(frame.id);

        if id.source == tool_address {
            if id.pgn == pgn::REQUEST && frame.data.len() >= 3 {
                recording.requests.push(LoggedRequest {
                    timestamp,
                    pgn: u32::from_le_bytes([frame.data[0], frame.data[1], frame.data[2], 0]),
                    destination: id.destination,
                });
            } else if !is_tool_traffic(id.pgn) {
                recording.imposter_frames.push(timestamp);
            }
            continue;
        }

        let mut packet = Packet::new(id.pgn, id.source, frame.data)
            .with_destination(id.destination)
            .with_timestamp(timestamp);
        packet.priority = id.priority;

        match reassembler.accept(packet) {
            Ok(Some(mut complete)) => {
                ordinal += 1;
                complete.ordinal = ordinal;
                recording.traffic.push(complete);
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Dropping broken transport session"),
        }
    }
    Ok(recording)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use crate::j1939::tp::bam_frames;

    const LOG: &str = "\
(1700000000.000000) can0 0CF00400#FFFFFF0000FFFFFF
(1700000000.100000) can0 0CF00400#FFFFFF0000FFFFFF
(1700000000.200000) can0 18EA00F9#B6FD00
(1700000000.210000) can0 18ECFF00#200C0002FFB6FD00
(1700000000.260000) can0 18EBFF00#015B0019026E0019
(1700000000.310000) can0 18EBFF00#0201FFFFFFFFFFFF
(1700000000.500000) can0 18FECAF9#0000000000000000
(1700000000.600000) can0 18FECE00#0000140000000000
";

    #[test]
    fn test_parse_log() {
        let recording = parse_log(LOG, 0xF9, None).unwrap();
        assert_eq!(recording.requests.len(), 1);
        assert_eq!(recording.requests[0].pgn, pgn::DM24);
        assert_eq!(recording.requests[0].destination, 0x00);
        assert_eq!(recording.imposter_frames, vec![Duration::from_millis(500)]);

        let pgns: Vec<u32> = recording.traffic.iter().map(|p| p.pgn).collect();
        assert_eq!(pgns, vec![61444, 61444, pgn::DM24, pgn::DM5]);
        let dm24 = &recording.traffic[2];
        assert_eq!(dm24.data.len(), 12);
        assert_eq!(dm24.ordinal, 3);
    }

    #[test]
    fn test_interface_filter() {
        let recording = parse_log(LOG, 0xF9, Some("can1")).unwrap();
        assert!(recording.traffic.is_empty());
    }

    #[test]
    fn test_malformed_line() {
        assert!(parse_log("(1.0) can0 18FECA00", 0xF9, None).is_err());
        assert!(parse_log("(x) can0 18FECA00#00", 0xF9, None).is_err());
        let overflow = "(1.0) can0 18FECA00#00\n(inf) can0 18FECA00#00\n";
        assert!(matches!(parse_log(overflow, 0xF9, None), Err(TransportError::Log(_))));
    }

    #[tokio::test]
    async fn test_replay_direct_request() {
        let adapter = ReplayTransportAdapter::from_log(LOG, 0xF9, None).unwrap();
        assert!(!adapter.imposter_detected());

        let replies = adapter
            .request_direct(pgn::DM24, 0x00, Duration::from_millis(750))
            .await
            .unwrap();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].source, 0x00);
        assert!(adapter.imposter_detected());
    }

    fn candump_line(packet: &Packet) -> String {
        let id = J1939Id {
            priority: 6,
            pgn: packet.pgn,
            source: packet.source,
            destination: packet.destination,
        };
        format!(
            "({:.3}) can0 {:08X}#{}",
            packet.timestamp.as_secs_f64(),
            id.to_raw(),
            hex::encode_upper(&packet.data)
        )
    }

    #[tokio::test]
    async fn test_bam_reply_reassembled() {
        let payload: Vec<u8> = (0..20).collect();
        let dm24 = Packet::new(pgn::DM24, 0x00, payload.clone())
            .with_timestamp(Duration::from_millis(20));
        let mut log = String::from("(0.000) can0 18EA00F9#B6FD00\n");
        for frame in bam_frames(&dm24, Duration::from_millis(50)) {
            log.push_str(&candump_line(&frame));
            log.push('\n');
        }

        let adapter = ReplayTransportAdapter::from_log(&log, 0xF9, None).unwrap();
        let replies = adapter
            .request_direct(pgn::DM24, 0x00, Duration::from_millis(750))
            .await
            .unwrap();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].data, payload);
        assert_eq!(replies[0].timestamp, Duration::from_millis(170));
    }

    #[tokio::test]
    async fn test_open_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(LOG.as_bytes()).unwrap();
        let config = ReplayConfig {
            path: file.path().to_path_buf(),
            tool_address: 0xF9,
            interface: None,
        };
        let adapter = ReplayTransportAdapter::open(&config).await.unwrap();
        let traffic = adapter.read_bus(Duration::from_millis(150)).await.unwrap();
        assert_eq!(traffic.len(), 2);
    }
}
