//! Bus configuration
//!
//! Transport selection, timing and request policy. All types deserialize
//! from the `[bus]`, `[timing]` and `[requests]` tables of the tool
//! configuration file.

use std::path::PathBuf;
use std::time::Duration;

use j84_core::TOOL_ADDRESS;
use serde::{Deserialize, Serialize};

use crate::error::CodecError;
use crate::j1939::pgn;

// =============================================================================
// Transport Configuration
// =============================================================================

/// Transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    /// Simulated vehicle for testing and demos
    Mock(MockConfig),
    /// Replay of a candump log
    Replay(ReplayConfig),
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::Mock(MockConfig::default())
    }
}

/// Mock transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockConfig {
    /// Simulated latency in milliseconds
    #[serde(default)]
    pub latency_ms: u64,
    /// Source address used by the tool
    #[serde(default = "default_tool_address")]
    pub tool_address: u8,
    /// Modules answering requests
    #[serde(default)]
    pub modules: Vec<SimulatedModule>,
    /// Periodic broadcasts on the simulated bus
    #[serde(default)]
    pub broadcasts: Vec<SimulatedBroadcast>,
    /// Simulate another device transmitting with the tool's address
    #[serde(default)]
    pub imposter: bool,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            latency_ms: 0,
            tool_address: TOOL_ADDRESS,
            modules: Vec::new(),
            broadcasts: Vec::new(),
            imposter: false,
        }
    }
}

fn default_tool_address() -> u8 {
    TOOL_ADDRESS
}

/// A simulated ECU
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedModule {
    pub address: u8,
    #[serde(default)]
    pub responses: Vec<SimulatedResponse>,
}

/// Reply of a simulated ECU to a request for `pgn`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedResponse {
    pub pgn: u32,
    /// Payload as hex, whitespace allowed
    pub data: String,
    /// Number of requests to ignore before answering
    #[serde(default)]
    pub silent_attempts: u32,
}

/// A periodic broadcast on the simulated bus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedBroadcast {
    pub pgn: u32,
    pub source: u8,
    /// Payload as hex, whitespace allowed
    pub data: String,
    pub period_ms: u64,
    #[serde(default = "default_priority")]
    pub priority: u8,
}

fn default_priority() -> u8 {
    6
}

/// Replay transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// candump log file (`(ts) can0 18FECA00#...`)
    pub path: PathBuf,
    /// Source address used by the tool
    #[serde(default = "default_tool_address")]
    pub tool_address: u8,
    /// Only replay frames from this interface
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
}

/// Parse a hex payload such as `"00 FF 1A"` or `"00ff1a"`
pub fn parse_hex(data: &str) -> Result<Vec<u8>, CodecError> {
    let cleaned: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(&cleaned).map_err(|e| CodecError::Parse(format!("'{}': {}", data, e)))
}

// =============================================================================
// Timing Configuration
// =============================================================================

/// Timeouts and listen windows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Wait for a destination-specific response
    #[serde(default = "default_response_timeout")]
    pub response_timeout_ms: u64,
    /// Collect responses to a global request
    #[serde(default = "default_global_window")]
    pub global_response_window_ms: u64,
    /// Passive broadcast listen window
    #[serde(default = "default_broadcast_listen")]
    pub broadcast_listen_ms: u64,
    /// DM1 listen window
    #[serde(default = "default_dm1_listen")]
    pub dm1_listen_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            response_timeout_ms: default_response_timeout(),
            global_response_window_ms: default_global_window(),
            broadcast_listen_ms: default_broadcast_listen(),
            dm1_listen_ms: default_dm1_listen(),
        }
    }
}

fn default_response_timeout() -> u64 {
    750
}

fn default_global_window() -> u64 {
    1200
}

fn default_broadcast_listen() -> u64 {
    12000
}

fn default_dm1_listen() -> u64 {
    3000
}

impl TimingConfig {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn global_response_window(&self) -> Duration {
        Duration::from_millis(self.global_response_window_ms)
    }

    pub fn broadcast_listen(&self) -> Duration {
        Duration::from_millis(self.broadcast_listen_ms)
    }

    pub fn dm1_listen(&self) -> Duration {
        Duration::from_millis(self.dm1_listen_ms)
    }
}

// =============================================================================
// Request Policy Configuration
// =============================================================================

/// Which PGNs get a retry and which may answer with several frames
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestPolicyConfig {
    /// PGNs re-requested once after a silent first attempt
    #[serde(default = "default_retry_pgns")]
    pub retry_pgns: Vec<u32>,
    /// PGNs that may legitimately answer with more than one frame
    #[serde(default)]
    pub multi_frame_pgns: Vec<u32>,
}

impl Default for RequestPolicyConfig {
    fn default() -> Self {
        Self {
            retry_pgns: default_retry_pgns(),
            multi_frame_pgns: Vec::new(),
        }
    }
}

fn default_retry_pgns() -> Vec<u32> {
    vec![pgn::DM24, pgn::DM5, 64252, 64253, 64254, 65248, 65253, 65257]
}
