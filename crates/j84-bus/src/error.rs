//! Codec errors

use thiserror::Error;

/// Errors decoding J1939 payloads
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Payload length does not fit the message layout
    #[error("{message} payload length {length} is invalid: {reason}")]
    InvalidLength {
        message: &'static str,
        length: usize,
        reason: String,
    },

    /// Transport protocol reassembly failure
    #[error("Transport protocol error: {0}")]
    TransportProtocol(String),

    /// Text (log line, hex) could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),
}
