//! Transport layer errors

use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum TransportError {
    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Log file error: {0}")]
    Log(String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),
}

impl From<crate::error::CodecError> for TransportError {
    fn from(err: crate::error::CodecError) -> Self {
        TransportError::ProtocolError(err.to_string())
    }
}
