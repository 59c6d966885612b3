//! Transport layer for J1939 communication
//!
//! This module provides transport adapters for reaching the vehicle bus:
//! - Mock adapter simulating a set of ECUs, for tests and demos
//! - Replay adapter reading a candump log
//!
//! # Example
//!
//! ```ignore
//! use j84_bus::transport::{create_transport, TransportAdapter};
//! use j84_bus::config::TransportConfig;
//!
//! let config = TransportConfig::Mock(Default::default());
//! let transport = create_transport(&config).await?;
//! let replies = transport.request_direct(0xFDB6, 0x00, Duration::from_millis(750)).await?;
//! ```

mod adapter;
pub mod error;
pub mod mock;
pub mod replay;

pub use adapter::TransportAdapter;
pub use error::TransportError;

use std::sync::Arc;

use crate::config::TransportConfig;

/// Create a transport adapter based on configuration
pub async fn create_transport(
    config: &TransportConfig,
) -> Result<Arc<dyn TransportAdapter>, TransportError> {
    match config {
        TransportConfig::Mock(cfg) => {
            let adapter = mock::MockTransportAdapter::from_config(cfg)?;
            Ok(Arc::new(adapter))
        }
        TransportConfig::Replay(cfg) => {
            let adapter = replay::ReplayTransportAdapter::open(cfg).await?;
            Ok(Arc::new(adapter))
        }
    }
}
