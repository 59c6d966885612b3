//! Error types for the compliance engine

use std::path::PathBuf;

use j84_bus::TransportError;
use j84_core::RegistryError;
use thiserror::Error;

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration value: {0}")]
    Invalid(String),
}

/// Errors that end a step early
///
/// Faults of a single module are reported as outcomes and never surface
/// here.
#[derive(Debug, Error, Clone)]
pub enum StepError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Step 6.{part}.{step} is not implemented")]
    UnknownStep { part: u8, step: u8 },
}

pub type StepResult<T> = Result<T, StepError>;
