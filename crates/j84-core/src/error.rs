//! Error types for the core data model

use thiserror::Error;

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors raised by the parameter registry
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// No module has been discovered at this source address
    #[error("No module registered at source address {0}")]
    ModuleNotFound(u8),

    /// SPN outside the 19-bit range
    #[error("SPN {0} is outside the valid range 0..=524287")]
    InvalidSpn(u32),
}
