//! j84-core - Core types for the J1939-84 compliance engine
//!
//! This crate holds the data model shared by the bus layer and the
//! compliance engine: module records and their supported SPNs, vehicle
//! information, outcomes and section codes, the parameter registry and
//! the results listener seam.

pub mod error;
pub mod listener;
pub mod models;
pub mod registry;

pub use error::{RegistryError, RegistryResult};
pub use listener::{RecordingListener, ResultsListener, UrgentMessage};
pub use models::*;
pub use registry::{ParameterRegistry, SupportUpdate};
