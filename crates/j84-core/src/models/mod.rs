//! Data models for the compliance engine

mod address;
mod module;
mod outcome;
mod vehicle;

pub use address::{address_label, module_name, GLOBAL_ADDRESS, NULL_ADDRESS, TOOL_ADDRESS};
pub use module::{ModuleRecord, SupportedSpn, MAX_SPN};
pub use outcome::{Outcome, SectionCode, SectionCodeError, Severity};
pub use vehicle::{FuelType, IgnitionType, VehicleInformation};
