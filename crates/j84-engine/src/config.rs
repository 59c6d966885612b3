//! Compliance run configuration
//!
//! Loaded from a TOML file:
//!
//! ```toml
//! [vehicle]
//! vin = "1XKYD49X0MJ000001"
//! engine_model_year = 2022
//! fuel_type = "diesel"
//!
//! [bus]
//! type = "replay"
//! path = "session.log"
//!
//! [timing]
//! broadcast_listen_ms = 12000
//!
//! [rules]
//! max_period_factor = 3.0
//! ```

use std::path::Path;

use j84_bus::j1939::{PgnDefinition, SpnCatalog};
use j84_bus::{RequestPolicyConfig, TimingConfig, TransportConfig};
use j84_core::VehicleInformation;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::rules::RuleTable;

/// Everything a compliance run needs besides the bus itself
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComplianceConfig {
    #[serde(default)]
    pub vehicle: VehicleInformation,
    #[serde(default)]
    pub bus: TransportConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub requests: RequestPolicyConfig,
    #[serde(default)]
    pub rules: RuleTable,
    /// Additional or replacement PGN definitions
    #[serde(default)]
    pub catalog: Vec<PgnDefinition>,
    #[serde(default)]
    pub run: RunConfig,
}

/// Which part and steps to run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_part")]
    pub part: u8,
    /// Steps to run; empty runs every implemented step of the part
    #[serde(default)]
    pub steps: Vec<u8>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            part: default_part(),
            steps: Vec::new(),
        }
    }
}

fn default_part() -> u8 {
    1
}

impl ComplianceConfig {
    /// Load and validate a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "Loading compliance configuration");
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ComplianceConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.vehicle.engine_model_year == 0 {
            return Err(ConfigError::Invalid(
                "vehicle.engine_model_year is required".to_string(),
            ));
        }
        if !self.vehicle.vin.is_empty() && self.vehicle.vin.len() != 17 {
            return Err(ConfigError::Invalid(format!(
                "vehicle.vin '{}' must be 17 characters",
                self.vehicle.vin
            )));
        }
        if self.rules.max_period_factor <= 0.0 {
            return Err(ConfigError::Invalid(
                "rules.max_period_factor must be positive".to_string(),
            ));
        }
        if self.timing.response_timeout_ms == 0 || self.timing.broadcast_listen_ms == 0 {
            return Err(ConfigError::Invalid(
                "timing windows must be non-zero".to_string(),
            ));
        }
        if !self.rules.tracking.columns.is_empty() && self.rules.tracking.rows.is_empty() {
            return Err(ConfigError::Invalid(
                "rules.tracking needs row labels for its columns".to_string(),
            ));
        }
        Ok(())
    }

    /// Built-in catalog extended by the configured definitions
    pub fn catalog(&self) -> SpnCatalog {
        let mut catalog = SpnCatalog::default();
        if !self.catalog.is_empty() {
            catalog.extend(self.catalog.clone());
        }
        catalog
    }
}
