//! Rule table
//!
//! The regulatory rule data the steps evaluate against. Everything here
//! deserializes from the `[rules]` section of the configuration file;
//! anything left out falls back to the built-in table.

use j84_bus::j1939::catalog::{
    GHG_ACTIVE_100H_FIRST_SPN, GHG_LIFETIME_FIRST_SPN, GHG_STORED_100H_FIRST_SPN,
    GHG_TRACKING_ACTIVE_100H, GHG_TRACKING_LIFETIME, GHG_TRACKING_STORED_100H,
};
use j84_bus::j1939::dm1::LampStatus;
use j84_core::{FuelType, IgnitionType, ModuleRecord, SectionCode, Severity, VehicleInformation};
use serde::{Deserialize, Serialize};

/// Complete rule configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleTable {
    #[serde(default)]
    pub minimum_support: MinimumSupport,
    #[serde(default = "default_mandatory_spns")]
    pub mandatory_spns: Vec<MandatorySpn>,
    #[serde(default)]
    pub mil: MilAllowance,
    /// Broadcast gaps above nominal period times this factor fail
    #[serde(default = "default_max_period_factor")]
    pub max_period_factor: f64,
    #[serde(default)]
    pub tracking: TrackingTable,
}

impl Default for RuleTable {
    fn default() -> Self {
        Self {
            minimum_support: MinimumSupport::default(),
            mandatory_spns: default_mandatory_spns(),
            mil: MilAllowance::default(),
            max_period_factor: default_max_period_factor(),
            tracking: TrackingTable::default(),
        }
    }
}

fn default_max_period_factor() -> f64 {
    3.0
}

// =============================================================================
// Minimum support
// =============================================================================

/// SPNs every vehicle of an ignition class must support
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinimumSupport {
    /// Data stream SPNs for compression ignition engines
    #[serde(default = "default_compression_data_stream")]
    pub compression_data_stream: Vec<u32>,
    /// Data stream SPNs for spark ignition engines
    #[serde(default = "default_spark_data_stream")]
    pub spark_data_stream: Vec<u32>,
    /// Data stream SPNs for electric drive
    #[serde(default = "default_electric_data_stream")]
    pub electric_data_stream: Vec<u32>,
    /// Expanded freeze frame SPNs for combustion engines
    #[serde(default = "default_freeze_frame")]
    pub freeze_frame: Vec<u32>,
}

impl Default for MinimumSupport {
    fn default() -> Self {
        Self {
            compression_data_stream: default_compression_data_stream(),
            spark_data_stream: default_spark_data_stream(),
            electric_data_stream: default_electric_data_stream(),
            freeze_frame: default_freeze_frame(),
        }
    }
}

fn default_compression_data_stream() -> Vec<u32> {
    vec![84, 91, 92, 102, 108, 110, 190, 512, 513, 1761]
}

fn default_spark_data_stream() -> Vec<u32> {
    vec![84, 91, 92, 102, 108, 110, 190, 512, 513]
}

fn default_electric_data_stream() -> Vec<u32> {
    vec![84, 91]
}

fn default_freeze_frame() -> Vec<u32> {
    vec![92, 110, 190, 512, 513]
}

impl MinimumSupport {
    /// Data stream list for the vehicle's ignition class
    pub fn data_stream_for(&self, vehicle: &VehicleInformation) -> &[u32] {
        match vehicle.fuel_type.ignition_type() {
            IgnitionType::Compression => &self.compression_data_stream,
            IgnitionType::Spark => &self.spark_data_stream,
            IgnitionType::Electric => &self.electric_data_stream,
        }
    }

    /// Freeze frame list; electric vehicles have none
    pub fn freeze_frame_for(&self, vehicle: &VehicleInformation) -> &[u32] {
        if vehicle.fuel_type.is_electric() {
            &[]
        } else {
            &self.freeze_frame
        }
    }
}

// =============================================================================
// Mandatory SPNs by model year and fuel type
// =============================================================================

/// Which modules a mandatory SPN is checked against
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModuleScope {
    /// Every OBD engine controller (address 0 or 1)
    #[default]
    Engine,
    /// At least one OBD module of the vehicle
    Vehicle,
}

/// One row of the mandatory SPN table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MandatorySpn {
    pub section: SectionCode,
    pub spn: u32,
    /// First engine model year the row applies to
    pub min_model_year: u16,
    /// Fuel types the row applies to; empty means all
    #[serde(default)]
    pub fuel_types: Vec<FuelType>,
    #[serde(default = "default_severity")]
    pub severity: Severity,
    #[serde(default)]
    pub scope: ModuleScope,
}

fn default_severity() -> Severity {
    Severity::Fail
}

impl MandatorySpn {
    pub fn applies_to(&self, vehicle: &VehicleInformation) -> bool {
        vehicle.engine_model_year >= self.min_model_year
            && (self.fuel_types.is_empty() || self.fuel_types.contains(&vehicle.fuel_type))
    }

    pub fn applies_to_module(&self, module: &ModuleRecord) -> bool {
        match self.scope {
            ModuleScope::Engine => module.obd && module.is_engine(),
            ModuleScope::Vehicle => module.obd,
        }
    }
}

const DIESEL_FAMILY: [FuelType; 3] = [FuelType::Diesel, FuelType::BiFuelDiesel, FuelType::HybridDiesel];

fn mandatory_row(letter: char, spn: u32, fuel_types: &[FuelType], severity: Severity) -> MandatorySpn {
    MandatorySpn {
        section: SectionCode::new(1, 4, 2, letter),
        spn,
        min_model_year: 2022,
        fuel_types: fuel_types.to_vec(),
        severity,
        scope: ModuleScope::Engine,
    }
}

fn default_mandatory_spns() -> Vec<MandatorySpn> {
    let combustion: Vec<FuelType> = ALL_FUEL_TYPES
        .into_iter()
        .filter(|f| !f.is_electric())
        .collect();
    let hybrid: Vec<FuelType> = ALL_FUEL_TYPES.into_iter().filter(|f| f.is_hybrid()).collect();

    vec![
        // NOx tracking
        mandatory_row('d', 12675, &DIESEL_FAMILY, Severity::Fail),
        // GHG tracking lifetime engine run time
        mandatory_row('e', 12730, &combustion, Severity::Fail),
        // GHG tracking lifetime active technology
        mandatory_row(
            'f',
            12691,
            &[FuelType::HybridGasoline, FuelType::HybridEthanol],
            Severity::Warn,
        ),
        // Hybrid lifetime propulsion system active time
        MandatorySpn {
            scope: ModuleScope::Vehicle,
            ..mandatory_row('g', 12797, &hybrid, Severity::Fail)
        },
        // NOx tracking engine activity
        mandatory_row('h', 12783, &DIESEL_FAMILY, Severity::Fail),
    ]
}

const ALL_FUEL_TYPES: [FuelType; 22] = [
    FuelType::Gasoline,
    FuelType::Methanol,
    FuelType::Ethanol,
    FuelType::Diesel,
    FuelType::Lpg,
    FuelType::Cng,
    FuelType::Propane,
    FuelType::BatteryElectric,
    FuelType::BiFuelGasoline,
    FuelType::BiFuelMethanol,
    FuelType::BiFuelEthanol,
    FuelType::BiFuelLpg,
    FuelType::BiFuelCng,
    FuelType::BiFuelPropane,
    FuelType::BiFuelElectric,
    FuelType::BiFuelDiesel,
    FuelType::HybridGasoline,
    FuelType::HybridEthanol,
    FuelType::HybridDiesel,
    FuelType::HybridElectric,
    FuelType::HybridMixed,
    FuelType::HybridRegenerative,
];

// =============================================================================
// MIL
// =============================================================================

/// Lamp states accepted for the MIL while the key is on, engine off
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MilAllowance {
    #[serde(default = "default_allowed_mil")]
    pub allowed: Vec<LampStatus>,
    /// Accept 0b00/0b00 as off with a warning
    #[serde(default = "default_true")]
    pub accept_alternate_off: bool,
}

impl Default for MilAllowance {
    fn default() -> Self {
        Self {
            allowed: default_allowed_mil(),
            accept_alternate_off: true,
        }
    }
}

fn default_allowed_mil() -> Vec<LampStatus> {
    vec![LampStatus::Off]
}

fn default_true() -> bool {
    true
}

// =============================================================================
// Tracking arrays
// =============================================================================

/// One array (table column) requested from engine modules
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingColumn {
    pub pgn: u32,
    /// Two header lines of the summary table column
    pub header: [String; 2],
    /// First SPN of the array; row `i` reads `first_spn + i`
    pub first_spn: u32,
    /// Section for bin values in the reserved band
    pub value_section: SectionCode,
    /// Section for a missing array response
    pub missing_section: SectionCode,
}

/// Tracking arrays and the summary table built from them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingTable {
    pub title: String,
    pub columns: Vec<TrackingColumn>,
    /// Row labels, in array order
    pub rows: Vec<String>,
}

impl Default for TrackingTable {
    fn default() -> Self {
        let column = |pgn, top: &str, bottom: &str, first_spn, step| TrackingColumn {
            pgn,
            header: [top.to_string(), bottom.to_string()],
            first_spn,
            value_section: SectionCode::new(1, 26, step, 'a'),
            missing_section: SectionCode::new(1, 26, step, 'b'),
        };
        Self {
            title: "GHG Tracking Arrays".to_string(),
            columns: vec![
                column(GHG_TRACKING_ACTIVE_100H, "Active", "100 Hour", GHG_ACTIVE_100H_FIRST_SPN, 14),
                column(GHG_TRACKING_STORED_100H, "Stored", "100 Hour", GHG_STORED_100H_FIRST_SPN, 13),
                column(GHG_TRACKING_LIFETIME, "", "Lifetime", GHG_LIFETIME_FIRST_SPN, 12),
            ],
            rows: [
                "Engine Run Time, s",
                "Vehicle Dist., km",
                "Vehicle Fuel, l",
                "Engine Fuel, l",
                "Eng.Out.Energy, kW-hr",
                "Engine Idle Run Time, s",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl TrackingTable {
    /// SPNs of every row of `column`
    pub fn column_spns(&self, column: &TrackingColumn) -> Vec<u32> {
        (0..self.rows.len() as u32).map(|i| column.first_spn + i).collect()
    }
}
