//! Vehicle information collected at the start of a run

use serde::{Deserialize, Serialize};

/// Fuel type per the J1939 SPN 5837 enumeration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FuelType {
    Gasoline,
    Methanol,
    Ethanol,
    #[default]
    Diesel,
    Lpg,
    Cng,
    Propane,
    BatteryElectric,
    BiFuelGasoline,
    BiFuelMethanol,
    BiFuelEthanol,
    BiFuelLpg,
    BiFuelCng,
    BiFuelPropane,
    BiFuelElectric,
    BiFuelDiesel,
    HybridGasoline,
    HybridEthanol,
    HybridDiesel,
    HybridElectric,
    HybridMixed,
    HybridRegenerative,
}

/// Combustion class used to select minimum support lists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IgnitionType {
    Compression,
    Spark,
    Electric,
}

impl FuelType {
    /// J1939 SPN 5837 value
    pub fn code(&self) -> u8 {
        match self {
            FuelType::Gasoline => 0x01,
            FuelType::Methanol => 0x02,
            FuelType::Ethanol => 0x03,
            FuelType::Diesel => 0x04,
            FuelType::Lpg => 0x05,
            FuelType::Cng => 0x06,
            FuelType::Propane => 0x07,
            FuelType::BatteryElectric => 0x08,
            FuelType::BiFuelGasoline => 0x09,
            FuelType::BiFuelMethanol => 0x0A,
            FuelType::BiFuelEthanol => 0x0B,
            FuelType::BiFuelLpg => 0x0C,
            FuelType::BiFuelCng => 0x0D,
            FuelType::BiFuelPropane => 0x0E,
            FuelType::BiFuelElectric => 0x0F,
            FuelType::BiFuelDiesel => 0x10,
            FuelType::HybridGasoline => 0x11,
            FuelType::HybridEthanol => 0x12,
            FuelType::HybridDiesel => 0x13,
            FuelType::HybridElectric => 0x14,
            FuelType::HybridMixed => 0x15,
            FuelType::HybridRegenerative => 0x16,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        let fuel = match code {
            0x01 => FuelType::Gasoline,
            0x02 => FuelType::Methanol,
            0x03 => FuelType::Ethanol,
            0x04 => FuelType::Diesel,
            0x05 => FuelType::Lpg,
            0x06 => FuelType::Cng,
            0x07 => FuelType::Propane,
            0x08 => FuelType::BatteryElectric,
            0x09 => FuelType::BiFuelGasoline,
            0x0A => FuelType::BiFuelMethanol,
            0x0B => FuelType::BiFuelEthanol,
            0x0C => FuelType::BiFuelLpg,
            0x0D => FuelType::BiFuelCng,
            0x0E => FuelType::BiFuelPropane,
            0x0F => FuelType::BiFuelElectric,
            0x10 => FuelType::BiFuelDiesel,
            0x11 => FuelType::HybridGasoline,
            0x12 => FuelType::HybridEthanol,
            0x13 => FuelType::HybridDiesel,
            0x14 => FuelType::HybridElectric,
            0x15 => FuelType::HybridMixed,
            0x16 => FuelType::HybridRegenerative,
            _ => return None,
        };
        Some(fuel)
    }

    pub fn ignition_type(&self) -> IgnitionType {
        match self {
            FuelType::Diesel | FuelType::BiFuelDiesel | FuelType::HybridDiesel => {
                IgnitionType::Compression
            }
            FuelType::BatteryElectric | FuelType::HybridElectric => IgnitionType::Electric,
            _ => IgnitionType::Spark,
        }
    }

    pub fn is_compression_ignition(&self) -> bool {
        self.ignition_type() == IgnitionType::Compression
    }

    pub fn is_spark_ignition(&self) -> bool {
        self.ignition_type() == IgnitionType::Spark
    }

    pub fn is_hybrid(&self) -> bool {
        matches!(
            self,
            FuelType::HybridGasoline
                | FuelType::HybridEthanol
                | FuelType::HybridDiesel
                | FuelType::HybridElectric
                | FuelType::HybridMixed
                | FuelType::HybridRegenerative
        )
    }

    pub fn is_electric(&self) -> bool {
        self.ignition_type() == IgnitionType::Electric
    }
}

impl std::fmt::Display for FuelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FuelType::Gasoline => "Gasoline/petrol",
            FuelType::Methanol => "Methanol",
            FuelType::Ethanol => "Ethanol",
            FuelType::Diesel => "Diesel",
            FuelType::Lpg => "Liquefied Petroleum Gas (LPG)",
            FuelType::Cng => "Compressed Natural Gas (CNG)",
            FuelType::Propane => "Propane",
            FuelType::BatteryElectric => "Battery/electric",
            FuelType::BiFuelGasoline => "Bi-fuel vehicle using gasoline",
            FuelType::BiFuelMethanol => "Bi-fuel vehicle using methanol",
            FuelType::BiFuelEthanol => "Bi-fuel vehicle using ethanol",
            FuelType::BiFuelLpg => "Bi-fuel vehicle using LPG",
            FuelType::BiFuelCng => "Bi-fuel vehicle using CNG",
            FuelType::BiFuelPropane => "Bi-fuel vehicle using propane",
            FuelType::BiFuelElectric => "Bi-fuel vehicle using battery",
            FuelType::BiFuelDiesel => "Bi-fuel vehicle using diesel",
            FuelType::HybridGasoline => "Hybrid vehicle using gasoline engine",
            FuelType::HybridEthanol => "Hybrid vehicle using gasoline engine on ethanol",
            FuelType::HybridDiesel => "Hybrid vehicle using diesel engine",
            FuelType::HybridElectric => "Hybrid vehicle using battery",
            FuelType::HybridMixed => "Hybrid vehicle using battery and combustion engine",
            FuelType::HybridRegenerative => "Hybrid vehicle in regeneration mode",
        };
        f.write_str(s)
    }
}

/// Vehicle record for the run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleInformation {
    /// Vehicle identification number
    #[serde(default)]
    pub vin: String,
    /// Engine model year
    pub engine_model_year: u16,
    /// Vehicle model year
    #[serde(default)]
    pub vehicle_model_year: u16,
    /// Fuel type
    #[serde(default)]
    pub fuel_type: FuelType,
    /// Number of engines on the vehicle
    #[serde(default = "default_engine_count")]
    pub engine_count: u8,
}

fn default_engine_count() -> u8 {
    1
}

impl VehicleInformation {
    pub fn new(engine_model_year: u16, fuel_type: FuelType) -> Self {
        Self {
            vin: String::new(),
            engine_model_year,
            vehicle_model_year: engine_model_year,
            fuel_type,
            engine_count: 1,
        }
    }
}
