//! PGN/SPN catalog
//!
//! Layout, scaling and transmission rate of the parameters the data
//! stream checks know how to decode. The built-in table covers the
//! common powertrain PGNs; configuration may add more.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::packet::Packet;
use super::slot::{self, SpnValue};

/// One SPN inside a PGN
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpnDefinition {
    pub spn: u32,
    pub label: String,
    /// Zero-based byte index of the first byte
    pub start_byte: usize,
    /// Bit offset inside the first byte
    #[serde(default)]
    pub start_bit: u8,
    pub bit_length: u8,
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default)]
    pub offset: f64,
    #[serde(default)]
    pub unit: String,
    /// Lowest physically plausible value
    pub min: f64,
    /// Highest physically plausible value
    pub max: f64,
}

fn default_scale() -> f64 {
    1.0
}

impl SpnDefinition {
    #[allow(clippy::too_many_arguments)]
    fn new(
        spn: u32,
        label: &str,
        start_byte: usize,
        bit_length: u8,
        scale: f64,
        offset: f64,
        unit: &str,
        range: (f64, f64),
    ) -> Self {
        Self {
            spn,
            label: label.to_string(),
            start_byte,
            start_bit: 0,
            bit_length,
            scale,
            offset,
            unit: unit.to_string(),
            min: range.0,
            max: range.1,
        }
    }

    pub fn decode(&self, data: &[u8]) -> Option<SpnValue> {
        slot::decode(
            data,
            self.start_byte,
            self.start_bit,
            self.bit_length,
            self.scale,
            self.offset,
        )
    }

    pub fn is_plausible(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// A parameter group and the SPNs it carries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PgnDefinition {
    pub pgn: u32,
    pub acronym: String,
    pub label: String,
    /// Nominal broadcast period; `None` for on-request PGNs
    #[serde(default)]
    pub broadcast_period_ms: Option<u64>,
    pub spns: Vec<SpnDefinition>,
}

impl PgnDefinition {
    pub fn broadcast_period(&self) -> Option<Duration> {
        self.broadcast_period_ms.map(Duration::from_millis)
    }

    pub fn is_on_request(&self) -> bool {
        self.broadcast_period_ms.is_none()
    }

    pub fn spn(&self, spn: u32) -> Option<&SpnDefinition> {
        self.spns.iter().find(|d| d.spn == spn)
    }

    /// Bytes needed to carry every defined SPN
    pub fn min_length(&self) -> usize {
        self.spns
            .iter()
            .map(|d| (d.start_byte * 8 + d.start_bit as usize + d.bit_length as usize).div_ceil(8))
            .max()
            .unwrap_or(0)
    }
}

/// Lookup of PGN and SPN definitions
#[derive(Debug, Clone)]
pub struct SpnCatalog {
    pgns: BTreeMap<u32, PgnDefinition>,
    by_spn: BTreeMap<u32, Vec<u32>>,
}

impl Default for SpnCatalog {
    fn default() -> Self {
        Self::from_definitions(default_definitions())
    }
}

impl SpnCatalog {
    pub fn from_definitions(definitions: Vec<PgnDefinition>) -> Self {
        let mut catalog = Self {
            pgns: BTreeMap::new(),
            by_spn: BTreeMap::new(),
        };
        catalog.extend(definitions);
        catalog
    }

    /// Add definitions; a PGN already present is replaced
    pub fn extend(&mut self, definitions: Vec<PgnDefinition>) {
        for def in definitions {
            self.pgns.insert(def.pgn, def);
        }
        self.reindex();
    }

    fn reindex(&mut self) {
        self.by_spn.clear();
        for def in self.pgns.values() {
            for spn in &def.spns {
                self.by_spn.entry(spn.spn).or_default().push(def.pgn);
            }
        }
    }

    pub fn pgn(&self, pgn: u32) -> Option<&PgnDefinition> {
        self.pgns.get(&pgn)
    }

    pub fn pgns(&self) -> impl Iterator<Item = &PgnDefinition> {
        self.pgns.values()
    }

    /// PGNs that carry `spn`, ascending
    pub fn pgns_for_spn(&self, spn: u32) -> &[u32] {
        self.by_spn.get(&spn).map(Vec::as_slice).unwrap_or(&[])
    }

    /// First definition of `spn` (lowest PGN)
    pub fn spn(&self, spn: u32) -> Option<&SpnDefinition> {
        let pgn = *self.pgns_for_spn(spn).first()?;
        self.pgns.get(&pgn)?.spn(spn)
    }

    pub fn spn_label(&self, spn: u32) -> String {
        self.spn(spn)
            .map(|d| d.label.clone())
            .unwrap_or_else(|| "Unknown".to_string())
    }

    pub fn is_on_request(&self, pgn: u32) -> bool {
        self.pgns.get(&pgn).is_some_and(PgnDefinition::is_on_request)
    }

    /// Decode `spn` from `packet`, when the packet's PGN carries it
    pub fn decode(&self, packet: &Packet, spn: u32) -> Option<SpnValue> {
        self.pgns.get(&packet.pgn)?.spn(spn)?.decode(&packet.data)
    }

    /// Payload shorter than its catalog layout; `None` when the length is
    /// fine or the PGN is unknown, else the expected minimum
    pub fn truncated(&self, packet: &Packet) -> Option<usize> {
        let expected = self.pgns.get(&packet.pgn)?.min_length();
        (packet.len() < expected).then_some(expected)
    }

    /// Whether any known SPN is defined
    pub fn is_known_spn(&self, spn: u32) -> bool {
        self.by_spn.contains_key(&spn)
    }
}

fn pgn_def(
    pgn: u32,
    acronym: &str,
    label: &str,
    period_ms: Option<u64>,
    spns: Vec<SpnDefinition>,
) -> PgnDefinition {
    PgnDefinition {
        pgn,
        acronym: acronym.to_string(),
        label: label.to_string(),
        broadcast_period_ms: period_ms,
        spns,
    }
}

/// GHG tracking array fields, in transmitted order: (label, unit, scale)
const GHG_TRACKING_FIELDS: [(&str, &str, f64); 6] = [
    ("Engine Run Time", "s", 1.0),
    ("Vehicle Distance", "km", 0.1),
    ("Vehicle Fuel Consumed", "l", 0.1),
    ("Engine Fuel Consumed", "l", 0.1),
    ("Engine Output Energy", "kWh", 0.1),
    ("Engine Idle Run Time", "s", 1.0),
];

/// PGN of the GHG tracking lifetime array
pub const GHG_TRACKING_LIFETIME: u32 = 64252;
/// PGN of the GHG tracking stored 100 hour array
pub const GHG_TRACKING_STORED_100H: u32 = 64253;
/// PGN of the GHG tracking active 100 hour array
pub const GHG_TRACKING_ACTIVE_100H: u32 = 64254;

/// First SPN of each tracking array; fields follow consecutively
pub const GHG_LIFETIME_FIRST_SPN: u32 = 12730;
pub const GHG_STORED_100H_FIRST_SPN: u32 = 12715;
pub const GHG_ACTIVE_100H_FIRST_SPN: u32 = 12700;

fn ghg_array(pgn: u32, acronym: &str, label: &str, first_spn: u32, prefix: &str) -> PgnDefinition {
    let spns = GHG_TRACKING_FIELDS
        .iter()
        .enumerate()
        .map(|(i, (field, unit, scale))| {
            SpnDefinition::new(
                first_spn + i as u32,
                &format!("{} {}", prefix, field),
                i * 4,
                32,
                *scale,
                0.0,
                unit,
                (0.0, f64::from(0xFAFF_FFFFu32) * scale),
            )
        })
        .collect();
    pgn_def(pgn, acronym, label, None, spns)
}

/// Built-in catalog entries
pub fn default_definitions() -> Vec<PgnDefinition> {
    vec![
        ghg_array(
            GHG_TRACKING_LIFETIME,
            "GHGTL",
            "GHG Tracking Lifetime Array Data",
            GHG_LIFETIME_FIRST_SPN,
            "GHG Tracking Lifetime",
        ),
        ghg_array(
            GHG_TRACKING_STORED_100H,
            "GHGTS",
            "GHG Tracking Stored 100 Hour Array Data",
            GHG_STORED_100H_FIRST_SPN,
            "GHG Tracking Stored 100 Hour",
        ),
        ghg_array(
            GHG_TRACKING_ACTIVE_100H,
            "GHGTA",
            "GHG Tracking Active 100 Hour Array Data",
            GHG_ACTIVE_100H_FIRST_SPN,
            "GHG Tracking Active 100 Hour",
        ),
        pgn_def(
            61443,
            "EEC2",
            "Electronic Engine Controller 2",
            Some(50),
            vec![
                SpnDefinition::new(91, "Accelerator Pedal 1 Position", 1, 8, 0.4, 0.0, "%", (0.0, 100.0)),
                SpnDefinition::new(92, "Engine Percent Load At Current Speed", 2, 8, 1.0, 0.0, "%", (0.0, 125.0)),
            ],
        ),
        pgn_def(
            61444,
            "EEC1",
            "Electronic Engine Controller 1",
            Some(100),
            vec![
                SpnDefinition::new(512, "Driver's Demand Engine - Percent Torque", 1, 8, 1.0, -125.0, "%", (-125.0, 125.0)),
                SpnDefinition::new(513, "Actual Engine - Percent Torque", 2, 8, 1.0, -125.0, "%", (-125.0, 125.0)),
                SpnDefinition::new(190, "Engine Speed", 3, 16, 0.125, 0.0, "rpm", (0.0, 8031.875)),
            ],
        ),
        pgn_def(
            65110,
            "AT1T1I1",
            "Aftertreatment 1 Diesel Exhaust Fluid Tank 1 Information",
            Some(1000),
            vec![SpnDefinition::new(1761, "Aftertreatment 1 Diesel Exhaust Fluid Tank Volume", 0, 8, 0.4, 0.0, "%", (0.0, 100.0))],
        ),
        pgn_def(
            65248,
            "VD",
            "Vehicle Distance",
            None,
            vec![
                SpnDefinition::new(244, "Trip Distance", 0, 32, 0.125, 0.0, "km", (0.0, 526_385_151.875)),
                SpnDefinition::new(245, "Total Vehicle Distance", 4, 32, 0.125, 0.0, "km", (0.0, 526_385_151.875)),
            ],
        ),
        pgn_def(
            65253,
            "HOURS",
            "Engine Hours, Revolutions",
            None,
            vec![
                SpnDefinition::new(247, "Engine Total Hours of Operation", 0, 32, 0.05, 0.0, "h", (0.0, 210_554_060.75)),
                SpnDefinition::new(249, "Engine Total Revolutions", 4, 32, 1000.0, 0.0, "r", (0.0, 4_211_081_215_000.0)),
            ],
        ),
        pgn_def(
            65257,
            "LFC1",
            "Fuel Consumption (Liquid) 1",
            None,
            vec![
                SpnDefinition::new(182, "Engine Trip Fuel", 0, 32, 0.5, 0.0, "L", (0.0, 2_105_540_607.5)),
                SpnDefinition::new(250, "Engine Total Fuel Used", 4, 32, 0.5, 0.0, "L", (0.0, 2_105_540_607.5)),
            ],
        ),
        pgn_def(
            65262,
            "ET1",
            "Engine Temperature 1",
            Some(1000),
            vec![
                SpnDefinition::new(110, "Engine Coolant Temperature", 0, 8, 1.0, -40.0, "°C", (-40.0, 210.0)),
                SpnDefinition::new(175, "Engine Oil Temperature 1", 2, 16, 0.03125, -273.0, "°C", (-273.0, 1734.96875)),
            ],
        ),
        pgn_def(
            65265,
            "CCVS1",
            "Cruise Control/Vehicle Speed 1",
            Some(100),
            vec![SpnDefinition::new(84, "Wheel-Based Vehicle Speed", 1, 16, 1.0 / 256.0, 0.0, "km/h", (0.0, 250.996))],
        ),
        pgn_def(
            65266,
            "LFE1",
            "Fuel Economy (Liquid) 1",
            Some(100),
            vec![SpnDefinition::new(183, "Engine Fuel Rate", 0, 16, 0.05, 0.0, "L/h", (0.0, 3212.75))],
        ),
        pgn_def(
            65269,
            "AMB",
            "Ambient Conditions",
            Some(1000),
            vec![
                SpnDefinition::new(108, "Barometric Pressure", 0, 8, 0.5, 0.0, "kPa", (0.0, 125.0)),
                SpnDefinition::new(171, "Ambient Air Temperature", 3, 16, 0.03125, -273.0, "°C", (-273.0, 1734.96875)),
            ],
        ),
        pgn_def(
            65270,
            "IC1",
            "Intake/Exhaust Conditions 1",
            Some(500),
            vec![SpnDefinition::new(102, "Engine Intake Manifold #1 Pressure", 1, 8, 2.0, 0.0, "kPa", (0.0, 500.0))],
        ),
    ]
}
