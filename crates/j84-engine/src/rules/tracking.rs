//! Tracking array rules and the summary table

use std::fmt::Write;

use j84_bus::j1939::{pgn_display, SpnCatalog};
use j84_bus::Packet;
use j84_core::{ModuleRecord, Outcome};

use super::table::{TrackingColumn, TrackingTable};
use super::values::preferred_frames;
use super::{Rule, RuleInput};

/// First raw value of the reserved band of a four-byte bin
const BIN_CEILING: u32 = 0xFAFF_FFFF;
/// Not available
const BIN_NOT_AVAILABLE: u32 = 0xFFFF_FFFF;

/// Bin value in `0xFAFFFFFF..0xFFFFFFFF`; all ones is never a violation
pub fn exceeds_bin_ceiling(value: u32) -> bool {
    (BIN_CEILING..BIN_NOT_AVAILABLE).contains(&value)
}

fn array_label(catalog: &SpnCatalog, pgn: u32) -> String {
    catalog
        .pgn(pgn)
        .map(|d| d.label.clone())
        .unwrap_or_else(|| pgn_display(pgn))
}

fn column_frame<'a>(packets: &'a [Packet], column: &TrackingColumn) -> Option<&'a Packet> {
    preferred_frames(packets).get(&column.pgn).copied()
}

/// Minimum length of a tracking array payload when it is short
fn short_array(catalog: &SpnCatalog, packet: &Packet, bins: usize) -> Option<usize> {
    catalog
        .truncated(packet)
        .or_else(|| (packet.len() < bins * 4).then_some(bins * 4))
}

/// Bin values of one tracking array must stay below the ceiling and the
/// array must be answered by every module that claims its SPNs
#[derive(Debug, Clone)]
pub struct BinThresholdRule {
    pub column: TrackingColumn,
    pub spns: Vec<u32>,
}

impl BinThresholdRule {
    pub fn new(table: &TrackingTable, column: &TrackingColumn) -> Self {
        Self {
            column: column.clone(),
            spns: table.column_spns(column),
        }
    }

    /// Whether the module declared any SPN of the array in DM24
    pub fn expected_from(&self, module: &ModuleRecord) -> bool {
        self.spns.iter().any(|s| module.supports_spn(*s))
    }
}

impl Rule for BinThresholdRule {
    fn name(&self) -> &'static str {
        "bin-threshold"
    }

    fn evaluate(&self, input: &RuleInput<'_>) -> Vec<Outcome> {
        let module = input.module;
        if !self.expected_from(module) {
            return Vec::new();
        }
        let Some(packet) = column_frame(input.packets, &self.column) else {
            return vec![Outcome::fail(
                self.column.missing_section,
                format!(
                    "{} was not received from {}",
                    array_label(input.catalog, self.column.pgn),
                    module.name()
                ),
            )];
        };
        if let Some(expected) = short_array(input.catalog, packet, self.spns.len()) {
            return vec![Outcome::fail(
                self.column.missing_section,
                format!(
                    "{} from {} is malformed: {} bytes received, {} expected",
                    array_label(input.catalog, self.column.pgn),
                    module.name(),
                    packet.len(),
                    expected
                ),
            )];
        }

        self.spns
            .iter()
            .enumerate()
            .filter_map(|(i, spn)| {
                let value = packet.get_u32(i * 4)?;
                exceeds_bin_ceiling(value).then(|| {
                    Outcome::fail(
                        self.column.value_section,
                        format!(
                            "SP {} ({}) bin value 0x{:08X} from {} is at or above 0x{:08X}",
                            spn,
                            input.catalog.spn_label(*spn),
                            value,
                            module.name(),
                            BIN_CEILING
                        ),
                    )
                })
            })
            .collect()
    }
}

/// One cell of the summary table
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrackingCell {
    Value(f64),
    /// Reserved band
    Error,
    /// Not available or no array received
    Blank,
}

impl TrackingCell {
    fn from_raw(raw: Option<u32>, scale: f64) -> Self {
        match raw {
            None | Some(BIN_NOT_AVAILABLE) => TrackingCell::Blank,
            Some(v) if exceeds_bin_ceiling(v) => TrackingCell::Error,
            Some(v) => TrackingCell::Value(f64::from(v) * scale),
        }
    }

    fn render(&self) -> String {
        match self {
            TrackingCell::Value(v) => thousands(v.round() as u64),
            TrackingCell::Error => "err".to_string(),
            TrackingCell::Blank => String::new(),
        }
    }
}

/// Integer with comma thousands separators
fn thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Fixed-width summary of the tracking arrays of one module
#[derive(Debug, Clone)]
pub struct TrackingSummary {
    pub title: String,
    pub headers: Vec<[String; 2]>,
    pub rows: Vec<(String, Vec<TrackingCell>)>,
}

const LABEL_WIDTH: usize = 39;
const CELL_WIDTH: usize = 12;

impl TrackingSummary {
    /// Build the table from the frames of `module`; `None` when no
    /// well-formed array was received at all
    pub fn build(
        table: &TrackingTable,
        catalog: &SpnCatalog,
        module: &ModuleRecord,
        packets: &[Packet],
    ) -> Option<Self> {
        let frames: Vec<Option<&Packet>> = table
            .columns
            .iter()
            .map(|c| {
                column_frame(packets, c)
                    .filter(|p| short_array(catalog, p, table.column_spns(c).len()).is_none())
            })
            .collect();
        if frames.iter().all(Option::is_none) {
            return None;
        }

        let rows = table
            .rows
            .iter()
            .enumerate()
            .map(|(i, label)| {
                let cells = table
                    .columns
                    .iter()
                    .zip(&frames)
                    .map(|(column, frame)| {
                        let spn = column.first_spn + i as u32;
                        let scale = catalog.spn(spn).map(|d| d.scale).unwrap_or(1.0);
                        TrackingCell::from_raw(frame.and_then(|p| p.get_u32(i * 4)), scale)
                    })
                    .collect();
                (label.clone(), cells)
            })
            .collect();

        Some(Self {
            title: format!("{} from {}", table.title, module.name()),
            headers: table.columns.iter().map(|c| c.header.clone()).collect(),
            rows,
        })
    }

    fn separator(&self) -> String {
        let mut line = format!("|{}", "-".repeat(LABEL_WIDTH + 2));
        for _ in &self.headers {
            line.push('+');
            line.push_str(&"-".repeat(CELL_WIDTH + 1));
        }
        line.push('|');
        line
    }

    fn row(label: &str, cells: impl Iterator<Item = String>) -> String {
        let mut line = format!("| {:<width$} |", label, width = LABEL_WIDTH);
        for cell in cells {
            let _ = write!(line, "{:>width$} |", cell, width = CELL_WIDTH);
        }
        line
    }

    pub fn render(&self) -> String {
        let separator = self.separator();
        let mut lines = vec![self.title.clone(), separator.clone()];
        for line in 0..2 {
            lines.push(Self::row("", self.headers.iter().map(|h| h[line].clone())));
        }
        lines.push(separator.clone());
        for (label, cells) in &self.rows {
            lines.push(Self::row(label, cells.iter().map(TrackingCell::render)));
        }
        lines.push(separator);
        lines.join("\n")
    }
}
