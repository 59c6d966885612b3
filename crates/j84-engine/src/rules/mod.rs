//! Compliance rule evaluation
//!
//! A rule is a pure function of one module record, the frames collected
//! from it and the vehicle record. Rules never touch the registry or the
//! bus; steps decide which rules run and hand their outcomes to the
//! listener in order.

mod dtc;
mod presence;
mod table;
mod tracking;
mod values;

pub use dtc::{dm1_of, ActiveDtcRule, ConversionMethodRule, MilStatusRule};
pub use presence::{missing_minimum_support, missing_vehicle_spn, MandatorySpnRule, SupportKind};
pub use table::{
    MandatorySpn, MilAllowance, MinimumSupport, ModuleScope, RuleTable, TrackingColumn,
    TrackingTable,
};
pub use tracking::{exceeds_bin_ceiling, BinThresholdRule, TrackingCell, TrackingSummary};
pub use values::{preferred_frames, DuplicateValueRule, ImplausibleValueRule};

use j84_bus::j1939::SpnCatalog;
use j84_bus::Packet;
use j84_core::{ModuleRecord, Outcome, VehicleInformation};

/// Everything a rule may look at
#[derive(Debug, Clone, Copy)]
pub struct RuleInput<'a> {
    pub module: &'a ModuleRecord,
    /// Frames received from the module, in arrival order
    pub packets: &'a [Packet],
    pub vehicle: &'a VehicleInformation,
    pub catalog: &'a SpnCatalog,
}

impl<'a> RuleInput<'a> {
    /// Frames of `pgn`, in arrival order
    pub fn frames_of(&self, pgn: u32) -> impl Iterator<Item = &'a Packet> {
        self.packets.iter().filter(move |p| p.pgn == pgn)
    }
}

/// One compliance check
pub trait Rule: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    fn evaluate(&self, input: &RuleInput<'_>) -> Vec<Outcome>;
}

/// Evaluate `rules` in order and concatenate their outcomes
pub fn evaluate_all(rules: &[Box<dyn Rule>], input: &RuleInput<'_>) -> Vec<Outcome> {
    rules
        .iter()
        .flat_map(|rule| {
            let outcomes = rule.evaluate(input);
            if !outcomes.is_empty() {
                tracing::debug!(
                    rule = rule.name(),
                    address = input.module.address,
                    count = outcomes.len(),
                    "Rule produced outcomes"
                );
            }
            outcomes
        })
        .collect()
}
