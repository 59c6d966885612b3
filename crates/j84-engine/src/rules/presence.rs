//! Presence rules: SPNs that must appear in DM24

use j84_bus::j1939::SpnCatalog;
use j84_core::{ModuleRecord, Outcome, SectionCode, VehicleInformation};

use super::table::{MandatorySpn, ModuleScope};
use super::{Rule, RuleInput};

/// Mandatory SPN row checked against one engine module
#[derive(Debug, Clone)]
pub struct MandatorySpnRule {
    row: MandatorySpn,
}

impl MandatorySpnRule {
    pub fn new(row: MandatorySpn) -> Self {
        Self { row }
    }
}

impl Rule for MandatorySpnRule {
    fn name(&self) -> &'static str {
        "mandatory-spn"
    }

    fn evaluate(&self, input: &RuleInput<'_>) -> Vec<Outcome> {
        let row = &self.row;
        if row.scope != ModuleScope::Engine
            || !row.applies_to(input.vehicle)
            || !row.applies_to_module(input.module)
            || input.module.supports_spn(row.spn)
        {
            return Vec::new();
        }
        vec![Outcome::new(
            row.severity,
            row.section,
            format!(
                "SP {} is not included in DM24 response from {}",
                row.spn,
                input.module.name()
            ),
        )]
    }
}

/// Vehicle-scoped mandatory SPN: at least one OBD module must list it
pub fn missing_vehicle_spn(
    row: &MandatorySpn,
    modules: &[&ModuleRecord],
    vehicle: &VehicleInformation,
) -> Option<Outcome> {
    if row.scope != ModuleScope::Vehicle || !row.applies_to(vehicle) {
        return None;
    }
    let present = modules
        .iter()
        .any(|m| row.applies_to_module(m) && m.supports_spn(row.spn));
    (!present).then(|| {
        Outcome::new(
            row.severity,
            row.section,
            format!("SP {} is not included in DM24 response from any OBD ECU", row.spn),
        )
    })
}

/// Support flag a minimum support list is checked against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupportKind {
    DataStream,
    FreezeFrame,
}

impl SupportKind {
    fn supported(&self, module: &ModuleRecord, spn: u32) -> bool {
        module.supported_spn(spn).is_some_and(|s| match self {
            SupportKind::DataStream => s.data_stream,
            SupportKind::FreezeFrame => s.freeze_frame,
        })
    }

    fn wording(&self) -> &'static str {
        match self {
            SupportKind::DataStream => "data stream",
            SupportKind::FreezeFrame => "expanded freeze frame",
        }
    }
}

/// FAIL for every required SPN that no OBD module supports with `kind`
pub fn missing_minimum_support(
    section: SectionCode,
    required: &[u32],
    kind: SupportKind,
    modules: &[&ModuleRecord],
    catalog: &SpnCatalog,
) -> Vec<Outcome> {
    let mut required = required.to_vec();
    required.sort_unstable();
    required.dedup();

    required
        .into_iter()
        .filter(|spn| !modules.iter().any(|m| m.obd && kind.supported(m, *spn)))
        .map(|spn| {
            Outcome::fail(
                section,
                format!(
                    "SP {} ({}) is not supported for {} by any OBD ECU",
                    spn,
                    catalog.spn_label(spn),
                    kind.wording()
                ),
            )
        })
        .collect()
}
