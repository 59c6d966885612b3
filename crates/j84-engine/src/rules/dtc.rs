//! DTC and lamp rules evaluated on a module's DM1

use j84_bus::j1939::dm1::{self, DiagnosticTroubleCodes, LampStatus};
use j84_bus::j1939::pgn;
use j84_core::{Outcome, SectionCode};

use super::table::MilAllowance;
use super::{Rule, RuleInput};

/// Latest well-formed DM1 among the module's frames
pub fn dm1_of(input: &RuleInput<'_>) -> Option<DiagnosticTroubleCodes> {
    input
        .frames_of(pgn::DM1)
        .filter(|p| p.source == input.module.address)
        .filter_map(|p| dm1::parse(&p.data).ok())
        .last()
}

/// An OBD module must not report active DTCs
#[derive(Debug, Clone)]
pub struct ActiveDtcRule {
    pub section: SectionCode,
}

impl Rule for ActiveDtcRule {
    fn name(&self) -> &'static str {
        "active-dtc"
    }

    fn evaluate(&self, input: &RuleInput<'_>) -> Vec<Outcome> {
        if !input.module.obd {
            return Vec::new();
        }
        let Some(dm1) = dm1_of(input) else {
            return Vec::new();
        };
        if !dm1.has_active_dtcs() {
            return Vec::new();
        }
        let codes: Vec<String> = dm1.dtcs.iter().map(|d| d.to_string()).collect();
        vec![Outcome::fail(
            self.section,
            format!(
                "OBD ECU {} reported active DTCs: {}",
                input.module.name(),
                codes.join(", ")
            ),
        )]
    }
}

/// MIL must be in an allowed state
#[derive(Debug, Clone)]
pub struct MilStatusRule {
    pub allowance: MilAllowance,
    /// FAIL for a disallowed state
    pub section: SectionCode,
    /// WARN when alternate off coding is accepted
    pub alternate_off_section: SectionCode,
}

impl Rule for MilStatusRule {
    fn name(&self) -> &'static str {
        "mil-status"
    }

    fn evaluate(&self, input: &RuleInput<'_>) -> Vec<Outcome> {
        if !input.module.obd {
            return Vec::new();
        }
        let Some(dm1) = dm1_of(input) else {
            return Vec::new();
        };
        let mil = dm1.mil;
        if self.allowance.allowed.contains(&mil) {
            return Vec::new();
        }
        if mil == LampStatus::AlternateOff
            && self.allowance.accept_alternate_off
            && self.allowance.allowed.contains(&LampStatus::Off)
        {
            return vec![Outcome::warn(
                self.alternate_off_section,
                format!(
                    "Alternate coding for off has been accepted for {}",
                    input.module.name()
                ),
            )];
        }
        vec![Outcome::fail(
            self.section,
            format!("OBD ECU {} reported MIL status of {}", input.module.name(), mil),
        )]
    }
}

/// SPN conversion method (SPN 1706) must be 0
#[derive(Debug, Clone)]
pub struct ConversionMethodRule {
    /// FAIL for OBD modules
    pub obd_section: SectionCode,
    /// WARN for non-OBD modules
    pub non_obd_section: SectionCode,
}

impl Rule for ConversionMethodRule {
    fn name(&self) -> &'static str {
        "conversion-method"
    }

    fn evaluate(&self, input: &RuleInput<'_>) -> Vec<Outcome> {
        let Some(dm1) = dm1_of(input) else {
            return Vec::new();
        };
        let legacy = dm1.conversion_method || dm1.dtcs.iter().any(|d| d.conversion_method);
        if !legacy {
            return Vec::new();
        }
        let name = input.module.name();
        let outcome = if input.module.obd {
            Outcome::fail(
                self.obd_section,
                format!("OBD ECU {} reported SPN conversion method (SP 1706) equal to binary 1", name),
            )
        } else {
            Outcome::warn(
                self.non_obd_section,
                format!("Non-OBD ECU {} reported SPN conversion method (SP 1706) equal to binary 1", name),
            )
        };
        vec![outcome]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use j84_bus::j1939::dm1::Dtc;
    use j84_bus::j1939::SpnCatalog;
    use j84_bus::Packet;
    use j84_core::{FuelType, ModuleRecord, Severity, VehicleInformation};
    use pretty_assertions::assert_eq;

    fn run(rule: &dyn Rule, module: &ModuleRecord, data: Vec<u8>) -> Vec<Outcome> {
        let catalog = SpnCatalog::default();
        let vehicle = VehicleInformation::new(2022, FuelType::Diesel);
        let packets = vec![Packet::new(pgn::DM1, module.address, data)];
        rule.evaluate(&RuleInput {
            module,
            packets: &packets,
            vehicle: &vehicle,
            catalog: &catalog,
        })
    }

    fn mil_rule() -> MilStatusRule {
        MilStatusRule {
            allowance: MilAllowance::default(),
            section: SectionCode::new(1, 15, 2, 'c'),
            alternate_off_section: SectionCode::new(1, 15, 3, 'a'),
        }
    }

    #[test]
    fn test_active_dtc() {
        let rule = ActiveDtcRule {
            section: SectionCode::new(1, 15, 2, 'b'),
        };
        let engine = ModuleRecord::new(0x00).with_obd(true);

        let clean = dm1::encode(LampStatus::Off, &[], false);
        assert!(run(&rule, &engine, clean).is_empty());

        let faulted = dm1::encode(LampStatus::On, &[Dtc::new(102, 18, 1)], false);
        let outcomes = run(&rule, &engine, faulted);
        assert_eq!(
            outcomes[0].message,
            "6.1.15.2.b - OBD ECU Engine #1 (0) reported active DTCs: SPN 102 FMI 18"
        );
    }

    #[test]
    fn test_mil_states() {
        let rule = mil_rule();
        let engine = ModuleRecord::new(0x00).with_obd(true);

        assert!(run(&rule, &engine, dm1::encode(LampStatus::Off, &[], false)).is_empty());

        let alternate = run(&rule, &engine, dm1::encode(LampStatus::AlternateOff, &[], false));
        assert_eq!(alternate.len(), 1);
        assert_eq!(alternate[0].severity, Severity::Warn);
        assert_eq!(
            alternate[0].message,
            "6.1.15.3.a - Alternate coding for off has been accepted for Engine #1 (0)"
        );

        let on = run(&rule, &engine, dm1::encode(LampStatus::On, &[], false));
        assert_eq!(on[0].message, "6.1.15.2.c - OBD ECU Engine #1 (0) reported MIL status of on");
    }

    #[test]
    fn test_alternate_off_not_accepted() {
        let mut rule = mil_rule();
        rule.allowance.accept_alternate_off = false;
        let engine = ModuleRecord::new(0x00).with_obd(true);
        let outcomes = run(&rule, &engine, dm1::encode(LampStatus::AlternateOff, &[], false));
        assert_eq!(outcomes[0].severity, Severity::Fail);
    }

    #[test]
    fn test_conversion_method_wording() {
        let rule = ConversionMethodRule {
            obd_section: SectionCode::new(1, 15, 2, 'd'),
            non_obd_section: SectionCode::new(1, 15, 3, 'b'),
        };
        let data = dm1::encode(LampStatus::Off, &[], true);

        let obd = run(&rule, &ModuleRecord::new(0x00).with_obd(true), data.clone());
        assert_eq!(
            obd[0].message,
            "6.1.15.2.d - OBD ECU Engine #1 (0) reported SPN conversion method (SP 1706) equal to binary 1"
        );

        let non_obd = run(&rule, &ModuleRecord::new(0x03), data);
        assert_eq!(non_obd[0].severity, Severity::Warn);
        assert_eq!(
            non_obd[0].message,
            "6.1.15.3.b - Non-OBD ECU Transmission #1 (3) reported SPN conversion method (SP 1706) equal to binary 1"
        );

        let clean = run(&rule, &ModuleRecord::new(0x00).with_obd(true), dm1::encode(LampStatus::Off, &[], false));
        assert!(clean.is_empty());
    }
}
