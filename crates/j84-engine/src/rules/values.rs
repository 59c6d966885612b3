//! Value rules: implausible and conflicting SPN values

use std::collections::BTreeMap;

use j84_bus::j1939::{SpnDefinition, SpnValue};
use j84_bus::Packet;
use j84_core::{ModuleRecord, Outcome, SectionCode};

use super::{Rule, RuleInput};

/// One frame per PGN: the latest request reply when there is one,
/// otherwise the latest broadcast
pub fn preferred_frames(packets: &[Packet]) -> BTreeMap<u32, &Packet> {
    let mut selected: BTreeMap<u32, &Packet> = BTreeMap::new();
    for packet in packets {
        match selected.get(&packet.pgn) {
            Some(current) if current.origin.is_request() && !packet.origin.is_request() => {}
            _ => {
                selected.insert(packet.pgn, packet);
            }
        }
    }
    selected
}

/// Decoded values of supported data stream SPNs must be plausible
#[derive(Debug, Clone)]
pub struct ImplausibleValueRule {
    pub section: SectionCode,
}

impl Rule for ImplausibleValueRule {
    fn name(&self) -> &'static str {
        "implausible-value"
    }

    /// Every broadcast frame is judged along with the preferred request
    /// reply; each SPN is reported once, for its first bad value
    fn evaluate(&self, input: &RuleInput<'_>) -> Vec<Outcome> {
        let module = input.module;
        let replies = preferred_frames(input.packets);
        let mut outcomes = Vec::new();

        for spn in module.data_stream_spns() {
            let finding = input.catalog.pgns_for_spn(spn).iter().find_map(|pgn| {
                let def = input.catalog.pgn(*pgn)?.spn(spn)?;
                let reply = replies.get(pgn).filter(|p| p.origin.is_request()).copied();
                input
                    .frames_of(*pgn)
                    .filter(|p| !p.origin.is_request())
                    .chain(reply)
                    .find_map(|packet| self.judge(def, module, packet))
            });
            outcomes.extend(finding);
        }
        outcomes
    }
}

impl ImplausibleValueRule {
    fn judge(&self, def: &SpnDefinition, module: &ModuleRecord, packet: &Packet) -> Option<Outcome> {
        let spn = def.spn;
        let detail = match def.decode(&packet.data) {
            Some(SpnValue::Valid { value, .. }) if !def.is_plausible(value) => format!(
                "SP {} ({}) value {} {} from {} is outside {} to {}",
                spn,
                def.label,
                value,
                def.unit,
                module.name(),
                def.min,
                def.max
            ),
            Some(SpnValue::Reserved { raw }) => format!(
                "SP {} ({}) from {} is in the reserved range (0x{:X})",
                spn,
                def.label,
                module.name(),
                raw
            ),
            Some(SpnValue::Error { raw }) => format!(
                "SP {} ({}) from {} reports an error indicator (0x{:X})",
                spn,
                def.label,
                module.name(),
                raw
            ),
            _ => return None,
        };
        Some(Outcome::fail(self.section, detail))
    }
}

/// A request answered more than once must carry the same values
#[derive(Debug, Clone)]
pub struct DuplicateValueRule {
    pub section: SectionCode,
}

impl Rule for DuplicateValueRule {
    fn name(&self) -> &'static str {
        "duplicate-value"
    }

    fn evaluate(&self, input: &RuleInput<'_>) -> Vec<Outcome> {
        let module = input.module;
        let mut replies: BTreeMap<u32, Vec<&Packet>> = BTreeMap::new();
        for packet in input.packets.iter().filter(|p| p.origin.is_request()) {
            replies.entry(packet.pgn).or_default().push(packet);
        }

        let mut outcomes = Vec::new();
        for (pgn, packets) in replies.iter().filter(|(_, p)| p.len() > 1) {
            let Some(def) = input.catalog.pgn(*pgn) else {
                continue;
            };
            for spn_def in def.spns.iter().filter(|d| module.supports_spn(d.spn)) {
                let mut values = packets.iter().map(|p| spn_def.decode(&p.data));
                let Some(first) = values.next() else {
                    continue;
                };
                if values.any(|v| v != first) {
                    outcomes.push(Outcome::fail(
                        self.section,
                        format!(
                            "SP {} ({}) was received from {} more than once with different values",
                            spn_def.spn,
                            spn_def.label,
                            module.name()
                        ),
                    ));
                }
            }
        }
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use j84_bus::j1939::SpnCatalog;
    use j84_bus::PacketOrigin;
    use j84_core::{FuelType, ModuleRecord, SupportedSpn, VehicleInformation};
    use pretty_assertions::assert_eq;

    fn engine(spns: &[u32]) -> ModuleRecord {
        ModuleRecord::new(0x00).with_obd(true).with_supported_spns(
            spns.iter().map(|s| SupportedSpn::data_stream(*s, 1)).collect(),
        )
    }

    fn evaluate(rule: &dyn Rule, module: &ModuleRecord, packets: &[Packet]) -> Vec<Outcome> {
        let catalog = SpnCatalog::default();
        let vehicle = VehicleInformation::new(2022, FuelType::Diesel);
        rule.evaluate(&RuleInput {
            module,
            packets,
            vehicle: &vehicle,
            catalog: &catalog,
        })
    }

    #[test]
    fn test_request_reply_takes_precedence() {
        let broadcast = Packet::new(65253, 0, vec![0xFF; 8]).with_ordinal(5);
        let reply = Packet::new(65253, 0, vec![0; 8])
            .with_ordinal(2)
            .with_origin(PacketOrigin::DirectRequest);
        let later = Packet::new(65253, 0, vec![1; 8]).with_ordinal(9);

        let frames = [reply.clone(), broadcast, later];
        let selected = preferred_frames(&frames);
        assert_eq!(selected.get(&65253).map(|p| p.ordinal), Some(2));
    }

    #[test]
    fn test_implausible_and_reserved() {
        let rule = ImplausibleValueRule {
            section: SectionCode::new(1, 26, 6, 'c'),
        };
        let module = engine(&[110, 175]);
        // Coolant 0xFB is reserved; oil temperature not available
        let packet = Packet::new(65262, 0, vec![0xFB, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
        let outcomes = evaluate(&rule, &module, &[packet]);
        assert_eq!(outcomes.len(), 1);
        assert_eq!(
            outcomes[0].message,
            "6.1.26.6.c - SP 110 (Engine Coolant Temperature) from Engine #1 (0) is in the reserved range (0xFB)"
        );

        // 0xFA -> 210 °C, the top of the plausible range
        let packet = Packet::new(65262, 0, vec![0xFA, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
        assert!(evaluate(&rule, &module, &[packet]).is_empty());
    }

    #[test]
    fn test_earlier_broadcast_is_judged() {
        let rule = ImplausibleValueRule {
            section: SectionCode::new(1, 26, 6, 'c'),
        };
        let module = engine(&[110]);
        let reserved = Packet::new(65262, 0, vec![0xFB, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
        let also_reserved = Packet::new(65262, 0, vec![0xFC, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
        let valid = Packet::new(65262, 0, vec![0x5A, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);

        let outcomes = evaluate(&rule, &module, &[reserved, also_reserved, valid.clone()]);
        assert_eq!(outcomes.len(), 1);
        assert_eq!(
            outcomes[0].message,
            "6.1.26.6.c - SP 110 (Engine Coolant Temperature) from Engine #1 (0) is in the reserved range (0xFB)"
        );

        // Only the preferred request reply is judged, not superseded replies
        let stale_reply = Packet::new(65262, 0, vec![0xFB, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF])
            .with_origin(PacketOrigin::DirectRequest);
        let reply = valid.with_origin(PacketOrigin::DirectRequest);
        assert!(evaluate(&rule, &module, &[stale_reply, reply]).is_empty());
    }

    #[test]
    fn test_error_indicator() {
        let rule = ImplausibleValueRule {
            section: SectionCode::new(1, 26, 6, 'c'),
        };
        let module = engine(&[190]);
        let packet = Packet::new(61444, 0, vec![0xFF, 0x7D, 0x7D, 0x00, 0xFE, 0xFF, 0xFF, 0xFF]);
        let outcomes = evaluate(&rule, &module, &[packet]);
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].message.contains("reports an error indicator (0xFE00)"));
    }

    #[test]
    fn test_duplicate_values() {
        let rule = DuplicateValueRule {
            section: SectionCode::new(1, 26, 6, 'b'),
        };
        let module = engine(&[247, 249]);
        let first = Packet::new(65253, 0, vec![10, 0, 0, 0, 5, 0, 0, 0]).with_origin(PacketOrigin::DirectRequest);
        let second = Packet::new(65253, 0, vec![11, 0, 0, 0, 5, 0, 0, 0]).with_origin(PacketOrigin::DirectRequest);

        let outcomes = evaluate(&rule, &module, &[first.clone(), second]);
        assert_eq!(outcomes.len(), 1);
        assert_eq!(
            outcomes[0].message,
            "6.1.26.6.b - SP 247 (Engine Total Hours of Operation) was received from Engine #1 (0) more than once with different values"
        );

        assert!(evaluate(&rule, &module, &[first.clone(), first]).is_empty());
    }
}
