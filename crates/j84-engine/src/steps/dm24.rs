//! 6.1.4 DM24: SPN support
//!
//! Destination-specific DM24 to every OBD module. The response replaces
//! the module's supported SPN set; mandatory and minimum support checks
//! run against it once all modules have answered.

use async_trait::async_trait;
use j84_bus::j1939::{dm24, pgn};
use j84_core::{ModuleRecord, Outcome, SectionCode, SupportUpdate};
use tracing::debug;

use super::{StepContext, StepController};
use crate::error::StepResult;
use crate::rules::{
    evaluate_all, missing_minimum_support, missing_vehicle_spn, MandatorySpnRule, Rule,
    RuleInput, SupportKind,
};

pub struct SupportedSpnStep;

#[async_trait]
impl StepController for SupportedSpnStep {
    fn part(&self) -> u8 {
        1
    }

    fn step(&self) -> u8 {
        4
    }

    fn name(&self) -> &'static str {
        "DM24: SPN Support"
    }

    async fn run(&self, ctx: &mut StepContext<'_>) -> StepResult<()> {
        let response_section = SectionCode::new(1, 4, 2, 'a');
        let duplicate_section = SectionCode::new(1, 4, 2, 'i');

        let rules: Vec<Box<dyn Rule>> = ctx
            .rules
            .mandatory_spns
            .iter()
            .cloned()
            .map(|row| Box::new(MandatorySpnRule::new(row)) as Box<dyn Rule>)
            .collect();

        ctx.check_imposter();
        let mut answered = 0usize;
        for address in ctx.registry.obd_addresses() {
            if ctx.should_stop() {
                return Ok(());
            }
            let name = ctx.registry.get_module(address)?.name();
            let result = ctx.engine.request_direct(pgn::DM24, address).await;
            ctx.check_imposter();

            let Some(packet) = result.packet() else {
                ctx.report(Outcome::fail(
                    response_section,
                    format!("No DM24 response from {}", name),
                ));
                continue;
            };
            if result.retry_used() {
                ctx.report(Outcome::fail(
                    response_section,
                    format!("Retry was required to obtain DM24 response from {}", name),
                ));
            }

            let spns = match dm24::parse(&packet.data) {
                Ok(spns) => spns,
                Err(e) => {
                    ctx.report(Outcome::fail(
                        response_section,
                        format!("Malformed DM24 response from {}: {}", name, e),
                    ));
                    continue;
                }
            };
            answered += 1;

            let conflicts = dm24::conflicting_duplicates(&spns);
            let update = ctx
                .registry
                .update_supported_spns(address, spns, packet.ordinal)?;
            debug!(address, ?update, "DM24 applied");
            if update == SupportUpdate::Stale {
                continue;
            }

            let latest = &packet.data;
            if result.has_duplicates() && result.packets.iter().any(|p| p.data != *latest) {
                ctx.report(Outcome::fail(
                    duplicate_section,
                    format!("More than one different DM24 response was received from {}", name),
                ));
            }
            for spn in conflicts {
                ctx.report(Outcome::fail(
                    duplicate_section,
                    format!(
                        "SP {} is listed more than once with different support in DM24 response from {}",
                        spn, name
                    ),
                ));
            }

            let module = ctx.registry.get_module(address)?.clone();
            let input = RuleInput {
                module: &module,
                packets: &result.packets,
                vehicle: ctx.vehicle,
                catalog: ctx.catalog,
            };
            ctx.report_all(evaluate_all(&rules, &input));
        }

        if answered == 0 || ctx.should_stop() {
            return Ok(());
        }

        let modules: Vec<ModuleRecord> = ctx.registry.obd_modules().cloned().collect();
        let modules: Vec<&ModuleRecord> = modules.iter().collect();
        let support = &ctx.rules.minimum_support;

        ctx.report_all(missing_minimum_support(
            SectionCode::new(1, 4, 2, 'b'),
            support.data_stream_for(ctx.vehicle),
            SupportKind::DataStream,
            &modules,
            ctx.catalog,
        ));
        ctx.report_all(missing_minimum_support(
            SectionCode::new(1, 4, 2, 'c'),
            support.freeze_frame_for(ctx.vehicle),
            SupportKind::FreezeFrame,
            &modules,
            ctx.catalog,
        ));
        for row in &ctx.rules.mandatory_spns {
            if let Some(outcome) = missing_vehicle_spn(row, &modules, ctx.vehicle) {
                ctx.report(outcome);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::Harness;
    use super::*;
    use j84_core::{FuelType, ModuleRecord, SupportedSpn, VehicleInformation};
    use pretty_assertions::assert_eq;

    const FULL_DIESEL: [u32; 15] = [
        84, 91, 92, 102, 108, 110, 190, 512, 513, 1761, 12675, 12730, 12783, 12797, 12691,
    ];

    fn support_all(spns: &[u32]) -> Vec<u8> {
        let records: Vec<SupportedSpn> = spns
            .iter()
            .map(|s| SupportedSpn::new(*s, true, true, false, 2))
            .collect();
        dm24::encode(&records)
    }

    fn harness_with(addresses: &[u8]) -> Harness {
        let mut harness = Harness::new();
        for address in addresses {
            harness
                .registry
                .put_module(ModuleRecord::new(*address).with_obd(true));
        }
        harness
    }

    #[tokio::test]
    async fn test_complete_support_passes() {
        let mut harness = harness_with(&[0x00]);
        harness.mock.set_response(pgn::DM24, 0x00, support_all(&FULL_DIESEL));

        harness.run(&SupportedSpnStep).await.unwrap();

        assert!(harness.listener.outcomes().is_empty(), "{:?}", harness.messages());
        assert!(harness.registry.get_module(0x00).unwrap().supports_spn(12675));
    }

    #[tokio::test]
    async fn test_missing_mandatory_spn() {
        let mut harness = harness_with(&[0x00]);
        let spns: Vec<u32> = FULL_DIESEL.iter().copied().filter(|s| *s != 12675).collect();
        harness.mock.set_response(pgn::DM24, 0x00, support_all(&spns));

        harness.run(&SupportedSpnStep).await.unwrap();

        assert_eq!(
            harness.messages(),
            vec!["FAIL: 6.1.4.2.d - SP 12675 is not included in DM24 response from Engine #1 (0)"]
        );
    }

    #[tokio::test]
    async fn test_retry_then_valid_fails_once() {
        let mut harness = harness_with(&[0x00]);
        harness.mock.queue_silence(pgn::DM24, 0x00, 1);
        harness.mock.set_response(pgn::DM24, 0x00, support_all(&FULL_DIESEL));

        harness.run(&SupportedSpnStep).await.unwrap();

        assert_eq!(
            harness.messages(),
            vec!["FAIL: 6.1.4.2.a - Retry was required to obtain DM24 response from Engine #1 (0)"]
        );
        assert_eq!(harness.mock.request_count(pgn::DM24, 0x00), 2);
    }

    #[tokio::test]
    async fn test_silent_module_single_failure() {
        let mut harness = harness_with(&[0x00, 0x03]);
        harness.mock.set_response(pgn::DM24, 0x00, support_all(&FULL_DIESEL));

        harness.run(&SupportedSpnStep).await.unwrap();

        assert_eq!(
            harness.messages(),
            vec!["FAIL: 6.1.4.2.a - No DM24 response from Transmission #1 (3)"]
        );
        assert_eq!(harness.mock.request_count(pgn::DM24, 0x03), 2);
    }

    #[tokio::test]
    async fn test_reply_from_other_module_is_surfaced() {
        let mut harness = harness_with(&[0x00]);
        harness
            .mock
            .add_crosstalk(pgn::DM24, 0x00, 0x03, support_all(&FULL_DIESEL));

        harness.run(&SupportedSpnStep).await.unwrap();

        assert_eq!(
            harness.messages(),
            vec![
                "WARN: Unexpected DM24 response from SA 0x03 to a request sent to Engine #1 (0) observed. Test results uncertain.",
                "FAIL: 6.1.4.2.a - No DM24 response from Engine #1 (0)",
            ]
        );
        assert_eq!(harness.listener.urgent_messages().len(), 1);
        // The foreign reply never lands in the addressed module's record
        assert!(harness.registry.get_module(0x00).unwrap().supported_spns().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_dm24() {
        let mut harness = harness_with(&[0x00]);
        harness.mock.set_response(pgn::DM24, 0x00, vec![0x5C, 0x00, 0x18]);

        harness.run(&SupportedSpnStep).await.unwrap();

        let messages = harness.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("FAIL: 6.1.4.2.a - Malformed DM24 response from Engine #1 (0)"));
    }

    #[tokio::test]
    async fn test_conflicting_duplicate_spn() {
        let mut harness = harness_with(&[0x00]);
        let mut records: Vec<SupportedSpn> = FULL_DIESEL
            .iter()
            .map(|s| SupportedSpn::new(*s, true, true, false, 2))
            .collect();
        records.push(SupportedSpn::new(110, false, true, false, 1));
        harness.mock.set_response(pgn::DM24, 0x00, dm24::encode(&records));

        harness.run(&SupportedSpnStep).await.unwrap();

        assert_eq!(
            harness.messages(),
            vec!["FAIL: 6.1.4.2.i - SP 110 is listed more than once with different support in DM24 response from Engine #1 (0)"]
        );
    }

    #[tokio::test]
    async fn test_two_different_replies() {
        let mut harness = harness_with(&[0x00]);
        let partial: Vec<u32> = FULL_DIESEL.iter().copied().filter(|s| *s != 84).collect();
        harness.mock.set_responses(
            pgn::DM24,
            0x00,
            vec![support_all(&partial), support_all(&FULL_DIESEL)],
        );

        harness.run(&SupportedSpnStep).await.unwrap();

        assert_eq!(
            harness.messages(),
            vec!["FAIL: 6.1.4.2.i - More than one different DM24 response was received from Engine #1 (0)"]
        );
        // The latest reply is the one applied
        assert!(harness.registry.get_module(0x00).unwrap().supports_spn(84));
    }

    #[tokio::test]
    async fn test_vehicle_minimum_support_across_modules() {
        let mut harness = harness_with(&[0x00, 0x03]);
        let engine: Vec<u32> = FULL_DIESEL.iter().copied().filter(|s| *s != 91).collect();
        harness.mock.set_response(pgn::DM24, 0x00, support_all(&engine));
        harness.mock.set_response(pgn::DM24, 0x03, support_all(&[91]));

        harness.run(&SupportedSpnStep).await.unwrap();

        assert!(harness.listener.outcomes().is_empty(), "{:?}", harness.messages());
    }

    #[tokio::test]
    async fn test_electric_vehicle_rows() {
        let mut harness = harness_with(&[0x00]);
        harness.vehicle = VehicleInformation::new(2022, FuelType::BatteryElectric);
        harness.mock.set_response(pgn::DM24, 0x00, support_all(&[84]));

        harness.run(&SupportedSpnStep).await.unwrap();

        assert_eq!(
            harness.messages(),
            vec!["FAIL: 6.1.4.2.b - SP 91 (Accelerator Pedal 1 Position) is not supported for data stream by any OBD ECU"]
        );
    }

    #[tokio::test]
    async fn test_stop_before_first_module() {
        let mut harness = harness_with(&[0x00]);
        harness.stop.stop();

        let stopped = harness.run(&SupportedSpnStep).await.unwrap();

        assert!(stopped);
        assert!(harness.listener.outcomes().is_empty());
        assert!(harness.mock.requests().is_empty());
    }
}
