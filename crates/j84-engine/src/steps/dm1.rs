//! 6.1.15 DM1: Active Diagnostic Trouble Codes
//!
//! DM1 is broadcast, so the step listens instead of requesting. OBD
//! modules that stay silent fail; every sender is checked for active
//! DTCs, MIL state and the SPN conversion method.

use std::collections::BTreeSet;

use async_trait::async_trait;
use j84_bus::j1939::{dm1, pgn};
use j84_bus::Packet;
use j84_core::{Outcome, SectionCode};
use tracing::info;

use super::{StepContext, StepController};
use crate::error::StepResult;
use crate::rules::{
    evaluate_all, ActiveDtcRule, ConversionMethodRule, MilStatusRule, Rule, RuleInput,
};

pub struct ActiveDtcStep;

#[async_trait]
impl StepController for ActiveDtcStep {
    fn part(&self) -> u8 {
        1
    }

    fn step(&self) -> u8 {
        15
    }

    fn name(&self) -> &'static str {
        "DM1: Active Diagnostic Trouble Codes"
    }

    async fn run(&self, ctx: &mut StepContext<'_>) -> StepResult<()> {
        let missing_section = SectionCode::new(1, 15, 2, 'a');
        let rules: Vec<Box<dyn Rule>> = vec![
            Box::new(ActiveDtcRule {
                section: SectionCode::new(1, 15, 2, 'b'),
            }),
            Box::new(MilStatusRule {
                allowance: ctx.rules.mil.clone(),
                section: SectionCode::new(1, 15, 2, 'c'),
                alternate_off_section: SectionCode::new(1, 15, 3, 'a'),
            }),
            Box::new(ConversionMethodRule {
                obd_section: SectionCode::new(1, 15, 2, 'd'),
                non_obd_section: SectionCode::new(1, 15, 3, 'b'),
            }),
        ];

        let window = ctx.engine.timing().dm1_listen();
        let frames: Vec<Packet> = ctx
            .engine
            .read_bus(window)
            .await?
            .into_iter()
            .filter(|p| p.pgn == pgn::DM1)
            .collect();
        ctx.check_imposter();
        info!(frames = frames.len(), "DM1 listen complete");

        let mut addresses: BTreeSet<u8> = ctx.registry.obd_addresses().into_iter().collect();
        addresses.extend(frames.iter().map(|p| p.source));

        for address in addresses {
            if ctx.should_stop() {
                return Ok(());
            }
            let module = ctx.registry.discover(address).clone();
            let module_frames: Vec<Packet> = frames
                .iter()
                .filter(|p| p.source == address)
                .cloned()
                .collect();

            let Some(latest) = module_frames.last() else {
                // Only OBD modules can end up here without frames
                ctx.report(Outcome::fail(
                    missing_section,
                    format!("No DM1 was received from {}", module.name()),
                ));
                continue;
            };
            if let Err(e) = dm1::parse(&latest.data) {
                ctx.report(Outcome::fail(
                    missing_section,
                    format!("Malformed DM1 from {}: {}", module.name(), e),
                ));
                continue;
            }

            let input = RuleInput {
                module: &module,
                packets: &module_frames,
                vehicle: ctx.vehicle,
                catalog: ctx.catalog,
            };
            ctx.report_all(evaluate_all(&rules, &input));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::super::test_support::Harness;
    use super::*;
    use j84_bus::j1939::dm1::{Dtc, LampStatus};
    use j84_core::ModuleRecord;
    use pretty_assertions::assert_eq;

    const PERIOD: Duration = Duration::from_millis(1000);

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
    async fn test_clean_dm1_passes() {
        let mut harness = harness_with(&[0x00]);
        harness
            .mock
            .add_broadcast(pgn::DM1, 0x00, dm1::encode(LampStatus::Off, &[], false), PERIOD);

        harness.run(&ActiveDtcStep).await.unwrap();

        assert!(harness.listener.outcomes().is_empty(), "{:?}", harness.messages());
    }

    #[tokio::test]
    async fn test_silent_obd_module() {
        let mut harness = harness_with(&[0x00, 0x03]);
        harness
            .mock
            .add_broadcast(pgn::DM1, 0x00, dm1::encode(LampStatus::Off, &[], false), PERIOD);

        harness.run(&ActiveDtcStep).await.unwrap();

        assert_eq!(
            harness.messages(),
            vec!["FAIL: 6.1.15.2.a - No DM1 was received from Transmission #1 (3)"]
        );
    }

    #[tokio::test]
    async fn test_active_dtc_and_mil_on() {
        let mut harness = harness_with(&[0x00]);
        harness.mock.add_broadcast(
            pgn::DM1,
            0x00,
            dm1::encode(LampStatus::On, &[Dtc::new(102, 18, 1)], false),
            PERIOD,
        );

        harness.run(&ActiveDtcStep).await.unwrap();

        assert_eq!(
            harness.messages(),
            vec![
                "FAIL: 6.1.15.2.b - OBD ECU Engine #1 (0) reported active DTCs: SPN 102 FMI 18",
                "FAIL: 6.1.15.2.c - OBD ECU Engine #1 (0) reported MIL status of on",
            ]
        );
    }

    #[tokio::test]
    async fn test_alternate_off_warns() {
        let mut harness = harness_with(&[0x00]);
        harness.mock.add_broadcast(
            pgn::DM1,
            0x00,
            dm1::encode(LampStatus::AlternateOff, &[], false),
            PERIOD,
        );

        harness.run(&ActiveDtcStep).await.unwrap();

        assert_eq!(
            harness.messages(),
            vec!["WARN: 6.1.15.3.a - Alternate coding for off has been accepted for Engine #1 (0)"]
        );
    }

    #[tokio::test]
    async fn test_non_obd_sender_conversion_method() {
        let mut harness = harness_with(&[0x00]);
        harness
            .mock
            .add_broadcast(pgn::DM1, 0x00, dm1::encode(LampStatus::Off, &[], false), PERIOD);
        harness
            .mock
            .add_broadcast(pgn::DM1, 0x21, dm1::encode(LampStatus::Off, &[], true), PERIOD);

        harness.run(&ActiveDtcStep).await.unwrap();

        let messages = harness.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("WARN: 6.1.15.3.b - Non-OBD ECU "));
        assert!(harness.registry.contains(0x21));
        assert_eq!(harness.registry.obd_addresses(), vec![0x00]);
    }
}
