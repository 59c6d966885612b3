//! 6.1.3 DM5: Diagnostic Readiness 1
//!
//! Global DM5 request. Every responder is added to the registry and
//! flagged OBD from its compliance byte.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use j84_bus::j1939::{dm5, pgn};
use j84_bus::Packet;
use j84_core::{module_name, Outcome, SectionCode};
use tracing::{info, warn};

use super::{StepContext, StepController};
use crate::error::StepResult;

pub struct DiagnosticReadinessStep;

#[async_trait]
impl StepController for DiagnosticReadinessStep {
    fn part(&self) -> u8 {
        1
    }

    fn step(&self) -> u8 {
        3
    }

    fn name(&self) -> &'static str {
        "DM5: Diagnostic Readiness 1"
    }

    async fn run(&self, ctx: &mut StepContext<'_>) -> StepResult<()> {
        let missing_section = SectionCode::new(1, 3, 2, 'a');

        let packets = match ctx.engine.request_global(pgn::DM5).await {
            Ok(packets) => packets,
            Err(e) => {
                warn!(error = %e, "DM5 request failed");
                Vec::new()
            }
        };
        ctx.check_imposter();

        // Latest reply per source
        let mut replies: BTreeMap<u8, &Packet> = BTreeMap::new();
        for packet in &packets {
            replies.insert(packet.source, packet);
        }

        for (address, packet) in replies {
            if ctx.should_stop() {
                return Ok(());
            }
            ctx.registry.discover(address);
            match dm5::parse(&packet.data) {
                Ok(readiness) => {
                    info!(
                        address,
                        obd = readiness.is_obd(),
                        compliance = readiness.obd_compliance,
                        "DM5 received"
                    );
                    ctx.registry
                        .set_obd(address, readiness.is_obd(), Some(readiness.obd_compliance));
                }
                Err(e) => ctx.report(Outcome::fail(
                    missing_section,
                    format!("Malformed DM5 response from {}: {}", module_name(address), e),
                )),
            }
        }

        if ctx.registry.obd_addresses().is_empty() {
            ctx.report(Outcome::fail(
                missing_section,
                "There needs to be at least one OBD Module",
            ));
            return Ok(());
        }

        let compliance: BTreeSet<u8> = ctx
            .registry
            .obd_modules()
            .filter_map(|m| m.obd_compliance)
            .collect();
        if compliance.len() > 1 {
            ctx.report(Outcome::warn(
                SectionCode::new(1, 3, 3, 'a'),
                "An ECU responded with a value for OBD Compliance that was not identical to other ECUs",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::Harness;
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_obd_modules_registered() {
        let mut harness = Harness::new();
        harness.mock.set_response(pgn::DM5, 0x00, dm5::encode(0x13));
        harness.mock.set_response(pgn::DM5, 0x03, dm5::encode(0x13));
        harness.mock.set_response(pgn::DM5, 0x21, dm5::encode(dm5::OBD_NOT_INTENDED));

        harness.run(&DiagnosticReadinessStep).await.unwrap();

        assert!(harness.listener.outcomes().is_empty());
        assert_eq!(harness.registry.addresses(), vec![0x00, 0x03, 0x21]);
        assert_eq!(harness.registry.obd_addresses(), vec![0x00, 0x03]);
        assert_eq!(
            harness.registry.get_module(0x00).unwrap().obd_compliance,
            Some(0x13)
        );
    }

    #[tokio::test]
    async fn test_no_obd_module() {
        let mut harness = Harness::new();
        harness.mock.set_response(pgn::DM5, 0x21, dm5::encode(dm5::OBD_NOT_INTENDED));

        harness.run(&DiagnosticReadinessStep).await.unwrap();

        assert_eq!(
            harness.messages(),
            vec!["FAIL: 6.1.3.2.a - There needs to be at least one OBD Module"]
        );
    }

    #[tokio::test]
    async fn test_differing_compliance_warns() {
        let mut harness = Harness::new();
        harness.mock.set_response(pgn::DM5, 0x00, dm5::encode(0x13));
        harness.mock.set_response(pgn::DM5, 0x03, dm5::encode(0x14));

        harness.run(&DiagnosticReadinessStep).await.unwrap();

        assert_eq!(
            harness.messages(),
            vec!["WARN: 6.1.3.3.a - An ECU responded with a value for OBD Compliance that was not identical to other ECUs"]
        );
    }

    #[tokio::test]
    async fn test_malformed_reply() {
        let mut harness = Harness::new();
        harness.mock.set_response(pgn::DM5, 0x00, dm5::encode(0x13));
        harness.mock.set_response(pgn::DM5, 0x03, vec![0x00, 0x00, 0x13]);

        harness.run(&DiagnosticReadinessStep).await.unwrap();

        let messages = harness.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("FAIL: 6.1.3.2.a - Malformed DM5 response from Transmission #1 (3)"));
        assert_eq!(harness.registry.obd_addresses(), vec![0x00]);
    }

    #[tokio::test]
    async fn test_disconnected_bus_reports_no_obd() {
        let mut harness = Harness::new();
        harness.mock.set_connected(false);

        harness.run(&DiagnosticReadinessStep).await.unwrap();

        assert_eq!(
            harness.messages(),
            vec!["FAIL: 6.1.3.2.a - There needs to be at least one OBD Module"]
        );
    }
}
