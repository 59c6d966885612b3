//! Compliance step controllers
//!
//! Each step of a part is a [`StepController`]. A step reads the bus
//! through the shared [`RequestEngine`], updates the
//! [`ParameterRegistry`] and hands outcomes to the listener in module
//! address order.

mod data_stream;
mod dm1;
mod dm24;
mod dm5;

pub use data_stream::DataStreamStep;
pub use dm1::ActiveDtcStep;
pub use dm24::SupportedSpnStep;
pub use dm5::DiagnosticReadinessStep;

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use j84_bus::j1939::{pgn_display, SpnCatalog};
use j84_bus::RequestEngine;
use j84_core::{
    module_name, Outcome, ParameterRegistry, ResultsListener, Severity, VehicleInformation,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{StepError, StepResult};
use crate::rules::RuleTable;

/// Cooperative cancellation flag shared with the operator
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Lifecycle of one step in a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    NotStarted,
    Running,
    Completed,
    Stopped,
    FailedFatal,
}

/// Everything a step may touch while it runs
pub struct StepContext<'a> {
    pub registry: &'a mut ParameterRegistry,
    pub engine: &'a RequestEngine,
    pub listener: &'a dyn ResultsListener,
    pub vehicle: &'a VehicleInformation,
    pub rules: &'a RuleTable,
    pub catalog: &'a SpnCatalog,
    stop: &'a StopSignal,
    part: u8,
    step: u8,
    imposter_reported: bool,
    foreign_reported: BTreeSet<u8>,
    stopped: bool,
}

impl<'a> StepContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        part: u8,
        step: u8,
        registry: &'a mut ParameterRegistry,
        engine: &'a RequestEngine,
        listener: &'a dyn ResultsListener,
        vehicle: &'a VehicleInformation,
        rules: &'a RuleTable,
        catalog: &'a SpnCatalog,
        stop: &'a StopSignal,
    ) -> Self {
        Self {
            registry,
            engine,
            listener,
            vehicle,
            rules,
            catalog,
            stop,
            part,
            step,
            imposter_reported: false,
            foreign_reported: BTreeSet::new(),
            stopped: false,
        }
    }

    /// Log and forward one outcome
    pub fn report(&self, outcome: Outcome) {
        match outcome.severity {
            Severity::Fail => warn!(message = %outcome.message, "FAIL"),
            Severity::Warn => info!(message = %outcome.message, "WARN"),
            Severity::Pass => info!(message = %outcome.message, "PASS"),
        }
        self.listener.on_outcome(outcome);
    }

    pub fn report_all(&self, outcomes: impl IntoIterator<Item = Outcome>) {
        for outcome in outcomes {
            self.report(outcome);
        }
    }

    /// Check the stop flag; once seen it sticks for the rest of the step
    pub fn should_stop(&mut self) -> bool {
        if !self.stopped && self.stop.is_stopped() {
            info!(part = self.part, step = self.step, "Stop requested");
            self.stopped = true;
        }
        self.stopped
    }

    pub fn was_stopped(&self) -> bool {
        self.stopped
    }

    /// Report a second device on the tool address, at most once per step,
    /// and every module that answered a request addressed to another one,
    /// once per source and step
    pub fn check_imposter(&mut self) {
        for foreign in self.engine.take_foreign_responses() {
            if !self.foreign_reported.insert(foreign.source) {
                continue;
            }
            let message = format!(
                "Unexpected {} response from SA 0x{:02X} to a request sent to {} observed. Test results uncertain.",
                pgn_display(foreign.pgn),
                foreign.source,
                module_name(foreign.destination)
            );
            self.report(Outcome::unsectioned(
                self.part,
                self.step,
                Severity::Warn,
                message.clone(),
            ));
            self.listener.on_urgent_message(
                &message,
                &format!("Unexpected responder {}", module_name(foreign.source)),
                Severity::Warn,
                "A module answered a destination specific request addressed to another module",
            );
        }

        if self.imposter_reported || !self.engine.imposter_detected() {
            return;
        }
        self.imposter_reported = true;

        let address = self.engine.tool_address();
        let message = format!(
            "Unexpected Service Tool Message from SA 0x{:02X} observed. Test results uncertain.",
            address
        );
        self.report(Outcome::unsectioned(
            self.part,
            self.step,
            Severity::Warn,
            message.clone(),
        ));
        self.listener.on_urgent_message(
            &message,
            &format!("Second device using SA 0x{:02X}", address),
            Severity::Warn,
            "Another device is transmitting with the service tool source address",
        );
    }
}

/// One step of a part
#[async_trait]
pub trait StepController: Send + Sync {
    fn part(&self) -> u8;

    fn step(&self) -> u8;

    /// Title shown in progress messages
    fn name(&self) -> &'static str;

    async fn run(&self, ctx: &mut StepContext<'_>) -> StepResult<()>;
}

/// Steps of `part` in run order
pub fn part_steps(part: u8) -> Vec<Box<dyn StepController>> {
    match part {
        1 => vec![
            Box::new(DiagnosticReadinessStep),
            Box::new(SupportedSpnStep),
            Box::new(ActiveDtcStep),
            Box::new(DataStreamStep),
        ],
        _ => Vec::new(),
    }
}

/// Look up one step controller
pub fn step_controller(part: u8, step: u8) -> StepResult<Box<dyn StepController>> {
    part_steps(part)
        .into_iter()
        .find(|s| s.step() == step)
        .ok_or(StepError::UnknownStep { part, step })
}


#[cfg(test)]
mod tests {
    use super::test_support::Harness;
    use super::*;
    use pretty_assertions::assert_eq;

    struct ImposterProbe;

    #[async_trait]
    impl StepController for ImposterProbe {
        fn part(&self) -> u8 {
            1
        }
        fn step(&self) -> u8 {
            99
        }
        fn name(&self) -> &'static str {
            "probe"
        }
        async fn run(&self, ctx: &mut StepContext<'_>) -> StepResult<()> {
            ctx.check_imposter();
            ctx.check_imposter();
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_imposter_reported_once_per_step() {
        let mut harness = Harness::new();
        harness.mock.set_imposter(true);

        harness.run(&ImposterProbe).await.unwrap();
        harness.run(&ImposterProbe).await.unwrap();

        assert_eq!(
            harness.messages(),
            vec![
                "WARN: Unexpected Service Tool Message from SA 0xF9 observed. Test results uncertain."
                    .to_string();
                2
            ]
        );
        let urgent = harness.listener.urgent_messages();
        assert_eq!(urgent.len(), 2);
        assert_eq!(urgent[0].title, "Second device using SA 0xF9");
    }

    struct ForeignReplyCheck;

    #[async_trait]
    impl StepController for ForeignReplyCheck {
        fn part(&self) -> u8 {
            1
        }
        fn step(&self) -> u8 {
            98
        }
        fn name(&self) -> &'static str {
            "foreign reply"
        }
        async fn run(&self, ctx: &mut StepContext<'_>) -> StepResult<()> {
            ctx.engine.request_direct(j84_bus::j1939::pgn::DM5, 0x00).await;
            ctx.check_imposter();
            ctx.engine.request_direct(j84_bus::j1939::pgn::DM5, 0x00).await;
            ctx.check_imposter();
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_foreign_responder_reported_once_per_source() {
        let mut harness = Harness::new();
        harness
            .mock
            .set_response(j84_bus::j1939::pgn::DM5, 0x00, vec![0x00, 0x00, 0x13, 0, 0, 0, 0, 0]);
        harness
            .mock
            .add_crosstalk(j84_bus::j1939::pgn::DM5, 0x00, 0x03, vec![0x00, 0x00, 0x05, 0, 0, 0, 0, 0]);

        harness.run(&ForeignReplyCheck).await.unwrap();

        assert_eq!(
            harness.messages(),
            vec![
                "WARN: Unexpected DM5 response from SA 0x03 to a request sent to Engine #1 (0) observed. Test results uncertain."
            ]
        );
        let urgent = harness.listener.urgent_messages();
        assert_eq!(urgent.len(), 1);
        assert_eq!(urgent[0].title, "Unexpected responder Transmission #1 (3)");
        assert_eq!(harness.engine.events().imposter_count(), 0);
    }

    #[tokio::test]
    async fn test_no_imposter_no_outcome() {
        let mut harness = Harness::new();
        harness.run(&ImposterProbe).await.unwrap();
        assert!(harness.listener.outcomes().is_empty());
    }

    #[test]
    fn test_stop_signal_shared() {
        let stop = StopSignal::new();
        let handle = stop.clone();
        handle.stop();
        assert!(stop.is_stopped());
        stop.reset();
        assert!(!handle.is_stopped());
    }

    #[test]
    fn test_part_one_step_order() {
        let steps: Vec<u8> = part_steps(1).iter().map(|s| s.step()).collect();
        assert_eq!(steps, vec![3, 4, 15, 26]);
        assert!(matches!(
            step_controller(1, 7),
            Err(StepError::UnknownStep { part: 1, step: 7 })
        ));
        assert!(part_steps(2).is_empty());
    }
}
