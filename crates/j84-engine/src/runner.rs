//! Part runner
//!
//! Owns the registry and the request engine for one run and executes
//! the selected steps in order. A stop request ends the current step at
//! its next module boundary; later steps are left not started.

use std::sync::Arc;

use j84_bus::j1939::SpnCatalog;
use j84_bus::{create_transport, EventLog, RequestEngine, RequestPolicy, TransportAdapter};
use j84_core::{ParameterRegistry, ResultsListener};
use serde::Serialize;
use tracing::{error, info};

use crate::config::ComplianceConfig;
use crate::error::{StepError, StepResult};
use crate::steps::{part_steps, StepContext, StepController, StepState, StopSignal};

/// How one step of a run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub part: u8,
    pub step: u8,
    pub name: String,
    pub state: StepState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Step states of a finished run, in run order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub steps: Vec<StepReport>,
}

impl RunReport {
    pub fn state_of(&self, step: u8) -> Option<StepState> {
        self.steps.iter().find(|s| s.step == step).map(|s| s.state)
    }

    /// Every step ran to completion
    pub fn is_complete(&self) -> bool {
        self.steps.iter().all(|s| s.state == StepState::Completed)
    }
}

/// Runs the steps of one part against a transport
pub struct PartRunner {
    config: ComplianceConfig,
    catalog: SpnCatalog,
    engine: RequestEngine,
    registry: ParameterRegistry,
    steps: Vec<Box<dyn StepController>>,
    stop: StopSignal,
}

impl PartRunner {
    /// Runner over an existing transport
    pub fn new(config: ComplianceConfig, transport: Arc<dyn TransportAdapter>) -> StepResult<Self> {
        let part = config.run.part;
        let mut steps = part_steps(part);
        if let Some(step) = config
            .run
            .steps
            .iter()
            .find(|s| !steps.iter().any(|c| c.step() == **s))
        {
            return Err(StepError::UnknownStep { part, step: *step });
        }
        if !config.run.steps.is_empty() {
            steps.retain(|s| config.run.steps.contains(&s.step()));
        }

        let engine = RequestEngine::new(
            transport,
            RequestPolicy::from_config(&config.requests),
            config.timing.clone(),
        );
        Ok(Self {
            catalog: config.catalog(),
            config,
            engine,
            registry: ParameterRegistry::new(),
            steps,
            stop: StopSignal::new(),
        })
    }

    /// Runner over the transport named in the configuration
    pub async fn connect(config: ComplianceConfig) -> StepResult<Self> {
        let transport = create_transport(&config.bus).await?;
        Self::new(config, transport)
    }

    /// Handle for requesting a stop from another task
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn registry(&self) -> &ParameterRegistry {
        &self.registry
    }

    pub fn events(&self) -> &EventLog {
        self.engine.events()
    }

    pub fn config(&self) -> &ComplianceConfig {
        &self.config
    }

    /// (part, step, name) of every selected step
    pub fn step_names(&self) -> Vec<(u8, u8, &'static str)> {
        self.steps
            .iter()
            .map(|s| (s.part(), s.step(), s.name()))
            .collect()
    }

    /// Run every selected step. The registry starts empty.
    pub async fn run(&mut self, listener: &dyn ResultsListener) -> RunReport {
        self.registry.clear();
        self.stop.reset();
        let mut report = RunReport::default();

        for step in &self.steps {
            let mut entry = StepReport {
                part: step.part(),
                step: step.step(),
                name: step.name().to_string(),
                state: StepState::NotStarted,
                error: None,
            };
            if self.stop.is_stopped() {
                report.steps.push(entry);
                continue;
            }

            entry.state = StepState::Running;
            info!(part = entry.part, step = entry.step, name = %entry.name, "Step started");
            listener.on_progress(&format!("Step 6.{}.{} - {}", entry.part, entry.step, entry.name));

            let mut ctx = StepContext::new(
                entry.part,
                entry.step,
                &mut self.registry,
                &self.engine,
                listener,
                &self.config.vehicle,
                &self.config.rules,
                &self.catalog,
                &self.stop,
            );
            let result = step.run(&mut ctx).await;
            let stopped = ctx.was_stopped() || self.stop.is_stopped();

            entry.state = match result {
                Err(e) => {
                    error!(part = entry.part, step = entry.step, error = %e, "Step failed");
                    entry.error = Some(e.to_string());
                    StepState::FailedFatal
                }
                Ok(()) if stopped => StepState::Stopped,
                Ok(()) => StepState::Completed,
            };
            info!(part = entry.part, step = entry.step, state = ?entry.state, "Step finished");
            report.steps.push(entry);
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use j84_bus::j1939::{dm5, pgn};
    use j84_bus::transport::mock::MockTransportAdapter;
    use j84_core::{FuelType, Outcome, RecordingListener, Severity, VehicleInformation};
    use pretty_assertions::assert_eq;

    fn config(steps: Vec<u8>) -> ComplianceConfig {
        let mut config = ComplianceConfig {
            vehicle: VehicleInformation::new(2022, FuelType::Diesel),
            ..Default::default()
        };
        config.run.steps = steps;
        config
    }

    /// Stops the run as soon as the first outcome arrives
    #[derive(Default)]
    struct StopOnOutcome {
        inner: RecordingListener,
        stop: parking_lot::Mutex<Option<StopSignal>>,
    }

    impl ResultsListener for StopOnOutcome {
        fn on_outcome(&self, outcome: Outcome) {
            if let Some(stop) = self.stop.lock().as_ref() {
                stop.stop();
            }
            self.inner.on_outcome(outcome);
        }
        fn on_urgent_message(&self, message: &str, title: &str, severity: Severity, detail: &str) {
            self.inner.on_urgent_message(message, title, severity, detail);
        }
        fn on_progress(&self, message: &str) {
            self.inner.on_progress(message);
        }
        fn on_result(&self, text: &str) {
            self.inner.on_result(text);
        }
    }

    #[test]
    fn test_unknown_step_rejected() {
        let mock = Arc::new(MockTransportAdapter::new(0xF9));
        assert!(matches!(
            PartRunner::new(config(vec![4, 9]), mock),
            Err(StepError::UnknownStep { part: 1, step: 9 })
        ));
    }

    #[tokio::test]
    async fn test_selected_steps_run_in_order() {
        let mock = Arc::new(MockTransportAdapter::new(0xF9));
        mock.set_response(pgn::DM5, 0x00, dm5::encode(0x13));
        let mut runner = PartRunner::new(config(vec![3, 4]), mock).unwrap();
        let listener = RecordingListener::new();

        let report = runner.run(&listener).await;

        assert_eq!(
            report.steps.iter().map(|s| s.step).collect::<Vec<_>>(),
            vec![3, 4]
        );
        assert!(report.is_complete());
        assert_eq!(
            listener.messages(),
            "Step 6.1.3 - DM5: Diagnostic Readiness 1\nStep 6.1.4 - DM24: SPN Support"
        );
        assert_eq!(runner.registry().obd_addresses(), vec![0x00]);
        // The engine never answered DM24
        assert_eq!(
            listener.outcomes()[0].message,
            "6.1.4.2.a - No DM24 response from Engine #1 (0)"
        );
    }

    #[tokio::test]
    async fn test_stop_leaves_later_steps_not_started() {
        let mock = Arc::new(MockTransportAdapter::new(0xF9));
        mock.set_response(pgn::DM5, 0x00, dm5::encode(0x13));
        mock.set_response(pgn::DM5, 0x01, dm5::encode(0x13));
        let mut runner = PartRunner::new(config(Vec::new()), mock.clone()).unwrap();
        let listener = StopOnOutcome::default();
        *listener.stop.lock() = Some(runner.stop_signal());

        let report = runner.run(&listener).await;

        assert_eq!(report.state_of(3), Some(StepState::Completed));
        assert_eq!(report.state_of(4), Some(StepState::Stopped));
        assert_eq!(report.state_of(15), Some(StepState::NotStarted));
        assert_eq!(report.state_of(26), Some(StepState::NotStarted));
        // Module 1 was never asked for DM24 after the stop
        assert_eq!(listener.inner.outcomes().len(), 1);
        assert_eq!(mock.request_count(pgn::DM24, 0x01), 0);
    }

    #[tokio::test]
    async fn test_transport_loss_is_fatal_for_listening_steps() {
        let mock = Arc::new(MockTransportAdapter::new(0xF9));
        mock.set_connected(false);
        let mut runner = PartRunner::new(config(vec![15]), mock).unwrap();
        let listener = RecordingListener::new();

        let report = runner.run(&listener).await;

        assert_eq!(report.state_of(15), Some(StepState::FailedFatal));
        assert!(report.steps[0].error.is_some());
    }
}
