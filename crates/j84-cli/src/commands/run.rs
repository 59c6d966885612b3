//! Run command - execute the steps of a part

use std::path::PathBuf;

use anyhow::{Context, Result};
use j84_bus::config::ReplayConfig;
use j84_bus::TransportConfig;
use j84_core::Severity;
use j84_engine::{ComplianceConfig, PartRunner, RunReport, StepState};
use tracing::{info, warn};

use crate::output::{ConsoleListener, ModuleRow, OutcomeRow, OutputContext, OutputFormat, StepRow};

/// Command-line overrides for a run
#[derive(Debug, Default)]
pub struct RunOptions {
    pub steps: Vec<u8>,
    /// Replay this candump log instead of the configured bus
    pub replay: Option<PathBuf>,
    /// Write the bus event log as JSON
    pub events: Option<PathBuf>,
}

/// Run the configured part; returns whether any step produced a FAIL
pub async fn run(
    mut config: ComplianceConfig,
    options: RunOptions,
    ctx: &OutputContext,
) -> Result<bool> {
    if !options.steps.is_empty() {
        config.run.steps = options.steps;
    }
    if let Some(path) = options.replay {
        let tool_address = match &config.bus {
            TransportConfig::Replay(replay) => replay.tool_address,
            TransportConfig::Mock(mock) => mock.tool_address,
        };
        config.bus = TransportConfig::Replay(ReplayConfig {
            path,
            tool_address,
            interface: None,
        });
    }

    let mut runner = PartRunner::connect(config)
        .await
        .context("Failed to open the vehicle bus")?;

    let stop = runner.stop_signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current module");
            stop.stop();
        }
    });

    let listener = ConsoleListener::new(ctx.streaming());
    info!(steps = ?runner.step_names(), "Starting run");
    let report = runner.run(&listener).await;

    if let Some(path) = &options.events {
        let events = runner.events().snapshot();
        let json = serde_json::to_string_pretty(&events)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write event log: {}", path.display()))?;
    }

    let outcomes = listener.recording().outcomes();
    let failed = outcomes.iter().any(|o| o.severity == Severity::Fail)
        || report.steps.iter().any(|s| s.state == StepState::FailedFatal);

    match ctx.format {
        OutputFormat::Json => ctx.print_value(&serde_json::json!({
            "steps": report.steps,
            "outcomes": outcomes,
            "results": listener.recording().results(),
        })),
        OutputFormat::Csv => {
            let rows: Vec<OutcomeRow> = outcomes.iter().map(OutcomeRow::from).collect();
            ctx.print(&rows);
        }
        OutputFormat::Table => {
            if !ctx.quiet {
                println!();
                ctx.print(&module_rows(&runner));
            }
            ctx.print(&step_rows(&report, &outcomes));
            if failed {
                ctx.error("Run finished with failures");
            } else {
                ctx.success("Run finished without failures");
            }
        }
    }
    Ok(failed)
}

fn module_rows(runner: &PartRunner) -> Vec<ModuleRow> {
    runner
        .registry()
        .modules()
        .map(|m| ModuleRow {
            address: format!("0x{:02X}", m.address),
            name: m.name(),
            obd: if m.obd { "Yes" } else { "No" }.to_string(),
            compliance: m
                .obd_compliance
                .map(|c| format!("0x{:02X}", c))
                .unwrap_or_else(|| "-".to_string()),
            spns: m.supported_spns().len(),
        })
        .collect()
}

fn step_rows(report: &RunReport, outcomes: &[j84_core::Outcome]) -> Vec<StepRow> {
    report
        .steps
        .iter()
        .map(|s| {
            let count = |severity| {
                outcomes
                    .iter()
                    .filter(|o| o.step == s.step && o.severity == severity)
                    .count()
            };
            StepRow {
                step: format!("6.{}.{}", s.part, s.step),
                name: s.name.clone(),
                state: match &s.error {
                    Some(e) => format!("{:?}: {}", s.state, e),
                    None => format!("{:?}", s.state),
                },
                fails: count(Severity::Fail),
                warns: count(Severity::Warn),
            }
        })
        .collect()
}
