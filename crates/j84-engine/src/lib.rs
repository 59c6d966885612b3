//! j84-engine - J1939-84 compliance steps and rule evaluation
//!
//! This crate runs the steps of a J1939-84 part against a vehicle bus
//! reached through `j84-bus`, keeps what it learns in a
//! [`ParameterRegistry`](j84_core::ParameterRegistry) and reports
//! outcomes through a [`ResultsListener`](j84_core::ResultsListener).
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          PartRunner                              │
//! │   step order, stop signal, registry lifetime, step states        │
//! │                                                                  │
//! │  ┌────────────┐  ┌────────────┐  ┌────────────┐  ┌────────────┐  │
//! │  │ 6.1.3 DM5  │  │ 6.1.4 DM24 │  │ 6.1.15 DM1 │  │6.1.26 Data │  │
//! │  │ readiness  │  │ SPN support│  │ active DTC │  │  stream    │  │
//! │  └─────┬──────┘  └─────┬──────┘  └─────┬──────┘  └─────┬──────┘  │
//! │        └───────────────┴───────┬───────┴───────────────┘         │
//! │                                ▼                                 │
//! │  ┌──────────────────┐  ┌──────────────────┐  ┌────────────────┐  │
//! │  │ rules (RuleTable)│  │BroadcastValidator│  │ RequestEngine  │  │
//! │  │ pure evaluation  │  │ periods, N/A SPNs│  │ (j84-bus)      │  │
//! │  └──────────────────┘  └──────────────────┘  └────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use j84_core::RecordingListener;
//! use j84_engine::{ComplianceConfig, PartRunner};
//!
//! let config = ComplianceConfig::load("vehicle.toml")?;
//! let mut runner = PartRunner::connect(config).await?;
//! let listener = RecordingListener::new();
//! let report = runner.run(&listener).await;
//! ```

pub mod broadcast;
pub mod config;
pub mod error;
pub mod rules;
pub mod runner;
pub mod steps;

pub use broadcast::{build_period_map, BroadcastPeriodMap, BroadcastValidator};
pub use config::{ComplianceConfig, RunConfig};
pub use error::{ConfigError, StepError, StepResult};
pub use rules::RuleTable;
pub use runner::{PartRunner, RunReport, StepReport};
pub use steps::{StepContext, StepController, StepState, StopSignal};
