//! Output formatting for j84 (table, json, csv) and the console listener

use clap::ValueEnum;
use colored::Colorize;
use j84_core::{Outcome, RecordingListener, ResultsListener, Severity};
use serde::Serialize;
use tabled::{Table, Tabled};

/// Output format options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
    /// CSV format
    Csv,
}

/// Context for output rendering
pub struct OutputContext {
    pub format: OutputFormat,
    pub quiet: bool,
}

impl OutputContext {
    pub fn new(format: OutputFormat, no_color: bool, quiet: bool) -> Self {
        if no_color {
            colored::control::set_override(false);
        }
        Self { format, quiet }
    }

    /// Whether live output goes to the terminal as it happens
    pub fn streaming(&self) -> bool {
        self.format == OutputFormat::Table && !self.quiet
    }

    pub fn success(&self, msg: &str) {
        if !self.quiet {
            println!("{}", msg.green());
        }
    }

    pub fn info(&self, msg: &str) {
        if !self.quiet {
            println!("{}", msg);
        }
    }

    pub fn error(&self, msg: &str) {
        eprintln!("{}", msg.red());
    }

    /// Print rows in the configured format
    pub fn print<T: Tabled + Serialize>(&self, data: &[T]) {
        match self.format {
            OutputFormat::Table => {
                if data.is_empty() {
                    if !self.quiet {
                        println!("No data");
                    }
                } else {
                    println!("{}", Table::new(data));
                }
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(data).unwrap_or_else(|_| "[]".to_string())
                );
            }
            OutputFormat::Csv => print_csv(data),
        }
    }

    /// Print any serializable value; tables fall back to pretty JSON
    pub fn print_value<T: Serialize>(&self, value: &T) {
        println!(
            "{}",
            serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
        );
    }

    /// Print key-value pairs
    pub fn print_kv(&self, pairs: &[(&str, String)]) {
        match self.format {
            OutputFormat::Table => {
                for (key, value) in pairs {
                    println!("{}: {}", key.bold(), value);
                }
            }
            OutputFormat::Json => {
                let map: std::collections::BTreeMap<&str, &str> =
                    pairs.iter().map(|(k, v)| (*k, v.as_str())).collect();
                self.print_value(&map);
            }
            OutputFormat::Csv => {
                let keys: Vec<&str> = pairs.iter().map(|(k, _)| *k).collect();
                println!("{}", keys.join(","));
                let values: Vec<String> = pairs.iter().map(|(_, v)| escape_csv(v)).collect();
                println!("{}", values.join(","));
            }
        }
    }
}

fn print_csv<T: Serialize>(data: &[T]) {
    let Some(first) = data.first() else {
        return;
    };
    let serde_json::Value::Object(map) = serde_json::to_value(first).unwrap_or_default() else {
        return;
    };
    let headers: Vec<String> = map.keys().cloned().collect();
    println!("{}", headers.join(","));

    for item in data {
        if let Ok(serde_json::Value::Object(row)) = serde_json::to_value(item) {
            let values: Vec<String> = headers
                .iter()
                .map(|h| {
                    row.get(h)
                        .map(|v| match v {
                            serde_json::Value::String(s) => escape_csv(s),
                            other => escape_csv(&other.to_string()),
                        })
                        .unwrap_or_default()
                })
                .collect();
            println!("{}", values.join(","));
        }
    }
}

/// Escape a value for CSV output
fn escape_csv(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

// =============================================================================
// Console listener
// =============================================================================

/// Prints everything a run reports and keeps a copy for the summary
pub struct ConsoleListener {
    recording: RecordingListener,
    streaming: bool,
}

impl ConsoleListener {
    pub fn new(streaming: bool) -> Self {
        Self {
            recording: RecordingListener::new(),
            streaming,
        }
    }

    pub fn recording(&self) -> &RecordingListener {
        &self.recording
    }
}

pub fn severity_label(severity: Severity) -> String {
    match severity {
        Severity::Fail => severity.to_string().red().bold().to_string(),
        Severity::Warn => severity.to_string().yellow().bold().to_string(),
        Severity::Pass => severity.to_string().green().to_string(),
    }
}

impl ResultsListener for ConsoleListener {
    fn on_outcome(&self, outcome: Outcome) {
        if self.streaming {
            println!("  {}: {}", severity_label(outcome.severity), outcome.message);
        }
        self.recording.on_outcome(outcome);
    }

    fn on_urgent_message(&self, message: &str, title: &str, severity: Severity, detail: &str) {
        eprintln!(
            "{} {}\n  {}\n  {}",
            severity_label(severity),
            title.bold(),
            message,
            detail.dimmed()
        );
        self.recording.on_urgent_message(message, title, severity, detail);
    }

    fn on_progress(&self, message: &str) {
        if self.streaming {
            println!("{}", message.bold());
        }
        self.recording.on_progress(message);
    }

    fn on_result(&self, text: &str) {
        if self.streaming {
            println!("{}", text);
        }
        self.recording.on_result(text);
    }
}

// =============================================================================
// Display types
// =============================================================================

/// Outcome display for the run summary
#[derive(Debug, Tabled, Serialize)]
pub struct OutcomeRow {
    #[tabled(rename = "Step")]
    pub step: String,
    #[tabled(rename = "Result")]
    pub severity: String,
    #[tabled(rename = "Message")]
    pub message: String,
}

impl From<&Outcome> for OutcomeRow {
    fn from(outcome: &Outcome) -> Self {
        Self {
            step: format!("6.{}.{}", outcome.part, outcome.step),
            severity: outcome.severity.to_string(),
            message: outcome.message.clone(),
        }
    }
}

/// Step state display for the run summary
#[derive(Debug, Tabled, Serialize)]
pub struct StepRow {
    #[tabled(rename = "Step")]
    pub step: String,
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "State")]
    pub state: String,
    #[tabled(rename = "Fail")]
    pub fails: usize,
    #[tabled(rename = "Warn")]
    pub warns: usize,
}

/// Module display for the run summary
#[derive(Debug, Tabled, Serialize)]
pub struct ModuleRow {
    #[tabled(rename = "SA")]
    pub address: String,
    #[tabled(rename = "Module")]
    pub name: String,
    #[tabled(rename = "OBD")]
    pub obd: String,
    #[tabled(rename = "Compliance")]
    pub compliance: String,
    #[tabled(rename = "SPNs")]
    pub spns: usize,
}

/// SPN display for the catalog command
#[derive(Debug, Tabled, Serialize)]
pub struct SpnRow {
    #[tabled(rename = "PGN")]
    pub pgn: u32,
    #[tabled(rename = "Acronym")]
    pub acronym: String,
    #[tabled(rename = "SPN")]
    pub spn: u32,
    #[tabled(rename = "Label")]
    pub label: String,
    #[tabled(rename = "Unit")]
    pub unit: String,
    #[tabled(rename = "Period")]
    pub period: String,
}
