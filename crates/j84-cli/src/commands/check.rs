//! Check-config command - validate a configuration file

use anyhow::Result;
use j84_bus::TransportConfig;
use j84_engine::ComplianceConfig;

use crate::output::{OutputContext, OutputFormat};

/// Print the resolved configuration
pub fn check_config(config: &ComplianceConfig, ctx: &OutputContext) -> Result<()> {
    if ctx.format == OutputFormat::Json {
        ctx.print_value(config);
        return Ok(());
    }

    let bus = match &config.bus {
        TransportConfig::Mock(mock) => format!(
            "mock ({} modules, {} broadcasts)",
            mock.modules.len(),
            mock.broadcasts.len()
        ),
        TransportConfig::Replay(replay) => format!("replay {}", replay.path.display()),
    };
    let steps = if config.run.steps.is_empty() {
        "all".to_string()
    } else {
        config
            .run
            .steps
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    };
    ctx.print_kv(&[
        ("Engine model year", config.vehicle.engine_model_year.to_string()),
        ("Fuel type", config.vehicle.fuel_type.to_string()),
        ("Bus", bus),
        ("Part", config.run.part.to_string()),
        ("Steps", steps),
        ("Mandatory SPN rows", config.rules.mandatory_spns.len().to_string()),
        ("Max period factor", config.rules.max_period_factor.to_string()),
    ]);
    if ctx.format == OutputFormat::Table && !ctx.quiet {
        println!();
        println!("{}", toml::to_string_pretty(config)?);
    }
    ctx.success("Configuration is valid");
    Ok(())
}
