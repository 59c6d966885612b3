//! Catalog command - list known PGNs and SPNs

use anyhow::{bail, Result};
use j84_engine::ComplianceConfig;

use crate::output::{OutputContext, SpnRow};

/// List the SPN catalog, optionally for one PGN
pub fn catalog(config: &ComplianceConfig, pgn: Option<u32>, ctx: &OutputContext) -> Result<()> {
    let catalog = config.catalog();
    if let Some(pgn) = pgn {
        if catalog.pgn(pgn).is_none() {
            bail!("PGN {} is not in the catalog", pgn);
        }
    }

    let rows: Vec<SpnRow> = catalog
        .pgns()
        .filter(|d| pgn.map_or(true, |p| p == d.pgn))
        .flat_map(|d| {
            d.spns.iter().map(move |s| SpnRow {
                pgn: d.pgn,
                acronym: d.acronym.clone(),
                spn: s.spn,
                label: s.label.clone(),
                unit: s.unit.clone(),
                period: d
                    .broadcast_period_ms
                    .map(|p| format!("{} ms", p))
                    .unwrap_or_else(|| "on request".to_string()),
            })
        })
        .collect();
    ctx.print(&rows);
    Ok(())
}
