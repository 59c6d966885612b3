//! Broadcast validation
//!
//! Groups collected traffic by PGN and source, checks broadcast periods
//! against the catalog and finds supported SPNs that were never seen
//! with a value.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;
use std::time::Duration;

use j84_bus::j1939::SpnCatalog;
use j84_bus::Packet;
use j84_core::{ModuleRecord, Outcome, SectionCode};
use tracing::debug;

use crate::rules::preferred_frames;

/// PGN → source address → broadcast frames in arrival order
pub type BroadcastPeriodMap = BTreeMap<u32, BTreeMap<u8, Vec<Packet>>>;

/// Group broadcast frames by PGN then source; request replies are left out
pub fn build_period_map(frames: &[Packet]) -> BroadcastPeriodMap {
    let mut map = BroadcastPeriodMap::new();
    for frame in frames.iter().filter(|f| !f.origin.is_request()) {
        map.entry(frame.pgn)
            .or_default()
            .entry(frame.source)
            .or_default()
            .push(frame.clone());
    }
    map
}

/// Largest silence inside `window`, counting the lead-in before the
/// first frame and the tail after the last; `None` without frames
pub fn max_gap(frames: &[Packet], window: &Range<Duration>) -> Option<Duration> {
    let first = frames.first()?;
    let last = frames.last()?;
    let lead_in = first.timestamp.saturating_sub(window.start);
    let tail = window.end.saturating_sub(last.timestamp);
    let between = frames
        .windows(2)
        .map(|w| w[1].timestamp.saturating_sub(w[0].timestamp));
    between.chain([lead_in, tail]).max()
}

/// Period and availability checks backed by the SPN catalog
#[derive(Debug, Clone, Copy)]
pub struct BroadcastValidator<'a> {
    catalog: &'a SpnCatalog,
    max_period_factor: f64,
}

impl<'a> BroadcastValidator<'a> {
    pub fn new(catalog: &'a SpnCatalog, max_period_factor: f64) -> Self {
        Self {
            catalog,
            max_period_factor,
        }
    }

    /// PGNs that are only sent on request
    pub fn non_broadcast_pgns(&self) -> BTreeSet<u32> {
        self.catalog
            .pgns()
            .filter(|d| d.is_on_request())
            .map(|d| d.pgn)
            .collect()
    }

    /// Period violations of `module` for `expected_spns` over the listen
    /// `window`
    pub fn broadcast_period_outcomes(
        &self,
        map: &BroadcastPeriodMap,
        window: &Range<Duration>,
        module: &ModuleRecord,
        expected_spns: &[u32],
        section: SectionCode,
    ) -> Vec<Outcome> {
        let mut outcomes = Vec::new();
        for spn in expected_spns {
            for pgn in self.catalog.pgns_for_spn(*spn) {
                let Some(def) = self.catalog.pgn(*pgn) else {
                    continue;
                };
                let Some(nominal) = def.broadcast_period() else {
                    continue;
                };
                let Some(frames) = map.get(pgn).and_then(|m| m.get(&module.address)) else {
                    continue;
                };
                let Some(gap) = max_gap(frames, window) else {
                    continue;
                };
                let limit = nominal.mul_f64(self.max_period_factor);
                if gap > limit {
                    outcomes.push(Outcome::fail(
                        section,
                        format!(
                            "SP {} ({}) broadcast period of {} (PG {}) from {} was {} ms, above the maximum of {} ms",
                            spn,
                            self.catalog.spn_label(*spn),
                            def.acronym,
                            pgn,
                            module.name(),
                            gap.as_millis(),
                            limit.as_millis()
                        ),
                    ));
                }
            }
        }
        outcomes
    }

    /// Hand period violations to `report`; returns how many there were
    pub fn report_broadcast_period(
        &self,
        map: &BroadcastPeriodMap,
        window: &Range<Duration>,
        module: &ModuleRecord,
        expected_spns: &[u32],
        section: SectionCode,
        mut report: impl FnMut(Outcome),
    ) -> usize {
        let outcomes = self.broadcast_period_outcomes(map, window, module, expected_spns, section);
        let count = outcomes.len();
        outcomes.into_iter().for_each(&mut report);
        count
    }

    /// One FAIL per PGN whose payload is shorter than its catalog layout,
    /// for the first such frame
    pub fn malformed_frame_outcomes(
        &self,
        module: &ModuleRecord,
        frames: &[Packet],
        section: SectionCode,
    ) -> Vec<Outcome> {
        let mut seen = BTreeSet::new();
        frames
            .iter()
            .filter_map(|frame| {
                let expected = self.catalog.truncated(frame)?;
                let def = self.catalog.pgn(frame.pgn)?;
                Some((frame, def, expected))
            })
            .filter(|(frame, _, _)| seen.insert(frame.pgn))
            .map(|(frame, def, expected)| {
                Outcome::fail(
                    section,
                    format!(
                        "{} (PG {}) from {} is malformed: {} bytes received, {} expected",
                        def.acronym,
                        frame.pgn,
                        module.name(),
                        frame.len(),
                        expected
                    ),
                )
            })
            .collect()
    }

    /// Candidate SPNs without a value in `frames`, ascending
    ///
    /// SPNs carried only on PGNs in `non_broadcast_pgns` are skipped: they
    /// have to be requested before they can be judged. A request reply
    /// for a PGN takes precedence over broadcasts of it.
    pub fn collect_not_available_spns(
        &self,
        frames: &[Packet],
        candidates: &[u32],
        non_broadcast_pgns: &BTreeSet<u32>,
    ) -> Vec<u32> {
        let selected = preferred_frames(frames);
        let candidates: BTreeSet<u32> = candidates.iter().copied().collect();

        candidates
            .into_iter()
            .filter(|spn| {
                let pgns = self.catalog.pgns_for_spn(*spn);
                if pgns.is_empty() || pgns.iter().all(|p| non_broadcast_pgns.contains(p)) {
                    return false;
                }
                let available = pgns.iter().any(|pgn| {
                    selected
                        .get(pgn)
                        .and_then(|packet| self.catalog.decode(packet, *spn))
                        .is_some_and(|v| !v.is_not_available())
                });
                !available
            })
            .collect()
    }

    /// Hand a FAIL for every candidate SPN without a value to `report`
    /// and return them
    pub fn collect_and_report_not_available_spns(
        &self,
        module: &ModuleRecord,
        frames: &[Packet],
        candidates: &[u32],
        non_broadcast_pgns: &BTreeSet<u32>,
        section: SectionCode,
        mut report: impl FnMut(Outcome),
    ) -> Vec<u32> {
        let missing = self.collect_not_available_spns(frames, candidates, non_broadcast_pgns);
        for spn in &missing {
            report(Outcome::fail(
                section,
                format!(
                    "SP {} ({}) is not available from {}",
                    spn,
                    self.catalog.spn_label(*spn),
                    module.name()
                ),
            ));
        }
        debug!(address = module.address, count = missing.len(), "Not available SPNs reported");
        missing
    }
}
