//! 6.1.26 Data stream
//!
//! Listens to the broadcast traffic, checks periods and availability of
//! every supported data stream SPN, requests what was not broadcast and
//! evaluates the GHG tracking arrays of each OBD module.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use j84_bus::Packet;
use j84_core::{Outcome, SectionCode};
use tracing::{debug, info, warn};

use super::{StepContext, StepController};
use crate::broadcast::{build_period_map, BroadcastValidator};
use crate::error::StepResult;
use crate::rules::{
    evaluate_all, BinThresholdRule, DuplicateValueRule, ImplausibleValueRule, Rule, RuleInput,
    TrackingSummary,
};

pub struct DataStreamStep;

#[async_trait]
impl StepController for DataStreamStep {
    fn part(&self) -> u8 {
        1
    }

    fn step(&self) -> u8 {
        26
    }

    fn name(&self) -> &'static str {
        "Data Stream"
    }

    async fn run(&self, ctx: &mut StepContext<'_>) -> StepResult<()> {
        let period_section = SectionCode::new(1, 26, 2, 'a');
        let missing_section = SectionCode::new(1, 26, 6, 'a');

        let (rules, catalog) = (ctx.rules, ctx.catalog);
        let validator = BroadcastValidator::new(catalog, rules.max_period_factor);
        let non_broadcast = validator.non_broadcast_pgns();
        let value_rules: Vec<Box<dyn Rule>> = vec![
            Box::new(DuplicateValueRule {
                section: SectionCode::new(1, 26, 6, 'b'),
            }),
            Box::new(ImplausibleValueRule {
                section: SectionCode::new(1, 26, 6, 'c'),
            }),
        ];

        let tracking = &rules.tracking;
        let mut tracking_rules: Vec<BinThresholdRule> = tracking
            .columns
            .iter()
            .map(|column| BinThresholdRule::new(tracking, column))
            .collect();
        tracking_rules.sort_by_key(|rule| rule.column.value_section);
        let tracking_pgns: BTreeSet<u32> = tracking_rules.iter().map(|r| r.column.pgn).collect();
        let tracking_spns: BTreeSet<u32> = tracking_rules
            .iter()
            .flat_map(|r| r.spns.iter().copied())
            .collect();

        let window = ctx.engine.timing().broadcast_listen();
        let listen_start = ctx.engine.bus_time();
        let traffic = ctx.engine.read_bus(window).await?;
        let listen = listen_start..listen_start + window;
        ctx.check_imposter();
        info!(frames = traffic.len(), "Broadcast listen complete");
        let map = build_period_map(&traffic);

        // Global replies are shared by all modules; each PGN is asked once
        let mut global_replies: BTreeMap<u32, Vec<Packet>> = BTreeMap::new();

        for address in ctx.registry.obd_addresses() {
            if ctx.should_stop() {
                return Ok(());
            }
            let module = ctx.registry.get_module(address)?.clone();
            let expected: Vec<u32> = module
                .data_stream_spns()
                .into_iter()
                .filter(|spn| !tracking_spns.contains(spn))
                .collect();

            validator.report_broadcast_period(&map, &listen, &module, &expected, period_section, |o| {
                ctx.report(o)
            });

            let mut frames: Vec<Packet> = traffic
                .iter()
                .filter(|p| p.source == address)
                .cloned()
                .collect();
            let not_broadcast = validator.collect_not_available_spns(&frames, &expected, &non_broadcast);

            let mut request_pgns: BTreeSet<u32> = BTreeSet::new();
            for spn in &not_broadcast {
                request_pgns.extend(catalog.pgns_for_spn(*spn));
            }
            for spn in &expected {
                request_pgns.extend(
                    catalog
                        .pgns_for_spn(*spn)
                        .iter()
                        .filter(|pgn| non_broadcast.contains(*pgn)),
                );
            }
            for rule in tracking_rules.iter().filter(|r| r.expected_from(&module)) {
                request_pgns.insert(rule.column.pgn);
            }
            debug!(address, pgns = ?request_pgns, "Requesting data stream PGNs");

            for pgn in &request_pgns {
                let result = ctx.engine.request_direct(*pgn, address).await;
                ctx.check_imposter();
                frames.extend(result.packets);
            }

            let unanswered: Vec<u32> = request_pgns
                .iter()
                .copied()
                .filter(|pgn| non_broadcast.contains(pgn))
                .filter(|pgn| !frames.iter().any(|p| p.pgn == *pgn && p.origin.is_request()))
                .collect();
            for pgn in unanswered {
                if !global_replies.contains_key(&pgn) {
                    let replies = match ctx.engine.request_global(pgn).await {
                        Ok(replies) => replies,
                        Err(e) => {
                            warn!(pgn, error = %e, "Global request failed");
                            Vec::new()
                        }
                    };
                    ctx.check_imposter();
                    global_replies.insert(pgn, replies);
                }
                if let Some(replies) = global_replies.get(&pgn) {
                    frames.extend(replies.iter().filter(|p| p.source == address).cloned());
                }
            }

            let (value_frames, short_frames): (Vec<Packet>, Vec<Packet>) = frames
                .iter()
                .filter(|p| !tracking_pgns.contains(&p.pgn))
                .cloned()
                .partition(|p| catalog.truncated(p).is_none());
            ctx.report_all(validator.malformed_frame_outcomes(&module, &short_frames, missing_section));

            // An SPN only ever seen in malformed frames is already reported
            let received: BTreeSet<u32> = value_frames.iter().map(|p| p.pgn).collect();
            let malformed_only: BTreeSet<u32> = short_frames
                .iter()
                .map(|p| p.pgn)
                .filter(|pgn| !received.contains(pgn))
                .collect();
            let candidates: Vec<u32> = expected
                .iter()
                .copied()
                .filter(|spn| {
                    let pgns = catalog.pgns_for_spn(*spn);
                    !(pgns.iter().any(|p| malformed_only.contains(p))
                        && !pgns.iter().any(|p| received.contains(p)))
                })
                .collect();
            validator.collect_and_report_not_available_spns(
                &module,
                &value_frames,
                &candidates,
                &BTreeSet::new(),
                missing_section,
                |o| ctx.report(o),
            );

            let input = RuleInput {
                module: &module,
                packets: &value_frames,
                vehicle: ctx.vehicle,
                catalog: ctx.catalog,
            };
            ctx.report_all(evaluate_all(&value_rules, &input));

            let input = RuleInput {
                packets: &frames,
                ..input
            };
            let outcomes: Vec<Outcome> = tracking_rules
                .iter()
                .flat_map(|rule| rule.evaluate(&input))
                .collect();
            ctx.report_all(outcomes);

            if let Some(summary) = TrackingSummary::build(tracking, catalog, &module, &frames) {
                ctx.listener.on_result(&summary.render());
            }
        }
        Ok(())
    }
}
