//! Simulate command implementation.

use super::scenario::Scenario;
use handoff_kv::KvStore;
use handoff_observer::TickReport;
use handoff_protocol::{CollectionId, SegmentId};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Simulation result.
#[derive(Debug, Serialize)]
pub struct SimulateResult {
    /// Per-tick outcomes.
    pub ticks: Vec<TickSummary>,
    /// Targeted segments per collection after the last tick.
    pub target: BTreeMap<CollectionId, Vec<SegmentId>>,
    /// Event keys still persisted, in write order.
    pub remaining_keys: Vec<String>,
    /// Events accepted over the run.
    pub accepted: u64,
    /// Events rejected over the run.
    pub rejected: u64,
    /// Ancestor events retired over the run.
    pub retired_ancestors: u64,
    /// Keys deleted as malformed over the run.
    pub malformed: u64,
}

/// Outcome of one tick.
#[derive(Debug, Serialize)]
pub struct TickSummary {
    /// Tick number, from 1.
    pub tick: usize,
    /// Accepted segments.
    pub accepted: Vec<SegmentId>,
    /// Rejected segments with the reason.
    pub rejected: Vec<RejectedSegment>,
    /// Retired ancestor segments.
    pub retired: Vec<SegmentId>,
    /// Events left pending.
    pub held: usize,
}

/// A rejected segment.
#[derive(Debug, Serialize)]
pub struct RejectedSegment {
    /// Segment ID.
    pub segment_id: SegmentId,
    /// Why it was rejected.
    pub reason: String,
}

impl TickSummary {
    fn new(tick: usize, report: TickReport) -> Self {
        Self {
            tick,
            accepted: report.accepted,
            rejected: report
                .rejected
                .into_iter()
                .map(|(segment_id, reason)| RejectedSegment {
                    segment_id,
                    reason: reason.to_string(),
                })
                .collect(),
            retired: report.retired,
            held: report.held,
        }
    }
}

/// Runs the simulate command.
///
/// At least `ticks` ticks run, and one more per scenario step.
pub fn run(path: &Path, ticks: usize, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let scenario = Scenario::load(path)?;
    let cluster = scenario.build()?;

    let rounds = ticks.max(scenario.steps.len()).max(1);
    let mut summaries = Vec::with_capacity(rounds);
    for round in 0..rounds {
        if let Some(step) = scenario.steps.get(round) {
            cluster.apply(step)?;
        }
        let report = cluster.observer.tick();
        summaries.push(TickSummary::new(round + 1, report));
    }

    let prefix = format!("{}/", cluster.observer.config().handoff_prefix);
    let (entries, _) = cluster.kv.load_with_revision(&prefix)?;
    let stats = cluster.observer.stats();
    let result = SimulateResult {
        ticks: summaries,
        target: scenario
            .collection_ids()
            .into_iter()
            .map(|collection_id| (collection_id, cluster.target.collection_segments(collection_id)))
            .collect(),
        remaining_keys: entries.into_iter().map(|entry| entry.key).collect(),
        accepted: stats.accepted,
        rejected: stats.rejected,
        retired_ancestors: stats.retired_ancestors,
        malformed: stats.malformed,
    };

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn print_text_output(result: &SimulateResult) {
    println!("Handoff Simulation");
    println!("==================");
    println!();
    for tick in &result.ticks {
        println!(
            "Tick {}: accepted {:?}, retired {:?}, held {}",
            tick.tick, tick.accepted, tick.retired, tick.held
        );
        for rejected in &tick.rejected {
            println!("  rejected {}: {}", rejected.segment_id, rejected.reason);
        }
    }
    println!();
    println!("Target:");
    for (collection_id, segments) in &result.target {
        println!("  [{collection_id}] {segments:?}");
    }
    println!();
    println!("Totals:");
    println!("  Accepted:          {}", result.accepted);
    println!("  Rejected:          {}", result.rejected);
    println!("  Retired ancestors: {}", result.retired_ancestors);
    println!("  Malformed:         {}", result.malformed);

    if !result.remaining_keys.is_empty() {
        println!();
        println!("Pending keys:");
        for key in &result.remaining_keys {
            println!("  {key}");
        }
    }
}
