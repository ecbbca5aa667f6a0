//! Keys command implementation.

use super::scenario::Scenario;
use handoff_kv::{KvStore, MemoryKv};
use handoff_protocol::{HandoffEvent, SegmentId};
use serde::Serialize;
use std::path::Path;

/// A persisted event key.
#[derive(Debug, Serialize)]
pub struct KeyEntry {
    /// Full key.
    pub key: String,
    /// Revision of the last write.
    pub revision: i64,
    /// Announced segment.
    pub segment_id: SegmentId,
    /// Event kind: flush, compaction or fake.
    pub kind: &'static str,
    /// Ancestors the segment replaces.
    pub compaction_from: Vec<SegmentId>,
}

/// Runs the keys command.
///
/// Every event of the scenario, steps included, is written to a fresh store
/// and listed in the order a reload would see it.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let scenario = Scenario::load(path)?;
    let prefix = scenario.config().handoff_prefix;
    let kv = MemoryKv::new();
    for event in scenario.all_events() {
        event.validate()?;
        kv.save(&event.key(&prefix), &event.encode()?)?;
    }

    let (entries, _) = kv.load_with_revision(&format!("{prefix}/"))?;
    let mut keys = Vec::with_capacity(entries.len());
    for entry in entries {
        let event = HandoffEvent::decode(&entry.value)?;
        keys.push(KeyEntry {
            key: entry.key,
            revision: entry.mod_revision,
            segment_id: event.segment_id,
            kind: kind(&event),
            compaction_from: event.compaction_from,
        });
    }

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&keys)?);
        }
        _ => {
            for entry in &keys {
                println!(
                    "{:>6}  {}  {} {:?}",
                    entry.revision, entry.key, entry.kind, entry.compaction_from
                );
            }
        }
    }

    Ok(())
}

fn kind(event: &HandoffEvent) -> &'static str {
    if event.is_fake {
        "fake"
    } else if event.created_by_compaction {
        "compaction"
    } else {
        "flush"
    }
}
