//! Run statistics
//!
//! This module provides the counters collected during a crawl and their
//! human readable rendering.

use crate::crawler::FetchErrorKind;
use crate::state::TargetState;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::time::Duration;

/// Crawl statistics summary
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    /// Seeds supplied to the run
    pub seeds: usize,

    /// Targets admitted to the work queue, seeds included
    pub targets_admitted: usize,

    /// Count of targets by terminal state
    pub targets_by_state: BTreeMap<&'static str, usize>,

    /// Queued targets never started because the run was cancelled
    pub unstarted: usize,

    /// Failed targets by error kind
    pub failures_by_kind: BTreeMap<String, usize>,

    pub records_inserted: usize,
    pub records_duplicate: usize,
    pub records_rejected: usize,

    /// Optional-field violations on accepted records
    pub warnings: usize,

    /// Records in the finalized dataset
    pub dataset_records: usize,

    /// Follow-up links extracted from pages
    pub links_discovered: usize,
    pub links_duplicate: usize,
    pub links_beyond_depth: usize,
    pub links_over_limit: usize,

    pub cancelled: bool,

    #[serde(serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u128(d.as_millis())
}

impl RunSummary {
    pub fn record_state(&mut self, state: TargetState) {
        *self.targets_by_state.entry(state.as_str()).or_default() += 1;
    }

    pub fn record_failure(&mut self, kind: FetchErrorKind) {
        *self.failures_by_kind.entry(kind.to_string()).or_default() += 1;
    }

    /// Targets that ended in `state`
    pub fn count(&self, state: TargetState) -> usize {
        self.targets_by_state
            .get(state.as_str())
            .copied()
            .unwrap_or(0)
    }

    /// Targets that reached any terminal state
    pub fn finished(&self) -> usize {
        TargetState::terminal_states()
            .iter()
            .map(|s| self.count(*s))
            .sum()
    }
}

/// Writes statistics in a formatted manner
///
/// # Arguments
///
/// * `summary` - The statistics to display
/// * `out` - Destination, normally stderr so stdout stays machine readable
pub fn write_summary<W: Write>(summary: &RunSummary, mut out: W) -> io::Result<()> {
    writeln!(out, "=== Crawl Statistics ===\n")?;

    writeln!(out, "Overview:")?;
    writeln!(out, "  Seeds: {}", summary.seeds)?;
    writeln!(out, "  Targets admitted: {}", summary.targets_admitted)?;
    writeln!(out, "  Elapsed: {:.1}s", summary.elapsed.as_secs_f64())?;
    if summary.cancelled {
        writeln!(out, "  Run was cancelled; {} target(s) never started", summary.unstarted)?;
    }
    writeln!(out)?;

    writeln!(out, "Targets by State:")?;
    let finished = summary.finished();
    for state in TargetState::terminal_states() {
        let count = summary.count(state);
        let percentage = if finished > 0 {
            (count as f64 / finished as f64) * 100.0
        } else {
            0.0
        };
        writeln!(out, "  {}: {} ({:.1}%)", state, count, percentage)?;
    }
    writeln!(out)?;

    writeln!(out, "Records:")?;
    writeln!(out, "  Inserted: {}", summary.records_inserted)?;
    writeln!(out, "  Duplicates: {}", summary.records_duplicate)?;
    writeln!(out, "  Rejected: {}", summary.records_rejected)?;
    writeln!(out, "  Warnings: {}", summary.warnings)?;
    writeln!(out, "  In dataset: {}", summary.dataset_records)?;
    writeln!(out)?;

    writeln!(out, "Links:")?;
    writeln!(out, "  Discovered: {}", summary.links_discovered)?;
    writeln!(out, "  Already seen: {}", summary.links_duplicate)?;
    writeln!(out, "  Beyond max depth: {}", summary.links_beyond_depth)?;
    writeln!(out, "  Over target limit: {}", summary.links_over_limit)?;

    if !summary.failures_by_kind.is_empty() {
        writeln!(out)?;
        writeln!(out, "Error Summary:")?;
        let mut error_counts: Vec<_> = summary.failures_by_kind.iter().collect();
        error_counts.sort_by(|a, b| b.1.cmp(a.1));

        for (kind, count) in error_counts {
            writeln!(out, "  {}: {}", kind, count)?;
        }
    }

    Ok(())
}

/// Prints statistics to stderr
pub fn print_summary(summary: &RunSummary) {
    // stderr going away is not worth failing the run over
    let _ = write_summary(summary, io::stderr().lock());
}
