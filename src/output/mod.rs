//! Output module for crawl results
//!
//! This module handles:
//! - Writing the finalized dataset as JSON lines
//! - Recording and printing run statistics

pub mod stats;

pub use stats::{print_summary, write_summary, RunSummary};

use crate::dataset::Dataset;
use crate::validate::RejectedRecord;
use std::io::{self, Write};

/// Writes one JSON object per record, in dataset order
pub fn write_json_lines<W: Write>(dataset: &Dataset, mut out: W) -> io::Result<()> {
    for record in dataset.iter() {
        serde_json::to_writer(&mut out, record)?;
        out.write_all(b"\n")?;
    }
    out.flush()
}

/// Writes rejected records with their violations as JSON lines
pub fn write_rejections<W: Write>(rejected: &[RejectedRecord], mut out: W) -> io::Result<()> {
    for record in rejected {
        serde_json::to_writer(&mut out, record)?;
        out.write_all(b"\n")?;
    }
    out.flush()
}
