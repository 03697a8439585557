//! Aggregation of validated records into the final dataset

mod aggregator;

pub use aggregator::{AddOutcome, Aggregator, Dataset, DedupeKey};
