//! State module for tracking crawl progress
//!
//! `TargetState` is the per-target state machine driven by the orchestrator:
//! `queued → fetching → parsing → validating → {aggregated | rejected | failed}`.

mod target_state;

pub use target_state::TargetState;
