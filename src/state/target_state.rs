/// Target state definitions for tracking crawl progress
///
/// Every target moves through the pipeline stages in order and ends in exactly
/// one terminal state.
use serde::Serialize;
use std::fmt;

/// Represents the current state of a target in the crawl pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetState {
    // ===== Active States =====
    /// Target is admitted to the work queue and waiting for a worker
    Queued,

    /// Target is being fetched (including retries and backoff)
    Fetching,

    /// Fetched payload is being run through the extraction rules
    Parsing,

    /// Extracted records are being validated and aggregated
    Validating,

    // ===== Terminal States =====
    /// At least one record from this target passed validation
    Aggregated,

    /// Records were produced but none passed validation
    Rejected,

    /// The fetch was abandoned (permanent error, retries exhausted, or cancelled)
    Failed,
}

impl TargetState {
    /// Returns true if this is a terminal state (no further transitions)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Aggregated | Self::Rejected | Self::Failed)
    }

    /// Returns true if this is an active state
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns true if `next` is a legal successor of this state
    ///
    /// Transitions follow the pipeline order; any active state may fail
    /// directly because cancellation can interrupt any stage.
    pub fn can_transition_to(&self, next: TargetState) -> bool {
        use TargetState::*;
        match (self, next) {
            (Queued, Fetching) => true,
            (Fetching, Parsing) => true,
            (Parsing, Validating) => true,
            (Validating, Aggregated | Rejected) => true,
            (Parsing, Rejected) => true,
            (from, Failed) => from.is_active(),
            _ => false,
        }
    }

    /// Stable lowercase name used in logs and progress output
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Fetching => "fetching",
            Self::Parsing => "parsing",
            Self::Validating => "validating",
            Self::Aggregated => "aggregated",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
        }
    }

    /// Returns all terminal states in reporting order
    pub fn terminal_states() -> [Self; 3] {
        [Self::Aggregated, Self::Rejected, Self::Failed]
    }
}

impl fmt::Display for TargetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
