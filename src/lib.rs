//! record-trawler: a concurrent structured-record crawler
//!
//! This crate fetches web pages under a rate limit and retry policy, extracts
//! fields with declarative rules, validates them against a schema and
//! aggregates accepted records into a deduplicated, ordered dataset.

pub mod config;
pub mod crawler;
pub mod dataset;
pub mod extract;
pub mod output;
pub mod state;
pub mod url;
pub mod validate;

use thiserror::Error;

/// Main error type for run-fatal failures
///
/// Per-target failures never surface here; they are recorded as terminal
/// target outcomes in the crawl report.
#[derive(Debug, Error)]
pub enum TrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Rule error: {0}")]
    Rule(#[from] RuleError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Worker failed: {0}")]
    Worker(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid extraction rules: {0}")]
    Rule(#[from] RuleError),
}

/// Extraction rule errors, raised once when rule sets are compiled
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("No rule sets defined")]
    Empty,

    #[error("Duplicate rule set '{0}'")]
    DuplicateRuleSet(String),

    #[error("Unknown rule set '{0}'")]
    UnknownRuleSet(String),

    #[error("Duplicate field '{field}' in rule set '{rule_set}'")]
    DuplicateField { rule_set: String, field: String },

    #[error("Rule for field '{field}' is missing option '{option}'")]
    MissingOption { field: String, option: &'static str },

    #[error("Invalid CSS selector '{selector}' for '{field}': {message}")]
    InvalidSelector {
        field: String,
        selector: String,
        message: String,
    },

    #[error("Invalid structural path '{path}' for field '{field}': {message}")]
    InvalidPath {
        field: String,
        path: String,
        message: String,
    },

    #[error("Invalid regex '{pattern}' for field '{field}': {source}")]
    InvalidRegex {
        field: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Rule for field '{field}' sets max-values to 0")]
    ZeroMaxValues { field: String },

    #[error("Capture group {group} does not exist in pattern for field '{field}' ({groups} groups)")]
    InvalidGroup {
        field: String,
        group: usize,
        groups: usize,
    },
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,
}

/// Result type alias for run-level operations
pub type Result<T> = std::result::Result<T, TrawlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlReport, Orchestrator, Target, TargetId};
pub use dataset::{Aggregator, Dataset};
pub use state::TargetState;
pub use validate::{ValidatedRecord, Validator, Value};
