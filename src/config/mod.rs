//! Configuration module for record-trawler
//!
//! This module handles loading, parsing, and validating TOML configuration
//! files, including the extraction rule sets and seed targets.
//!
//! # Example
//!
//! ```no_run
//! use record_trawler::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("trawl.toml")).unwrap();
//! println!("Crawler will use max depth: {}", config.crawler.max_depth);
//! ```

mod parser;
mod types;
mod validation;

pub use types::{
    Config, CrawlerConfig, DatasetConfig, RuleConfig, RuleSetConfig, SeedEntry,
    SelectorKindConfig, UserAgentConfig, ValueTypeConfig,
};

pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::{validate_crawler_config, MIN_REQUESTS_PER_SECOND};
