//! URL handling for crawl targets
//!
//! Normalization produces the canonical form used to deduplicate targets, and
//! link resolution turns extracted hrefs into absolute follow-up URLs.

mod normalize;

pub use normalize::{normalize_url, parse_target_url, resolve_link};

use ::url::Url;

/// Builds the seen-set key for a target
///
/// The same URL crawled under two different rule sets yields two distinct
/// targets, so the rule set name is part of the key.
pub fn seen_key(url: &Url, rule_set: &str) -> String {
    let canonical = normalize_url(url.as_str())
        .map(String::from)
        .unwrap_or_else(|_| url.to_string());
    format!("{rule_set} {canonical}")
}
