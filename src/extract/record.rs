use crate::crawler::TargetId;
use serde::Serialize;
use url::Url;

/// Where a record came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Provenance {
    /// Target whose page produced the record
    pub target: TargetId,
    /// Final URL of that page, after redirects
    pub url: Url,
}

/// Raw extracted text for one field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawValue {
    /// The rule matched nothing
    Missing,
    One(String),
    Many(Vec<String>),
}

impl RawValue {
    pub fn from_matches(mut matches: Vec<String>, multiple: bool) -> Self {
        match (matches.len(), multiple) {
            (0, _) => Self::Missing,
            (_, true) => Self::Many(matches),
            (_, false) => Self::One(matches.swap_remove(0)),
        }
    }
}

static MISSING: RawValue = RawValue::Missing;

/// Field name to raw text, in rule order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub provenance: Provenance,
    pub fields: Vec<(String, RawValue)>,
}

impl RawRecord {
    /// Raw value of a field; `Missing` when the field was never extracted
    pub fn get(&self, field: &str) -> &RawValue {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map_or(&MISSING, |(_, value)| value)
    }
}

/// A follow-up URL discovered on a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowLink {
    pub url: Url,
    pub rule_set: String,
}

/// Everything extracted from one page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedPage {
    pub records: Vec<RawRecord>,
    pub links: Vec<FollowLink>,
}
