//! Declarative field extraction from HTML pages
//!
//! Rule sets from the configuration are compiled into a [`RuleCatalog`] once.
//! [`parse`] then applies one compiled set to a fetched page, producing raw
//! records for validation and follow-up links for the frontier.

mod parser;
mod record;
mod rules;

pub use parser::parse;
pub use record::{FollowLink, ParsedPage, Provenance, RawRecord, RawValue};
pub use rules::{
    parse_path, CompiledRuleSet, ExtractionRule, FollowRule, PathStep, RuleCatalog, Selector,
};
