//! Schema validation of raw extracted records
//!
//! Validation is pure: the same raw record and schema always produce the same
//! outcome. Every violated field is reported, not just the first one.

use crate::extract::{Provenance, RawRecord, RawValue};
use crate::validate::value::{coerce, ValueType};
use crate::validate::Value;
use regex::Regex;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::sync::Arc;
use thiserror::Error;

/// Declared type and constraints of one record field
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: String,
    pub value_type: ValueType,
    pub required: bool,
    pub multiple: bool,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub pattern: Option<Regex>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            required: false,
            multiple: false,
            min: None,
            max: None,
            pattern: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn multiple(mut self) -> Self {
        self.multiple = true;
        self
    }

    pub fn range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn pattern(mut self, pattern: Regex) -> Self {
        self.pattern = Some(pattern);
        self
    }
}

/// Ordered field declarations of a rule set
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: Vec<FieldSpec>,
}

impl Schema {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// What went wrong with one field value
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ViolationKind {
    #[error("required value is missing")]
    Missing,

    #[error("cannot read '{raw}' as {expected}")]
    Coercion { raw: String, expected: ValueType },

    #[error("{actual} is below the minimum of {min}")]
    BelowMin { actual: f64, min: f64 },

    #[error("{actual} is above the maximum of {max}")]
    AboveMax { actual: f64, max: f64 },

    #[error("'{raw}' does not match pattern '{pattern}'")]
    PatternMismatch { raw: String, pattern: String },
}

/// A constraint violation on a named field
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[error("field '{field}': {kind}")]
pub struct Violation {
    pub field: String,
    #[serde(serialize_with = "serialize_display")]
    pub kind: ViolationKind,
}

fn serialize_display<S: Serializer>(kind: &ViolationKind, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(kind)
}

/// A record that passed validation
///
/// Fields appear in schema order. Optional fields that were missing or
/// violated a constraint are absent, and the latter are listed in `warnings`.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRecord {
    pub provenance: Provenance,
    pub fields: Vec<(String, Option<Value>)>,
    pub warnings: Vec<Violation>,
}

impl ValidatedRecord {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .and_then(|(_, value)| value.as_ref())
    }
}

impl Serialize for ValidatedRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// A record that failed validation, with every violation found
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedRecord {
    pub provenance: Provenance,
    pub violations: Vec<Violation>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationOutcome {
    Accepted(ValidatedRecord),
    Rejected(RejectedRecord),
}

/// Validates raw records against one schema
#[derive(Debug, Clone)]
pub struct Validator {
    schema: Arc<Schema>,
}

impl Validator {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn validate(&self, raw: &RawRecord) -> ValidationOutcome {
        let base = &raw.provenance.url;
        let mut fields = Vec::with_capacity(self.schema.fields.len());
        let mut violations = Vec::new();
        let mut rejected = false;

        for spec in &self.schema.fields {
            let (value, kinds) = check_field(spec, raw.get(&spec.name), base);

            if kinds.is_empty() {
                fields.push((spec.name.clone(), value));
                continue;
            }

            rejected |= spec.required;
            violations.extend(kinds.into_iter().map(|kind| Violation {
                field: spec.name.clone(),
                kind,
            }));
            fields.push((spec.name.clone(), None));
        }

        if rejected {
            ValidationOutcome::Rejected(RejectedRecord {
                provenance: raw.provenance.clone(),
                violations,
            })
        } else {
            ValidationOutcome::Accepted(ValidatedRecord {
                provenance: raw.provenance.clone(),
                fields,
                warnings: violations,
            })
        }
    }
}

fn check_field(spec: &FieldSpec, raw: &RawValue, base: &url::Url) -> (Option<Value>, Vec<ViolationKind>) {
    let texts: Vec<&str> = match raw {
        RawValue::Missing => Vec::new(),
        RawValue::One(text) => vec![text.as_str()],
        RawValue::Many(texts) => texts.iter().map(String::as_str).collect(),
    };
    let texts: Vec<&str> = texts
        .into_iter()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();

    if texts.is_empty() {
        let kinds = if spec.required {
            vec![ViolationKind::Missing]
        } else {
            Vec::new()
        };
        return (None, kinds);
    }

    let mut kinds = Vec::new();
    if spec.multiple {
        let mut values = Vec::with_capacity(texts.len());
        for text in texts {
            match check_scalar(spec, text, base) {
                Ok(value) => values.push(value),
                Err(errs) => kinds.extend(errs),
            }
        }
        (Some(Value::List(values)), kinds)
    } else {
        match check_scalar(spec, texts[0], base) {
            Ok(value) => (Some(value), kinds),
            Err(errs) => (None, errs),
        }
    }
}

fn check_scalar(spec: &FieldSpec, raw: &str, base: &url::Url) -> Result<Value, Vec<ViolationKind>> {
    let mut kinds = Vec::new();

    if let Some(pattern) = &spec.pattern {
        if !pattern.is_match(raw) {
            kinds.push(ViolationKind::PatternMismatch {
                raw: raw.to_string(),
                pattern: pattern.as_str().to_string(),
            });
        }
    }

    let Some(value) = coerce(raw, spec.value_type, base) else {
        kinds.push(ViolationKind::Coercion {
            raw: raw.to_string(),
            expected: spec.value_type,
        });
        return Err(kinds);
    };

    if let Some(actual) = value.range_measure() {
        if let Some(min) = spec.min.filter(|min| actual < *min) {
            kinds.push(ViolationKind::BelowMin { actual, min });
        }
        if let Some(max) = spec.max.filter(|max| actual > *max) {
            kinds.push(ViolationKind::AboveMax { actual, max });
        }
    }

    if kinds.is_empty() {
        Ok(value)
    } else {
        Err(kinds)
    }
}
