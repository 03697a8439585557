//! Coercion of raw extracted text into typed, schema-checked records

mod validator;
mod value;

pub use validator::{
    FieldSpec, RejectedRecord, Schema, ValidatedRecord, ValidationOutcome, Validator, Violation,
    ViolationKind,
};
pub use value::{coerce, collapse_whitespace, Value, ValueType};
