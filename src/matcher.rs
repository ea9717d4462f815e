//! Structured error-signature matching for single log lines
//!
//! Each line of a watched file is expected to be one JSON object. A line
//! matches when every configured field rule is satisfied by the record.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How a record field is compared against the configured value
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Comparison {
    /// Field value must equal the configured value
    #[default]
    Exact,
    /// Field value must start with (or equal) the configured value
    Prefix,
}

/// A single required field in the error signature
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldRule {
    /// Name of the JSON field
    pub name: String,
    /// Value the field must carry
    pub value: String,
    /// Comparison applied to the field value
    #[serde(default)]
    pub comparison: Comparison,
}

impl FieldRule {
    pub fn exact(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            comparison: Comparison::Exact,
        }
    }

    pub fn prefix(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            comparison: Comparison::Prefix,
        }
    }

    /// Check this rule against a parsed record
    ///
    /// Only string fields can satisfy a rule.
    fn is_satisfied_by(&self, record: &Map<String, Value>) -> bool {
        match record.get(&self.name) {
            Some(Value::String(actual)) => match self.comparison {
                Comparison::Exact => actual == &self.value,
                Comparison::Prefix => actual.starts_with(&self.value),
            },
            _ => false,
        }
    }
}

/// Mapping of required field names to required values
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorSignature {
    pub fields: Vec<FieldRule>,
}

impl Default for ErrorSignature {
    /// `level == "error"` and a message starting with `"Error on update listings:"`
    fn default() -> Self {
        Self {
            fields: vec![
                FieldRule::exact("level", "error"),
                FieldRule::prefix("message", "Error on update listings:"),
            ],
        }
    }
}

/// Evaluates log lines against an [`ErrorSignature`]
///
/// Pure and stateless; malformed lines are a normal occurrence and simply
/// do not match.
#[derive(Debug, Clone, Default)]
pub struct LineMatcher {
    signature: ErrorSignature,
}

impl LineMatcher {
    pub fn new(signature: ErrorSignature) -> Self {
        Self { signature }
    }

    /// Return `true` iff `line` is a JSON object satisfying every field rule
    pub fn matches(&self, line: &str) -> bool {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return false;
        }

        let record = match serde_json::from_str::<Value>(trimmed) {
            Ok(Value::Object(record)) => record,
            _ => return false,
        };

        self.signature
            .fields
            .iter()
            .all(|rule| rule.is_satisfied_by(&record))
    }
}
