use serde_json::Value;
use thiserror::Error;

use crate::model::ExamSpec;

#[derive(Debug, Clone, PartialEq)]
pub enum MarkInput {
    Text(String),
    Number(f64),
}

impl MarkInput {
    /// Strings and numbers are mark inputs; anything else can never parse.
    pub fn from_json(v: &Value) -> Self {
        match v {
            Value::Number(n) => n
                .as_f64()
                .map(MarkInput::Number)
                .unwrap_or_else(|| MarkInput::Text(n.to_string())),
            Value::String(s) => MarkInput::Text(s.clone()),
            Value::Null => MarkInput::Text(String::new()),
            other => MarkInput::Text(other.to_string()),
        }
    }
}

impl From<f64> for MarkInput {
    fn from(v: f64) -> Self {
        MarkInput::Number(v)
    }
}

impl From<&str> for MarkInput {
    fn from(v: &str) -> Self {
        MarkInput::Text(v.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MarkError {
    #[error("marks must be a number (got {input:?})")]
    NotANumber { input: String },
    #[error("marks must be between 0 and {total} (got {value})")]
    OutOfRange { value: f64, total: f64 },
}

impl MarkError {
    pub fn code(&self) -> &'static str {
        match self {
            MarkError::NotANumber { .. } => "mark_not_a_number",
            MarkError::OutOfRange { .. } => "mark_out_of_range",
        }
    }
}

/// Parses and range-checks a raw mark entry. The parsed value is returned
/// as-is; grading works from the unrounded number.
pub fn validate_mark(input: &MarkInput, spec: &ExamSpec) -> Result<f64, MarkError> {
    let value = match input {
        MarkInput::Number(v) => *v,
        MarkInput::Text(s) => s.trim().parse::<f64>().map_err(|_| MarkError::NotANumber {
            input: s.clone(),
        })?,
    };

    if !value.is_finite() {
        return Err(MarkError::NotANumber {
            input: match input {
                MarkInput::Text(s) => s.clone(),
                MarkInput::Number(v) => v.to_string(),
            },
        });
    }

    if value < 0.0 || value > spec.total_marks {
        return Err(MarkError::OutOfRange {
            value,
            total: spec.total_marks,
        });
    }

    Ok(value)
}
