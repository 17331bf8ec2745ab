//! Value types: actual results collected from external sources and the
//! typed values stored as execution variables.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A typed execution-variable value: scalar or tabular.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariableValue {
    Scalar(String),
    Table(Vec<HashMap<String, String>>),
}

impl VariableValue {
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            VariableValue::Scalar(s) => Some(s),
            VariableValue::Table(_) => None,
        }
    }

    pub fn to_display_string(&self) -> String {
        match self {
            VariableValue::Scalar(s) => s.clone(),
            VariableValue::Table(rows) => serde_json::to_string(rows).unwrap_or_default(),
        }
    }
}

impl From<&str> for VariableValue {
    fn from(value: &str) -> Self {
        VariableValue::Scalar(value.to_string())
    }
}

impl From<String> for VariableValue {
    fn from(value: String) -> Self {
        VariableValue::Scalar(value)
    }
}

/// One collected result for a parameter: either a value or an error-typed
/// entry. Errors are data here, never control flow; a failed collect
/// must not abort sibling parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActualValue {
    Value { value: VariableValue },
    Error { description: String },
}

impl ActualValue {
    pub fn value(value: impl Into<VariableValue>) -> Self {
        ActualValue::Value {
            value: value.into(),
        }
    }

    pub fn error(description: impl Into<String>) -> Self {
        ActualValue::Error {
            description: description.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ActualValue::Error { .. })
    }

    pub fn error_description(&self) -> Option<&str> {
        match self {
            ActualValue::Error { description } => Some(description),
            ActualValue::Value { .. } => None,
        }
    }

    pub fn as_variable_value(&self) -> Option<&VariableValue> {
        match self {
            ActualValue::Value { value } => Some(value),
            ActualValue::Error { .. } => None,
        }
    }

    pub fn to_display_string(&self) -> String {
        match self {
            ActualValue::Value { value } => value.to_display_string(),
            ActualValue::Error { description } => format!("[error: {}]", description),
        }
    }
}
