//! Execution variable store.
//!
//! Per-session mapping from variable name to last-known value, written by
//! completed synchronous parameters and read by not-yet-started ones.
//! Readers never see a live view: a parameter consumes a [`VariableSnapshot`]
//! taken at the moment it is dispatched.

use dashmap::DashMap;
use std::collections::HashMap;

use crate::domain::VariableValue;

/// Concurrent name → value map. Insert is a single atomic step; there is no
/// compound read-modify-write surface.
#[derive(Debug, Default)]
pub struct ExecutionVariableStore {
    variables: DashMap<String, VariableValue>,
}

impl ExecutionVariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, name: impl Into<String>, value: VariableValue) {
        self.variables.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<VariableValue> {
        self.variables.get(name).map(|v| v.clone())
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Snapshot for dispatch-time resolution. Later writes are invisible to
    /// the returned snapshot.
    pub fn snapshot(&self) -> VariableSnapshot {
        VariableSnapshot {
            variables: self
                .variables
                .iter()
                .map(|e| (e.key().clone(), e.value().clone()))
                .collect(),
        }
    }
}

/// Immutable view of the variable store as of one dispatch.
#[derive(Debug, Clone, Default)]
pub struct VariableSnapshot {
    variables: HashMap<String, VariableValue>,
}

impl VariableSnapshot {
    pub fn get(&self, name: &str) -> Option<&VariableValue> {
        self.variables.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Replace `${name}` placeholders with snapshot values. Unknown names
    /// are left verbatim so a mismatch is visible in the validation output
    /// instead of silently comparing against an empty string.
    pub fn resolve_placeholders(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find('}') {
                Some(end) => {
                    let name = &after[..end];
                    match self.variables.get(name) {
                        Some(value) => out.push_str(&value.to_display_string()),
                        None => {
                            out.push_str("${");
                            out.push_str(name);
                            out.push('}');
                        }
                    }
                    rest = &after[end + 1..];
                }
                None => {
                    out.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }
}
