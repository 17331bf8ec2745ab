//! Session state records.
//!
//! Sessions own pages own tabs own parameters as a strict tree of plain
//! structs addressed by the session id and the parameter's qualifying path.
//! Ownership edges are containment only: no parent back-references, no
//! cycles. The records live in the [`SessionStateStore`]; all in-flight
//! coordination state (counters, variables) lives outside them.
//!
//! [`SessionStateStore`]: crate::core::session_store::SessionStateStore

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::{ActualValue, ExecutionFlags, ValidationStatus};

/// Pseudo-tab name under which common (page-independent) parameters are
/// tracked at session scope.
pub const COMMON_TAB: &str = "__common__";

/// Opaque, globally unique session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        SessionId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        SessionId(value.to_string())
    }
}

/// A parameter's identity within a session: page, tab, group, name.
/// Common parameters use an empty page and the [`COMMON_TAB`] tab.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParameterPath {
    pub page: String,
    pub tab: String,
    pub group: String,
    pub name: String,
}

impl ParameterPath {
    pub fn new(
        page: impl Into<String>,
        tab: impl Into<String>,
        group: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            page: page.into(),
            tab: tab.into(),
            group: group.into(),
            name: name.into(),
        }
    }

    pub fn common(group: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new("", COMMON_TAB, group, name)
    }

    pub fn is_common(&self) -> bool {
        self.tab == COMMON_TAB
    }

    /// Key under which this parameter's value is published to the
    /// execution variable store: `tab.name`.
    pub fn variable_key(&self) -> String {
        format!("{}.{}", self.tab, self.name)
    }
}

impl std::fmt::Display for ParameterPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.page, self.tab, self.group, self.name
        )
    }
}

/// Validation outcome attached to a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationInfo {
    pub status: ValidationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl ValidationInfo {
    pub fn in_progress() -> Self {
        Self {
            status: ValidationStatus::InProgress,
            error_description: None,
        }
    }

    pub fn terminal(status: ValidationStatus) -> Self {
        Self {
            status,
            error_description: None,
        }
    }

    pub fn with_error(status: ValidationStatus, description: impl Into<String>) -> Self {
        Self {
            status,
            error_description: Some(description.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterRecord {
    pub path: ParameterPath,
    pub synchronous: bool,
    pub preconfigured: bool,
    pub expected: Option<String>,
    #[serde(default)]
    pub actual: Vec<ActualValue>,
    pub validation: ValidationInfo,
    #[serde(default)]
    pub deferred: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TabRecord {
    pub name: String,
    pub synchronous_loading: bool,
    pub status: ValidationStatus,
    pub parameters: Vec<ParameterRecord>,
}

impl TabRecord {
    /// Parameter names are only unique within their group, so lookup
    /// requires both segments.
    pub fn parameter(&self, group: &str, name: &str) -> Option<&ParameterRecord> {
        self.parameters
            .iter()
            .find(|p| p.path.group == group && p.path.name == name)
    }

    pub fn parameter_statuses(&self) -> impl Iterator<Item = ValidationStatus> + '_ {
        self.parameters.iter().map(|p| p.validation.status)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRecord {
    pub name: String,
    pub status: ValidationStatus,
    /// Guards against duplicate tab dispatch for the same page.
    #[serde(default)]
    pub tabs_loading_started: bool,
    pub tabs: Vec<TabRecord>,
}

impl PageRecord {
    pub fn tab(&self, name: &str) -> Option<&TabRecord> {
        self.tabs.iter().find(|t| t.name == name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: SessionId,
    /// Identity of the engine instance that owns this session's in-memory
    /// runtime state. Used by the lost-session sweep.
    pub owner_instance: String,
    pub environment_id: String,
    pub started_at: DateTime<Utc>,
    pub flags: ExecutionFlags,
    pub key_parameters: HashMap<String, String>,
    /// Display order of pages as requested.
    pub page_order: Vec<String>,
    /// Common parameters tracked as a pseudo-tab at session scope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common: Option<TabRecord>,
    pub pages: Vec<PageRecord>,
    pub status: ValidationStatus,
    /// Set once the session-level rollup has been computed.
    #[serde(default)]
    pub validated: bool,
}

impl SessionRecord {
    pub fn page(&self, name: &str) -> Option<&PageRecord> {
        self.pages.iter().find(|p| p.name == name)
    }

    pub fn tab(&self, page: &str, tab: &str) -> Option<&TabRecord> {
        if tab == COMMON_TAB {
            return self.common.as_ref();
        }
        self.page(page).and_then(|p| p.tab(tab))
    }

    pub fn parameter(&self, path: &ParameterPath) -> Option<&ParameterRecord> {
        self.tab(&path.page, &path.tab)
            .and_then(|t| t.parameter(&path.group, &path.name))
    }

    /// Statuses feeding the session-level rollup: every page plus the
    /// common pseudo-tab when present.
    pub fn unit_statuses(&self) -> Vec<ValidationStatus> {
        let mut statuses: Vec<ValidationStatus> =
            self.pages.iter().map(|p| p.status).collect();
        if let Some(common) = &self.common {
            statuses.push(common.status);
        }
        statuses
    }
}
