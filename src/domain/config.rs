//! Project configuration tree and the session execution request.
//!
//! The configuration is static input: pages own tabs, tabs own groups,
//! groups own parameters. Groups exist only for display and for the
//! synchronous-loading flag their parameters inherit; they are not a
//! scheduling unit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::SessionId;

/// The configured project the engine executes sessions against.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    /// Page-independent parameters executed at session scope before any
    /// dependent page parameter is dispatched.
    #[serde(default)]
    pub common_parameters: Vec<ParameterConfig>,
    #[serde(default)]
    pub pages: Vec<PageConfig>,
}

impl ProjectConfig {
    pub fn page(&self, name: &str) -> Option<&PageConfig> {
        self.pages.iter().find(|p| p.name == name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageConfig {
    pub name: String,
    #[serde(default)]
    pub tabs: Vec<TabConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TabConfig {
    pub name: String,
    /// When set, this tab's parameters execute strictly in configured order,
    /// each awaited to full completion before the next starts.
    #[serde(default)]
    pub synchronous_loading: bool,
    #[serde(default)]
    pub groups: Vec<GroupConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupConfig {
    pub name: String,
    /// Orders this group's parameters within the tab; later parameters see
    /// the variables their predecessors published.
    #[serde(default)]
    pub synchronous_loading: bool,
    #[serde(default)]
    pub parameters: Vec<ParameterConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterConfig {
    pub name: String,
    /// Which registered collector handles this parameter (e.g. "sql",
    /// "rest", "log-search"). The engine does not know the protocol.
    pub source_type: String,
    /// Collector-specific request payload (query text, endpoint, search
    /// expression). Opaque to the engine; placeholders `${tab.param}` are
    /// resolved against the dispatch-time variable snapshot.
    #[serde(default)]
    pub query: String,
    /// Expected-result template; placeholders resolve like `query`.
    /// Absent means the parameter opts out of validation.
    #[serde(default)]
    pub expected: Option<String>,
    #[serde(default)]
    pub preconfigured: bool,
    /// Manually verified parameters get terminal status `MANUAL`.
    #[serde(default)]
    pub manual: bool,
    /// Degrade a mismatch or error to `WARNING` instead of `FAILED`.
    #[serde(default)]
    pub warning_only: bool,
}

/// Session execution request. `session_id` absent means "create new".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub environment_id: String,
    #[serde(default)]
    pub session_id: Option<SessionId>,
    #[serde(default)]
    pub key_parameters: HashMap<String, String>,
    #[serde(default)]
    pub page_names: Vec<String>,
    #[serde(default)]
    pub log_search_period: Option<LogSearchPeriod>,
    #[serde(default)]
    pub flags: ExecutionFlags,
    #[serde(default)]
    pub timeout_range: Option<TimeoutRange>,
}

impl ExecutionRequest {
    pub fn new(environment_id: impl Into<String>) -> Self {
        Self {
            environment_id: environment_id.into(),
            session_id: None,
            key_parameters: HashMap::new(),
            page_names: Vec::new(),
            log_search_period: None,
            flags: ExecutionFlags::default(),
            timeout_range: None,
        }
    }

    pub fn with_pages<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.page_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_key_parameter(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.key_parameters.insert(name.into(), value.into());
        self
    }

    pub fn with_flags(mut self, flags: ExecutionFlags) -> Self {
        self.flags = flags;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ExecutionFlags {
    /// Collect only parameters marked preconfigured.
    #[serde(default)]
    pub only_preconfigured: bool,
    /// Run common parameters even when `only_preconfigured` would filter
    /// them out.
    #[serde(default)]
    pub force_common_parameters: bool,
    /// Execute common parameters only; pages are skipped entirely.
    #[serde(default)]
    pub only_common_parameters_executed: bool,
    #[serde(default)]
    pub pot_generation_mode: bool,
    #[serde(default)]
    pub highlight_diffs: bool,
    #[serde(default)]
    pub send_session_results: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSearchPeriod {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimeoutRange {
    pub min_secs: u64,
    pub max_secs: u64,
}
