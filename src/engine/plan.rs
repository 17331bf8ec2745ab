//! Dispatch plan: the filtered, flattened view of the project configuration
//! that one session actually executes.
//!
//! Built once at session start. The plan decides up front which parameters
//! run, which are ordered, and how many units every fan-in counter starts
//! at, so the runtime only ever decrements.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::core::SessionCounters;
use crate::domain::{
    ExecutionFlags, ExecutionRequest, PageRecord, ParameterConfig, ParameterPath, ParameterRecord,
    ProjectConfig, SessionId, SessionRecord, TabRecord, ValidationInfo, ValidationStatus,
    COMMON_TAB,
};
use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone)]
pub struct ParameterPlan {
    pub path: ParameterPath,
    pub spec: ParameterConfig,
    /// Dispatched strictly after its predecessors in the same tab.
    pub ordered: bool,
    /// Lives in a synchronous tab; completion feeds the page's
    /// synchronous-parameters counter.
    pub synchronous: bool,
}

#[derive(Debug, Clone)]
pub struct TabPlan {
    pub name: String,
    pub synchronous_loading: bool,
    pub parameters: Vec<ParameterPlan>,
}

#[derive(Debug, Clone)]
pub struct PagePlan {
    pub name: String,
    pub tabs: Vec<TabPlan>,
}

impl PagePlan {
    pub fn synchronous_parameter_count(&self) -> i64 {
        self.tabs
            .iter()
            .filter(|t| t.synchronous_loading)
            .map(|t| t.parameters.len() as i64)
            .sum()
    }

    pub fn synchronous_tabs(&self) -> impl Iterator<Item = &TabPlan> {
        self.tabs.iter().filter(|t| t.synchronous_loading)
    }

    pub fn asynchronous_tabs(&self) -> impl Iterator<Item = &TabPlan> {
        self.tabs.iter().filter(|t| !t.synchronous_loading)
    }
}

#[derive(Debug, Clone)]
pub struct SessionPlan {
    pub common: Vec<ParameterPlan>,
    pub pages: Vec<PagePlan>,
}

impl SessionPlan {
    /// Resolve the request against the project configuration, applying the
    /// execution flags. Unknown page names are an error; an empty result
    /// (nothing to collect at all) is too.
    pub fn build(project: &ProjectConfig, request: &ExecutionRequest) -> EngineResult<SessionPlan> {
        let flags = request.flags;

        let common: Vec<ParameterPlan> = project
            .common_parameters
            .iter()
            .filter(|p| eligible(p, flags, true))
            .map(|p| ParameterPlan {
                path: ParameterPath::common("", p.name.clone()),
                spec: p.clone(),
                ordered: false,
                synchronous: false,
            })
            .collect();

        let mut pages = Vec::new();
        if !flags.only_common_parameters_executed {
            for page_name in &request.page_names {
                let page = project
                    .page(page_name)
                    .ok_or_else(|| EngineError::UnknownPage(page_name.clone()))?;
                let tabs: Vec<TabPlan> = page
                    .tabs
                    .iter()
                    .map(|tab| TabPlan {
                        name: tab.name.clone(),
                        synchronous_loading: tab.synchronous_loading,
                        parameters: tab
                            .groups
                            .iter()
                            .flat_map(|group| {
                                group.parameters.iter().map(move |p| (group, p))
                            })
                            .filter(|(_, p)| eligible(p, flags, false))
                            .map(|(group, p)| ParameterPlan {
                                path: ParameterPath::new(
                                    page.name.clone(),
                                    tab.name.clone(),
                                    group.name.clone(),
                                    p.name.clone(),
                                ),
                                spec: p.clone(),
                                ordered: tab.synchronous_loading || group.synchronous_loading,
                                synchronous: tab.synchronous_loading,
                            })
                            .collect(),
                    })
                    .collect();
                pages.push(PagePlan {
                    name: page.name.clone(),
                    tabs,
                });
            }
        }

        let plan = SessionPlan { common, pages };
        if plan.is_empty() {
            return Err(EngineError::EmptyExecution);
        }
        Ok(plan)
    }

    pub fn is_empty(&self) -> bool {
        self.common.is_empty() && self.pages.is_empty()
    }

    pub fn page(&self, name: &str) -> Option<&PagePlan> {
        self.pages.iter().find(|p| p.name == name)
    }

    pub fn parameter_count(&self) -> usize {
        self.common.len()
            + self
                .pages
                .iter()
                .flat_map(|p| &p.tabs)
                .map(|t| t.parameters.len())
                .sum::<usize>()
    }

    /// Fan-in counters sized exactly to this plan.
    pub fn counters(&self) -> SessionCounters {
        let mut builder =
            SessionCounters::builder().common_parameters(self.common.len() as i64);
        for page in &self.pages {
            let tabs: Vec<(String, i64)> = page
                .tabs
                .iter()
                .map(|t| (t.name.clone(), t.parameters.len() as i64))
                .collect();
            builder = builder.page(page.name.as_str(), tabs, page.synchronous_parameter_count());
        }
        builder.build()
    }

    /// Initial persisted record for this plan, all statuses `IN_PROGRESS`.
    pub fn to_record(
        &self,
        id: SessionId,
        owner_instance: &str,
        request: &ExecutionRequest,
        started_at: DateTime<Utc>,
    ) -> SessionRecord {
        let common = if self.common.is_empty() {
            None
        } else {
            Some(TabRecord {
                name: COMMON_TAB.to_string(),
                synchronous_loading: false,
                status: ValidationStatus::InProgress,
                parameters: self.common.iter().map(parameter_record).collect(),
            })
        };

        let pages: Vec<PageRecord> = self
            .pages
            .iter()
            .map(|page| PageRecord {
                name: page.name.clone(),
                status: ValidationStatus::InProgress,
                tabs_loading_started: false,
                tabs: page
                    .tabs
                    .iter()
                    .map(|tab| TabRecord {
                        name: tab.name.clone(),
                        synchronous_loading: tab.synchronous_loading,
                        status: ValidationStatus::InProgress,
                        parameters: tab.parameters.iter().map(parameter_record).collect(),
                    })
                    .collect(),
            })
            .collect();

        SessionRecord {
            id,
            owner_instance: owner_instance.to_string(),
            environment_id: request.environment_id.clone(),
            started_at,
            flags: request.flags,
            key_parameters: request.key_parameters.clone(),
            page_order: self.pages.iter().map(|p| p.name.clone()).collect(),
            common,
            pages,
            status: ValidationStatus::InProgress,
            validated: false,
        }
    }

    /// Seed values for the execution variable store: key parameters are
    /// visible to every query and expected template from the start.
    pub fn seed_variables(request: &ExecutionRequest) -> HashMap<String, String> {
        request.key_parameters.clone()
    }
}

fn eligible(param: &ParameterConfig, flags: ExecutionFlags, is_common: bool) -> bool {
    if flags.only_preconfigured && !param.preconfigured {
        return is_common && flags.force_common_parameters;
    }
    true
}

fn parameter_record(plan: &ParameterPlan) -> ParameterRecord {
    ParameterRecord {
        path: plan.path.clone(),
        synchronous: plan.ordered,
        preconfigured: plan.spec.preconfigured,
        expected: plan.spec.expected.clone(),
        actual: Vec::new(),
        validation: ValidationInfo::in_progress(),
        deferred: false,
        tracking_id: None,
    }
}
