//! Session state store contract plus the in-memory implementation.
//!
//! The engine treats persistence as a key-value store of session records
//! with single-writer-per-record update semantics: every mutation targets
//! one record and is applied atomically under that record's entry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::domain::{
    ActualValue, PageRecord, ParameterPath, ParameterRecord, SessionId, SessionRecord,
    ValidationInfo, ValidationStatus, COMMON_TAB,
};
use crate::error::{EngineError, EngineResult};

/// Lightweight listing entry for reaper sweeps.
#[derive(Debug, Clone)]
pub struct SessionMeta {
    pub id: SessionId,
    pub owner_instance: String,
    pub started_at: DateTime<Utc>,
}

#[async_trait]
pub trait SessionStateStore: Send + Sync {
    async fn insert_session(&self, record: SessionRecord) -> EngineResult<()>;
    async fn load_session(&self, id: &SessionId) -> Option<SessionRecord>;
    async fn contains(&self, id: &SessionId) -> bool;
    async fn remove_session(&self, id: &SessionId) -> Option<SessionRecord>;
    async fn list_sessions(&self) -> Vec<SessionMeta>;

    async fn store_parameter_result(
        &self,
        id: &SessionId,
        path: &ParameterPath,
        values: Vec<ActualValue>,
        validation: ValidationInfo,
    ) -> EngineResult<()>;

    async fn mark_parameter_deferred(
        &self,
        id: &SessionId,
        path: &ParameterPath,
        tracking_id: &str,
    ) -> EngineResult<()>;

    async fn set_tab_status(
        &self,
        id: &SessionId,
        page: &str,
        tab: &str,
        status: ValidationStatus,
    ) -> EngineResult<()>;

    async fn set_page_status(
        &self,
        id: &SessionId,
        page: &str,
        status: ValidationStatus,
    ) -> EngineResult<()>;

    async fn set_session_status(
        &self,
        id: &SessionId,
        status: ValidationStatus,
        validated: bool,
    ) -> EngineResult<()>;

    /// Set the page's "tabs loading already started" flag, returning the
    /// previous value. A `true` return means another dispatch already
    /// claimed this page.
    async fn mark_tabs_loading_started(&self, id: &SessionId, page: &str) -> EngineResult<bool>;
}

/// DashMap-backed store. Each mutation holds the record's entry for its
/// duration, which gives the single-writer-per-record guarantee.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<SessionId, SessionRecord>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_session<T>(
        &self,
        id: &SessionId,
        f: impl FnOnce(&mut SessionRecord) -> EngineResult<T>,
    ) -> EngineResult<T> {
        let mut entry = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| EngineError::SessionNotFound(id.clone()))?;
        f(entry.value_mut())
    }
}

fn tab_mut<'a>(
    record: &'a mut SessionRecord,
    page: &str,
    tab: &str,
) -> Option<&'a mut crate::domain::TabRecord> {
    if tab == COMMON_TAB {
        return record.common.as_mut();
    }
    record
        .pages
        .iter_mut()
        .find(|p| p.name == page)
        .and_then(|p| p.tabs.iter_mut().find(|t| t.name == tab))
}

fn parameter_mut<'a>(
    record: &'a mut SessionRecord,
    path: &ParameterPath,
) -> Option<&'a mut ParameterRecord> {
    // Names repeat across groups; only the full path is an identity.
    tab_mut(record, &path.page, &path.tab)
        .and_then(|t| t.parameters.iter_mut().find(|p| p.path == *path))
}

fn page_mut<'a>(record: &'a mut SessionRecord, page: &str) -> Option<&'a mut PageRecord> {
    record.pages.iter_mut().find(|p| p.name == page)
}

#[async_trait]
impl SessionStateStore for InMemorySessionStore {
    async fn insert_session(&self, record: SessionRecord) -> EngineResult<()> {
        let id = record.id.clone();
        match self.sessions.entry(id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(EngineError::SessionAlreadyRunning(id))
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(record);
                Ok(())
            }
        }
    }

    async fn load_session(&self, id: &SessionId) -> Option<SessionRecord> {
        self.sessions.get(id).map(|r| r.clone())
    }

    async fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    async fn remove_session(&self, id: &SessionId) -> Option<SessionRecord> {
        self.sessions.remove(id).map(|(_, record)| record)
    }

    async fn list_sessions(&self) -> Vec<SessionMeta> {
        self.sessions
            .iter()
            .map(|entry| SessionMeta {
                id: entry.id.clone(),
                owner_instance: entry.owner_instance.clone(),
                started_at: entry.started_at,
            })
            .collect()
    }

    async fn store_parameter_result(
        &self,
        id: &SessionId,
        path: &ParameterPath,
        values: Vec<ActualValue>,
        validation: ValidationInfo,
    ) -> EngineResult<()> {
        self.with_session(id, |record| {
            let param = parameter_mut(record, path).ok_or_else(|| EngineError::UnknownTab {
                page: path.page.clone(),
                tab: path.tab.clone(),
            })?;
            param.actual = values;
            param.validation = validation;
            param.deferred = false;
            Ok(())
        })
    }

    async fn mark_parameter_deferred(
        &self,
        id: &SessionId,
        path: &ParameterPath,
        tracking_id: &str,
    ) -> EngineResult<()> {
        self.with_session(id, |record| {
            let param = parameter_mut(record, path).ok_or_else(|| EngineError::UnknownTab {
                page: path.page.clone(),
                tab: path.tab.clone(),
            })?;
            param.deferred = true;
            param.tracking_id = Some(tracking_id.to_string());
            Ok(())
        })
    }

    async fn set_tab_status(
        &self,
        id: &SessionId,
        page: &str,
        tab: &str,
        status: ValidationStatus,
    ) -> EngineResult<()> {
        self.with_session(id, |record| {
            let tab_record = tab_mut(record, page, tab).ok_or_else(|| EngineError::UnknownTab {
                page: page.to_string(),
                tab: tab.to_string(),
            })?;
            tab_record.status = status;
            Ok(())
        })
    }

    async fn set_page_status(
        &self,
        id: &SessionId,
        page: &str,
        status: ValidationStatus,
    ) -> EngineResult<()> {
        self.with_session(id, |record| {
            let page_record =
                page_mut(record, page).ok_or_else(|| EngineError::UnknownPage(page.to_string()))?;
            page_record.status = status;
            Ok(())
        })
    }

    async fn set_session_status(
        &self,
        id: &SessionId,
        status: ValidationStatus,
        validated: bool,
    ) -> EngineResult<()> {
        self.with_session(id, |record| {
            record.status = status;
            record.validated = validated;
            Ok(())
        })
    }

    async fn mark_tabs_loading_started(&self, id: &SessionId, page: &str) -> EngineResult<bool> {
        self.with_session(id, |record| {
            let page_record =
                page_mut(record, page).ok_or_else(|| EngineError::UnknownPage(page.to_string()))?;
            let previous = page_record.tabs_loading_started;
            page_record.tabs_loading_started = true;
            Ok(previous)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ExecutionFlags, TabRecord};
    use std::collections::HashMap;

    fn sample_record(id: &str) -> SessionRecord {
        SessionRecord {
            id: SessionId::new(id),
            owner_instance: "node-a".into(),
            environment_id: "uat".into(),
            started_at: Utc::now(),
            flags: ExecutionFlags::default(),
            key_parameters: HashMap::new(),
            page_order: vec!["P".into()],
            common: None,
            pages: vec![PageRecord {
                name: "P".into(),
                status: ValidationStatus::InProgress,
                tabs_loading_started: false,
                tabs: vec![TabRecord {
                    name: "T".into(),
                    synchronous_loading: false,
                    status: ValidationStatus::InProgress,
                    parameters: vec![ParameterRecord {
                        path: ParameterPath::new("P", "T", "g", "a"),
                        synchronous: false,
                        preconfigured: false,
                        expected: Some("1".into()),
                        actual: vec![],
                        validation: ValidationInfo::in_progress(),
                        deferred: false,
                        tracking_id: None,
                    }],
                }],
            }],
            status: ValidationStatus::InProgress,
            validated: false,
        }
    }

    #[tokio::test]
    async fn test_insert_and_duplicate() {
        let store = InMemorySessionStore::new();
        store.insert_session(sample_record("s1")).await.unwrap();
        assert!(store.contains(&SessionId::new("s1")).await);
        let err = store.insert_session(sample_record("s1")).await.unwrap_err();
        assert!(matches!(err, EngineError::SessionAlreadyRunning(_)));
    }

    #[tokio::test]
    async fn test_parameter_result_update() {
        let store = InMemorySessionStore::new();
        store.insert_session(sample_record("s1")).await.unwrap();
        let id = SessionId::new("s1");
        let path = ParameterPath::new("P", "T", "g", "a");

        store
            .store_parameter_result(
                &id,
                &path,
                vec![ActualValue::value("1")],
                ValidationInfo::terminal(ValidationStatus::Passed),
            )
            .await
            .unwrap();

        let record = store.load_session(&id).await.unwrap();
        let param = record.parameter(&path).unwrap();
        assert_eq!(param.actual, vec![ActualValue::value("1")]);
        assert_eq!(param.validation.status, ValidationStatus::Passed);
    }

    #[tokio::test]
    async fn test_result_lands_on_the_right_group() {
        let mut record = sample_record("s1");
        let mut second = record.pages[0].tabs[0].parameters[0].clone();
        second.path = ParameterPath::new("P", "T", "g2", "a");
        record.pages[0].tabs[0].parameters.push(second);

        let store = InMemorySessionStore::new();
        store.insert_session(record).await.unwrap();
        let id = SessionId::new("s1");
        let g2 = ParameterPath::new("P", "T", "g2", "a");

        store
            .store_parameter_result(
                &id,
                &g2,
                vec![ActualValue::value("1")],
                ValidationInfo::terminal(ValidationStatus::Passed),
            )
            .await
            .unwrap();

        let record = store.load_session(&id).await.unwrap();
        assert_eq!(
            record.parameter(&g2).unwrap().validation.status,
            ValidationStatus::Passed
        );
        let g1 = ParameterPath::new("P", "T", "g", "a");
        assert_eq!(
            record.parameter(&g1).unwrap().validation.status,
            ValidationStatus::InProgress
        );
    }

    #[tokio::test]
    async fn test_updates_after_removal_report_not_found() {
        let store = InMemorySessionStore::new();
        store.insert_session(sample_record("s1")).await.unwrap();
        let id = SessionId::new("s1");
        assert!(store.remove_session(&id).await.is_some());

        let err = store
            .set_session_status(&id, ValidationStatus::Passed, true)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn test_tabs_loading_started_guard() {
        let store = InMemorySessionStore::new();
        store.insert_session(sample_record("s1")).await.unwrap();
        let id = SessionId::new("s1");
        assert!(!store.mark_tabs_loading_started(&id, "P").await.unwrap());
        assert!(store.mark_tabs_loading_started(&id, "P").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_sessions() {
        let store = InMemorySessionStore::new();
        store.insert_session(sample_record("s1")).await.unwrap();
        store.insert_session(sample_record("s2")).await.unwrap();
        let mut metas = store.list_sessions().await;
        metas.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        assert_eq!(metas.len(), 2);
        assert_eq!(metas[0].owner_instance, "node-a");
    }
}
