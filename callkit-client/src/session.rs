use crate::error::SessionLookupError;
use async_trait::async_trait;
use callkit_core::{CallError, SessionId};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Lifecycle of an interview session as recorded by the scheduling backend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SessionStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionStatus::Scheduled => "scheduled",
            SessionStatus::InProgress => "in-progress",
            SessionStatus::Completed => "completed",
            SessionStatus::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: SessionId,
    pub status: SessionStatus,
}

/// The backend that owns session records. Calls are opaque to the coordinator.
#[async_trait]
pub trait SessionDirectory: Send + Sync {
    async fn fetch_session(&self, id: &SessionId) -> Result<SessionRecord, SessionLookupError>;

    async fn mark_started(&self, id: &SessionId) -> Result<SessionRecord, SessionLookupError>;

    async fn mark_completed(&self, id: &SessionId) -> Result<SessionRecord, SessionLookupError>;
}

pub type SharedSessionDirectory = Arc<dyn SessionDirectory>;

/// Check that `id` may host a call right now, starting it if it is still scheduled.
pub async fn admit_session(
    directory: &dyn SessionDirectory,
    id: &SessionId,
) -> Result<SessionRecord, CallError> {
    let record = directory.fetch_session(id).await?;
    match record.status {
        SessionStatus::InProgress => Ok(record),
        SessionStatus::Scheduled => {
            info!("Starting scheduled session {}", id);
            let record = directory.mark_started(id).await?;
            if record.status == SessionStatus::InProgress {
                Ok(record)
            } else {
                Err(CallError::SessionNotActive(record.status.to_string()))
            }
        }
        status => Err(CallError::SessionNotActive(status.to_string())),
    }
}

/// A process-local directory, for hosts without a scheduling backend and for tests.
#[derive(Debug, Clone, Default)]
pub struct InMemorySessions {
    records: Arc<DashMap<SessionId, SessionStatus>>,
}

impl InMemorySessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(self, id: impl Into<SessionId>, status: SessionStatus) -> Self {
        self.records.insert(id.into(), status);
        self
    }

    pub fn status_of(&self, id: &SessionId) -> Option<SessionStatus> {
        self.records.get(id).map(|entry| *entry.value())
    }

    fn update(
        &self,
        id: &SessionId,
        next: SessionStatus,
    ) -> Result<SessionRecord, SessionLookupError> {
        let mut entry = self
            .records
            .get_mut(id)
            .ok_or_else(|| SessionLookupError::NotFound(id.to_string()))?;
        *entry = next;
        Ok(SessionRecord {
            id: id.clone(),
            status: next,
        })
    }
}

#[async_trait]
impl SessionDirectory for InMemorySessions {
    async fn fetch_session(&self, id: &SessionId) -> Result<SessionRecord, SessionLookupError> {
        let status = self
            .status_of(id)
            .ok_or_else(|| SessionLookupError::NotFound(id.to_string()))?;
        Ok(SessionRecord {
            id: id.clone(),
            status,
        })
    }

    async fn mark_started(&self, id: &SessionId) -> Result<SessionRecord, SessionLookupError> {
        self.update(id, SessionStatus::InProgress)
    }

    async fn mark_completed(&self, id: &SessionId) -> Result<SessionRecord, SessionLookupError> {
        self.update(id, SessionStatus::Completed)
    }
}
