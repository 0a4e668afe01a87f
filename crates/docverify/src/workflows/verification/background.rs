use std::fmt::{self, Debug};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

pub const NO_RECORDS_FOUND: &str = "no criminal records found for subject";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackgroundCheckRequestId(pub Uuid);

impl BackgroundCheckRequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BackgroundCheckRequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BackgroundCheckRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackgroundCheckStatus {
    Pending,
    Completed,
    NotAvailable,
}

impl BackgroundCheckStatus {
    pub const fn label(self) -> &'static str {
        match self {
            BackgroundCheckStatus::Pending => "pending",
            BackgroundCheckStatus::Completed => "completed",
            BackgroundCheckStatus::NotAvailable => "not_available",
        }
    }
}

/// Person a check was submitted for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackgroundCheckSubject {
    pub subject_id: String,
    pub full_name: String,
    pub birth_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackgroundCheckRecord {
    pub request_id: BackgroundCheckRequestId,
    pub status: BackgroundCheckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<BackgroundCheckSubject>,
    pub has_record: Option<bool>,
    pub details: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl BackgroundCheckRecord {
    fn pending(subject: BackgroundCheckSubject, submitted_at: DateTime<Utc>) -> Self {
        Self {
            request_id: BackgroundCheckRequestId::new(),
            status: BackgroundCheckStatus::Pending,
            subject: Some(subject),
            has_record: None,
            details: None,
            submitted_at: Some(submitted_at),
            completed_at: None,
            error_message: None,
        }
    }

    fn not_available(request_id: BackgroundCheckRequestId, message: impl Into<String>) -> Self {
        Self {
            request_id,
            status: BackgroundCheckStatus::NotAvailable,
            subject: None,
            has_record: None,
            details: None,
            submitted_at: None,
            completed_at: None,
            error_message: Some(message.into()),
        }
    }
}

/// Result applied to a pending record when the provider reports back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackgroundCheckCompletion {
    pub has_record: bool,
    pub details: String,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackgroundCheckStoreError {
    #[error("request {0} already exists")]
    Conflict(BackgroundCheckRequestId),
    #[error("background check store unavailable: {0}")]
    Unavailable(String),
}

/// Keyed storage for check records, injected into the coordinator.
#[async_trait]
pub trait BackgroundCheckStore: Debug + Send + Sync {
    async fn insert(&self, record: BackgroundCheckRecord) -> Result<(), BackgroundCheckStoreError>;

    /// Applies `completion` only if the record is still pending, atomically, and returns
    /// whatever is stored afterwards. `None` when the id is unknown.
    async fn complete_pending(
        &self,
        request_id: BackgroundCheckRequestId,
        completion: BackgroundCheckCompletion,
    ) -> Result<Option<BackgroundCheckRecord>, BackgroundCheckStoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryBackgroundCheckStore {
    records: DashMap<BackgroundCheckRequestId, BackgroundCheckRecord>,
}

impl InMemoryBackgroundCheckStore {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl BackgroundCheckStore for InMemoryBackgroundCheckStore {
    async fn insert(&self, record: BackgroundCheckRecord) -> Result<(), BackgroundCheckStoreError> {
        match self.records.entry(record.request_id) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(BackgroundCheckStoreError::Conflict(record.request_id))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(())
            }
        }
    }

    async fn complete_pending(
        &self,
        request_id: BackgroundCheckRequestId,
        completion: BackgroundCheckCompletion,
    ) -> Result<Option<BackgroundCheckRecord>, BackgroundCheckStoreError> {
        let Some(mut entry) = self.records.get_mut(&request_id) else {
            return Ok(None);
        };
        if entry.status == BackgroundCheckStatus::Pending {
            entry.status = BackgroundCheckStatus::Completed;
            entry.has_record = Some(completion.has_record);
            entry.details = Some(completion.details);
            entry.completed_at = Some(completion.completed_at);
        }
        Ok(Some(entry.clone()))
    }
}

/// Stub coordinator: a pending check completes with a clean result on its first poll.
#[derive(Debug)]
pub struct BackgroundCheckCoordinator {
    store: Arc<dyn BackgroundCheckStore>,
}

impl BackgroundCheckCoordinator {
    pub fn new(store: Arc<dyn BackgroundCheckStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryBackgroundCheckStore::default()))
    }

    pub async fn submit(
        &self,
        subject_id: &str,
        full_name: &str,
        birth_date: NaiveDate,
    ) -> BackgroundCheckRecord {
        let record = BackgroundCheckRecord::pending(
            BackgroundCheckSubject {
                subject_id: subject_id.trim().to_string(),
                full_name: full_name.trim().to_string(),
                birth_date,
            },
            Utc::now(),
        );

        match self.store.insert(record.clone()).await {
            Ok(()) => {
                info!(request_id = %record.request_id, subject_id, "background check submitted");
                record
            }
            Err(err) => {
                warn!(request_id = %record.request_id, error = %err, "background check could not be stored");
                BackgroundCheckRecord::not_available(
                    record.request_id,
                    "background check service is unavailable",
                )
            }
        }
    }

    pub async fn poll_status(&self, request_id: BackgroundCheckRequestId) -> BackgroundCheckRecord {
        let completion = BackgroundCheckCompletion {
            has_record: false,
            details: NO_RECORDS_FOUND.to_string(),
            completed_at: Utc::now(),
        };

        match self.store.complete_pending(request_id, completion).await {
            Ok(Some(record)) => record,
            Ok(None) => BackgroundCheckRecord::not_available(
                request_id,
                format!("background check request {request_id} was not found"),
            ),
            Err(err) => {
                warn!(%request_id, error = %err, "background check status unavailable");
                BackgroundCheckRecord::not_available(
                    request_id,
                    "background check service is unavailable",
                )
            }
        }
    }
}
