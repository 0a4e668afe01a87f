use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{Document, DocumentId, OwnerId};

/// Persistence boundary for document aggregates.
///
/// `add` and `update` stage changes; `save_changes` commits them. Implementations own
/// optimistic concurrency.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_by_id(&self, id: DocumentId) -> Result<Option<Document>, RepositoryError>;
    async fn get_by_owner(&self, owner_id: &OwnerId) -> Result<Vec<Document>, RepositoryError>;
    async fn add(&self, document: Document) -> Result<(), RepositoryError>;
    async fn update(&self, document: Document) -> Result<(), RepositoryError>;
    async fn exists(&self, id: DocumentId) -> Result<bool, RepositoryError>;
    async fn save_changes(&self) -> Result<(), RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("record was modified concurrently")]
    Concurrency,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Trait describing the outbound event sink (message bus, e-mail adapters, ...).
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn publish(&self, notification: DocumentNotification) -> Result<(), NotificationError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    DocumentApproved,
    DocumentRejected,
}

/// Event payload published after a decision is committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentNotification {
    pub kind: NotificationKind,
    pub document_id: DocumentId,
    pub actor_id: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}
