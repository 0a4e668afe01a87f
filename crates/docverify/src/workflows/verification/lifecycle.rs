use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::access::{validate_object_key, AccessError, AccessGrant, AccessTokenIssuer};
use super::analysis::{AnalysisAdapter, AnalysisOutcome};
use super::claims::ActorClaims;
use super::domain::{
    Document, DocumentId, DocumentStateError, DocumentStatus, DocumentType, ExtractedData, OwnerId,
};
use super::repository::{
    DocumentNotification, DocumentStore, NotificationKind, NotificationSink, RepositoryError,
};
use crate::config::UploadPolicy;
use crate::telemetry;

const MAX_FILE_NAME_CHARS: usize = 128;

/// Client request for a place to upload a new document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSlotRequest {
    pub owner_id: OwnerId,
    pub document_type: DocumentType,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: u64,
}

/// Generated storage key plus the write grant for it.
#[derive(Debug, Clone, Serialize)]
pub struct UploadSlot {
    pub storage_path: String,
    pub grant: AccessGrant,
}

/// Failure category callers map onto response codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Unauthorized,
    Forbidden,
    BadRequest,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error("document {0} was not found")]
    NotFound(DocumentId),
    #[error("authentication is required")]
    Unauthorized,
    #[error("the current actor is not allowed to perform this action")]
    Forbidden,
    #[error("{0}")]
    BadRequest(String),
    #[error("an internal error occurred, try again later (correlation id {correlation_id})")]
    Internal { correlation_id: Uuid },
}

impl LifecycleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LifecycleError::NotFound(_) => ErrorKind::NotFound,
            LifecycleError::Unauthorized => ErrorKind::Unauthorized,
            LifecycleError::Forbidden => ErrorKind::Forbidden,
            LifecycleError::BadRequest(_) => ErrorKind::BadRequest,
            LifecycleError::Internal { .. } => ErrorKind::Internal,
        }
    }
}

impl From<DocumentStateError> for LifecycleError {
    fn from(value: DocumentStateError) -> Self {
        Self::BadRequest(value.to_string())
    }
}

/// Logs the full failure and hands back only a correlation id.
fn internal(operation: &'static str, err: &dyn std::error::Error) -> LifecycleError {
    let correlation_id = telemetry::correlation_id();
    error!(%correlation_id, operation, error = %err, "document lifecycle operation failed");
    LifecycleError::Internal { correlation_id }
}

fn access_failure(operation: &'static str, err: AccessError) -> LifecycleError {
    match err {
        AccessError::InvalidObjectKey(key) => {
            LifecycleError::BadRequest(format!("'{key}' is not a valid storage path"))
        }
        other => internal(operation, &other),
    }
}

/// State machine owner for verification documents.
pub struct DocumentLifecycle<R, N> {
    repository: Arc<R>,
    notifications: Arc<N>,
    issuer: Arc<AccessTokenIssuer>,
    analysis: Arc<AnalysisAdapter>,
    upload_policy: UploadPolicy,
}

impl<R, N> DocumentLifecycle<R, N>
where
    R: DocumentStore + 'static,
    N: NotificationSink + 'static,
{
    pub fn new(
        repository: Arc<R>,
        notifications: Arc<N>,
        issuer: Arc<AccessTokenIssuer>,
        analysis: Arc<AnalysisAdapter>,
    ) -> Self {
        Self {
            repository,
            notifications,
            issuer,
            analysis,
            upload_policy: UploadPolicy::default(),
        }
    }

    pub fn with_upload_policy(mut self, policy: UploadPolicy) -> Self {
        self.upload_policy = policy;
        self
    }

    pub fn issuer(&self) -> &AccessTokenIssuer {
        &self.issuer
    }

    /// Validate an upload request and hand out a write grant for a fresh storage key.
    pub async fn request_upload_slot(
        &self,
        request: UploadSlotRequest,
    ) -> Result<UploadSlot, LifecycleError> {
        if request.owner_id.0.trim().is_empty() {
            return Err(LifecycleError::BadRequest("owner id is required".to_string()));
        }
        if request.file_name.trim().is_empty() {
            return Err(LifecycleError::BadRequest("file name is required".to_string()));
        }
        if request.size_bytes == 0 {
            return Err(LifecycleError::BadRequest("file is empty".to_string()));
        }
        if request.size_bytes > self.upload_policy.max_bytes {
            return Err(LifecycleError::BadRequest(format!(
                "file size {} exceeds the {} byte limit",
                request.size_bytes, self.upload_policy.max_bytes
            )));
        }
        if !self.upload_policy.allows_content_type(&request.content_type) {
            return Err(LifecycleError::BadRequest(format!(
                "content type '{}' is not accepted",
                request.content_type
            )));
        }

        let storage_path = format!(
            "{}/{}-{}",
            sanitize_segment(&request.owner_id.0),
            Uuid::new_v4(),
            sanitize_segment(&request.file_name)
        );

        let grant = self
            .issuer
            .issue_upload_grant(&storage_path, &request.content_type)
            .await
            .map_err(|err| access_failure("issue upload grant", err))?;

        info!(
            owner_id = %request.owner_id,
            document_type = request.document_type.label(),
            %storage_path,
            "upload slot issued"
        );

        Ok(UploadSlot {
            storage_path,
            grant,
        })
    }

    /// Register an uploaded document. New documents start in `Uploaded`.
    pub async fn create(
        &self,
        owner_id: OwnerId,
        document_type: DocumentType,
        file_name: &str,
        storage_path: &str,
    ) -> Result<Document, LifecycleError> {
        if owner_id.0.trim().is_empty() {
            return Err(LifecycleError::BadRequest("owner id is required".to_string()));
        }
        if file_name.trim().is_empty() || storage_path.trim().is_empty() {
            return Err(LifecycleError::BadRequest(
                "file name and storage path are required".to_string(),
            ));
        }
        let storage_path = validate_object_key(storage_path).map_err(|_| {
            LifecycleError::BadRequest(
                "storage path must be a relative object key without query or fragment".to_string(),
            )
        })?;

        let document = Document::new(
            owner_id,
            document_type,
            file_name.trim(),
            storage_path,
            Utc::now(),
        );

        self.repository
            .add(document.clone())
            .await
            .map_err(|err| internal("add document", &err))?;
        self.commit().await?;

        info!(
            document_id = %document.id(),
            owner_id = %document.owner_id(),
            document_type = document.document_type().label(),
            "document created"
        );
        Ok(document)
    }

    pub async fn get(&self, document_id: DocumentId) -> Result<Document, LifecycleError> {
        self.load(document_id).await
    }

    pub async fn list_for_owner(&self, owner_id: &OwnerId) -> Result<Vec<Document>, LifecycleError> {
        self.repository
            .get_by_owner(owner_id)
            .await
            .map_err(|err| internal("list documents", &err))
    }

    /// Move an uploaded document into review once storage holds the object.
    pub async fn mark_as_pending_verification(
        &self,
        document_id: DocumentId,
    ) -> Result<Document, LifecycleError> {
        let mut document = self.load(document_id).await?;
        document.mark_as_pending_verification()?;

        let received = self
            .issuer
            .exists(document.storage_path())
            .await
            .map_err(|err| access_failure("check uploaded object", err))?;
        if !received {
            return Err(LifecycleError::BadRequest(format!(
                "upload for document {document_id} has not reached storage"
            )));
        }

        self.persist(&document).await?;
        info!(%document_id, "document pending verification");
        Ok(document)
    }

    /// Run field extraction and store the result. Re-running overwrites the earlier result.
    ///
    /// A failed extraction is returned as-is and leaves the document untouched.
    pub async fn request_analysis(
        &self,
        document_id: DocumentId,
    ) -> Result<AnalysisOutcome, LifecycleError> {
        let document = self.load(document_id).await?;
        if document.status().is_terminal() {
            return Err(DocumentStateError::InvalidTransition {
                action: "analyze",
                current: document.status(),
            }
            .into());
        }

        let grant = self
            .issuer
            .issue_download_grant(document.storage_path())
            .await
            .map_err(|err| access_failure("issue analysis grant", err))?;

        let outcome = self
            .analysis
            .analyze(document.storage_path(), &grant.url, document.document_type())
            .await;

        if !outcome.success {
            warn!(
                %document_id,
                error = outcome.error_message.as_deref().unwrap_or("unknown"),
                "analysis unavailable, document left unchanged"
            );
            return Ok(outcome);
        }

        // Reload so a decision taken while the analysis ran is not overwritten.
        let mut document = self.load(document_id).await?;
        document.record_analysis(ExtractedData {
            fields: outcome.extracted_fields.clone(),
            summary: outcome.raw_summary.clone(),
            confidence: outcome.confidence,
            model_id: outcome.model_id.clone(),
            analyzed_at: Utc::now(),
        })?;
        self.persist(&document).await?;

        info!(
            %document_id,
            fields = outcome.extracted_fields.len(),
            confidence = outcome.confidence,
            "analysis recorded"
        );
        Ok(outcome)
    }

    pub async fn approve(
        &self,
        document_id: DocumentId,
        actor: &ActorClaims,
    ) -> Result<Document, LifecycleError> {
        let (mut document, actor_id) = self.authorize_decision(document_id, actor).await?;
        document.approve(Utc::now())?;
        self.persist(&document).await?;

        info!(%document_id, %actor_id, "document approved");
        self.notify(NotificationKind::DocumentApproved, document_id, actor_id)
            .await;
        Ok(document)
    }

    pub async fn reject(
        &self,
        document_id: DocumentId,
        actor: &ActorClaims,
        reason: &str,
    ) -> Result<Document, LifecycleError> {
        let (mut document, actor_id) = self.authorize_decision(document_id, actor).await?;
        document.reject(reason)?;
        self.persist(&document).await?;

        info!(%document_id, %actor_id, "document rejected");
        self.notify(NotificationKind::DocumentRejected, document_id, actor_id)
            .await;
        Ok(document)
    }

    /// Read grant for the owner of a document or an admin.
    pub async fn issue_download_grant(
        &self,
        document_id: DocumentId,
        actor: &ActorClaims,
    ) -> Result<AccessGrant, LifecycleError> {
        let document = self.load(document_id).await?;
        let actor_id = actor.actor_id().ok_or(LifecycleError::Unauthorized)?;
        if actor_id != document.owner_id().0 && !actor.is_admin() {
            return Err(LifecycleError::Forbidden);
        }

        self.issuer
            .issue_download_grant(document.storage_path())
            .await
            .map_err(|err| access_failure("issue download grant", err))
    }

    /// Guards shared by approve and reject, checked in order: exists, authenticated, admin.
    async fn authorize_decision(
        &self,
        document_id: DocumentId,
        actor: &ActorClaims,
    ) -> Result<(Document, String), LifecycleError> {
        let document = self.load(document_id).await?;
        let actor_id = actor
            .actor_id()
            .ok_or(LifecycleError::Unauthorized)?
            .to_string();
        if !actor.is_admin() {
            warn!(%document_id, %actor_id, "decision attempted without admin role");
            return Err(LifecycleError::Forbidden);
        }
        if document.status() != DocumentStatus::PendingVerification {
            return Err(LifecycleError::BadRequest(format!(
                "document {document_id} is {} and cannot be decided",
                document.status()
            )));
        }
        Ok((document, actor_id))
    }

    async fn load(&self, document_id: DocumentId) -> Result<Document, LifecycleError> {
        self.repository
            .get_by_id(document_id)
            .await
            .map_err(|err| internal("load document", &err))?
            .ok_or(LifecycleError::NotFound(document_id))
    }

    async fn persist(&self, document: &Document) -> Result<(), LifecycleError> {
        match self.repository.update(document.clone()).await {
            Ok(()) => {}
            Err(RepositoryError::NotFound) => return Err(LifecycleError::NotFound(document.id())),
            Err(err) => return Err(internal("update document", &err)),
        }
        self.commit().await
    }

    async fn commit(&self) -> Result<(), LifecycleError> {
        self.repository
            .save_changes()
            .await
            .map_err(|err| internal("save changes", &err))
    }

    /// Best effort: a failed publish is logged and never undoes the committed decision.
    async fn notify(&self, kind: NotificationKind, document_id: DocumentId, actor_id: String) {
        let notification = DocumentNotification {
            kind,
            document_id,
            actor_id,
            occurred_at: Utc::now(),
        };
        if let Err(err) = self.notifications.publish(notification).await {
            warn!(%document_id, ?kind, error = %err, "document notification was not delivered");
        }
    }
}

/// Reduces a client supplied value to a safe single path segment.
fn sanitize_segment(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_') {
                ch
            } else {
                '_'
            }
        })
        .take(MAX_FILE_NAME_CHARS)
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "document".to_string()
    } else {
        cleaned.to_string()
    }
}
