use async_trait::async_trait;
use chrono::{DateTime, Utc};
use docverify::workflows::verification::{
    AnalysisBackend, AnalysisBackendError, AnalysisRequest, AnalysisResponse, Document,
    DocumentId, DocumentNotification, DocumentStore, ExtractedField, GrantPermissions,
    NotificationError, NotificationSink, OwnerId, RepositoryError, StorageBackend, StorageError,
};
use metrics_exporter_prometheus::PrometheusHandle;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryDocumentStore {
    documents: Arc<Mutex<HashMap<DocumentId, Document>>>,
}

impl InMemoryDocumentStore {
    fn guard(&self) -> Result<MutexGuard<'_, HashMap<DocumentId, Document>>, RepositoryError> {
        self.documents
            .lock()
            .map_err(|_| RepositoryError::Unavailable("document store mutex poisoned".to_string()))
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get_by_id(&self, id: DocumentId) -> Result<Option<Document>, RepositoryError> {
        Ok(self.guard()?.get(&id).cloned())
    }

    async fn get_by_owner(&self, owner_id: &OwnerId) -> Result<Vec<Document>, RepositoryError> {
        let mut documents: Vec<Document> = self
            .guard()?
            .values()
            .filter(|document| document.owner_id() == owner_id)
            .cloned()
            .collect();
        documents.sort_by_key(|document| document.uploaded_at());
        Ok(documents)
    }

    async fn add(&self, document: Document) -> Result<(), RepositoryError> {
        let mut guard = self.guard()?;
        if guard.contains_key(&document.id()) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(document.id(), document);
        Ok(())
    }

    async fn update(&self, document: Document) -> Result<(), RepositoryError> {
        let mut guard = self.guard()?;
        if guard.contains_key(&document.id()) {
            guard.insert(document.id(), document);
            Ok(())
        } else {
            Err(RepositoryError::NotFound)
        }
    }

    async fn exists(&self, id: DocumentId) -> Result<bool, RepositoryError> {
        Ok(self.guard()?.contains_key(&id))
    }

    // Writes land immediately; there is no unit of work to flush.
    async fn save_changes(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

/// Emits review decisions as structured log events.
#[derive(Debug, Default, Clone)]
pub(crate) struct LoggingNotificationSink;

#[async_trait]
impl NotificationSink for LoggingNotificationSink {
    async fn publish(&self, notification: DocumentNotification) -> Result<(), NotificationError> {
        info!(
            kind = ?notification.kind,
            document_id = %notification.document_id,
            actor_id = %notification.actor_id,
            occurred_at = %notification.occurred_at,
            "document notification"
        );
        Ok(())
    }
}

/// Development stand-in for blob storage that signs URLs with a shared key.
///
/// Nothing serves the signed URLs, so no bytes ever arrive. Objects exist only after
/// [`LocalStorage::put_object`], or, when built with
/// [`LocalStorage::accepting_signed_uploads`], as soon as a write grant is signed for the key.
/// The served binary uses the latter, which means `confirm-upload` never finds a missing
/// object there.
#[derive(Debug)]
pub(crate) struct LocalStorage {
    base_url: String,
    signing_key: String,
    accept_signed_uploads: bool,
    containers: Mutex<HashSet<String>>,
    objects: Mutex<HashSet<(String, String)>>,
}

impl LocalStorage {
    pub(crate) fn new(base_url: &str, signing_key: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            signing_key: signing_key.to_string(),
            accept_signed_uploads: false,
            containers: Mutex::new(HashSet::new()),
            objects: Mutex::new(HashSet::new()),
        }
    }

    pub(crate) fn accepting_signed_uploads(mut self) -> Self {
        self.accept_signed_uploads = true;
        self
    }

    /// Records an object as written, standing in for the client's upload.
    pub(crate) fn put_object(&self, container: &str, key: &str) -> Result<(), StorageError> {
        if !self.containers.lock().map_err(poisoned)?.contains(container) {
            return Err(StorageError::NotFound);
        }
        self.objects
            .lock()
            .map_err(poisoned)?
            .insert((container.to_string(), key.to_string()));
        Ok(())
    }

    fn signature(&self, container: &str, key: &str, permissions: &str, expiry: i64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.signing_key.as_bytes());
        hasher.update(b"\n");
        hasher.update(format!("{container}/{key}\n{permissions}\n{expiry}").as_bytes());
        hex::encode(hasher.finalize())
    }
}

fn poisoned<T>(_: T) -> StorageError {
    StorageError::Backend {
        status: 500,
        message: "local storage mutex poisoned".to_string(),
    }
}

#[async_trait]
impl StorageBackend for LocalStorage {
    async fn container_exists(&self, container: &str) -> Result<bool, StorageError> {
        Ok(self.containers.lock().map_err(poisoned)?.contains(container))
    }

    async fn create_container(&self, container: &str) -> Result<(), StorageError> {
        self.containers
            .lock()
            .map_err(poisoned)?
            .insert(container.to_string());
        Ok(())
    }

    async fn object_exists(&self, container: &str, key: &str) -> Result<bool, StorageError> {
        Ok(self
            .objects
            .lock()
            .map_err(poisoned)?
            .contains(&(container.to_string(), key.to_string())))
    }

    async fn delete_object(&self, container: &str, key: &str) -> Result<(), StorageError> {
        let removed = self
            .objects
            .lock()
            .map_err(poisoned)?
            .remove(&(container.to_string(), key.to_string()));
        if removed {
            Ok(())
        } else {
            Err(StorageError::NotFound)
        }
    }

    async fn sign_url(
        &self,
        container: &str,
        key: &str,
        permissions: GrantPermissions,
        expires_at: DateTime<Utc>,
    ) -> Result<String, StorageError> {
        if !self.containers.lock().map_err(poisoned)?.contains(container) {
            return Err(StorageError::NotFound);
        }
        if permissions.write && self.accept_signed_uploads {
            self.objects
                .lock()
                .map_err(poisoned)?
                .insert((container.to_string(), key.to_string()));
        }

        let sp = permissions.as_sas();
        let se = expires_at.timestamp();
        let sig = self.signature(container, key, &sp, se);
        Ok(format!(
            "{}/{container}/{key}?sp={sp}&se={se}&sig={sig}",
            self.base_url
        ))
    }
}

/// Deterministic extraction keyed on the requested model.
#[derive(Debug, Default, Clone)]
pub(crate) struct StubAnalysisBackend;

#[async_trait]
impl AnalysisBackend for StubAnalysisBackend {
    async fn analyze(
        &self,
        request: AnalysisRequest,
    ) -> Result<AnalysisResponse, AnalysisBackendError> {
        let field = |name: &str, value: &str, confidence: f32| ExtractedField {
            name: name.to_string(),
            value: value.to_string(),
            confidence,
        };

        let fields = match request.model_id.as_str() {
            "prebuilt-idDocument" => vec![
                field("documentNumber", "D1234567", 0.97),
                field("firstName", "Jordan", 0.93),
                field("lastName", "Rivera", 0.92),
                field("dateOfExpiration", "2031-04-30", 0.88),
            ],
            "prebuilt-invoice" => vec![
                field("customerAddress", "12 Harbour Street", 0.86),
                field("invoiceDate", "2026-09-01", 0.9),
            ],
            "prebuilt-read" => vec![field("content", "no convictions recorded", 0.8)],
            _ => Vec::new(),
        };

        Ok(AnalysisResponse {
            content: format!("{} analyzed with {}", request.object_key, request.model_id),
            fields,
        })
    }
}

/// Content type advertised for a file name, falling back to `application/octet-stream`.
pub(crate) fn content_type_for(file_name: &str) -> String {
    mime_guess::from_path(file_name)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}
