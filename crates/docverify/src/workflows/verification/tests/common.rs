use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::response::Response;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::config::UploadPolicy;
use crate::workflows::verification::access::AccessTokenIssuer;
use crate::workflows::verification::analysis::{
    AnalysisAdapter, AnalysisBackend, AnalysisBackendError, AnalysisRequest, AnalysisResponse,
    ExtractedField,
};
use crate::workflows::verification::domain::{Document, DocumentId, DocumentType, OwnerId};
use crate::workflows::verification::lifecycle::DocumentLifecycle;
use crate::workflows::verification::repository::{
    DocumentNotification, DocumentStore, NotificationError, NotificationSink, RepositoryError,
};
use crate::workflows::verification::storage::{GrantPermissions, StorageBackend, StorageError};

pub(super) const CONTAINER: &str = "documents";

#[derive(Default, Clone)]
pub(super) struct MemoryStore {
    documents: Arc<Mutex<HashMap<DocumentId, Document>>>,
    saves: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub(super) fn document(&self, id: DocumentId) -> Option<Document> {
        self.documents.lock().expect("lock").get(&id).cloned()
    }

    pub(super) fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get_by_id(&self, id: DocumentId) -> Result<Option<Document>, RepositoryError> {
        Ok(self.document(id))
    }

    async fn get_by_owner(&self, owner_id: &OwnerId) -> Result<Vec<Document>, RepositoryError> {
        let guard = self.documents.lock().expect("lock");
        let mut documents: Vec<Document> = guard
            .values()
            .filter(|document| document.owner_id() == owner_id)
            .cloned()
            .collect();
        documents.sort_by_key(|document| document.uploaded_at());
        Ok(documents)
    }

    async fn add(&self, document: Document) -> Result<(), RepositoryError> {
        let mut guard = self.documents.lock().expect("lock");
        if guard.contains_key(&document.id()) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(document.id(), document);
        Ok(())
    }

    async fn update(&self, document: Document) -> Result<(), RepositoryError> {
        let mut guard = self.documents.lock().expect("lock");
        if !guard.contains_key(&document.id()) {
            return Err(RepositoryError::NotFound);
        }
        guard.insert(document.id(), document);
        Ok(())
    }

    async fn exists(&self, id: DocumentId) -> Result<bool, RepositoryError> {
        Ok(self.documents.lock().expect("lock").contains_key(&id))
    }

    async fn save_changes(&self) -> Result<(), RepositoryError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Store whose reads work but whose writes hang, used to cancel mid-persist.
#[derive(Default, Clone)]
pub(super) struct SlowWriteStore {
    pub(super) inner: MemoryStore,
    pub(super) write_delay: Duration,
}

#[async_trait]
impl DocumentStore for SlowWriteStore {
    async fn get_by_id(&self, id: DocumentId) -> Result<Option<Document>, RepositoryError> {
        self.inner.get_by_id(id).await
    }

    async fn get_by_owner(&self, owner_id: &OwnerId) -> Result<Vec<Document>, RepositoryError> {
        self.inner.get_by_owner(owner_id).await
    }

    async fn add(&self, document: Document) -> Result<(), RepositoryError> {
        self.inner.add(document).await
    }

    async fn update(&self, document: Document) -> Result<(), RepositoryError> {
        tokio::time::sleep(self.write_delay).await;
        self.inner.update(document).await
    }

    async fn exists(&self, id: DocumentId) -> Result<bool, RepositoryError> {
        self.inner.exists(id).await
    }

    async fn save_changes(&self) -> Result<(), RepositoryError> {
        self.inner.save_changes().await
    }
}

#[derive(Clone)]
pub(super) struct UnavailableStore;

#[async_trait]
impl DocumentStore for UnavailableStore {
    async fn get_by_id(&self, _id: DocumentId) -> Result<Option<Document>, RepositoryError> {
        Err(RepositoryError::Unavailable("connection refused by db-7".to_string()))
    }

    async fn get_by_owner(&self, _owner_id: &OwnerId) -> Result<Vec<Document>, RepositoryError> {
        Err(RepositoryError::Unavailable("connection refused by db-7".to_string()))
    }

    async fn add(&self, _document: Document) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("connection refused by db-7".to_string()))
    }

    async fn update(&self, _document: Document) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("connection refused by db-7".to_string()))
    }

    async fn exists(&self, _id: DocumentId) -> Result<bool, RepositoryError> {
        Err(RepositoryError::Unavailable("connection refused by db-7".to_string()))
    }

    async fn save_changes(&self) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("connection refused by db-7".to_string()))
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryNotifications {
    events: Arc<Mutex<Vec<DocumentNotification>>>,
    fail: Arc<AtomicBool>,
}

impl MemoryNotifications {
    pub(super) fn failing() -> Self {
        let sink = Self::default();
        sink.fail.store(true, Ordering::SeqCst);
        sink
    }

    pub(super) fn events(&self) -> Vec<DocumentNotification> {
        self.events.lock().expect("lock").clone()
    }
}

#[async_trait]
impl NotificationSink for MemoryNotifications {
    async fn publish(&self, notification: DocumentNotification) -> Result<(), NotificationError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotificationError::Transport("bus offline".to_string()));
        }
        self.events.lock().expect("lock").push(notification);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub(super) struct MemoryStorage {
    containers: Mutex<HashSet<String>>,
    objects: Mutex<HashSet<(String, String)>>,
    create_calls: AtomicUsize,
    create_failures_remaining: AtomicUsize,
    create_delay: Option<Duration>,
    signing_error: Option<StorageError>,
    existence_error: Option<StorageError>,
}

impl MemoryStorage {
    pub(super) fn with_create_delay(delay: Duration) -> Self {
        Self {
            create_delay: Some(delay),
            ..Self::default()
        }
    }

    pub(super) fn with_existing_container(container: &str) -> Self {
        let storage = Self::default();
        storage
            .containers
            .lock()
            .expect("lock")
            .insert(container.to_string());
        storage
    }

    pub(super) fn failing_creates(times: usize) -> Self {
        let storage = Self::default();
        storage
            .create_failures_remaining
            .store(times, Ordering::SeqCst);
        storage
    }

    pub(super) fn with_signing_error(error: StorageError) -> Self {
        Self {
            signing_error: Some(error),
            ..Self::default()
        }
    }

    pub(super) fn with_existence_error(error: StorageError) -> Self {
        Self {
            existence_error: Some(error),
            ..Self::default()
        }
    }

    /// Simulates a client finishing its direct upload.
    pub(super) fn put_object(&self, container: &str, key: &str) {
        self.objects
            .lock()
            .expect("lock")
            .insert((container.to_string(), key.to_string()));
    }

    pub(super) fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn container_exists(&self, container: &str) -> Result<bool, StorageError> {
        Ok(self.containers.lock().expect("lock").contains(container))
    }

    async fn create_container(&self, container: &str) -> Result<(), StorageError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.create_delay {
            tokio::time::sleep(delay).await;
        }
        let should_fail = self
            .create_failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(StorageError::Backend {
                status: 503,
                message: "server busy".to_string(),
            });
        }
        self.containers
            .lock()
            .expect("lock")
            .insert(container.to_string());
        Ok(())
    }

    async fn object_exists(&self, container: &str, key: &str) -> Result<bool, StorageError> {
        if let Some(error) = &self.existence_error {
            return Err(error.clone());
        }
        Ok(self
            .objects
            .lock()
            .expect("lock")
            .contains(&(container.to_string(), key.to_string())))
    }

    async fn delete_object(&self, container: &str, key: &str) -> Result<(), StorageError> {
        let removed = self
            .objects
            .lock()
            .expect("lock")
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
        if let Some(error) = &self.signing_error {
            return Err(error.clone());
        }
        Ok(format!(
            "https://storage.test/{container}/{key}?sp={}&se={}&sig=test",
            permissions.as_sas(),
            expires_at.timestamp()
        ))
    }
}

#[derive(Debug)]
pub(super) struct StubAnalysis {
    response: Mutex<Result<AnalysisResponse, AnalysisBackendError>>,
    delay: Option<Duration>,
    requests: Mutex<Vec<AnalysisRequest>>,
}

impl StubAnalysis {
    pub(super) fn returning(response: AnalysisResponse) -> Self {
        Self {
            response: Mutex::new(Ok(response)),
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(super) fn failing(error: AnalysisBackendError) -> Self {
        Self {
            response: Mutex::new(Err(error)),
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(super) fn slow(delay: Duration) -> Self {
        Self {
            response: Mutex::new(Ok(AnalysisResponse::default())),
            delay: Some(delay),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(super) fn set_response(&self, response: Result<AnalysisResponse, AnalysisBackendError>) {
        *self.response.lock().expect("lock") = response;
    }

    pub(super) fn requests(&self) -> Vec<AnalysisRequest> {
        self.requests.lock().expect("lock").clone()
    }
}

#[async_trait]
impl AnalysisBackend for StubAnalysis {
    async fn analyze(
        &self,
        request: AnalysisRequest,
    ) -> Result<AnalysisResponse, AnalysisBackendError> {
        self.requests.lock().expect("lock").push(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.response.lock().expect("lock").clone()
    }
}

pub(super) fn field(name: &str, value: &str, confidence: f32) -> ExtractedField {
    ExtractedField {
        name: name.to_string(),
        value: value.to_string(),
        confidence,
    }
}

pub(super) fn identity_extraction() -> AnalysisResponse {
    AnalysisResponse {
        fields: vec![
            field("documentNumber", "X1234567", 0.98),
            field("firstName", "Ada", 0.9),
            field("dateOfExpiration", "2031-04-30", 0.82),
        ],
        content: "IDENTITY CARD Ada Lovelace X1234567".to_string(),
    }
}

pub(super) struct Harness<R = MemoryStore> {
    pub(super) lifecycle: DocumentLifecycle<R, MemoryNotifications>,
    pub(super) store: R,
    pub(super) notifications: MemoryNotifications,
    pub(super) storage: Arc<MemoryStorage>,
    pub(super) analysis: Arc<StubAnalysis>,
}

pub(super) fn harness() -> Harness {
    harness_with(MemoryStore::default(), MemoryNotifications::default())
}

pub(super) fn harness_with<R>(store: R, notifications: MemoryNotifications) -> Harness<R>
where
    R: DocumentStore + Clone + 'static,
{
    let storage = Arc::new(MemoryStorage::default());
    let analysis = Arc::new(StubAnalysis::returning(identity_extraction()));
    let issuer = Arc::new(AccessTokenIssuer::new(storage.clone(), CONTAINER));
    let adapter = Arc::new(AnalysisAdapter::new(
        analysis.clone(),
        Duration::from_secs(5),
    ));
    let lifecycle = DocumentLifecycle::new(
        Arc::new(store.clone()),
        Arc::new(notifications.clone()),
        issuer,
        adapter,
    )
    .with_upload_policy(UploadPolicy::default());

    Harness {
        lifecycle,
        store,
        notifications,
        storage,
        analysis,
    }
}

pub(super) fn owner() -> OwnerId {
    OwnerId("U1".to_string())
}

impl<R> Harness<R>
where
    R: DocumentStore + 'static,
{
    /// Creates `id.pdf` under key `k1` and confirms its upload.
    pub(super) async fn pending_document(&self) -> Document {
        let document = self.uploaded_document().await;
        self.storage.put_object(CONTAINER, document.storage_path());
        self.lifecycle
            .mark_as_pending_verification(document.id())
            .await
            .expect("document moves to pending verification")
    }

    pub(super) async fn uploaded_document(&self) -> Document {
        self.lifecycle
            .create(owner(), DocumentType::IdentityDocument, "id.pdf", "k1")
            .await
            .expect("document is created")
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
