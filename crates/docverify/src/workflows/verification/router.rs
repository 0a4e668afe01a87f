use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::background::{BackgroundCheckCoordinator, BackgroundCheckRequestId};
use super::claims::ActorClaims;
use super::domain::{DocumentId, DocumentType, DocumentView, OwnerId};
use super::lifecycle::{DocumentLifecycle, ErrorKind, LifecycleError, UploadSlotRequest};
use super::repository::{DocumentStore, NotificationSink};

impl IntoResponse for LifecycleError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = match kind {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let payload = json!({
            "error": self.to_string(),
            "kind": kind,
        });
        (status, Json(payload)).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateDocumentRequest {
    pub(crate) owner_id: OwnerId,
    pub(crate) document_type: DocumentType,
    pub(crate) file_name: String,
    pub(crate) storage_path: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RejectDocumentRequest {
    #[serde(default)]
    pub(crate) reason: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubmitBackgroundCheckRequest {
    pub(crate) subject_id: String,
    pub(crate) full_name: String,
    pub(crate) birth_date: NaiveDate,
}

/// Router builder exposing the document verification endpoints.
pub fn document_router<R, N>(lifecycle: Arc<DocumentLifecycle<R, N>>) -> Router
where
    R: DocumentStore + 'static,
    N: NotificationSink + 'static,
{
    Router::new()
        .route(
            "/api/v1/documents/upload-slots",
            post(upload_slot_handler::<R, N>),
        )
        .route("/api/v1/documents", post(create_handler::<R, N>))
        .route(
            "/api/v1/documents/:document_id",
            get(document_handler::<R, N>),
        )
        .route(
            "/api/v1/owners/:owner_id/documents",
            get(owner_documents_handler::<R, N>),
        )
        .route(
            "/api/v1/documents/:document_id/confirm-upload",
            post(confirm_upload_handler::<R, N>),
        )
        .route(
            "/api/v1/documents/:document_id/analysis",
            post(analysis_handler::<R, N>),
        )
        .route(
            "/api/v1/documents/:document_id/approve",
            post(approve_handler::<R, N>),
        )
        .route(
            "/api/v1/documents/:document_id/reject",
            post(reject_handler::<R, N>),
        )
        .route(
            "/api/v1/documents/:document_id/download",
            get(download_handler::<R, N>),
        )
        .with_state(lifecycle)
}

/// Router builder for the background check endpoints.
pub fn background_check_router(coordinator: Arc<BackgroundCheckCoordinator>) -> Router {
    Router::new()
        .route(
            "/api/v1/background-checks",
            post(submit_background_check_handler),
        )
        .route(
            "/api/v1/background-checks/:request_id",
            get(background_check_status_handler),
        )
        .with_state(coordinator)
}

pub(crate) async fn upload_slot_handler<R, N>(
    State(lifecycle): State<Arc<DocumentLifecycle<R, N>>>,
    Json(request): Json<UploadSlotRequest>,
) -> Response
where
    R: DocumentStore + 'static,
    N: NotificationSink + 'static,
{
    match lifecycle.request_upload_slot(request).await {
        Ok(slot) => (StatusCode::CREATED, Json(slot)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn create_handler<R, N>(
    State(lifecycle): State<Arc<DocumentLifecycle<R, N>>>,
    Json(request): Json<CreateDocumentRequest>,
) -> Response
where
    R: DocumentStore + 'static,
    N: NotificationSink + 'static,
{
    let CreateDocumentRequest {
        owner_id,
        document_type,
        file_name,
        storage_path,
    } = request;

    match lifecycle
        .create(owner_id, document_type, &file_name, &storage_path)
        .await
    {
        Ok(document) => (StatusCode::CREATED, Json(DocumentView::from(&document))).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn document_handler<R, N>(
    State(lifecycle): State<Arc<DocumentLifecycle<R, N>>>,
    Path(document_id): Path<Uuid>,
) -> Response
where
    R: DocumentStore + 'static,
    N: NotificationSink + 'static,
{
    match lifecycle.get(DocumentId(document_id)).await {
        Ok(document) => (StatusCode::OK, Json(DocumentView::from(&document))).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn owner_documents_handler<R, N>(
    State(lifecycle): State<Arc<DocumentLifecycle<R, N>>>,
    Path(owner_id): Path<String>,
) -> Response
where
    R: DocumentStore + 'static,
    N: NotificationSink + 'static,
{
    match lifecycle.list_for_owner(&OwnerId(owner_id)).await {
        Ok(documents) => {
            let views: Vec<DocumentView> = documents.iter().map(DocumentView::from).collect();
            (StatusCode::OK, Json(views)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn confirm_upload_handler<R, N>(
    State(lifecycle): State<Arc<DocumentLifecycle<R, N>>>,
    Path(document_id): Path<Uuid>,
) -> Response
where
    R: DocumentStore + 'static,
    N: NotificationSink + 'static,
{
    match lifecycle
        .mark_as_pending_verification(DocumentId(document_id))
        .await
    {
        Ok(document) => (StatusCode::OK, Json(DocumentView::from(&document))).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn analysis_handler<R, N>(
    State(lifecycle): State<Arc<DocumentLifecycle<R, N>>>,
    Path(document_id): Path<Uuid>,
) -> Response
where
    R: DocumentStore + 'static,
    N: NotificationSink + 'static,
{
    match lifecycle.request_analysis(DocumentId(document_id)).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn approve_handler<R, N>(
    State(lifecycle): State<Arc<DocumentLifecycle<R, N>>>,
    Path(document_id): Path<Uuid>,
    actor: ActorClaims,
) -> Response
where
    R: DocumentStore + 'static,
    N: NotificationSink + 'static,
{
    match lifecycle.approve(DocumentId(document_id), &actor).await {
        Ok(document) => (StatusCode::OK, Json(DocumentView::from(&document))).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn reject_handler<R, N>(
    State(lifecycle): State<Arc<DocumentLifecycle<R, N>>>,
    Path(document_id): Path<Uuid>,
    actor: ActorClaims,
    Json(request): Json<RejectDocumentRequest>,
) -> Response
where
    R: DocumentStore + 'static,
    N: NotificationSink + 'static,
{
    match lifecycle
        .reject(DocumentId(document_id), &actor, &request.reason)
        .await
    {
        Ok(document) => (StatusCode::OK, Json(DocumentView::from(&document))).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn download_handler<R, N>(
    State(lifecycle): State<Arc<DocumentLifecycle<R, N>>>,
    Path(document_id): Path<Uuid>,
    actor: ActorClaims,
) -> Response
where
    R: DocumentStore + 'static,
    N: NotificationSink + 'static,
{
    match lifecycle
        .issue_download_grant(DocumentId(document_id), &actor)
        .await
    {
        Ok(grant) => (StatusCode::OK, Json(grant)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn submit_background_check_handler(
    State(coordinator): State<Arc<BackgroundCheckCoordinator>>,
    Json(request): Json<SubmitBackgroundCheckRequest>,
) -> Response {
    if request.subject_id.trim().is_empty() || request.full_name.trim().is_empty() {
        let payload = json!({
            "error": "subject id and full name are required",
            "kind": ErrorKind::BadRequest,
        });
        return (StatusCode::BAD_REQUEST, Json(payload)).into_response();
    }

    let record = coordinator
        .submit(&request.subject_id, &request.full_name, request.birth_date)
        .await;
    (StatusCode::ACCEPTED, Json(record)).into_response()
}

pub(crate) async fn background_check_status_handler(
    State(coordinator): State<Arc<BackgroundCheckCoordinator>>,
    Path(request_id): Path<Uuid>,
) -> Response {
    let record = coordinator
        .poll_status(BackgroundCheckRequestId(request_id))
        .await;
    (StatusCode::OK, Json(record)).into_response()
}
