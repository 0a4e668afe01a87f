//! Document verification workflow: scoped storage grants, field extraction, background
//! checks, and the admin-gated approval state machine.

pub mod access;
pub mod analysis;
pub mod background;
pub mod claims;
pub mod domain;
pub mod lifecycle;
pub mod repository;
pub mod router;
pub mod storage;

#[cfg(test)]
mod tests;

pub use access::{AccessError, AccessGrant, AccessTokenIssuer};
pub use analysis::{
    AnalysisAdapter, AnalysisBackend, AnalysisBackendError, AnalysisOutcome, AnalysisRequest,
    AnalysisResponse, ExtractedField, ANALYSIS_TIMED_OUT, ANALYSIS_UNAVAILABLE,
};
pub use background::{
    BackgroundCheckCompletion, BackgroundCheckCoordinator, BackgroundCheckRecord,
    BackgroundCheckRequestId, BackgroundCheckStatus, BackgroundCheckStore,
    BackgroundCheckStoreError, InMemoryBackgroundCheckStore,
};
pub use claims::ActorClaims;
pub use domain::{
    Document, DocumentId, DocumentStateError, DocumentStatus, DocumentType, DocumentView,
    ExtractedData, OwnerId,
};
pub use lifecycle::{DocumentLifecycle, ErrorKind, LifecycleError, UploadSlot, UploadSlotRequest};
pub use repository::{
    DocumentNotification, DocumentStore, NotificationError, NotificationKind, NotificationSink,
    RepositoryError,
};
pub use router::{background_check_router, document_router};
pub use storage::{GrantPermissions, StorageBackend, StorageError};
