use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::storage::{GrantPermissions, StorageBackend, StorageError};

pub const UPLOAD_GRANT_TTL_HOURS: i64 = 1;
pub const DOWNLOAD_GRANT_TTL_HOURS: i64 = 24;

/// Time-limited credential for direct client access to one object. Never persisted.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct AccessGrant {
    pub url: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub permissions: GrantPermissions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl AccessGrant {
    pub fn is_expired_at(&self, at: DateTime<Utc>) -> bool {
        at >= self.expires_at
    }
}

// The url embeds the signature, keep it out of logs.
impl fmt::Debug for AccessGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessGrant")
            .field("url", &"<redacted>")
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .field("permissions", &self.permissions)
            .field("content_type", &self.content_type)
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error("object key '{0}' is not a valid storage key")]
    InvalidObjectKey(String),
    #[error("storage {operation} failed: {source}")]
    Storage {
        operation: &'static str,
        #[source]
        source: StorageError,
    },
    #[error("container initializer did not complete: {0}")]
    InitializerAborted(String),
}

/// Issues scoped grants against a single container, creating it on first use.
pub struct AccessTokenIssuer {
    storage: Arc<dyn StorageBackend>,
    container: String,
    initialized: Arc<AtomicBool>,
    init_lock: Arc<Mutex<()>>,
}

impl fmt::Debug for AccessTokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessTokenIssuer")
            .field("container", &self.container)
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}

impl AccessTokenIssuer {
    pub fn new(storage: Arc<dyn StorageBackend>, container: impl Into<String>) -> Self {
        Self {
            storage,
            container: container.into(),
            initialized: Arc::new(AtomicBool::new(false)),
            init_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Creates the container at most once per issuer.
    ///
    /// The creation call runs on its own task and owns the lock guard, so dropping a
    /// waiting caller never abandons an initialization halfway. Waiters re-check the
    /// flag once they get the lock; a failed attempt leaves the flag unset and the
    /// next caller tries again.
    pub async fn ensure_container(&self) -> Result<(), AccessError> {
        if self.is_initialized() {
            return Ok(());
        }

        let guard = Arc::clone(&self.init_lock).lock_owned().await;
        if self.is_initialized() {
            return Ok(());
        }

        let storage = Arc::clone(&self.storage);
        let initialized = Arc::clone(&self.initialized);
        let container = self.container.clone();

        let initializer = tokio::spawn(async move {
            let _guard = guard;
            let result = create_if_missing(storage.as_ref(), &container).await;
            if result.is_ok() {
                initialized.store(true, Ordering::Release);
            }
            result
        });

        match initializer.await {
            Ok(result) => result.map_err(|source| AccessError::Storage {
                operation: "container initialization",
                source,
            }),
            Err(join_error) => Err(AccessError::InitializerAborted(join_error.to_string())),
        }
    }

    /// Create + write grant, valid for one hour.
    pub async fn issue_upload_grant(
        &self,
        object_key: &str,
        content_type: &str,
    ) -> Result<AccessGrant, AccessError> {
        let content_type = content_type.trim();
        let content_type = (!content_type.is_empty()).then(|| content_type.to_string());
        self.issue(
            object_key,
            GrantPermissions::UPLOAD,
            Duration::hours(UPLOAD_GRANT_TTL_HOURS),
            content_type,
        )
        .await
    }

    /// Read-only grant, valid for twenty-four hours.
    pub async fn issue_download_grant(&self, object_key: &str) -> Result<AccessGrant, AccessError> {
        self.issue(
            object_key,
            GrantPermissions::DOWNLOAD,
            Duration::hours(DOWNLOAD_GRANT_TTL_HOURS),
            None,
        )
        .await
    }

    pub async fn exists(&self, object_key: &str) -> Result<bool, AccessError> {
        let key = validate_object_key(object_key)?;
        self.ensure_container().await?;

        match self.storage.object_exists(&self.container, key).await {
            Ok(found) => Ok(found),
            Err(StorageError::NotFound) => Ok(false),
            Err(source) => Err(AccessError::Storage {
                operation: "existence check",
                source,
            }),
        }
    }

    /// Deleting a missing object counts as success.
    pub async fn delete(&self, object_key: &str) -> Result<(), AccessError> {
        let key = validate_object_key(object_key)?;
        self.ensure_container().await?;

        match self.storage.delete_object(&self.container, key).await {
            Ok(()) => {
                info!(container = %self.container, key, "storage object deleted");
                Ok(())
            }
            Err(StorageError::NotFound) => {
                debug!(container = %self.container, key, "delete skipped, object already absent");
                Ok(())
            }
            Err(source) => Err(AccessError::Storage {
                operation: "delete",
                source,
            }),
        }
    }

    async fn issue(
        &self,
        object_key: &str,
        permissions: GrantPermissions,
        ttl: Duration,
        content_type: Option<String>,
    ) -> Result<AccessGrant, AccessError> {
        let key = validate_object_key(object_key)?;
        self.ensure_container().await?;

        let issued_at = Utc::now();
        let expires_at = issued_at + ttl;
        let url = self
            .storage
            .sign_url(&self.container, key, permissions, expires_at)
            .await
            .map_err(|source| {
                warn!(container = %self.container, key, error = %source, "grant signing failed");
                AccessError::Storage {
                    operation: "grant signing",
                    source,
                }
            })?;

        debug!(
            container = %self.container,
            key,
            permissions = %permissions.as_sas(),
            %expires_at,
            "access grant issued"
        );

        Ok(AccessGrant {
            url,
            issued_at,
            expires_at,
            permissions,
            content_type,
        })
    }
}

async fn create_if_missing(storage: &dyn StorageBackend, container: &str) -> Result<(), StorageError> {
    if storage.container_exists(container).await? {
        debug!(container, "storage container already present");
        return Ok(());
    }
    storage.create_container(container).await?;
    info!(container, "storage container created");
    Ok(())
}

pub(crate) fn validate_object_key(object_key: &str) -> Result<&str, AccessError> {
    let key = object_key.trim();
    let invalid = key.is_empty()
        || key.starts_with('/')
        || key.contains('?')
        || key.contains('#')
        || key.split('/').any(|segment| segment == "..");
    if invalid {
        Err(AccessError::InvalidObjectKey(object_key.to_string()))
    } else {
        Ok(key)
    }
}
