use std::fmt::Debug;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Permission flags carried by a delegated storage URL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GrantPermissions {
    pub create: bool,
    pub write: bool,
    pub read: bool,
}

impl GrantPermissions {
    pub const UPLOAD: Self = Self {
        create: true,
        write: true,
        read: false,
    };

    pub const DOWNLOAD: Self = Self {
        create: false,
        write: false,
        read: true,
    };

    /// SAS-style permission string, e.g. `cw` or `r`.
    pub fn as_sas(&self) -> String {
        let mut flags = String::with_capacity(3);
        if self.read {
            flags.push('r');
        }
        if self.create {
            flags.push('c');
        }
        if self.write {
            flags.push('w');
        }
        flags
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("object or container not found")]
    NotFound,
    #[error("credential type cannot produce delegated access urls")]
    UnsupportedCredential,
    #[error("storage backend returned status {status}: {message}")]
    Backend { status: u16, message: String },
}

/// Object storage operations the grant issuer depends on.
#[async_trait]
pub trait StorageBackend: Debug + Send + Sync {
    async fn container_exists(&self, container: &str) -> Result<bool, StorageError>;

    async fn create_container(&self, container: &str) -> Result<(), StorageError>;

    async fn object_exists(&self, container: &str, key: &str) -> Result<bool, StorageError>;

    /// Missing objects should be reported as [`StorageError::NotFound`].
    async fn delete_object(&self, container: &str, key: &str) -> Result<(), StorageError>;

    async fn sign_url(
        &self,
        container: &str,
        key: &str,
        permissions: GrantPermissions,
        expires_at: DateTime<Utc>,
    ) -> Result<String, StorageError>;
}
