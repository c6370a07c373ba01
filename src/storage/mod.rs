//! Admin-record storage.
//!
//! Admin records live either in SQLite or in Firestore. The backend is chosen
//! once at startup from `storage.backend`; everything above this module talks
//! to the [`AdminStore`] trait only.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{Config, StorageBackend};

pub mod firestore;
pub mod sqlite;

pub use firestore::FirestoreAdminStore;
pub use sqlite::SqliteAdminStore;

/// Local record establishing that an identity may administer the academy.
#[derive(Clone, PartialEq, Eq)]
pub struct AdminRecord {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    /// Present only for admins provisioned for the username/password path.
    pub password_hash: Option<String>,
    pub created_at: String,
}

impl fmt::Debug for AdminRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminRecord")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("email", &self.email)
            .field(
                "password_hash",
                &self.password_hash.as_ref().map(|_| "[redacted]"),
            )
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Admin to be provisioned. The password is already hashed.
#[derive(Clone)]
pub struct NewAdmin {
    pub username: String,
    pub email: Option<String>,
    pub password_hash: Option<String>,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Admin record is malformed: {0}")]
    Malformed(String),

    #[error("Admin already exists: {0}")]
    Conflict(String),

    #[error("Admin not found: {0}")]
    NotFound(String),
}

impl From<anyhow::Error> for StorageError {
    fn from(err: anyhow::Error) -> Self {
        Self::Unavailable(format!("{err:#}"))
    }
}

impl From<sea_orm::DbErr> for StorageError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Unavailable(err.to_string())
    }
}

#[async_trait]
pub trait AdminStore: Send + Sync {
    fn backend(&self) -> StorageBackend;

    async fn ping(&self) -> Result<(), StorageError>;

    /// Returns the admin whose email matches exactly, or `None` when there is
    /// no match or the match is ambiguous.
    async fn find_by_email(&self, email: &str) -> Result<Option<AdminRecord>, StorageError>;

    async fn find_by_username(&self, username: &str)
    -> Result<Option<AdminRecord>, StorageError>;

    /// `true` when no admin is provisioned yet.
    async fn is_empty(&self) -> Result<bool, StorageError>;

    async fn list(&self) -> Result<Vec<AdminRecord>, StorageError>;

    async fn insert(&self, admin: NewAdmin) -> Result<AdminRecord, StorageError>;

    async fn update_password_hash(&self, id: &str, password_hash: &str)
    -> Result<(), StorageError>;
}

/// Opens the configured admin store.
pub async fn connect(config: &Config) -> anyhow::Result<Arc<dyn AdminStore>> {
    let store: Arc<dyn AdminStore> = match config.storage.backend {
        StorageBackend::Sqlite => Arc::new(SqliteAdminStore::connect(&config.storage).await?),
        StorageBackend::Firestore => Arc::new(FirestoreAdminStore::from_config(config).await?),
    };

    tracing::info!(backend = %store.backend(), "Admin store ready");
    Ok(store)
}

/// Creates the bootstrap admin when the store holds no admin at all.
///
/// Returns `true` when an admin was created.
pub async fn ensure_default_admin(
    store: &dyn AdminStore,
    config: &Config,
) -> anyhow::Result<bool> {
    if !store.is_empty().await? {
        tracing::info!("Admin exists, skipping bootstrap admin");
        return Ok(false);
    }

    let username = config.storage.bootstrap_username.clone();
    let password_hash = crate::services::password::hash_password_blocking(
        config.storage.bootstrap_password.clone(),
        config.security.clone(),
    )
    .await?;

    store
        .insert(NewAdmin {
            username: username.clone(),
            email: None,
            password_hash: Some(password_hash),
        })
        .await?;

    tracing::warn!(
        username = %username,
        "Created bootstrap admin with the configured default password; change it immediately"
    );
    Ok(true)
}

/// Outcome of [`copy_admins`].
#[derive(Debug, Default)]
pub struct CopyReport {
    pub copied: Vec<String>,
    /// Usernames the target already holds.
    pub skipped: Vec<String>,
}

/// Copies every admin from `source` into `target`, password hashes included.
///
/// Admins whose username or email already exists in `target` are skipped.
pub async fn copy_admins(
    source: &dyn AdminStore,
    target: &dyn AdminStore,
) -> Result<CopyReport, StorageError> {
    let mut report = CopyReport::default();

    for admin in source.list().await? {
        let username = admin.username.clone();
        let copy = NewAdmin {
            username: admin.username,
            email: admin.email,
            password_hash: admin.password_hash,
        };

        match target.insert(copy).await {
            Ok(_) => {
                tracing::info!(username = %username, "Copied admin");
                report.copied.push(username);
            }
            Err(StorageError::Conflict(key)) => {
                tracing::info!(username = %username, key = %key, "Admin already present, skipping");
                report.skipped.push(username);
            }
            Err(e) => return Err(e),
        }
    }

    Ok(report)
}
