use async_trait::async_trait;

use super::{AdminRecord, AdminStore, NewAdmin, StorageError};
use crate::config::{StorageBackend, StorageConfig};
use crate::db::Store;

pub struct SqliteAdminStore {
    store: Store,
}

impl SqliteAdminStore {
    #[must_use]
    pub const fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn connect(config: &StorageConfig) -> anyhow::Result<Self> {
        let store = Store::with_pool_options(
            &config.database_path,
            config.max_db_connections,
            config.min_db_connections,
        )
        .await?;
        Ok(Self::new(store))
    }

    fn parse_id(id: &str) -> Result<i32, StorageError> {
        id.parse()
            .map_err(|_| StorageError::NotFound(format!("invalid admin id {id}")))
    }
}

#[async_trait]
impl AdminStore for SqliteAdminStore {
    fn backend(&self) -> StorageBackend {
        StorageBackend::Sqlite
    }

    async fn ping(&self) -> Result<(), StorageError> {
        Ok(self.store.ping().await?)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<AdminRecord>, StorageError> {
        Ok(self.store.get_admin_by_email(email).await?)
    }

    async fn find_by_username(
        &self,
        username: &str,
    ) -> Result<Option<AdminRecord>, StorageError> {
        Ok(self.store.get_admin_by_username(username).await?)
    }

    async fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.store.count_admins().await? == 0)
    }

    async fn list(&self) -> Result<Vec<AdminRecord>, StorageError> {
        Ok(self.store.list_admins().await?)
    }

    async fn insert(&self, admin: NewAdmin) -> Result<AdminRecord, StorageError> {
        if self.store.get_admin_by_username(&admin.username).await?.is_some() {
            return Err(StorageError::Conflict(admin.username));
        }
        if let Some(email) = &admin.email
            && self.store.get_admin_by_email(email).await?.is_some()
        {
            return Err(StorageError::Conflict(email.clone()));
        }

        Ok(self.store.insert_admin(&admin).await?)
    }

    async fn update_password_hash(
        &self,
        id: &str,
        password_hash: &str,
    ) -> Result<(), StorageError> {
        let id = Self::parse_id(id)?;
        if self.store.get_admin_by_id(id).await?.is_none() {
            return Err(StorageError::NotFound(id.to_string()));
        }
        Ok(self
            .store
            .update_admin_password_hash(id, password_hash)
            .await?)
    }
}
