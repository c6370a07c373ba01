use anyhow::Result;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::storage::{AdminRecord, NewAdmin};

pub mod migrator;
pub mod repositories;

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        ensure_sqlite_file(db_url).await?;

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    fn admin_repo(&self) -> repositories::admin::AdminRepository {
        repositories::admin::AdminRepository::new(self.conn.clone())
    }

    pub async fn get_admin_by_username(&self, username: &str) -> Result<Option<AdminRecord>> {
        self.admin_repo().get_by_username(username).await
    }

    pub async fn get_admin_by_email(&self, email: &str) -> Result<Option<AdminRecord>> {
        self.admin_repo().get_by_email(email).await
    }

    pub async fn get_admin_by_id(&self, id: i32) -> Result<Option<AdminRecord>> {
        self.admin_repo().get_by_id(id).await
    }

    pub async fn count_admins(&self) -> Result<u64> {
        self.admin_repo().count().await
    }

    pub async fn list_admins(&self) -> Result<Vec<AdminRecord>> {
        self.admin_repo().list().await
    }

    pub async fn insert_admin(&self, admin: &NewAdmin) -> Result<AdminRecord> {
        self.admin_repo().insert(admin).await
    }

    pub async fn update_admin_password_hash(&self, id: i32, password_hash: &str) -> Result<()> {
        self.admin_repo()
            .update_password_hash(id, password_hash)
            .await
    }
}

/// Creates the parent directory and an empty file for on-disk SQLite URLs.
pub async fn ensure_sqlite_file(db_url: &str) -> Result<()> {
    if db_url.contains(":memory:") {
        return Ok(());
    }

    let path_str = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:");
    let path_str = path_str.split('?').next().unwrap_or(path_str);
    let path = Path::new(path_str);

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }
    if !path.exists() {
        tokio::fs::File::create(path).await?;
    }

    Ok(())
}
