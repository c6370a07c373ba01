use anyhow::{Context, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};

use crate::entities::admins;
use crate::storage::{AdminRecord, NewAdmin};

impl From<admins::Model> for AdminRecord {
    fn from(model: admins::Model) -> Self {
        Self {
            id: model.id.to_string(),
            username: model.username,
            email: model.email,
            password_hash: model.password_hash,
            created_at: model.created_at,
        }
    }
}

pub struct AdminRepository {
    conn: DatabaseConnection,
}

impl AdminRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn get_by_username(&self, username: &str) -> Result<Option<AdminRecord>> {
        let admin = admins::Entity::find()
            .filter(admins::Column::Username.eq(username))
            .one(&self.conn)
            .await
            .context("Failed to query admin by username")?;

        Ok(admin.map(AdminRecord::from))
    }

    pub async fn get_by_email(&self, email: &str) -> Result<Option<AdminRecord>> {
        let admin = admins::Entity::find()
            .filter(admins::Column::Email.eq(email))
            .one(&self.conn)
            .await
            .context("Failed to query admin by email")?;

        Ok(admin.map(AdminRecord::from))
    }

    pub async fn get_by_id(&self, id: i32) -> Result<Option<AdminRecord>> {
        let admin = admins::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query admin by ID")?;

        Ok(admin.map(AdminRecord::from))
    }

    pub async fn count(&self) -> Result<u64> {
        admins::Entity::find()
            .count(&self.conn)
            .await
            .context("Failed to count admins")
    }

    pub async fn list(&self) -> Result<Vec<AdminRecord>> {
        let rows = admins::Entity::find()
            .order_by_asc(admins::Column::Id)
            .all(&self.conn)
            .await
            .context("Failed to list admins")?;

        Ok(rows.into_iter().map(AdminRecord::from).collect())
    }

    /// Inserts an admin whose password has already been hashed.
    pub async fn insert(&self, admin: &NewAdmin) -> Result<AdminRecord> {
        let now = chrono::Utc::now().to_rfc3339();

        let active = admins::ActiveModel {
            username: Set(admin.username.clone()),
            email: Set(admin.email.clone()),
            password_hash: Set(admin.password_hash.clone()),
            created_at: Set(now),
            ..Default::default()
        };

        let model = active
            .insert(&self.conn)
            .await
            .with_context(|| format!("Failed to insert admin {}", admin.username))?;

        Ok(AdminRecord::from(model))
    }

    pub async fn update_password_hash(&self, id: i32, password_hash: &str) -> Result<()> {
        let admin = admins::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query admin for password update")?
            .ok_or_else(|| anyhow::anyhow!("Admin not found: {id}"))?;

        let mut active: admins::ActiveModel = admin.into();
        active.password_hash = Set(Some(password_hash.to_string()));
        active.update(&self.conn).await?;

        Ok(())
    }
}
