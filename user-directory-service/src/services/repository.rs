//! Local user record storage.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;

use super::ServiceError;
use crate::models::{LocalUser, LocalUserChanges, NewLocalUser};

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: NewLocalUser) -> Result<LocalUser, ServiceError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<LocalUser>, ServiceError>;

    /// `None` when no record has that id.
    async fn update(
        &self,
        id: i64,
        changes: LocalUserChanges,
    ) -> Result<Option<LocalUser>, ServiceError>;

    /// `false` when no record has that id.
    async fn delete(&self, id: i64) -> Result<bool, ServiceError>;

    async fn health_check(&self) -> Result<(), ServiceError> {
        Ok(())
    }
}

const LOCAL_USER_COLUMNS: &str = "id, username, first_name, middle_name, last_name, \
     email_address, contact_number, created_at, updated_at";

#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create(&self, user: NewLocalUser) -> Result<LocalUser, ServiceError> {
        let sql = format!(
            "INSERT INTO local_users \
             (username, first_name, middle_name, last_name, email_address, contact_number) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {}",
            LOCAL_USER_COLUMNS
        );

        let created = sqlx::query_as::<_, LocalUser>(&sql)
            .bind(&user.username)
            .bind(&user.first_name)
            .bind(&user.middle_name)
            .bind(&user.last_name)
            .bind(&user.email_address)
            .bind(&user.contact_number)
            .fetch_one(&self.pool)
            .await?;

        tracing::info!(user_id = created.id, username = %created.username, "Local user created");
        Ok(created)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<LocalUser>, ServiceError> {
        let sql = format!("SELECT {} FROM local_users WHERE id = $1", LOCAL_USER_COLUMNS);

        let user = sqlx::query_as::<_, LocalUser>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    async fn update(
        &self,
        id: i64,
        changes: LocalUserChanges,
    ) -> Result<Option<LocalUser>, ServiceError> {
        let sql = format!(
            "UPDATE local_users SET \
                 username = COALESCE($2, username), \
                 first_name = COALESCE($3, first_name), \
                 middle_name = COALESCE($4, middle_name), \
                 last_name = COALESCE($5, last_name), \
                 email_address = COALESCE($6, email_address), \
                 contact_number = COALESCE($7, contact_number), \
                 updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {}",
            LOCAL_USER_COLUMNS
        );

        let updated = sqlx::query_as::<_, LocalUser>(&sql)
            .bind(id)
            .bind(changes.username)
            .bind(changes.first_name)
            .bind(changes.middle_name)
            .bind(changes.last_name)
            .bind(changes.email_address)
            .bind(changes.contact_number)
            .fetch_optional(&self.pool)
            .await?;

        Ok(updated)
    }

    async fn delete(&self, id: i64) -> Result<bool, ServiceError> {
        let result = sqlx::query("DELETE FROM local_users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn health_check(&self) -> Result<(), ServiceError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Process-local store for development and tests. Contents are lost on restart.
#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<BTreeMap<i64, LocalUser>>,
    next_id: AtomicI64,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create(&self, user: NewLocalUser) -> Result<LocalUser, ServiceError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let now = Utc::now();
        let created = LocalUser {
            id,
            username: user.username,
            first_name: user.first_name,
            middle_name: user.middle_name,
            last_name: user.last_name,
            email_address: user.email_address,
            contact_number: user.contact_number,
            created_at: now,
            updated_at: now,
        };

        self.users.write().await.insert(id, created.clone());
        Ok(created)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<LocalUser>, ServiceError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn update(
        &self,
        id: i64,
        changes: LocalUserChanges,
    ) -> Result<Option<LocalUser>, ServiceError> {
        let mut users = self.users.write().await;
        Ok(users.get_mut(&id).map(|user| {
            changes.apply_to(user);
            user.clone()
        }))
    }

    async fn delete(&self, id: i64) -> Result<bool, ServiceError> {
        Ok(self.users.write().await.remove(&id).is_some())
    }
}
