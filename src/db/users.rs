//! User lookup. Account management lives outside this service.

use super::Database;
use crate::store::UserDirectory;
use crate::types::UserRecord;
use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
impl UserDirectory for Database {
    async fn find_user(&self, id: i32) -> Result<Option<UserRecord>> {
        let user = sqlx::query_as::<_, UserRecord>("SELECT id, name, role FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }
}

impl Database {
    /// Insert a user (or return the existing id for the same name). Used by
    /// seeding and integration tests.
    pub async fn upsert_user(&self, name: &str, role: &str) -> Result<i32> {
        let id = sqlx::query_scalar::<_, i32>(
            "INSERT INTO users (name, role) VALUES ($1, $2)
             ON CONFLICT (name) DO UPDATE SET role = EXCLUDED.role
             RETURNING id",
        )
        .bind(name)
        .bind(role)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }
}
