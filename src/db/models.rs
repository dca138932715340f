//! Trained-model rows: pending creation, RMSE commit, rollback delete and catalogue queries.
//!
//! A row is inserted with `rmse = NULL` before the remote training call and
//! either receives its RMSE or is deleted by the same lifecycle invocation.
//! Each statement is a single-row operation; no explicit locking is taken.

use super::Database;
use crate::store::ModelStore;
use crate::types::{Indicator, ModelRecord, NewModel};
use anyhow::Result;
use async_trait::async_trait;

const COLUMNS: &str = "id, uid AS user_id, name, target, method, created_at, rmse";

#[async_trait]
impl ModelStore for Database {
    async fn create_pending(&self, model: &NewModel) -> Result<ModelRecord> {
        let record = sqlx::query_as::<_, ModelRecord>(&format!(
            "INSERT INTO models (uid, name, target, method, created_at, rmse)
             VALUES ($1, $2, $3, $4, $5, NULL)
             RETURNING {}",
            COLUMNS
        ))
        .bind(model.user_id)
        .bind(model.name())
        .bind(model.target.as_str())
        .bind(model.method.as_str())
        .bind(model.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(record)
    }

    async fn set_rmse(&self, id: i32, rmse: f64) -> Result<bool> {
        let result = sqlx::query("UPDATE models SET rmse = $2 WHERE id = $1")
            .bind(id)
            .bind(rmse)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: i32) -> Result<bool> {
        let result = sqlx::query("DELETE FROM models WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find(&self, id: i32) -> Result<Option<ModelRecord>> {
        let record = sqlx::query_as::<_, ModelRecord>(&format!(
            "SELECT {} FROM models WHERE id = $1",
            COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn list_for_target(
        &self,
        target: Indicator,
        method: Option<&str>,
    ) -> Result<Vec<ModelRecord>> {
        let rows = match method {
            Some(method) => {
                sqlx::query_as::<_, ModelRecord>(&format!(
                    "SELECT {} FROM models WHERE target = $1 AND method = $2
                     ORDER BY rmse ASC NULLS LAST, id ASC",
                    COLUMNS
                ))
                .bind(target.as_str())
                .bind(method)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, ModelRecord>(&format!(
                    "SELECT {} FROM models WHERE target = $1
                     ORDER BY rmse ASC NULLS LAST, id ASC",
                    COLUMNS
                ))
                .bind(target.as_str())
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows)
    }

    async fn methods_for_target(&self, target: Indicator) -> Result<Vec<String>> {
        let methods = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT method FROM models WHERE target = $1 ORDER BY method",
        )
        .bind(target.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(methods)
    }

    async fn count(&self) -> Result<i64> {
        let n = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM models")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}
