//! # Store: Persistence Seams
//!
//! The orchestrator and aggregator only see these traits. Two implementations
//! exist: [`crate::db::Database`] (PostgreSQL via sqlx) and
//! [`memory::MemoryStore`] (process-local, used by tests and `serve --in-memory`).
//!
//! Both implementations must agree on ordering:
//!
//! - measurements: ascending by timestamp (`recent` is the one exception, newest first)
//! - monthly buckets: ascending by (year, month)
//! - distinct days: ascending
//! - models for a target: RMSE ascending, pending rows (no RMSE) last

pub mod memory;

use crate::types::{Indicator, Measurement, ModelRecord, NewMeasurement, NewModel, UserRecord};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};

/// One (year, month) group of a station's measurements. `average` is `None`
/// when no row in the group carries the requested indicator.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyBucket {
    pub year: i32,
    pub month: u32,
    pub average: Option<f64>,
}

/// Read queries over measurements plus the plain CRUD the HTTP layer exposes.
#[async_trait]
pub trait MeasurementStore: Send + Sync {
    /// Rows with `start <= taken_at <= end`, optionally for one station.
    async fn between(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
        station: Option<i32>,
    ) -> Result<Vec<Measurement>>;

    async fn all(&self) -> Result<Vec<Measurement>>;

    /// The `limit` newest rows, newest first.
    async fn recent(&self, limit: i64) -> Result<Vec<Measurement>>;

    async fn stations(&self) -> Result<Vec<i32>>;

    /// Per-(year, month) mean of `indicator` for `station` over `[start, end]`.
    async fn monthly_averages(
        &self,
        station: i32,
        indicator: Indicator,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<MonthlyBucket>>;

    /// Calendar days having at least one row at or after `cutoff`.
    async fn distinct_days_since(&self, cutoff: NaiveDateTime) -> Result<Vec<NaiveDate>>;

    async fn insert(&self, row: &NewMeasurement) -> Result<Measurement>;

    /// Replace a row in place. Returns `false` if the id does not exist.
    async fn update(&self, id: i32, row: &NewMeasurement) -> Result<bool>;

    async fn delete(&self, id: i32) -> Result<bool>;

    /// Cheap connectivity probe for readiness checks.
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Model rows written by the training lifecycle.
#[async_trait]
pub trait ModelStore: Send + Sync {
    /// Insert a pending row (RMSE unset) and return it with its generated id.
    async fn create_pending(&self, model: &NewModel) -> Result<ModelRecord>;

    /// Returns `false` if the row no longer exists.
    async fn set_rmse(&self, id: i32, rmse: f64) -> Result<bool>;

    async fn delete(&self, id: i32) -> Result<bool>;

    async fn find(&self, id: i32) -> Result<Option<ModelRecord>>;

    async fn list_for_target(
        &self,
        target: Indicator,
        method: Option<&str>,
    ) -> Result<Vec<ModelRecord>>;

    async fn methods_for_target(&self, target: Indicator) -> Result<Vec<String>>;

    async fn count(&self) -> Result<i64>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, id: i32) -> Result<Option<UserRecord>>;
}
