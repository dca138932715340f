//! Measurement queries: date-range filters, monthly averages, distinct days, CRUD.
//!
//! The indicator column in the monthly-average query is interpolated from
//! [`Indicator::column`], a closed whitelist; every other value is bound.

use super::Database;
use crate::store::{MeasurementStore, MonthlyBucket};
use crate::types::{Indicator, Measurement, NewMeasurement};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};

const COLUMNS: &str = "id, station, taken_at, ph, dissolved_oxygen, ammonia_nitrogen";

#[async_trait]
impl MeasurementStore for Database {
    async fn between(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
        station: Option<i32>,
    ) -> Result<Vec<Measurement>> {
        let rows = match station {
            Some(station) => {
                sqlx::query_as::<_, Measurement>(&format!(
                    "SELECT {} FROM measurements
                     WHERE taken_at BETWEEN $1 AND $2 AND station = $3
                     ORDER BY taken_at, id",
                    COLUMNS
                ))
                .bind(start)
                .bind(end)
                .bind(station)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Measurement>(&format!(
                    "SELECT {} FROM measurements
                     WHERE taken_at BETWEEN $1 AND $2
                     ORDER BY taken_at, id",
                    COLUMNS
                ))
                .bind(start)
                .bind(end)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows)
    }

    async fn all(&self) -> Result<Vec<Measurement>> {
        let rows = sqlx::query_as::<_, Measurement>(&format!(
            "SELECT {} FROM measurements ORDER BY taken_at, id",
            COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn recent(&self, limit: i64) -> Result<Vec<Measurement>> {
        let rows = sqlx::query_as::<_, Measurement>(&format!(
            "SELECT {} FROM measurements ORDER BY taken_at DESC, id DESC LIMIT $1",
            COLUMNS
        ))
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn stations(&self) -> Result<Vec<i32>> {
        let rows = sqlx::query_scalar::<_, i32>(
            "SELECT DISTINCT station FROM measurements ORDER BY station",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn monthly_averages(
        &self,
        station: i32,
        indicator: Indicator,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<MonthlyBucket>> {
        let sql = format!(
            "SELECT EXTRACT(YEAR FROM taken_at)::INT4 AS year,
                    EXTRACT(MONTH FROM taken_at)::INT4 AS month,
                    AVG({col}) AS average
             FROM measurements
             WHERE station = $1 AND taken_at >= $2 AND taken_at <= $3
             GROUP BY 1, 2
             ORDER BY 1 ASC, 2 ASC",
            col = indicator.column()
        );
        let rows: Vec<(i32, i32, Option<f64>)> = sqlx::query_as(&sql)
            .bind(station)
            .bind(start)
            .bind(end)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(year, month, average)| MonthlyBucket {
                year,
                month: month as u32,
                average,
            })
            .collect())
    }

    async fn distinct_days_since(&self, cutoff: NaiveDateTime) -> Result<Vec<NaiveDate>> {
        let days = sqlx::query_scalar::<_, NaiveDate>(
            "SELECT DISTINCT taken_at::date AS day FROM measurements
             WHERE taken_at >= $1
             ORDER BY day ASC",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(days)
    }

    async fn insert(&self, row: &NewMeasurement) -> Result<Measurement> {
        let inserted = sqlx::query_as::<_, Measurement>(&format!(
            "INSERT INTO measurements (station, taken_at, ph, dissolved_oxygen, ammonia_nitrogen)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {}",
            COLUMNS
        ))
        .bind(row.station)
        .bind(row.taken_at)
        .bind(row.ph)
        .bind(row.dissolved_oxygen)
        .bind(row.ammonia_nitrogen)
        .fetch_one(&self.pool)
        .await?;
        Ok(inserted)
    }

    async fn update(&self, id: i32, row: &NewMeasurement) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE measurements
             SET station = $2, taken_at = $3, ph = $4, dissolved_oxygen = $5, ammonia_nitrogen = $6
             WHERE id = $1",
        )
        .bind(id)
        .bind(row.station)
        .bind(row.taken_at)
        .bind(row.ph)
        .bind(row.dissolved_oxygen)
        .bind(row.ammonia_nitrogen)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: i32) -> Result<bool> {
        let result = sqlx::query("DELETE FROM measurements WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<()> {
        self.health_check().await
    }
}
