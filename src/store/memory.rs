//! In-memory store implementing every persistence trait.
//!
//! Mirrors the ordering rules of the PostgreSQL implementation so the
//! orchestrator behaves identically against either. Faults can be injected
//! per operation to exercise the rollback paths.

use super::{MeasurementStore, ModelStore, MonthlyBucket, UserDirectory};
use crate::types::{Indicator, Measurement, ModelRecord, NewMeasurement, NewModel, UserRecord};
use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Operations that can be forced to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    CreateModel,
    SetRmse,
    DeleteModel,
    ReadMeasurements,
}

#[derive(Default)]
struct Tables {
    measurements: Vec<Measurement>,
    models: Vec<ModelRecord>,
    users: Vec<UserRecord>,
    next_measurement_id: i32,
    next_model_id: i32,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    faults: Mutex<HashSet<Fault>>,
}

fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(self, id: i32, name: &str, role: &str) -> Self {
        lock_or_recover(&self.tables).users.push(UserRecord {
            id,
            name: name.to_string(),
            role: role.to_string(),
        });
        self
    }

    pub fn inject(&self, fault: Fault) {
        lock_or_recover(&self.faults).insert(fault);
    }

    pub fn clear_faults(&self) {
        lock_or_recover(&self.faults).clear();
    }

    fn check(&self, fault: Fault) -> Result<()> {
        if lock_or_recover(&self.faults).contains(&fault) {
            bail!("injected fault: {:?}", fault);
        }
        Ok(())
    }

    /// Snapshot of every model row, in id order.
    pub fn models(&self) -> Vec<ModelRecord> {
        lock_or_recover(&self.tables).models.clone()
    }
}

#[async_trait]
impl MeasurementStore for MemoryStore {
    async fn between(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
        station: Option<i32>,
    ) -> Result<Vec<Measurement>> {
        self.check(Fault::ReadMeasurements)?;
        let tables = lock_or_recover(&self.tables);
        let mut rows: Vec<Measurement> = tables
            .measurements
            .iter()
            .filter(|m| m.taken_at >= start && m.taken_at <= end)
            .filter(|m| station.map_or(true, |s| m.station == s))
            .cloned()
            .collect();
        rows.sort_by_key(|m| (m.taken_at, m.id));
        Ok(rows)
    }

    async fn all(&self) -> Result<Vec<Measurement>> {
        self.check(Fault::ReadMeasurements)?;
        let mut rows = lock_or_recover(&self.tables).measurements.clone();
        rows.sort_by_key(|m| (m.taken_at, m.id));
        Ok(rows)
    }

    async fn recent(&self, limit: i64) -> Result<Vec<Measurement>> {
        self.check(Fault::ReadMeasurements)?;
        let mut rows = lock_or_recover(&self.tables).measurements.clone();
        rows.sort_by_key(|m| std::cmp::Reverse((m.taken_at, m.id)));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn stations(&self) -> Result<Vec<i32>> {
        self.check(Fault::ReadMeasurements)?;
        let tables = lock_or_recover(&self.tables);
        let set: BTreeSet<i32> = tables.measurements.iter().map(|m| m.station).collect();
        Ok(set.into_iter().collect())
    }

    async fn monthly_averages(
        &self,
        station: i32,
        indicator: Indicator,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<MonthlyBucket>> {
        self.check(Fault::ReadMeasurements)?;
        let tables = lock_or_recover(&self.tables);
        // (year, month) -> (sum, count of indicator-bearing rows)
        let mut groups: BTreeMap<(i32, u32), (f64, u32)> = BTreeMap::new();
        for m in tables
            .measurements
            .iter()
            .filter(|m| m.station == station && m.taken_at >= start && m.taken_at <= end)
        {
            let entry = groups
                .entry((m.taken_at.year(), m.taken_at.month()))
                .or_insert((0.0, 0));
            if let Some(v) = m.value(indicator) {
                entry.0 += v;
                entry.1 += 1;
            }
        }
        Ok(groups
            .into_iter()
            .map(|((year, month), (sum, n))| MonthlyBucket {
                year,
                month,
                average: (n > 0).then(|| sum / n as f64),
            })
            .collect())
    }

    async fn distinct_days_since(&self, cutoff: NaiveDateTime) -> Result<Vec<NaiveDate>> {
        self.check(Fault::ReadMeasurements)?;
        let tables = lock_or_recover(&self.tables);
        let days: BTreeSet<NaiveDate> = tables
            .measurements
            .iter()
            .filter(|m| m.taken_at >= cutoff)
            .map(|m| m.taken_at.date())
            .collect();
        Ok(days.into_iter().collect())
    }

    async fn insert(&self, row: &NewMeasurement) -> Result<Measurement> {
        let mut tables = lock_or_recover(&self.tables);
        tables.next_measurement_id += 1;
        let m = Measurement {
            id: tables.next_measurement_id,
            station: row.station,
            taken_at: row.taken_at,
            ph: row.ph,
            dissolved_oxygen: row.dissolved_oxygen,
            ammonia_nitrogen: row.ammonia_nitrogen,
        };
        tables.measurements.push(m.clone());
        Ok(m)
    }

    async fn update(&self, id: i32, row: &NewMeasurement) -> Result<bool> {
        let mut tables = lock_or_recover(&self.tables);
        match tables.measurements.iter_mut().find(|m| m.id == id) {
            Some(m) => {
                m.station = row.station;
                m.taken_at = row.taken_at;
                m.ph = row.ph;
                m.dissolved_oxygen = row.dissolved_oxygen;
                m.ammonia_nitrogen = row.ammonia_nitrogen;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: i32) -> Result<bool> {
        let mut tables = lock_or_recover(&self.tables);
        let before = tables.measurements.len();
        tables.measurements.retain(|m| m.id != id);
        Ok(tables.measurements.len() != before)
    }
}

#[async_trait]
impl ModelStore for MemoryStore {
    async fn create_pending(&self, model: &NewModel) -> Result<ModelRecord> {
        self.check(Fault::CreateModel)?;
        let mut tables = lock_or_recover(&self.tables);
        tables.next_model_id += 1;
        let record = ModelRecord {
            id: tables.next_model_id,
            user_id: model.user_id,
            name: model.name(),
            target: model.target.to_string(),
            method: model.method.to_string(),
            created_at: model.created_at,
            rmse: None,
        };
        tables.models.push(record.clone());
        Ok(record)
    }

    async fn set_rmse(&self, id: i32, rmse: f64) -> Result<bool> {
        self.check(Fault::SetRmse)?;
        let mut tables = lock_or_recover(&self.tables);
        match tables.models.iter_mut().find(|m| m.id == id) {
            Some(m) => {
                m.rmse = Some(rmse);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: i32) -> Result<bool> {
        self.check(Fault::DeleteModel)?;
        let mut tables = lock_or_recover(&self.tables);
        let before = tables.models.len();
        tables.models.retain(|m| m.id != id);
        Ok(tables.models.len() != before)
    }

    async fn find(&self, id: i32) -> Result<Option<ModelRecord>> {
        let tables = lock_or_recover(&self.tables);
        Ok(tables.models.iter().find(|m| m.id == id).cloned())
    }

    async fn list_for_target(
        &self,
        target: Indicator,
        method: Option<&str>,
    ) -> Result<Vec<ModelRecord>> {
        let tables = lock_or_recover(&self.tables);
        let mut rows: Vec<ModelRecord> = tables
            .models
            .iter()
            .filter(|m| m.target == target.as_str())
            .filter(|m| method.map_or(true, |wanted| m.method == wanted))
            .cloned()
            .collect();
        // NULLS LAST, like Postgres ASC
        rows.sort_by(|a, b| match (a.rmse, b.rmse) {
            (Some(x), Some(y)) => x.total_cmp(&y).then(a.id.cmp(&b.id)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.id.cmp(&b.id),
        });
        Ok(rows)
    }

    async fn methods_for_target(&self, target: Indicator) -> Result<Vec<String>> {
        let tables = lock_or_recover(&self.tables);
        let set: BTreeSet<String> = tables
            .models
            .iter()
            .filter(|m| m.target == target.as_str())
            .map(|m| m.method.clone())
            .collect();
        Ok(set.into_iter().collect())
    }

    async fn count(&self) -> Result<i64> {
        Ok(lock_or_recover(&self.tables).models.len() as i64)
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn find_user(&self, id: i32) -> Result<Option<UserRecord>> {
        let tables = lock_or_recover(&self.tables);
        Ok(tables.users.iter().find(|u| u.id == id).cloned())
    }
}
