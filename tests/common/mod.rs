//! Shared test helpers for integration tests.

#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use riverwatch::clock::Clock;
use riverwatch::dashboard::{build_router, AppState};
use riverwatch::store::memory::MemoryStore;
use riverwatch::trainer::{RemoteFailure, RemoteTrainer};
use riverwatch::types::SearchMethod;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

/// Returns the test database URL from the `TEST_DATABASE_URL` environment variable.
/// Panics if the variable is not set.
pub fn test_db_url() -> String {
    std::env::var("TEST_DATABASE_URL")
        .expect("TEST_DATABASE_URL must be set for integration tests")
}

/// Returns true if the test database URL is configured.
pub fn has_test_db() -> bool {
    std::env::var("TEST_DATABASE_URL").is_ok()
}

/// Connect to the test database, create the schema and empty every table.
pub async fn setup_test_db() -> riverwatch::db::Database {
    let db = riverwatch::db::Database::connect(&test_db_url())
        .await
        .expect("Failed to connect to test database");
    db.migrate().await.expect("Failed to create schema");
    truncate_all_tables(db.pool()).await;
    db
}

/// Truncate all tables to ensure test isolation.
pub async fn truncate_all_tables(pool: &sqlx::PgPool) {
    sqlx::raw_sql("TRUNCATE TABLE models, measurements, users RESTART IDENTITY CASCADE")
        .execute(pool)
        .await
        .unwrap();
}

/// Noon on the given day.
pub fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}

/// The fixed "now" used by router tests.
pub fn test_now() -> NaiveDateTime {
    at(2025, 6, 15)
}

// ── Scripted Trainer ────────────────────────────────────────────

/// Trainer stand-in with one canned reply per operation.
pub struct ScriptedTrainer {
    pub train: Result<Value, RemoteFailure>,
    pub predict: Result<Value, RemoteFailure>,
    pub tune: Result<Value, RemoteFailure>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedTrainer {
    pub fn succeeding() -> Self {
        ScriptedTrainer {
            train: Ok(json!({"status": "success", "data": {"rmse": 0.42, "pred": [1, 2], "real": [1, 2]}})),
            predict: Ok(json!({"status": "success", "data": {"pred": 7.1}})),
            tune: Ok(json!({"status": "success", "data": {"best_rmse": 0.3, "best_params": {"C": 1}}})),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        ScriptedTrainer {
            train: Ok(json!({"status": "failure"})),
            predict: Err(RemoteFailure::HttpStatus(500)),
            tune: Err(RemoteFailure::NoResponse("connection refused".into())),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn log(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl RemoteTrainer for ScriptedTrainer {
    fn train(&self, model_id: i32) -> Result<Value, RemoteFailure> {
        self.log(format!("train:{}", model_id));
        self.train.clone()
    }

    fn predict(&self, model_id: i32, month: u32) -> Result<Value, RemoteFailure> {
        self.log(format!("predict:{}:{}", model_id, month));
        self.predict.clone()
    }

    fn tune(&self, model_id: i32, method: SearchMethod) -> Result<Value, RemoteFailure> {
        self.log(format!("tune:{}:{}", model_id, method));
        self.tune.clone()
    }
}

/// Router over a fresh in-memory store (user 1 exists) and the given trainer.
pub fn memory_app(trainer: Arc<ScriptedTrainer>) -> (Arc<MemoryStore>, axum::Router) {
    let store = Arc::new(MemoryStore::new().with_user(1, "alice", "ADMIN"));
    let state = AppState::assemble(
        store.clone(),
        store.clone(),
        store.clone(),
        trainer,
        Clock::fixed(test_now()),
    );
    (store, build_router(state))
}
