//! # Orchestrator: Model Lifecycle
//!
//! Drives the three remote operations and keeps persisted model rows
//! consistent with their outcome.
//!
//! ## Training
//!
//! ```text
//! validate user ──▶ insert pending row ──▶ remote train(id) ──▶ set rmse
//!       │                  │                      │                 │
//!       ▼                  ▼                      ▼                 ▼
//!   Validation        Persistence        delete row, Remote   delete row, Persistence
//! ```
//!
//! The pending row's id is the correlation key sent to the trainer. Every
//! failure after the insert deletes the row. Rollback is best-effort: if the
//! delete itself fails the caller still gets the original failure and the
//! dangling row is only logged.
//!
//! The lifecycle runs on its own task. A caller that goes away mid-call
//! (client disconnect, request timeout) does not stop the commit or the
//! rollback; they finish in the background.
//!
//! Concurrent requests for the same (indicator, method, user) are not
//! serialized. Each invocation owns the row it created, so they never
//! contend. A process crash between the remote call and the commit can
//! leave a pending row behind; nothing sweeps those up.
//!
//! ## Prediction
//!
//! Builds the trailing six-month daily window, asks the trainer for the
//! value one calendar month from now, and returns the window with that
//! point appended. The window is only extended after a usable response.
//!
//! ## Tuning
//!
//! Pass-through. Tuning never creates or mutates a model row; callers retrain
//! with the returned parameters if they want them persisted.
//!
//! The trainer client blocks, so each call runs on the blocking pool. A panic
//! inside the client surfaces as a transport failure.

use crate::aggregate::{AggregatedSeries, Aggregator, DAY_FORMAT, DEFAULT_WINDOW_MONTHS};
use crate::clock::Clock;
use crate::prom_metrics::Metrics;
use crate::store::{ModelStore, UserDirectory};
use crate::trainer::translate::{self, PredictReport, TrainReport, TuneReport};
use crate::trainer::{RemoteFailure, RemoteTrainer};
use crate::types::{Indicator, Method, ModelRecord, NewModel, SearchMethod};
use chrono::{Datelike, Months};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn, Instrument};

/// Why an orchestrator call did not succeed.
#[derive(Debug, Clone, PartialEq)]
pub enum OrchestratorError {
    /// A referenced entity does not exist or an argument is out of range.
    Validation(String),
    Remote(RemoteFailure),
    /// Storage failed while reading or writing rows.
    Persistence(String),
}

impl OrchestratorError {
    fn outcome(&self) -> &'static str {
        match self {
            OrchestratorError::Validation(_) => "validation",
            OrchestratorError::Remote(f) if f.is_transport() => "transport",
            OrchestratorError::Remote(RemoteFailure::Malformed(_)) => "malformed",
            OrchestratorError::Remote(_) => "rejected",
            OrchestratorError::Persistence(_) => "persistence",
        }
    }
}

impl fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrchestratorError::Validation(e) => write!(f, "validation failed: {}", e),
            OrchestratorError::Remote(e) => write!(f, "remote call failed: {}", e),
            OrchestratorError::Persistence(e) => write!(f, "storage error: {}", e),
        }
    }
}

impl std::error::Error for OrchestratorError {}

impl From<RemoteFailure> for OrchestratorError {
    fn from(failure: RemoteFailure) -> Self {
        OrchestratorError::Remote(failure)
    }
}

fn persistence(e: anyhow::Error) -> OrchestratorError {
    OrchestratorError::Persistence(format!("{:#}", e))
}

/// Trailing window with the predicted point appended.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionOutcome {
    pub series: AggregatedSeries,
    pub predicted: f64,
    /// `YYYY-MM-DD`, one calendar month after "now".
    pub target_date: String,
}

#[derive(Clone)]
pub struct ModelOrchestrator {
    models: Arc<dyn ModelStore>,
    users: Arc<dyn UserDirectory>,
    aggregator: Aggregator,
    trainer: Arc<dyn RemoteTrainer>,
    clock: Clock,
    metrics: Arc<Metrics>,
}

impl ModelOrchestrator {
    pub fn new(
        models: Arc<dyn ModelStore>,
        users: Arc<dyn UserDirectory>,
        aggregator: Aggregator,
        trainer: Arc<dyn RemoteTrainer>,
        metrics: Arc<Metrics>,
    ) -> Self {
        ModelOrchestrator {
            models,
            users,
            aggregator,
            trainer,
            clock: Clock::system(),
            metrics,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    fn record<T>(&self, operation: &str, result: &Result<T, OrchestratorError>) {
        let outcome = match result {
            Ok(_) => "success",
            Err(e) => e.outcome(),
        };
        self.metrics.record_operation(operation, outcome);
    }

    async fn call_remote<F>(&self, operation: &'static str, call: F) -> Result<Value, RemoteFailure>
    where
        F: FnOnce(&dyn RemoteTrainer) -> Result<Value, RemoteFailure> + Send + 'static,
    {
        let trainer = Arc::clone(&self.trainer);
        match tokio::task::spawn_blocking(move || call(trainer.as_ref())).await {
            Ok(result) => result,
            Err(e) => {
                error!(operation, error = %e, "trainer call aborted");
                Err(RemoteFailure::NoResponse(e.to_string()))
            }
        }
    }

    /// Delete a pending row after a failed training call. Never fails.
    async fn rollback(&self, model_id: i32) {
        match self.models.delete(model_id).await {
            Ok(deleted) => {
                warn!(model_id, deleted, "rolled back pending model");
                self.metrics.record_rollback(true);
            }
            Err(e) => {
                error!(model_id, error = %format!("{:#}", e), "rollback failed, pending model left behind");
                self.metrics.record_rollback(false);
            }
        }
    }

    /// Train a new model for `indicator` with `method`, owned by `user_id`.
    ///
    /// On success the new row carries the returned RMSE. On any failure no
    /// row from this call remains (unless the rollback itself failed).
    /// Dropping the returned future does not interrupt the lifecycle.
    pub async fn train(
        &self,
        indicator: Indicator,
        method: Method,
        user_id: i32,
    ) -> Result<TrainReport, OrchestratorError> {
        let this = self.clone();
        let lifecycle = tokio::spawn(
            async move {
                let result = this.run_training(indicator, method, user_id).await;
                this.record("train", &result);
                result
            }
            .instrument(tracing::Span::current()),
        );
        match lifecycle.await {
            Ok(result) => result,
            Err(e) => {
                error!(%indicator, %method, user_id, error = %e, "training task aborted");
                Err(OrchestratorError::Persistence(format!(
                    "training task aborted: {}",
                    e
                )))
            }
        }
    }

    async fn run_training(
        &self,
        indicator: Indicator,
        method: Method,
        user_id: i32,
    ) -> Result<TrainReport, OrchestratorError> {
        match self.users.find_user(user_id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                warn!(user_id, "training requested by unknown user");
                return Err(OrchestratorError::Validation(format!(
                    "user {} does not exist",
                    user_id
                )));
            }
            Err(e) => {
                error!(user_id, error = %format!("{:#}", e), "user lookup failed");
                return Err(persistence(e));
            }
        }

        let pending = NewModel {
            user_id,
            target: indicator,
            method,
            created_at: self.clock.now(),
        };
        let record = self.models.create_pending(&pending).await.map_err(|e| {
            error!(name = %pending.name(), error = %format!("{:#}", e), "failed to create pending model");
            persistence(e)
        })?;
        let model_id = record.id;
        info!(model_id, name = %record.name, user_id, "created pending model");

        let outcome = self
            .call_remote("train", move |t| t.train(model_id))
            .await
            .and_then(translate::train_result);
        let report = match outcome {
            Ok(report) => report,
            Err(failure) => {
                if failure.is_transport() {
                    error!(model_id, error = %failure, "training call failed");
                } else {
                    warn!(model_id, error = %failure, "training call failed");
                }
                self.rollback(model_id).await;
                return Err(failure.into());
            }
        };

        match self.models.set_rmse(model_id, report.rmse).await {
            Ok(true) => {
                info!(model_id, rmse = report.rmse, "model trained");
                Ok(report)
            }
            Ok(false) => {
                error!(model_id, "pending model disappeared before commit");
                Err(OrchestratorError::Persistence(format!(
                    "model {} no longer exists",
                    model_id
                )))
            }
            Err(e) => {
                error!(model_id, error = %format!("{:#}", e), "failed to store rmse");
                self.rollback(model_id).await;
                Err(persistence(e))
            }
        }
    }

    /// Predict the value of `indicator` one calendar month from now.
    pub async fn predict(
        &self,
        model_id: i32,
        indicator: Indicator,
    ) -> Result<PredictionOutcome, OrchestratorError> {
        let result = self.run_prediction(model_id, indicator).await;
        self.record("predict", &result);
        result
    }

    async fn run_prediction(
        &self,
        model_id: i32,
        indicator: Indicator,
    ) -> Result<PredictionOutcome, OrchestratorError> {
        let now = self.clock.now();
        let window = self
            .aggregator
            .trailing_window(indicator, DEFAULT_WINDOW_MONTHS, now)
            .await
            .map_err(|e| {
                error!(model_id, error = %format!("{:#}", e), "failed to build prediction window");
                persistence(e)
            })?;

        let target = now.checked_add_months(Months::new(1)).ok_or_else(|| {
            OrchestratorError::Validation(format!("no calendar month after {}", now))
        })?;
        let month = target.month();

        let PredictReport { pred } = self
            .call_remote("predict", move |t| t.predict(model_id, month))
            .await
            .and_then(translate::predict_result)
            .map_err(|failure| {
                warn!(model_id, month, error = %failure, "prediction failed");
                OrchestratorError::from(failure)
            })?;

        let target_date = target.format(DAY_FORMAT).to_string();
        let mut series = window;
        series.push(target_date.clone(), pred);
        info!(model_id, %indicator, points = series.len(), pred, "prediction appended");
        Ok(PredictionOutcome {
            series,
            predicted: pred,
            target_date,
        })
    }

    /// Run a hyper-parameter search for `model_id`. No row is touched.
    pub async fn tune(
        &self,
        model_id: i32,
        method: SearchMethod,
    ) -> Result<TuneReport, OrchestratorError> {
        let result = self
            .call_remote("tune", move |t| t.tune(model_id, method))
            .await
            .and_then(translate::tune_result)
            .map_err(|failure| {
                warn!(model_id, %method, error = %failure, "tuning failed");
                OrchestratorError::from(failure)
            });
        if let Ok(report) = &result {
            info!(model_id, %method, best_rmse = report.best_rmse, "tuning finished");
        }
        self.record("tune", &result);
        result
    }

    /// Models for `indicator`, best RMSE first. `None` lists every method.
    pub async fn available_models(
        &self,
        indicator: Indicator,
        method: Option<Method>,
    ) -> Result<Vec<ModelRecord>, OrchestratorError> {
        self.models
            .list_for_target(indicator, method.as_ref().map(Method::as_str))
            .await
            .map_err(persistence)
    }

    pub async fn methods_for(&self, indicator: Indicator) -> Result<Vec<String>, OrchestratorError> {
        self.models
            .methods_for_target(indicator)
            .await
            .map_err(persistence)
    }

    /// Remove a model row. Returns `false` if it did not exist.
    pub async fn delete_model(&self, model_id: i32) -> Result<bool, OrchestratorError> {
        let deleted = self.models.delete(model_id).await.map_err(persistence)?;
        info!(model_id, deleted, "model delete requested");
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::{Fault, MemoryStore};
    use crate::store::MeasurementStore;
    use crate::types::NewMeasurement;
    use chrono::{NaiveDate, NaiveDateTime};
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Train(i32),
        Predict(i32, u32),
        Tune(i32, SearchMethod),
    }

    /// Answers every call with the same scripted reply.
    struct ScriptedTrainer {
        reply: Option<Result<Value, RemoteFailure>>,
        delay: Duration,
        calls: Mutex<Vec<Call>>,
    }

    impl ScriptedTrainer {
        fn replying(reply: Result<Value, RemoteFailure>) -> Arc<Self> {
            Arc::new(ScriptedTrainer {
                reply: Some(reply),
                delay: Duration::ZERO,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn slow(delay: Duration, reply: Result<Value, RemoteFailure>) -> Arc<Self> {
            Arc::new(ScriptedTrainer {
                reply: Some(reply),
                delay,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn panicking() -> Arc<Self> {
            Arc::new(ScriptedTrainer {
                reply: None,
                delay: Duration::ZERO,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn answer(&self, call: Call) -> Result<Value, RemoteFailure> {
            self.calls.lock().unwrap().push(call);
            std::thread::sleep(self.delay);
            match &self.reply {
                Some(reply) => reply.clone(),
                None => panic!("trainer exploded"),
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl RemoteTrainer for ScriptedTrainer {
        fn train(&self, model_id: i32) -> Result<Value, RemoteFailure> {
            self.answer(Call::Train(model_id))
        }

        fn predict(&self, model_id: i32, month: u32) -> Result<Value, RemoteFailure> {
            self.answer(Call::Predict(model_id, month))
        }

        fn tune(&self, model_id: i32, method: SearchMethod) -> Result<Value, RemoteFailure> {
            self.answer(Call::Tune(model_id, method))
        }
    }

    fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        trainer: Arc<ScriptedTrainer>,
        metrics: Arc<Metrics>,
        orchestrator: ModelOrchestrator,
    }

    fn fixture_at(trainer: Arc<ScriptedTrainer>, now: NaiveDateTime) -> Fixture {
        let store = Arc::new(MemoryStore::new().with_user(1, "alice", "ADMIN"));
        let metrics = Arc::new(Metrics::new());
        let orchestrator = ModelOrchestrator::new(
            store.clone(),
            store.clone(),
            Aggregator::new(store.clone()),
            trainer.clone(),
            metrics.clone(),
        )
        .with_clock(Clock::fixed(now));
        Fixture {
            store,
            trainer,
            metrics,
            orchestrator,
        }
    }

    fn fixture(trainer: Arc<ScriptedTrainer>) -> Fixture {
        fixture_at(trainer, at(2025, 6, 15))
    }

    fn train_success() -> Result<Value, RemoteFailure> {
        Ok(json!({"status": "success", "data": {"rmse": 0.42, "pred": [1, 2], "real": [1, 2]}}))
    }

    fn operation_count(metrics: &Metrics, operation: &str, outcome: &str) -> u64 {
        metrics
            .model_operations
            .get_or_create(&crate::prom_metrics::OperationLabel {
                operation: operation.into(),
                outcome: outcome.into(),
            })
            .get()
    }

    // ── Training ────────────────────────────────────────────────

    #[tokio::test]
    async fn train_success_commits_rmse() {
        let f = fixture(ScriptedTrainer::replying(train_success()));
        let report = f
            .orchestrator
            .train(Indicator::Ph, Method::Svm, 1)
            .await
            .unwrap();

        assert_eq!(report.rmse, 0.42);
        assert_eq!(report.pred, vec![1.0, 2.0]);
        let models = f.store.models();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].name, "PH_SVM");
        assert_eq!(models[0].rmse, Some(0.42));
        assert_eq!(models[0].created_at, at(2025, 6, 15));
        assert_eq!(f.trainer.calls(), vec![Call::Train(models[0].id)]);
        assert_eq!(operation_count(&f.metrics, "train", "success"), 1);
    }

    #[tokio::test]
    async fn integer_rmse_is_coerced() {
        let f = fixture(ScriptedTrainer::replying(Ok(
            json!({"status": "success", "data": {"rmse": 2}}),
        )));
        f.orchestrator
            .train(Indicator::Do, Method::Gru, 1)
            .await
            .unwrap();
        assert_eq!(f.store.models()[0].rmse, Some(2.0));
    }

    #[tokio::test]
    async fn train_rejection_rolls_back() {
        let f = fixture(ScriptedTrainer::replying(Ok(json!({"status": "failure"}))));
        let err = f
            .orchestrator
            .train(Indicator::Ph, Method::Svm, 1)
            .await
            .unwrap_err();

        assert_eq!(err, OrchestratorError::Remote(RemoteFailure::Rejected));
        assert!(f.store.models().is_empty());
        assert_eq!(f.trainer.calls().len(), 1);
        assert_eq!(operation_count(&f.metrics, "train", "rejected"), 1);
    }

    #[tokio::test]
    async fn train_malformed_payload_rolls_back() {
        let f = fixture(ScriptedTrainer::replying(Ok(
            json!({"status": "success", "data": {"pred": [1.0]}}),
        )));
        let err = f
            .orchestrator
            .train(Indicator::Nh3n, Method::Lstm, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Remote(RemoteFailure::Malformed(_))));
        assert!(f.store.models().is_empty());
    }

    #[tokio::test]
    async fn train_transport_failure_rolls_back() {
        let f = fixture(ScriptedTrainer::replying(Err(RemoteFailure::HttpStatus(500))));
        let err = f
            .orchestrator
            .train(Indicator::Ph, Method::AdaBoost, 1)
            .await
            .unwrap_err();
        assert_eq!(err, OrchestratorError::Remote(RemoteFailure::HttpStatus(500)));
        assert!(f.store.models().is_empty());
        assert_eq!(operation_count(&f.metrics, "train", "transport"), 1);
    }

    #[tokio::test]
    async fn panicking_trainer_is_a_transport_failure() {
        let f = fixture(ScriptedTrainer::panicking());
        let err = f
            .orchestrator
            .train(Indicator::Ph, Method::Svm, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Remote(RemoteFailure::NoResponse(_))));
        assert!(f.store.models().is_empty());
    }

    #[tokio::test]
    async fn unknown_user_fails_before_any_side_effect() {
        let f = fixture(ScriptedTrainer::replying(train_success()));
        let err = f
            .orchestrator
            .train(Indicator::Ph, Method::Svm, 99)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Validation(_)));
        assert!(f.store.models().is_empty());
        assert!(f.trainer.calls().is_empty());
    }

    #[tokio::test]
    async fn create_failure_skips_remote_call() {
        let f = fixture(ScriptedTrainer::replying(train_success()));
        f.store.inject(Fault::CreateModel);
        let err = f
            .orchestrator
            .train(Indicator::Ph, Method::Svm, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Persistence(_)));
        assert!(f.trainer.calls().is_empty());
    }

    #[tokio::test]
    async fn commit_failure_rolls_back() {
        let f = fixture(ScriptedTrainer::replying(train_success()));
        f.store.inject(Fault::SetRmse);
        let err = f
            .orchestrator
            .train(Indicator::Ph, Method::Svm, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Persistence(_)));
        assert!(f.store.models().is_empty());
    }

    #[tokio::test]
    async fn failed_rollback_still_reports_remote_failure() {
        let f = fixture(ScriptedTrainer::replying(Ok(json!({"status": "failure"}))));
        f.store.inject(Fault::DeleteModel);
        let err = f
            .orchestrator
            .train(Indicator::Ph, Method::Svm, 1)
            .await
            .unwrap_err();

        assert_eq!(err, OrchestratorError::Remote(RemoteFailure::Rejected));
        let models = f.store.models();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].rmse, None);
        let failed = f
            .metrics
            .rollbacks
            .get_or_create(&crate::prom_metrics::RollbackLabel {
                result: "failed".into(),
            })
            .get();
        assert_eq!(failed, 1);
    }

    #[tokio::test]
    async fn concurrent_training_creates_independent_rows() {
        let f = fixture(ScriptedTrainer::replying(train_success()));
        let (a, b) = tokio::join!(
            f.orchestrator.train(Indicator::Ph, Method::Svm, 1),
            f.orchestrator.train(Indicator::Ph, Method::Svm, 1),
        );
        assert!(a.is_ok() && b.is_ok());
        let models = f.store.models();
        assert_eq!(models.len(), 2);
        assert_ne!(models[0].id, models[1].id);
    }

    /// Poll until `done` holds or two seconds pass.
    async fn settle(done: impl Fn() -> bool) {
        for _ in 0..40 {
            if done() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    #[tokio::test]
    async fn abandoned_training_still_commits() {
        let f = fixture(ScriptedTrainer::slow(Duration::from_millis(300), train_success()));
        let abandoned = tokio::time::timeout(
            Duration::from_millis(50),
            f.orchestrator.train(Indicator::Ph, Method::Svm, 1),
        )
        .await;
        assert!(abandoned.is_err());

        settle(|| {
            let models = f.store.models();
            !models.is_empty() && models.iter().all(|m| m.rmse.is_some())
        })
        .await;
        let models = f.store.models();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].rmse, Some(0.42));
        assert_eq!(operation_count(&f.metrics, "train", "success"), 1);
    }

    #[tokio::test]
    async fn abandoned_failed_training_still_rolls_back() {
        let f = fixture(ScriptedTrainer::slow(
            Duration::from_millis(300),
            Ok(json!({"status": "failure"})),
        ));
        let abandoned = tokio::time::timeout(
            Duration::from_millis(50),
            f.orchestrator.train(Indicator::Ph, Method::Svm, 1),
        )
        .await;
        assert!(abandoned.is_err());
        // the pending row exists while the remote call is in flight
        assert_eq!(f.store.models().len(), 1);

        settle(|| f.store.models().is_empty()).await;
        assert!(f.store.models().is_empty());
        let deleted = f
            .metrics
            .rollbacks
            .get_or_create(&crate::prom_metrics::RollbackLabel {
                result: "deleted".into(),
            })
            .get();
        assert_eq!(deleted, 1);
    }

    // ── Prediction ──────────────────────────────────────────────

    async fn seed_daily(store: &MemoryStore, days: &[(u32, u32, f64)]) {
        for &(month, day, value) in days {
            store
                .insert(&NewMeasurement {
                    station: 1,
                    taken_at: at(2025, month, day),
                    ph: None,
                    dissolved_oxygen: Some(value),
                    ammonia_nitrogen: None,
                })
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn predict_appends_one_point_a_month_ahead() {
        let f = fixture(ScriptedTrainer::replying(Ok(
            json!({"status": "success", "data": {"pred": 7.1}}),
        )));
        seed_daily(
            &f.store,
            &[(1, 10, 6.0), (2, 10, 6.2), (3, 10, 6.4), (4, 10, 6.6), (5, 10, 6.8), (6, 10, 7.0)],
        )
        .await;

        let outcome = f.orchestrator.predict(5, Indicator::Do).await.unwrap();

        assert_eq!(outcome.series.len(), 7);
        assert_eq!(outcome.series.last(), Some(("2025-07-15", 7.1)));
        assert_eq!(outcome.predicted, 7.1);
        assert_eq!(outcome.target_date, "2025-07-15");
        assert_eq!(f.trainer.calls(), vec![Call::Predict(5, 7)]);
    }

    #[tokio::test]
    async fn predict_failure_returns_no_series() {
        let f = fixture(ScriptedTrainer::replying(Ok(json!({"status": "failure"}))));
        seed_daily(&f.store, &[(6, 1, 7.0)]).await;
        let err = f.orchestrator.predict(5, Indicator::Do).await.unwrap_err();
        assert_eq!(err, OrchestratorError::Remote(RemoteFailure::Rejected));
        assert_eq!(operation_count(&f.metrics, "predict", "rejected"), 1);
    }

    #[tokio::test]
    async fn predict_month_rolls_over_year_end() {
        let f = fixture_at(
            ScriptedTrainer::replying(Ok(json!({"status": "success", "data": {"pred": 1}}))),
            at(2025, 12, 20),
        );
        let outcome = f.orchestrator.predict(3, Indicator::Ph).await.unwrap();
        assert_eq!(outcome.target_date, "2026-01-20");
        assert_eq!(f.trainer.calls(), vec![Call::Predict(3, 1)]);
    }

    #[tokio::test]
    async fn predict_target_clamps_to_month_end() {
        let f = fixture_at(
            ScriptedTrainer::replying(Ok(json!({"status": "success", "data": {"pred": 1}}))),
            at(2025, 1, 31),
        );
        let outcome = f.orchestrator.predict(3, Indicator::Ph).await.unwrap();
        assert_eq!(outcome.target_date, "2025-02-28");
        assert_eq!(f.trainer.calls(), vec![Call::Predict(3, 2)]);
    }

    #[tokio::test]
    async fn predict_storage_failure_skips_remote_call() {
        let f = fixture(ScriptedTrainer::replying(Ok(
            json!({"status": "success", "data": {"pred": 1}}),
        )));
        f.store.inject(Fault::ReadMeasurements);
        let err = f.orchestrator.predict(3, Indicator::Ph).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Persistence(_)));
        assert!(f.trainer.calls().is_empty());
    }

    // ── Tuning ──────────────────────────────────────────────────

    #[tokio::test]
    async fn tune_failure_leaves_models_untouched() {
        let f = fixture(ScriptedTrainer::replying(Err(RemoteFailure::NoResponse(
            "timed out".into(),
        ))));
        let existing = f
            .store
            .create_pending(&NewModel {
                user_id: 1,
                target: Indicator::Do,
                method: Method::Svm,
                created_at: at(2025, 6, 1),
            })
            .await
            .unwrap();
        f.store.set_rmse(existing.id, 0.5).await.unwrap();
        let before = f.store.models();

        let err = f
            .orchestrator
            .tune(existing.id, SearchMethod::Bayesian)
            .await
            .unwrap_err();

        assert!(matches!(err, OrchestratorError::Remote(RemoteFailure::NoResponse(_))));
        assert_eq!(f.store.models(), before);
        assert_eq!(
            f.trainer.calls(),
            vec![Call::Tune(existing.id, SearchMethod::Bayesian)]
        );
    }

    #[tokio::test]
    async fn tune_success_returns_best_params() {
        let f = fixture(ScriptedTrainer::replying(Ok(json!({
            "status": "success",
            "data": {"best_rmse": 0.31, "best_params": {"C": 10, "kernel": "rbf"}}
        }))));
        let report = f.orchestrator.tune(5, SearchMethod::Random).await.unwrap();
        assert_eq!(report.best_rmse, 0.31);
        assert_eq!(report.best_params["C"], json!(10.0));
        assert!(f.store.models().is_empty());
        assert_eq!(operation_count(&f.metrics, "tune", "success"), 1);
    }

    // ── Catalogue ───────────────────────────────────────────────

    #[tokio::test]
    async fn catalogue_lists_filters_and_deletes() {
        let f = fixture(ScriptedTrainer::replying(train_success()));
        f.orchestrator.train(Indicator::Ph, Method::Svm, 1).await.unwrap();
        f.orchestrator.train(Indicator::Ph, Method::Gru, 1).await.unwrap();
        f.orchestrator.train(Indicator::Do, Method::Svm, 1).await.unwrap();

        let all = f.orchestrator.available_models(Indicator::Ph, None).await.unwrap();
        assert_eq!(all.len(), 2);
        let gru = f
            .orchestrator
            .available_models(Indicator::Ph, Some(Method::Gru))
            .await
            .unwrap();
        assert_eq!(gru.len(), 1);
        assert_eq!(gru[0].method, "GRU");

        let methods = f.orchestrator.methods_for(Indicator::Ph).await.unwrap();
        assert_eq!(methods, vec!["GRU", "SVM"]);

        assert!(f.orchestrator.delete_model(gru[0].id).await.unwrap());
        assert!(!f.orchestrator.delete_model(gru[0].id).await.unwrap());
        assert_eq!(f.store.models().len(), 2);
    }
}
