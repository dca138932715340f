//! # Dashboard: HTTP API Server
//!
//! Runs an Axum HTTP server exposing the model lifecycle (`/model/*`),
//! measurement queries and CRUD (`/waterquality/*`), and the health and
//! metrics probes.
//!
//! Handlers stay thin: they parse query strings into domain types, call the
//! orchestrator or the measurement store, and map outcomes onto the JSON
//! envelopes clients expect (`{"status": "success" | "failure", ...}`).
//! Authentication is handled upstream of this service.

mod routes_health;
mod routes_models;
mod routes_waterquality;

use crate::aggregate::Aggregator;
use crate::clock::Clock;
use crate::config::Settings;
use crate::db;
use crate::orchestrator::{ModelOrchestrator, OrchestratorError};
use crate::prom_metrics;
use crate::store::memory::MemoryStore;
use crate::store::{MeasurementStore, ModelStore, UserDirectory};
use crate::trainer::{HttpTrainerClient, RemoteTrainer};
use anyhow::Result;
use axum::extract::Request;
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use std::time::Duration;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn, Instrument};

pub struct AppState {
    pub orchestrator: ModelOrchestrator,
    pub measurements: Arc<dyn MeasurementStore>,
    pub prom_metrics: Arc<prom_metrics::Metrics>,
    pub request_timeout: Duration,
    pub body_limit_bytes: usize,
}

impl AppState {
    /// Wire the stores and trainer into an orchestrator with a fresh metrics
    /// registry.
    pub fn assemble(
        measurements: Arc<dyn MeasurementStore>,
        models: Arc<dyn ModelStore>,
        users: Arc<dyn UserDirectory>,
        trainer: Arc<dyn RemoteTrainer>,
        clock: Clock,
    ) -> Arc<Self> {
        let prom_metrics = Arc::new(prom_metrics::Metrics::new());
        let orchestrator = ModelOrchestrator::new(
            models,
            users,
            Aggregator::new(Arc::clone(&measurements)),
            trainer,
            Arc::clone(&prom_metrics),
        )
        .with_clock(clock);
        Arc::new(AppState {
            orchestrator,
            measurements,
            prom_metrics,
            request_timeout: Duration::from_secs(crate::config::DEFAULT_REQUEST_TIMEOUT_SECS),
            body_limit_bytes: crate::config::DEFAULT_BODY_LIMIT_BYTES,
        })
    }

    pub fn with_limits(self: Arc<Self>, request_timeout: Duration, body_limit_bytes: usize) -> Arc<Self> {
        match Arc::try_unwrap(self) {
            Ok(mut state) => {
                state.request_timeout = request_timeout;
                state.body_limit_bytes = body_limit_bytes;
                Arc::new(state)
            }
            Err(shared) => {
                warn!("state already shared, keeping default limits");
                shared
            }
        }
    }

    pub fn now(&self) -> chrono::NaiveDateTime {
        self.orchestrator.clock().now()
    }
}

// ── Response Envelopes ──────────────────────────────────────────

pub(super) fn success() -> Response {
    Json(serde_json::json!({"status": "success"})).into_response()
}

pub(super) fn failure(status: StatusCode, message: impl std::fmt::Display) -> Response {
    (
        status,
        Json(serde_json::json!({"status": "failure", "error": message.to_string()})),
    )
        .into_response()
}

/// Map an orchestrator error onto an HTTP status. Remote failures of any
/// kind look the same to the client.
pub(super) fn orchestrator_failure(e: &OrchestratorError) -> Response {
    let status = match e {
        OrchestratorError::Validation(_) => StatusCode::BAD_REQUEST,
        OrchestratorError::Remote(_) => StatusCode::BAD_GATEWAY,
        OrchestratorError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    failure(status, e)
}

pub(super) fn storage_failure(context: &str, e: anyhow::Error) -> Response {
    error!(error = %format!("{:#}", e), "{}", context);
    failure(StatusCode::INTERNAL_SERVER_ERROR, context)
}

// ── Middleware ──────────────────────────────────────────────────

/// Records request duration into the Prometheus histogram, generates (or
/// propagates) a request ID, and wraps the request in a tracing span using
/// `.instrument()` so the span follows the handler across awaits.
async fn metrics_middleware(
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let request_id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let method = req.method().to_string();
    let raw_path = req.uri().path().to_string();
    let norm_path = normalize_path(&raw_path);
    let start = std::time::Instant::now();

    let span = tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        path = %raw_path,
    );
    let mut response = next.run(req).instrument(span).await;

    state
        .prom_metrics
        .http_request_duration
        .get_or_create(&prom_metrics::HttpLabel {
            method,
            path: norm_path,
        })
        .observe(start.elapsed().as_secs_f64());

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

/// Collapse numeric path segments into `:id` to bound histogram cardinality.
fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|seg| {
            if !seg.is_empty() && seg.chars().all(|c| c.is_ascii_digit() || c == '-') {
                ":id"
            } else {
                seg
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let request_timeout = state.request_timeout;
    let body_limit = state.body_limit_bytes;

    Router::new()
        .route("/model/training", get(routes_models::handler_training))
        .route("/model/prediction", get(routes_models::handler_prediction))
        .route("/model/tuning", get(routes_models::handler_tuning))
        .route("/model/available", get(routes_models::handler_available))
        .route("/model/list", get(routes_models::handler_list))
        .route("/model/delete/{id}", post(routes_models::handler_delete))
        .route(
            "/waterquality/query",
            get(routes_waterquality::handler_query),
        )
        .route("/waterquality/all", get(routes_waterquality::handler_all))
        .route(
            "/waterquality/station",
            get(routes_waterquality::handler_stations),
        )
        .route("/waterquality/plot", get(routes_waterquality::handler_plot))
        .route(
            "/waterquality/recent",
            get(routes_waterquality::handler_recent),
        )
        .route("/waterquality/add", post(routes_waterquality::handler_add))
        .route(
            "/waterquality/update/{id}",
            post(routes_waterquality::handler_update),
        )
        .route(
            "/waterquality/delete/{id}",
            post(routes_waterquality::handler_delete),
        )
        .route("/healthz", get(routes_health::handler_healthz))
        .route("/readyz", get(routes_health::handler_readyz))
        .route("/metrics", get(routes_health::handler_metrics))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(CatchPanicLayer::new())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            metrics_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .with_state(state)
}

/// Start the server. With `in_memory` the process keeps all rows in RAM and
/// seeds a single admin user (id 1), which is enough to exercise the API
/// against a real trainer without PostgreSQL.
pub async fn run(settings: &Settings, in_memory: bool) -> Result<()> {
    let trainer: Arc<dyn RemoteTrainer> = Arc::new(HttpTrainerClient::new(
        &settings.trainer_base_url,
        settings.trainer_timeout,
    ));

    let state = if in_memory {
        let store = Arc::new(MemoryStore::new().with_user(1, "admin", "ADMIN"));
        info!("using in-memory store");
        AppState::assemble(store.clone(), store.clone(), store, trainer, Clock::system())
    } else {
        let database = Arc::new(db::Database::connect(settings.require_database_url()?).await?);
        AppState::assemble(
            database.clone(),
            database.clone(),
            database,
            trainer,
            Clock::system(),
        )
    };
    let state = state.with_limits(settings.request_timeout, settings.body_limit_bytes);

    let app = build_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], settings.port));
    info!(
        port = settings.port,
        trainer = %settings.trainer_base_url,
        "riverwatch running"
    );
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("received SIGINT, shutting down"),
                    _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                ctrl_c.await.ok();
                info!("received SIGINT, shutting down");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("received SIGINT, shutting down");
    }
}
