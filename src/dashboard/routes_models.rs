//! Model lifecycle API: train, predict, tune, list and delete models.
//!
//! Indicator and method strings are parsed case-insensitively here; unknown
//! values are answered with 400 and never reach the orchestrator.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path as AxumPath, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

use super::{failure, orchestrator_failure, success, AppState};
use crate::types::{Indicator, Method, SearchMethod};

#[derive(Deserialize)]
pub(super) struct TrainingQuery {
    indicator: String,
    method: String,
    uid: i32,
}

#[derive(Deserialize)]
pub(super) struct PredictionQuery {
    id: i32,
    indicator: String,
}

#[derive(Deserialize)]
pub(super) struct TuningQuery {
    id: i32,
    method: String,
}

#[derive(Deserialize)]
pub(super) struct AvailableQuery {
    indicator: String,
    method: String,
}

#[derive(Deserialize)]
pub(super) struct ListQuery {
    indicator: String,
}

fn parse<T: FromStr<Err = anyhow::Error>>(raw: &str) -> Result<T, Response> {
    raw.parse::<T>()
        .map_err(|e| failure(StatusCode::BAD_REQUEST, e))
}

fn bad_query(e: QueryRejection) -> Response {
    failure(StatusCode::BAD_REQUEST, e.body_text())
}

pub(super) async fn handler_training(
    State(state): State<Arc<AppState>>,
    query: Result<Query<TrainingQuery>, QueryRejection>,
) -> Response {
    let Query(q) = match query {
        Ok(q) => q,
        Err(e) => return bad_query(e),
    };
    let (indicator, method) = match (parse::<Indicator>(&q.indicator), parse::<Method>(&q.method)) {
        (Ok(i), Ok(m)) => (i, m),
        (Err(resp), _) | (_, Err(resp)) => return resp,
    };

    match state.orchestrator.train(indicator, method, q.uid).await {
        Ok(report) => Json(serde_json::json!({"status": "success", "data": report})).into_response(),
        Err(e) => orchestrator_failure(&e),
    }
}

pub(super) async fn handler_prediction(
    State(state): State<Arc<AppState>>,
    query: Result<Query<PredictionQuery>, QueryRejection>,
) -> Response {
    let Query(q) = match query {
        Ok(q) => q,
        Err(e) => return bad_query(e),
    };
    let indicator = match parse::<Indicator>(&q.indicator) {
        Ok(i) => i,
        Err(resp) => return resp,
    };

    match state.orchestrator.predict(q.id, indicator).await {
        Ok(outcome) => {
            let (dates, values) = outcome.series.into_parts();
            Json(serde_json::json!({
                "status": "success",
                "forPlot": values,
                "dates": dates,
                "pred": outcome.predicted,
            }))
            .into_response()
        }
        Err(e) => orchestrator_failure(&e),
    }
}

pub(super) async fn handler_tuning(
    State(state): State<Arc<AppState>>,
    query: Result<Query<TuningQuery>, QueryRejection>,
) -> Response {
    let Query(q) = match query {
        Ok(q) => q,
        Err(e) => return bad_query(e),
    };
    let method = match parse::<SearchMethod>(&q.method) {
        Ok(m) => m,
        Err(resp) => return resp,
    };

    match state.orchestrator.tune(q.id, method).await {
        Ok(report) => Json(serde_json::json!({"status": "success", "data": report})).into_response(),
        Err(e) => orchestrator_failure(&e),
    }
}

/// `method=all` lists every method for the indicator.
pub(super) async fn handler_available(
    State(state): State<Arc<AppState>>,
    query: Result<Query<AvailableQuery>, QueryRejection>,
) -> Response {
    let Query(q) = match query {
        Ok(q) => q,
        Err(e) => return bad_query(e),
    };
    let indicator = match parse::<Indicator>(&q.indicator) {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    let method = if q.method.trim().eq_ignore_ascii_case("all") {
        None
    } else {
        match parse::<Method>(&q.method) {
            Ok(m) => Some(m),
            Err(resp) => return resp,
        }
    };

    match state.orchestrator.available_models(indicator, method).await {
        Ok(models) => Json(models).into_response(),
        Err(e) => orchestrator_failure(&e),
    }
}

pub(super) async fn handler_list(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Response {
    let Query(q) = match query {
        Ok(q) => q,
        Err(e) => return bad_query(e),
    };
    let indicator = match parse::<Indicator>(&q.indicator) {
        Ok(i) => i,
        Err(resp) => return resp,
    };

    match state.orchestrator.methods_for(indicator).await {
        Ok(methods) => Json(methods).into_response(),
        Err(e) => orchestrator_failure(&e),
    }
}

pub(super) async fn handler_delete(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<i32>,
) -> Response {
    match state.orchestrator.delete_model(id).await {
        Ok(true) => {
            info!(model_id = id, "model deleted via API");
            success()
        }
        Ok(false) => failure(StatusCode::NOT_FOUND, format!("model {} not found", id)),
        Err(e) => orchestrator_failure(&e),
    }
}
