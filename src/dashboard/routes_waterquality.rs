//! Measurement API: range queries, plotting series, recent rows and CRUD.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path as AxumPath, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::NaiveDate;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use super::{failure, storage_failure, success, AppState};
use crate::types::{Indicator, NewMeasurement};

/// Station id meaning "every station" in range queries.
const ALL_STATIONS: i32 = -1;

#[derive(Deserialize)]
pub(super) struct RangeQuery {
    station: i32,
    #[serde(rename = "startDate")]
    start_date: String,
    #[serde(rename = "endDate")]
    end_date: String,
}

#[derive(Deserialize)]
pub(super) struct PlotQuery {
    station: i32,
    period: u32,
    indicator: String,
}

#[derive(Deserialize)]
pub(super) struct RecentQuery {
    num: i64,
}

fn parse_day(raw: &str) -> Result<NaiveDate, Response> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|e| {
        failure(
            StatusCode::BAD_REQUEST,
            format!("invalid date '{}': {}", raw, e),
        )
    })
}

/// Rows between `startDate 00:00:00` and the end of `endDate`, inclusive.
pub(super) async fn handler_query(
    State(state): State<Arc<AppState>>,
    query: Result<Query<RangeQuery>, QueryRejection>,
) -> Response {
    let Query(q) = match query {
        Ok(q) => q,
        Err(e) => return failure(StatusCode::BAD_REQUEST, e.body_text()),
    };
    let (start_day, end_day) = match (parse_day(&q.start_date), parse_day(&q.end_date)) {
        (Ok(s), Ok(e)) => (s, e),
        (Err(resp), _) | (_, Err(resp)) => return resp,
    };
    let bounds = start_day
        .and_hms_opt(0, 0, 0)
        .zip(end_day.and_hms_micro_opt(23, 59, 59, 999_999));
    let Some((start, end)) = bounds else {
        return failure(StatusCode::BAD_REQUEST, "date out of range");
    };
    let station = (q.station != ALL_STATIONS).then_some(q.station);

    match state.measurements.between(start, end, station).await {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => storage_failure("range query failed", e),
    }
}

pub(super) async fn handler_all(State(state): State<Arc<AppState>>) -> Response {
    match state.measurements.all().await {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => storage_failure("listing measurements failed", e),
    }
}

pub(super) async fn handler_stations(State(state): State<Arc<AppState>>) -> Response {
    match state.measurements.stations().await {
        Ok(stations) => Json(stations).into_response(),
        Err(e) => storage_failure("listing stations failed", e),
    }
}

/// Monthly averages over the last `period` years as parallel arrays.
pub(super) async fn handler_plot(
    State(state): State<Arc<AppState>>,
    query: Result<Query<PlotQuery>, QueryRejection>,
) -> Response {
    let Query(q) = match query {
        Ok(q) => q,
        Err(e) => return failure(StatusCode::BAD_REQUEST, e.body_text()),
    };
    let indicator = match q.indicator.parse::<Indicator>() {
        Ok(i) => i,
        Err(e) => return failure(StatusCode::BAD_REQUEST, e),
    };

    let series = state
        .orchestrator
        .aggregator()
        .plot(q.station, q.period, indicator, state.now())
        .await;
    match series {
        Ok(series) => {
            let (dates, values) = series.into_parts();
            Json(serde_json::json!({"waterquality": values, "dates": dates})).into_response()
        }
        Err(e) => storage_failure("plot query failed", e),
    }
}

pub(super) async fn handler_recent(
    State(state): State<Arc<AppState>>,
    query: Result<Query<RecentQuery>, QueryRejection>,
) -> Response {
    let Query(q) = match query {
        Ok(q) => q,
        Err(e) => return failure(StatusCode::BAD_REQUEST, e.body_text()),
    };
    if q.num < 1 {
        return failure(StatusCode::BAD_REQUEST, "num must be at least 1");
    }
    match state.measurements.recent(q.num).await {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => storage_failure("recent query failed", e),
    }
}

pub(super) async fn handler_add(
    State(state): State<Arc<AppState>>,
    body: Result<Json<NewMeasurement>, JsonRejection>,
) -> Response {
    let Json(row) = match body {
        Ok(b) => b,
        Err(e) => return failure(StatusCode::BAD_REQUEST, e.body_text()),
    };
    match state.measurements.insert(&row).await {
        Ok(inserted) => {
            info!(id = inserted.id, station = inserted.station, "measurement added");
            success()
        }
        Err(e) => storage_failure("adding measurement failed", e),
    }
}

pub(super) async fn handler_update(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<i32>,
    body: Result<Json<NewMeasurement>, JsonRejection>,
) -> Response {
    let Json(row) = match body {
        Ok(b) => b,
        Err(e) => return failure(StatusCode::BAD_REQUEST, e.body_text()),
    };
    match state.measurements.update(id, &row).await {
        Ok(true) => {
            info!(id, "measurement updated");
            success()
        }
        Ok(false) => failure(StatusCode::NOT_FOUND, format!("measurement {} not found", id)),
        Err(e) => storage_failure("updating measurement failed", e),
    }
}

pub(super) async fn handler_delete(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<i32>,
) -> Response {
    match state.measurements.delete(id).await {
        Ok(true) => {
            info!(id, "measurement deleted");
            success()
        }
        Ok(false) => failure(StatusCode::NOT_FOUND, format!("measurement {} not found", id)),
        Err(e) => storage_failure("deleting measurement failed", e),
    }
}
