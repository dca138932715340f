//! Turns raw trainer envelopes into typed reports.
//!
//! A usable response has `"status": "success"` (any case) and a `data`
//! object matching the endpoint's shape. Numeric leaves are coerced to `f64`
//! first, so `{"rmse": 1}` and `{"rmse": 1.0}` decode identically and the
//! untyped `best_params` map only ever carries floats.

use super::RemoteFailure;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainReport {
    pub rmse: f64,
    #[serde(default)]
    pub pred: Vec<f64>,
    #[serde(default)]
    pub real: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictReport {
    pub pred: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuneReport {
    pub best_rmse: f64,
    #[serde(default)]
    pub best_params: Map<String, Value>,
}

/// Rewrite every JSON number as an `f64` number.
pub fn coerce_numbers(value: Value) -> Value {
    match value {
        Value::Number(n) => match n.as_f64().and_then(Number::from_f64) {
            Some(f) => Value::Number(f),
            None => Value::Number(n),
        },
        Value::Array(items) => Value::Array(items.into_iter().map(coerce_numbers).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, coerce_numbers(v)))
                .collect(),
        ),
        other => other,
    }
}

fn is_success(envelope: &Value) -> bool {
    envelope
        .get("status")
        .and_then(Value::as_str)
        .is_some_and(|s| s.eq_ignore_ascii_case("success"))
}

fn decode<T: DeserializeOwned>(operation: &str, envelope: Value) -> Result<T, RemoteFailure> {
    if !is_success(&envelope) {
        warn!(operation, status = ?envelope.get("status"), "trainer rejected request");
        return Err(RemoteFailure::Rejected);
    }
    let data = match envelope {
        Value::Object(mut map) => map.remove("data").unwrap_or(Value::Null),
        _ => Value::Null,
    };
    serde_json::from_value(coerce_numbers(data)).map_err(|e| {
        warn!(operation, error = %e, "trainer payload did not match expected shape");
        RemoteFailure::Malformed(e.to_string())
    })
}

pub fn train_result(envelope: Value) -> Result<TrainReport, RemoteFailure> {
    decode("train", envelope)
}

pub fn predict_result(envelope: Value) -> Result<PredictReport, RemoteFailure> {
    decode("predict", envelope)
}

pub fn tune_result(envelope: Value) -> Result<TuneReport, RemoteFailure> {
    decode("tune", envelope)
}
