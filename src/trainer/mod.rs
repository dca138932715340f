//! # Trainer: Remote ML Service Client
//!
//! Thin blocking client for the external training service. One instance is
//! shared by every request; it holds no per-call state beyond the pooled
//! `ureq::Agent`.
//!
//! ## Endpoints
//!
//! | Call | Request |
//! |------|---------|
//! | train | `GET {base}training?model_id=N` |
//! | predict | `GET {base}prediction?model_id=N&month=1..12` |
//! | tune | `GET {base}tuning?model_id=N&method=random|bayesian` |
//!
//! Every response is the envelope `{"status": "...", "data": {...}}`. The
//! client only guarantees a JSON document came back; [`translate`] decides
//! whether it is a usable success.
//!
//! Connection errors, timeouts and non-2xx statuses are all failures of the
//! current call. Nothing is retried here.

pub mod translate;

use crate::types::SearchMethod;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::{error, info};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000/api/";
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;
const CONNECT_TIMEOUT_SECS: u64 = 5;

/// Why a remote call produced no usable result.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteFailure {
    /// Connection refused, DNS failure, timeout or a broken body stream.
    NoResponse(String),
    /// The service answered with a non-2xx status.
    HttpStatus(u16),
    /// The body was not JSON.
    Unparsable(String),
    /// The envelope's status was missing or `failure`.
    Rejected,
    /// Status was `success` but `data` did not match the expected shape.
    Malformed(String),
}

impl RemoteFailure {
    /// True for failures where no well-formed envelope was received.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            RemoteFailure::NoResponse(_) | RemoteFailure::HttpStatus(_) | RemoteFailure::Unparsable(_)
        )
    }
}

impl fmt::Display for RemoteFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteFailure::NoResponse(e) => write!(f, "no response from trainer: {}", e),
            RemoteFailure::HttpStatus(code) => write!(f, "trainer returned HTTP {}", code),
            RemoteFailure::Unparsable(e) => write!(f, "trainer response is not JSON: {}", e),
            RemoteFailure::Rejected => write!(f, "trainer reported failure"),
            RemoteFailure::Malformed(e) => write!(f, "trainer payload has unexpected shape: {}", e),
        }
    }
}

impl std::error::Error for RemoteFailure {}

/// The three remote operations. Implementations block for the duration of
/// the call; async callers move them onto the blocking pool.
pub trait RemoteTrainer: Send + Sync {
    fn train(&self, model_id: i32) -> Result<Value, RemoteFailure>;
    fn predict(&self, model_id: i32, month: u32) -> Result<Value, RemoteFailure>;
    fn tune(&self, model_id: i32, method: SearchMethod) -> Result<Value, RemoteFailure>;
}

/// Ensure `base` ends with exactly one `/` so endpoint names append cleanly.
pub fn normalize_base_url(base: &str) -> String {
    format!("{}/", base.trim().trim_end_matches('/'))
}

pub struct HttpTrainerClient {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpTrainerClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let agent = ureq::Agent::new_with_config(
            ureq::config::Config::builder()
                .timeout_connect(Some(Duration::from_secs(CONNECT_TIMEOUT_SECS).min(timeout)))
                .timeout_global(Some(timeout))
                .build(),
        );
        HttpTrainerClient {
            base_url: normalize_base_url(base_url),
            agent,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn get(&self, endpoint: &str, query: &[(&str, String)]) -> Result<Value, RemoteFailure> {
        let url = format!("{}{}", self.base_url, endpoint);
        let mut request = self.agent.get(&url);
        for (key, value) in query {
            request = request.query(*key, value);
        }

        let mut response = request.call().map_err(|e| {
            let failure = match e {
                ureq::Error::StatusCode(code) => RemoteFailure::HttpStatus(code),
                other => RemoteFailure::NoResponse(other.to_string()),
            };
            error!(endpoint, error = %failure, "trainer request failed");
            failure
        })?;

        let body = response.body_mut().read_to_string().map_err(|e| {
            error!(endpoint, error = %e, "failed to read trainer response body");
            RemoteFailure::NoResponse(e.to_string())
        })?;

        serde_json::from_str(&body).map_err(|e| {
            error!(endpoint, error = %e, "trainer response is not JSON");
            RemoteFailure::Unparsable(e.to_string())
        })
    }
}

impl RemoteTrainer for HttpTrainerClient {
    fn train(&self, model_id: i32) -> Result<Value, RemoteFailure> {
        info!(model_id, "requesting remote training");
        self.get("training", &[("model_id", model_id.to_string())])
    }

    fn predict(&self, model_id: i32, month: u32) -> Result<Value, RemoteFailure> {
        info!(model_id, month, "requesting remote prediction");
        self.get(
            "prediction",
            &[("model_id", model_id.to_string()), ("month", month.to_string())],
        )
    }

    fn tune(&self, model_id: i32, method: SearchMethod) -> Result<Value, RemoteFailure> {
        info!(model_id, method = %method, "requesting remote tuning");
        self.get(
            "tuning",
            &[("model_id", model_id.to_string()), ("method", method.to_string())],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_gets_single_trailing_slash() {
        assert_eq!(normalize_base_url("http://ml:8000/api"), "http://ml:8000/api/");
        assert_eq!(normalize_base_url("http://ml:8000/api/"), "http://ml:8000/api/");
        assert_eq!(normalize_base_url("http://ml:8000/api//"), "http://ml:8000/api/");
    }

    #[test]
    fn transport_failures_are_grouped() {
        assert!(RemoteFailure::NoResponse("refused".into()).is_transport());
        assert!(RemoteFailure::HttpStatus(500).is_transport());
        assert!(RemoteFailure::Unparsable("eof".into()).is_transport());
        assert!(!RemoteFailure::Rejected.is_transport());
        assert!(!RemoteFailure::Malformed("rmse".into()).is_transport());
    }

    #[test]
    fn display_names_the_status_code() {
        assert_eq!(RemoteFailure::HttpStatus(404).to_string(), "trainer returned HTTP 404");
    }

    #[test]
    fn client_keeps_normalized_base() {
        let client = HttpTrainerClient::new("http://localhost:9/api", Duration::from_secs(1));
        assert_eq!(client.base_url(), "http://localhost:9/api/");
    }
}
