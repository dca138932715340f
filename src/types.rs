//! Domain vocabulary shared by storage, aggregation and the model lifecycle.
//!
//! Indicators, algorithm identifiers and tuning strategies are closed sets.
//! Wire strings are parsed case-insensitively at the boundary; anything
//! outside the set is rejected there and never reaches SQL or the trainer.

use anyhow::{bail, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ── Indicators ──────────────────────────────────────────────────

/// A measured water-quality indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Indicator {
    #[serde(rename = "PH")]
    Ph,
    /// Dissolved oxygen.
    #[serde(rename = "DO")]
    Do,
    /// Ammonia nitrogen.
    #[serde(rename = "NH3N")]
    Nh3n,
}

impl Indicator {
    pub const ALL: [Indicator; 3] = [Indicator::Ph, Indicator::Do, Indicator::Nh3n];

    pub fn as_str(&self) -> &'static str {
        match self {
            Indicator::Ph => "PH",
            Indicator::Do => "DO",
            Indicator::Nh3n => "NH3N",
        }
    }

    /// Whitelisted storage column for this indicator.
    pub(crate) fn column(&self) -> &'static str {
        match self {
            Indicator::Ph => "ph",
            Indicator::Do => "dissolved_oxygen",
            Indicator::Nh3n => "ammonia_nitrogen",
        }
    }
}

impl fmt::Display for Indicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Indicator {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PH" => Ok(Indicator::Ph),
            "DO" => Ok(Indicator::Do),
            "NH3N" => Ok(Indicator::Nh3n),
            other => bail!("unknown indicator '{}'", other),
        }
    }
}

// ── Training methods ────────────────────────────────────────────

/// Algorithm identifiers understood by the remote training service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    #[serde(rename = "ADABOOST")]
    AdaBoost,
    #[serde(rename = "SVM")]
    Svm,
    #[serde(rename = "LSTM")]
    Lstm,
    #[serde(rename = "GRU")]
    Gru,
    #[serde(rename = "BI-RNN")]
    BiRnn,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::AdaBoost => "ADABOOST",
            Method::Svm => "SVM",
            Method::Lstm => "LSTM",
            Method::Gru => "GRU",
            Method::BiRnn => "BI-RNN",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ADABOOST" => Ok(Method::AdaBoost),
            "SVM" => Ok(Method::Svm),
            "LSTM" => Ok(Method::Lstm),
            "GRU" => Ok(Method::Gru),
            "BI-RNN" | "BIRNN" => Ok(Method::BiRnn),
            other => bail!("unknown training method '{}'", other),
        }
    }
}

/// Hyper-parameter search strategy used by the tuning endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMethod {
    Random,
    Bayesian,
}

impl SearchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMethod::Random => "random",
            SearchMethod::Bayesian => "bayesian",
        }
    }
}

impl fmt::Display for SearchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchMethod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "random" => Ok(SearchMethod::Random),
            "bayesian" => Ok(SearchMethod::Bayesian),
            other => bail!("unknown search method '{}'", other),
        }
    }
}

// ── Rows ────────────────────────────────────────────────────────

/// Wire format for measurement timestamps (`yyyy-MM-dd HH:mm:ss`).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

mod timestamp_format {
    use super::TIMESTAMP_FORMAT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(dt: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&dt.format(TIMESTAMP_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDateTime::parse_from_str(raw.trim(), TIMESTAMP_FORMAT)
            .or_else(|_| NaiveDateTime::parse_from_str(raw.trim(), "%Y-%m-%dT%H:%M:%S"))
            .map_err(serde::de::Error::custom)
    }
}

/// One immutable water-quality sample taken at a station.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Measurement {
    pub id: i32,
    pub station: i32,
    #[serde(rename = "date", with = "timestamp_format")]
    pub taken_at: NaiveDateTime,
    #[serde(rename = "phValue")]
    pub ph: Option<f64>,
    #[serde(rename = "doValue")]
    pub dissolved_oxygen: Option<f64>,
    #[serde(rename = "nh3nValue")]
    pub ammonia_nitrogen: Option<f64>,
}

impl Measurement {
    pub fn value(&self, indicator: Indicator) -> Option<f64> {
        match indicator {
            Indicator::Ph => self.ph,
            Indicator::Do => self.dissolved_oxygen,
            Indicator::Nh3n => self.ammonia_nitrogen,
        }
    }
}

/// Insert / replace payload for a measurement.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewMeasurement {
    pub station: i32,
    #[serde(rename = "date", with = "timestamp_format")]
    pub taken_at: NaiveDateTime,
    #[serde(rename = "phValue")]
    pub ph: Option<f64>,
    #[serde(rename = "doValue")]
    pub dissolved_oxygen: Option<f64>,
    #[serde(rename = "nh3nValue")]
    pub ammonia_nitrogen: Option<f64>,
}

/// A persisted trained-model row. `rmse` is `None` only while training is in flight.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct ModelRecord {
    pub id: i32,
    #[serde(rename = "uid")]
    pub user_id: i32,
    pub name: String,
    pub target: String,
    pub method: String,
    #[serde(rename = "date")]
    pub created_at: NaiveDateTime,
    pub rmse: Option<f64>,
}

/// Pending model row created before the remote training call.
#[derive(Debug, Clone, PartialEq)]
pub struct NewModel {
    pub user_id: i32,
    pub target: Indicator,
    pub method: Method,
    pub created_at: NaiveDateTime,
}

impl NewModel {
    /// `<indicator>_<method>`, e.g. `PH_SVM`.
    pub fn name(&self) -> String {
        format!("{}_{}", self.target, self.method)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct UserRecord {
    pub id: i32,
    pub name: String,
    pub role: String,
}
