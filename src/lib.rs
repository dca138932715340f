//! # Riverwatch: Water-Quality Monitoring Backend
//!
//! Stores station measurements, derives monthly and daily indicator series
//! from them, and drives an external machine-learning service that trains,
//! predicts with and tunes per-indicator models.
//!
//! ## Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`types`] | Indicators, methods, measurement and model rows |
//! | [`store`] | Persistence traits plus the in-memory implementation |
//! | [`db`] | PostgreSQL implementation of the store traits |
//! | [`aggregate`] | Monthly averages and the trailing daily window |
//! | [`trainer`] | Blocking HTTP client for the ML service and response decoding |
//! | [`orchestrator`] | Model lifecycle: create, remote call, commit or roll back |
//! | [`dashboard`] | Axum HTTP API |
//! | [`config`] | TOML settings with CLI / environment overrides |
//! | [`prom_metrics`] | Prometheus registry |
//! | [`clock`] | Injectable source of "now" |

pub mod aggregate;
pub mod clock;
pub mod config;
pub mod dashboard;
pub mod db;
pub mod orchestrator;
pub mod prom_metrics;
pub mod store;
pub mod trainer;
pub mod types;
