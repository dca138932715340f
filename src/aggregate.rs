//! # Aggregate: Time-Bucketed Indicator Series
//!
//! Derives the two series the rest of the system consumes from raw
//! measurements:
//!
//! - **Monthly averages** for one station (plotting and tuning context),
//!   labelled `YYYY-M` and ordered by (year, month).
//! - **Trailing daily window** across all stations (model input for
//!   "predict next month"), labelled `YYYY-MM-DD`, one point per calendar
//!   day, rounded half-up to two decimals.
//!
//! Series are recomputed per request and never stored. Ascending order is
//! load-bearing: prediction appends its synthesized point to the end.
//!
//! A window bound that cannot be represented (e.g. subtracting months past
//! the calendar range) is logged and yields an empty series. Callers treat
//! an empty series as "no data". Storage errors still propagate.

use crate::store::MeasurementStore;
use crate::types::{Indicator, Measurement};
use anyhow::Result;
use chrono::{Months, NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

/// Months of history fed into a prediction request.
pub const DEFAULT_WINDOW_MONTHS: u32 = 6;

pub const DAY_FORMAT: &str = "%Y-%m-%d";

/// Ordered (label, value) pairs. Labels and values always have equal length.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregatedSeries {
    dates: Vec<String>,
    values: Vec<f64>,
}

impl AggregatedSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, label: impl Into<String>, value: f64) {
        self.dates.push(label.into());
        self.values.push(value);
    }

    pub fn dates(&self) -> &[String] {
        &self.dates
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn last(&self) -> Option<(&str, f64)> {
        self.dates
            .last()
            .zip(self.values.last())
            .map(|(d, v)| (d.as_str(), *v))
    }

    pub fn into_parts(self) -> (Vec<String>, Vec<f64>) {
        (self.dates, self.values)
    }
}

/// Round to `scale` decimals, ties away from zero, judged on the exact
/// binary value: 0.015 is stored as 0.01499999... and rounds to 0.01.
///
/// `value * 10^scale` can itself round onto a tie, so the product's exact
/// residual (from `mul_add`) decides which side of the tie the input lies on.
pub fn round_half_up(value: f64, scale: u32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let factor = 10f64.powi(scale as i32);
    let magnitude = value.abs();
    let scaled = magnitude * factor;
    let floor = scaled.floor();
    let fraction = scaled - floor;
    let rounded = if fraction > 0.5 {
        floor + 1.0
    } else if fraction < 0.5 {
        floor
    } else if magnitude.mul_add(factor, -scaled) < 0.0 {
        // the product was rounded up onto the tie
        floor
    } else {
        floor + 1.0
    };
    (rounded / factor).copysign(value)
}

/// Mean of `indicator` over every row of the day. Rows without the
/// indicator count as 0 but still add to the divisor. An empty day is 0.
pub fn daily_average(rows: &[Measurement], indicator: Indicator) -> f64 {
    if rows.is_empty() {
        return 0.0;
    }
    let sum: f64 = rows.iter().map(|m| m.value(indicator).unwrap_or(0.0)).sum();
    sum / rows.len() as f64
}

/// Whole-day bounds, `00:00:00` through `23:59:59.999999`.
fn day_bounds(day: NaiveDate) -> Option<(NaiveDateTime, NaiveDateTime)> {
    Some((
        day.and_hms_opt(0, 0, 0)?,
        day.and_hms_micro_opt(23, 59, 59, 999_999)?,
    ))
}

#[derive(Clone)]
pub struct Aggregator {
    store: Arc<dyn MeasurementStore>,
}

impl Aggregator {
    pub fn new(store: Arc<dyn MeasurementStore>) -> Self {
        Aggregator { store }
    }

    /// Monthly means of `indicator` at `station` over `[start, now]`.
    /// Months with no indicator values are skipped, never emitted as zero.
    pub async fn monthly_average(
        &self,
        station: i32,
        indicator: Indicator,
        start: NaiveDateTime,
        now: NaiveDateTime,
    ) -> Result<AggregatedSeries> {
        let mut buckets = self
            .store
            .monthly_averages(station, indicator, start, now)
            .await?;
        buckets.sort_by_key(|b| (b.year, b.month));

        let mut series = AggregatedSeries::new();
        for bucket in buckets {
            if let Some(avg) = bucket.average {
                series.push(format!("{}-{}", bucket.year, bucket.month), avg);
            }
        }
        Ok(series)
    }

    /// Monthly means over the last `period_years` years.
    pub async fn plot(
        &self,
        station: i32,
        period_years: u32,
        indicator: Indicator,
        now: NaiveDateTime,
    ) -> Result<AggregatedSeries> {
        let start = period_years
            .checked_mul(12)
            .and_then(|months| now.checked_sub_months(Months::new(months)));
        match start {
            Some(start) => self.monthly_average(station, indicator, start, now).await,
            None => {
                error!(station, period_years, "plot window start out of range");
                Ok(AggregatedSeries::new())
            }
        }
    }

    /// One rounded daily mean per calendar day with data since
    /// `now - months_back`, ascending.
    pub async fn trailing_window(
        &self,
        indicator: Indicator,
        months_back: u32,
        now: NaiveDateTime,
    ) -> Result<AggregatedSeries> {
        let Some(cutoff) = now.checked_sub_months(Months::new(months_back)) else {
            error!(months_back, %now, "trailing window cutoff out of range");
            return Ok(AggregatedSeries::new());
        };

        let mut days = self.store.distinct_days_since(cutoff).await?;
        days.sort();
        days.dedup();

        let mut series = AggregatedSeries::new();
        for day in days {
            let Some((start, end)) = day_bounds(day) else {
                error!(%day, "could not derive day bounds");
                return Ok(AggregatedSeries::new());
            };
            let rows = self.store.between(start, end, None).await?;
            let avg = daily_average(&rows, indicator);
            series.push(day.format(DAY_FORMAT).to_string(), round_half_up(avg, 2));
        }
        Ok(series)
    }
}
