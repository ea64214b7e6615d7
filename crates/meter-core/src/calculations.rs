//! Daily-rate normalization of cumulative readings.

use chrono::NaiveDate;
use serde::Serialize;

use crate::models::Reading;

/// Interface for any dated cumulative value from which daily rates can be
/// derived.
pub trait CumulativePoint {
    /// Calendar day the value was recorded on.
    fn date(&self) -> NaiveDate;
    /// Cumulative meter value.
    fn value(&self) -> f64;
}

impl CumulativePoint for Reading {
    fn date(&self) -> NaiveDate {
        self.date
    }

    fn value(&self) -> f64 {
        self.value
    }
}

impl CumulativePoint for (NaiveDate, f64) {
    fn date(&self) -> NaiveDate {
        self.0
    }

    fn value(&self) -> f64 {
        self.1
    }
}

// ── DailyRate ─────────────────────────────────────────────────────────────────

/// Consumption per day between two consecutive readings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DailyRate {
    pub from: NaiveDate,
    pub to: NaiveDate,
    /// Elapsed days, at least 1.
    pub days: i64,
    /// Raw value difference (may be negative after a meter swap).
    pub delta: f64,
    /// `delta / days`.
    pub rate: f64,
}

/// Stateless collection of rate and rounding helpers.
pub struct RateCalculator;

impl RateCalculator {
    /// Convert a chronological series into per-day rates, one per
    /// consecutive pair.
    ///
    /// Elapsed time is floored at one day so same-day duplicates never divide
    /// by zero. Fewer than two points yield an empty vector.
    pub fn daily_rates<P: CumulativePoint>(series: &[P]) -> Vec<DailyRate> {
        series
            .windows(2)
            .map(|pair| {
                let (a, b) = (&pair[0], &pair[1]);
                let days = (b.date() - a.date()).num_days().max(1);
                let delta = b.value() - a.value();
                DailyRate {
                    from: a.date(),
                    to: b.date(),
                    days,
                    delta,
                    rate: delta / days as f64,
                }
            })
            .collect()
    }

    /// Just the `rate` column of [`RateCalculator::daily_rates`].
    pub fn rate_values<P: CumulativePoint>(series: &[P]) -> Vec<f64> {
        Self::daily_rates(series).into_iter().map(|r| r.rate).collect()
    }
}

/// Arithmetic mean, `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Round half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10_f64.powi(decimals);
    (value * factor).round() / factor
}

/// Difference of two cumulative values, floored at zero.
pub fn clamped_delta(start: f64, end: f64) -> f64 {
    (end - start).max(0.0)
}

// ── Tests ──────────────────────────────────────────────────────────────────────
