//! Period consumption from sparse cumulative readings.
//!
//! Billing periods rarely have readings exactly on their edges, so boundary
//! readings are matched by proximity inside a buffered search window.

use chrono::NaiveDate;
use meter_core::calculations::clamped_delta;
use meter_core::error::{EngineError, Result};
use meter_core::models::{ConsumptionResult, ConsumptionWarning, Reading};
use meter_core::time_utils::{days_between, months_after, months_before};

// ── BillingPeriod ─────────────────────────────────────────────────────────────

/// An inclusive `[start, end]` range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillingPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl BillingPeriod {
    /// Create a period, rejecting `start > end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(EngineError::InvalidPeriod(format!(
                "period start {} is after period end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// The search window widened by `buffer_months` on both sides.
    pub fn buffered(&self, buffer_months: u32) -> (NaiveDate, NaiveDate) {
        (
            months_before(self.start, buffer_months),
            months_after(self.end, buffer_months),
        )
    }
}

// ── PeriodExtractor ───────────────────────────────────────────────────────────

/// Stateless boundary matching and delta computation.
pub struct PeriodExtractor;

impl PeriodExtractor {
    /// Compute the consumption of one meter within `period`.
    ///
    /// `series` must be sorted ascending by date and already restricted to
    /// the buffered window. Only readings on or before `period.end` are
    /// candidates. The start boundary is the candidate closest to
    /// `period.start` (earlier reading wins a tie), the end boundary is the
    /// latest candidate.
    ///
    /// Cost and share are left unset; they need the price table and the
    /// building-wide totals respectively.
    pub fn extract(series: &[Reading], period: &BillingPeriod) -> ConsumptionResult {
        let cutoff = series.partition_point(|r| r.date <= period.end);
        let before_end = &series[..cutoff];

        let start = Self::closest_to(before_end, period.start);
        let end = before_end.last();

        let has_data = matches!((start, end), (Some(s), Some(e)) if s.date != e.date);

        let consumption = match (start, end) {
            (Some(s), Some(e)) if has_data => Some(clamped_delta(s.value, e.value)),
            _ => None,
        };

        let warning = match (start, end) {
            (None, _) => Some(ConsumptionWarning::NoStartReading),
            (_, None) => Some(ConsumptionWarning::NoEndReading),
            (Some(s), Some(e)) if s.date == e.date => Some(ConsumptionWarning::SingleReading),
            (Some(s), Some(e)) if e.value < s.value => Some(ConsumptionWarning::PossibleRollover),
            _ => None,
        };

        ConsumptionResult {
            start_date: start.map(|r| r.date),
            start_value: start.map(|r| r.value),
            end_date: end.map(|r| r.date),
            end_value: end.map(|r| r.value),
            consumption,
            has_data,
            warning,
            share_percent: 0.0,
            estimated_cost: None,
        }
    }

    /// The reading whose date is nearest to `target`; the first one wins on
    /// equal distance.
    fn closest_to(readings: &[Reading], target: NaiveDate) -> Option<&Reading> {
        let distance = |r: &Reading| days_between(r.date, target).abs();
        readings.iter().fold(None, |best: Option<&Reading>, r| match best {
            Some(b) if distance(b) <= distance(r) => Some(b),
            _ => Some(r),
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
