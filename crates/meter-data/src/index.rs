//! Per-meter chronological index over raw reading records.

use std::borrow::Borrow;
use std::collections::BTreeMap;

use chrono::NaiveDate;
use meter_core::error::ValidationError;
use meter_core::models::{MeterInput, RawPoint, RawReading, Reading};
use tracing::{debug, warn};

// ── ReadingIndex ──────────────────────────────────────────────────────────────

/// Readings grouped by meter id, each group sorted ascending by date.
///
/// A meter with any invalid record is quarantined: its readings are dropped
/// and the first validation error is kept in [`ReadingIndex::rejected`].
/// Every other meter is indexed normally.
#[derive(Debug, Clone, Default)]
pub struct ReadingIndex {
    series: BTreeMap<String, Vec<Reading>>,
    rejected: BTreeMap<String, ValidationError>,
}

impl ReadingIndex {
    /// Build the index from a flat, unordered collection of records.
    pub fn build<I>(records: I) -> Self
    where
        I: IntoIterator,
        I::Item: Borrow<RawReading>,
    {
        let mut grouped: BTreeMap<String, Vec<RawPoint>> = BTreeMap::new();
        for record in records {
            let record = record.borrow();
            grouped
                .entry(record.meter_id.clone())
                .or_default()
                .push(record.to_point());
        }
        Self::from_groups(grouped)
    }

    /// Build the index from meters carrying nested readings.
    ///
    /// Meters without any readings are still known to the index and resolve
    /// to an empty series.
    pub fn from_meters(meters: &[MeterInput]) -> Self {
        let mut grouped: BTreeMap<String, Vec<RawPoint>> = BTreeMap::new();
        for meter in meters {
            grouped
                .entry(meter.id.clone())
                .or_default()
                .extend(meter.readings.iter().cloned());
        }
        Self::from_groups(grouped)
    }

    fn from_groups(grouped: BTreeMap<String, Vec<RawPoint>>) -> Self {
        let mut index = Self::default();
        let mut total = 0usize;

        for (meter_id, points) in grouped {
            total += points.len();
            match parse_series(&meter_id, &points) {
                Ok(readings) => {
                    index.series.insert(meter_id, readings);
                }
                Err(err) => {
                    warn!("quarantining meter {}: {}", meter_id, err);
                    index.rejected.insert(meter_id, err);
                }
            }
        }

        debug!(
            "ReadingIndex: {} records -> {} meters ({} rejected)",
            total,
            index.series.len(),
            index.rejected.len()
        );
        index
    }

    /// Sorted readings of `meter_id`; empty for unknown or rejected meters.
    pub fn series(&self, meter_id: &str) -> &[Reading] {
        self.series.get(meter_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The validation error that quarantined `meter_id`, if any.
    pub fn rejection(&self, meter_id: &str) -> Option<&ValidationError> {
        self.rejected.get(meter_id)
    }

    /// All quarantined meters with their errors.
    pub fn rejected(&self) -> &BTreeMap<String, ValidationError> {
        &self.rejected
    }

    /// Ids of all indexed (non-rejected) meters in ascending order.
    pub fn meter_ids(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    /// Number of indexed meters.
    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

/// Parse and sort the nested readings of a single meter.
///
/// Fails on the first invalid point in input order. The sort is stable, so
/// same-date duplicates keep their input order.
pub fn parse_series(meter_id: &str, points: &[RawPoint]) -> Result<Vec<Reading>, ValidationError> {
    let mut readings = points
        .iter()
        .map(|point| point.parse(meter_id))
        .collect::<Result<Vec<_>, _>>()?;
    readings.sort_by_key(|r| r.date);
    Ok(readings)
}

// ── Window helpers ────────────────────────────────────────────────────────────

/// Sub-slice of a sorted series with `from <= date <= to`.
pub fn slice_between(series: &[Reading], from: NaiveDate, to: NaiveDate) -> &[Reading] {
    let lo = series.partition_point(|r| r.date < from);
    let hi = series.partition_point(|r| r.date <= to);
    if lo >= hi {
        return &[];
    }
    &series[lo..hi]
}

/// Sub-slice of a sorted series with `date >= from`.
pub fn slice_from(series: &[Reading], from: NaiveDate) -> &[Reading] {
    let lo = series.partition_point(|r| r.date < from);
    &series[lo..]
}

// ── Tests ─────────────────────────────────────────────────────────────────────
