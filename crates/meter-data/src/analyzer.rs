//! Anomaly classifier for meter reading series.
//!
//! Flags meters that stopped being read (stale) and meters whose most recent
//! daily consumption deviates sharply from their own history (spike / drop).

use chrono::NaiveDate;
use meter_core::calculations::{mean, RateCalculator};
use meter_core::formatting::format_number;
use meter_core::models::{AnomalyRecord, AnomalyType, MeterInput, Reading, Severity};
use meter_core::pricing::PriceTable;
use meter_core::settings::AnomalyConfig;
use meter_core::time_utils::{days_between, months_before};
use tracing::debug;

use crate::index::slice_from;

/// Days used to project a daily-rate difference into a monthly cost.
const COST_PROJECTION_DAYS: f64 = 30.0;

// ── AnomalyAnalyzer ───────────────────────────────────────────────────────────

/// Classifies one meter at a time against configurable thresholds.
pub struct AnomalyAnalyzer {
    config: AnomalyConfig,
    prices: PriceTable,
}

impl AnomalyAnalyzer {
    /// Create an analyzer with the given thresholds and price table.
    pub fn new(config: AnomalyConfig, prices: PriceTable) -> Self {
        Self { config, prices }
    }

    // ── Public methods ────────────────────────────────────────────────────────

    /// Evaluate every condition for one meter.
    ///
    /// `series` is the meter's full sorted history; only readings inside the
    /// lookback window ending at `today` are considered. The checks run in
    /// order:
    /// 1. No readings in the window → one critical stale record, nothing else.
    /// 2. Last reading older than `stale_factor × interval` → stale.
    /// 3. With at least three readings, compare the latest daily rate with the
    ///    mean of the earlier ones → spike or drop.
    pub fn analyze_meter(
        &self,
        meter: &MeterInput,
        series: &[Reading],
        today: NaiveDate,
    ) -> Vec<AnomalyRecord> {
        let window_start = months_before(today, self.config.lookback_months);
        let window = slice_from(series, window_start);

        let Some(last) = window.last() else {
            return vec![self.record(
                meter,
                AnomalyType::Stale,
                Severity::Critical,
                format!(
                    "Keine Ablesungen in den letzten {} Monaten",
                    self.config.lookback_months
                ),
            )];
        };

        let mut records = Vec::new();

        if let Some(record) = self.check_cadence(meter, last.date, today) {
            records.push(record);
        }

        if let Some(record) = self.check_rate_change(meter, window) {
            records.push(record);
        }

        records
    }

    // ── Checks ────────────────────────────────────────────────────────────────

    /// Stale check against the meter's expected reading interval.
    fn check_cadence(
        &self,
        meter: &MeterInput,
        last_date: NaiveDate,
        today: NaiveDate,
    ) -> Option<AnomalyRecord> {
        let interval = self.interval_days(meter);
        let days_since = days_between(last_date, today);
        let days = days_since as f64;

        if days <= self.config.stale_factor * interval as f64 {
            return None;
        }

        let severity = if days > self.config.stale_critical_factor * interval as f64 {
            Severity::Critical
        } else {
            Severity::Warning
        };

        Some(self.record(
            meter,
            AnomalyType::Stale,
            severity,
            format!(
                "Letzte Ablesung vor {} Tagen ({}), erwartet alle {} Tage",
                days_since, last_date, interval
            ),
        ))
    }

    /// Spike / drop check on the normalized daily rates of `window`.
    fn check_rate_change(&self, meter: &MeterInput, window: &[Reading]) -> Option<AnomalyRecord> {
        if window.len() < 3 {
            return None;
        }

        let rates = RateCalculator::rate_values(window);
        let (latest, historical) = rates.split_last()?;
        let latest = *latest;
        let average = mean(historical)?;

        if average <= 0.0 {
            debug!(
                "meter {}: zero baseline (avg {}), skipping spike/drop check",
                meter.id, average
            );
            return None;
        }

        let ratio = latest / average;
        let unit = meter.meter_type.unit_label();

        if ratio > self.config.spike_ratio {
            let severity = if ratio > self.config.spike_critical_ratio {
                Severity::Critical
            } else {
                Severity::Warning
            };
            let mut details = format!(
                "Verbrauch {} % über Durchschnitt ({} vs. {} {}/Tag)",
                ((ratio - 1.0) * 100.0).round(),
                format_number(latest, 2),
                format_number(average, 2),
                unit
            );
            if let Some(price) = self.prices.price(meter.meter_type) {
                let extra = (latest - average) * COST_PROJECTION_DAYS * price;
                details.push_str(&format!(
                    ", ca. {} € Mehrkosten pro Monat",
                    format_number(extra, 2)
                ));
            }
            return Some(self.record(meter, AnomalyType::Spike, severity, details));
        }

        if ratio < self.config.drop_ratio && average > self.config.drop_min_average {
            let details = format!(
                "Verbrauch {} % unter Durchschnitt ({} vs. {} {}/Tag), möglicher Defekt oder Leerstand",
                ((1.0 - ratio) * 100.0).round(),
                format_number(latest, 2),
                format_number(average, 2),
                unit
            );
            return Some(self.record(meter, AnomalyType::Drop, Severity::Warning, details));
        }

        None
    }

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn interval_days(&self, meter: &MeterInput) -> u32 {
        meter
            .reading_interval_days
            .filter(|days| *days > 0)
            .unwrap_or(self.config.default_interval_days)
    }

    fn record(
        &self,
        meter: &MeterInput,
        anomaly_type: AnomalyType,
        severity: Severity,
        details: String,
    ) -> AnomalyRecord {
        AnomalyRecord {
            meter_id: meter.id.clone(),
            meter_type: meter.meter_type,
            anomaly_type,
            severity,
            details,
            unit_id: meter.unit_id.clone(),
            context: meter.context.clone(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use meter_core::models::{MeterContext, MeterType};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn reading(y: i32, m: u32, d: u32, v: f64) -> Reading {
        Reading::new(date(y, m, d), v)
    }

    fn meter(meter_type: MeterType, interval: Option<u32>) -> MeterInput {
        MeterInput {
            id: "m-1".to_string(),
            meter_type,
            reading_interval_days: interval,
            unit_id: Some("u-1".to_string()),
            context: MeterContext {
                building_name: Some("Lindenweg 3".to_string()),
                ..MeterContext::default()
            },
            readings: Vec::new(),
        }
    }

    fn analyzer() -> AnomalyAnalyzer {
        AnomalyAnalyzer::new(AnomalyConfig::default(), PriceTable::default())
    }

    /// Readings every 10 days with the given per-interval deltas.
    fn series_with_deltas(deltas: &[f64]) -> Vec<Reading> {
        let mut d = date(2024, 1, 1);
        let mut value = 1000.0;
        let mut out = vec![Reading::new(d, value)];
        for delta in deltas {
            d += chrono::Duration::days(10);
            value += delta;
            out.push(Reading::new(d, value));
        }
        out
    }

    // ── stale ────────────────────────────────────────────────────────────────

    #[test]
    fn test_no_readings_is_single_critical_stale() {
        let records = analyzer().analyze_meter(
            &meter(MeterType::Electricity, None),
            &[],
            date(2024, 6, 1),
        );
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].anomaly_type, AnomalyType::Stale);
        assert_eq!(records[0].severity, Severity::Critical);
        assert_eq!(
            records[0].context.building_name.as_deref(),
            Some("Lindenweg 3")
        );
        assert_eq!(records[0].unit_id.as_deref(), Some("u-1"));
    }

    #[test]
    fn test_readings_only_before_lookback_count_as_none() {
        // Old readings with a huge spike must not produce a spike record.
        let series = vec![
            reading(2021, 1, 1, 0.0),
            reading(2021, 2, 1, 10.0),
            reading(2021, 3, 1, 900.0),
        ];
        let records = analyzer().analyze_meter(
            &meter(MeterType::Gas, None),
            &series,
            date(2024, 6, 1),
        );
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].anomaly_type, AnomalyType::Stale);
        assert_eq!(records[0].severity, Severity::Critical);
    }

    #[test]
    fn test_stale_critical_after_three_intervals() {
        let series = vec![reading(2024, 1, 1, 100.0)];
        let records = analyzer().analyze_meter(
            &meter(MeterType::WaterCold, Some(30)),
            &series,
            date(2024, 4, 15),
        );
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].anomaly_type, AnomalyType::Stale);
        assert_eq!(records[0].severity, Severity::Critical);
        assert!(records[0].details.contains("105 Tagen"));
    }

    #[test]
    fn test_stale_warning_between_two_and_three_intervals() {
        let series = vec![reading(2024, 1, 1, 100.0)];
        // 70 days: > 60, <= 90.
        let records = analyzer().analyze_meter(
            &meter(MeterType::WaterCold, Some(30)),
            &series,
            date(2024, 3, 11),
        );
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].severity, Severity::Warning);
    }

    #[test]
    fn test_not_stale_at_exactly_twice_interval() {
        let series = vec![reading(2024, 1, 1, 100.0)];
        let records = analyzer().analyze_meter(
            &meter(MeterType::WaterCold, Some(30)),
            &series,
            date(2024, 3, 1),
        );
        assert!(records.is_empty());
    }

    #[test]
    fn test_zero_interval_uses_default() {
        let series = vec![reading(2024, 1, 1, 100.0)];
        let records = analyzer().analyze_meter(
            &meter(MeterType::Gas, Some(0)),
            &series,
            date(2024, 2, 15),
        );
        assert!(records.is_empty());
    }

    // ── spike / drop ─────────────────────────────────────────────────────────

    #[test]
    fn test_spike_critical() {
        let series = vec![
            reading(2024, 1, 1, 100.0),
            reading(2024, 2, 1, 130.0),
            reading(2024, 3, 1, 250.0),
        ];
        let records = analyzer().analyze_meter(
            &meter(MeterType::Electricity, None),
            &series,
            date(2024, 3, 10),
        );
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].anomaly_type, AnomalyType::Spike);
        assert_eq!(records[0].severity, Severity::Critical);
        assert!(records[0].details.contains("über Durchschnitt"));
        assert!(records[0].details.contains("Mehrkosten"));
    }

    #[test]
    fn test_spike_warning_between_thresholds() {
        // Rates 1.0, 1.0, 1.8 → avg 1.0, ratio 1.8.
        let series = series_with_deltas(&[10.0, 10.0, 18.0]);
        let records = analyzer().analyze_meter(
            &meter(MeterType::Gas, Some(10)),
            &series,
            date(2024, 1, 31),
        );
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].anomaly_type, AnomalyType::Spike);
        assert_eq!(records[0].severity, Severity::Warning);
        assert!(records[0].details.starts_with("Verbrauch 80 %"));
    }

    #[test]
    fn test_unpriced_spike_has_no_cost_hint() {
        let series = series_with_deltas(&[10.0, 10.0, 50.0]);
        let records = analyzer().analyze_meter(
            &meter(MeterType::PvProduction, Some(10)),
            &series,
            date(2024, 1, 31),
        );
        assert_eq!(records[0].anomaly_type, AnomalyType::Spike);
        assert!(!records[0].details.contains("Mehrkosten"));
    }

    #[test]
    fn test_drop_is_warning() {
        // Rates 2.0, 2.0, 0.2 → ratio 0.1.
        let series = series_with_deltas(&[20.0, 20.0, 2.0]);
        let records = analyzer().analyze_meter(
            &meter(MeterType::Heating, Some(10)),
            &series,
            date(2024, 1, 31),
        );
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].anomaly_type, AnomalyType::Drop);
        assert_eq!(records[0].severity, Severity::Warning);
        assert!(records[0].details.contains("Leerstand"));
    }

    #[test]
    fn test_drop_ignored_for_tiny_baseline() {
        // avg 0.05/day is below the drop floor.
        let series = series_with_deltas(&[0.5, 0.5, 0.0]);
        let records = analyzer().analyze_meter(
            &meter(MeterType::WaterHot, Some(10)),
            &series,
            date(2024, 1, 31),
        );
        assert!(records.is_empty());
    }

    // ── threshold boundaries ─────────────────────────────────────────────────

    #[test]
    fn test_ratio_exactly_spike_ratio_is_not_flagged() {
        // Rates 2.0, 2.0, 3.0 → ratio 1.5.
        let series = series_with_deltas(&[20.0, 20.0, 30.0]);
        let records = analyzer().analyze_meter(
            &meter(MeterType::Gas, Some(10)),
            &series,
            date(2024, 1, 31),
        );
        assert!(records.is_empty());
    }

    #[test]
    fn test_ratio_exactly_critical_ratio_is_warning() {
        // Rates 2.0, 2.0, 4.0 → ratio 2.0.
        let series = series_with_deltas(&[20.0, 20.0, 40.0]);
        let records = analyzer().analyze_meter(
            &meter(MeterType::Gas, Some(10)),
            &series,
            date(2024, 1, 31),
        );
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].anomaly_type, AnomalyType::Spike);
        assert_eq!(records[0].severity, Severity::Warning);
    }

    #[test]
    fn test_ratio_exactly_drop_ratio_is_not_flagged() {
        // Rates 10.0, 10.0, 3.0 → ratio 0.3.
        let series = series_with_deltas(&[100.0, 100.0, 30.0]);
        let records = analyzer().analyze_meter(
            &meter(MeterType::Gas, Some(10)),
            &series,
            date(2024, 1, 31),
        );
        assert!(records.is_empty());
    }

    #[test]
    fn test_average_exactly_drop_floor_is_not_flagged() {
        // Rates 0.1, 0.1, 0.0 → avg equals drop_min_average.
        let series = series_with_deltas(&[1.0, 1.0, 0.0]);
        let records = analyzer().analyze_meter(
            &meter(MeterType::WaterCold, Some(10)),
            &series,
            date(2024, 1, 31),
        );
        assert!(records.is_empty());

        // Just above the floor the same collapse is a drop.
        let series = series_with_deltas(&[2.0, 2.0, 0.0]);
        let records = analyzer().analyze_meter(
            &meter(MeterType::WaterCold, Some(10)),
            &series,
            date(2024, 1, 31),
        );
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].anomaly_type, AnomalyType::Drop);
    }

    #[test]
    fn test_normal_variation_is_not_flagged() {
        let series = series_with_deltas(&[10.0, 12.0, 9.0, 14.0]);
        let records = analyzer().analyze_meter(
            &meter(MeterType::Gas, Some(10)),
            &series,
            date(2024, 2, 10),
        );
        assert!(records.is_empty());
    }

    #[test]
    fn test_zero_baseline_skips_rate_check() {
        let series = series_with_deltas(&[0.0, 0.0, 50.0]);
        let records = analyzer().analyze_meter(
            &meter(MeterType::Gas, Some(10)),
            &series,
            date(2024, 1, 31),
        );
        assert!(records.is_empty());
    }

    #[test]
    fn test_two_readings_skip_rate_check() {
        let series = vec![reading(2024, 1, 1, 0.0), reading(2024, 1, 11, 500.0)];
        let records = analyzer().analyze_meter(
            &meter(MeterType::Gas, Some(10)),
            &series,
            date(2024, 1, 12),
        );
        assert!(records.is_empty());
    }

    #[test]
    fn test_stale_and_spike_together() {
        let series = vec![
            reading(2024, 1, 1, 100.0),
            reading(2024, 2, 1, 130.0),
            reading(2024, 3, 1, 250.0),
        ];
        let records = analyzer().analyze_meter(
            &meter(MeterType::Electricity, Some(30)),
            &series,
            date(2024, 6, 15),
        );
        let kinds: Vec<AnomalyType> = records.iter().map(|r| r.anomaly_type).collect();
        assert_eq!(kinds, vec![AnomalyType::Stale, AnomalyType::Spike]);
    }

    #[test]
    fn test_custom_thresholds() {
        let config = AnomalyConfig {
            spike_ratio: 3.0,
            spike_critical_ratio: 5.0,
            ..AnomalyConfig::default()
        };
        let analyzer = AnomalyAnalyzer::new(config, PriceTable::default());
        let series = series_with_deltas(&[10.0, 10.0, 25.0]);
        let records = analyzer.analyze_meter(
            &meter(MeterType::Gas, Some(10)),
            &series,
            date(2024, 1, 31),
        );
        assert!(records.is_empty());
    }
}
