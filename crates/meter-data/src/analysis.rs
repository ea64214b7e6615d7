//! The two pipelines of the engine: anomaly detection and period export.
//!
//! Both take already-loaded meters and return plain serializable reports.
//! Neither touches the filesystem or reads the clock; `today` and the period
//! bounds are explicit inputs, so identical input yields identical output.

use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use meter_core::error::Result;
use meter_core::models::{AnomalyRecord, MeterConsumption, MeterFailure, MeterInput, MeterType};
use meter_core::pricing::PriceTable;
use meter_core::settings::{AnomalyConfig, ExportConfig};
use serde::Serialize;
use tracing::{debug, warn};

use crate::aggregator::{CostAllocator, ExportTotals, TypeSummary};
use crate::analyzer::AnomalyAnalyzer;
use crate::extractor::{BillingPeriod, PeriodExtractor};
use crate::index::{slice_between, ReadingIndex};

// ── Public types ──────────────────────────────────────────────────────────────

/// Output of [`analyze_anomalies`].
#[derive(Debug, Clone, Serialize)]
pub struct AnomalyReport {
    /// Reference day the stale checks were measured against.
    pub today: NaiveDate,
    /// Meters that passed validation and were classified.
    pub meters_analyzed: usize,
    /// Records in meter input order; several per meter are possible.
    pub anomalies: Vec<AnomalyRecord>,
    pub failures: Vec<MeterFailure>,
}

/// Output of [`export_period`].
#[derive(Debug, Clone, Serialize)]
pub struct ExportReport {
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    /// Search window actually used for boundary readings.
    pub buffer_start: NaiveDate,
    pub buffer_end: NaiveDate,
    /// One row per meter, sorted by unit, type and meter id.
    pub per_unit: Vec<MeterConsumption>,
    pub summary_by_type: BTreeMap<MeterType, TypeSummary>,
    pub totals: ExportTotals,
    pub failures: Vec<MeterFailure>,
}

// ── Pipelines ─────────────────────────────────────────────────────────────────

/// Classify every meter against the anomaly thresholds.
///
/// A meter whose readings fail validation is listed in `failures` and does
/// not affect the others.
pub fn analyze_anomalies(
    meters: &[MeterInput],
    today: NaiveDate,
    config: &AnomalyConfig,
    prices: &PriceTable,
) -> AnomalyReport {
    let meters = unique_meters(meters);
    let index = ReadingIndex::from_meters(&meters);
    let analyzer = AnomalyAnalyzer::new(config.clone(), prices.clone());

    let mut anomalies = Vec::new();
    let mut failures = Vec::new();
    let mut analyzed = 0usize;

    for meter in &meters {
        if let Some(err) = index.rejection(&meter.id) {
            failures.push(MeterFailure::from(err));
            continue;
        }
        analyzed += 1;
        anomalies.extend(analyzer.analyze_meter(meter, index.series(&meter.id), today));
    }

    debug!(
        "analyze_anomalies: {} meters, {} anomalies, {} failures",
        analyzed,
        anomalies.len(),
        failures.len()
    );

    AnomalyReport {
        today,
        meters_analyzed: analyzed,
        anomalies,
        failures,
    }
}

/// Compute per-meter consumption, costs and shares for `[period_start, period_end]`.
///
/// Fails only when the period itself is invalid. Invalid meters end up in
/// `failures`; meters without usable readings still get a row with
/// `has_data = false`.
pub fn export_period(
    meters: &[MeterInput],
    period_start: NaiveDate,
    period_end: NaiveDate,
    config: &ExportConfig,
    prices: &PriceTable,
) -> Result<ExportReport> {
    let period = BillingPeriod::new(period_start, period_end)?;
    let (buffer_start, buffer_end) = period.buffered(config.buffer_months);

    let meters = unique_meters(meters);
    let index = ReadingIndex::from_meters(&meters);

    let mut rows = Vec::with_capacity(meters.len());
    let mut failures = Vec::new();

    // ── Step 1: Extract ───────────────────────────────────────────────────────
    for meter in &meters {
        if let Some(err) = index.rejection(&meter.id) {
            failures.push(MeterFailure::from(err));
            continue;
        }
        let window = slice_between(index.series(&meter.id), buffer_start, buffer_end);
        rows.push(MeterConsumption {
            meter_id: meter.id.clone(),
            meter_type: meter.meter_type,
            unit_label: meter.meter_type.unit_label(),
            unit_id: meter.unit_id.clone(),
            context: meter.context.clone(),
            result: PeriodExtractor::extract(window, &period),
        });
    }

    // ── Step 2: Costs and shares ──────────────────────────────────────────────
    CostAllocator::apply_costs(&mut rows, prices);
    CostAllocator::apply_shares(&mut rows);

    // ── Step 3: Aggregate ─────────────────────────────────────────────────────
    let summary_by_type = CostAllocator::summarize(&rows);
    let totals = CostAllocator::totals(&summary_by_type);

    rows.sort_by(|a, b| {
        a.unit_id
            .cmp(&b.unit_id)
            .then(a.meter_type.cmp(&b.meter_type))
            .then_with(|| a.meter_id.cmp(&b.meter_id))
    });

    debug!(
        "export_period {}..{}: {} rows, {} failures, total cost {:.2}",
        period_start,
        period_end,
        rows.len(),
        failures.len(),
        totals.total_cost
    );

    Ok(ExportReport {
        period_start,
        period_end,
        buffer_start,
        buffer_end,
        per_unit: rows,
        summary_by_type,
        totals,
        failures,
    })
}

// ── Internal helpers ──────────────────────────────────────────────────────────

/// Keep the first meter for each id; later duplicates are dropped.
fn unique_meters(meters: &[MeterInput]) -> Vec<MeterInput> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut unique = Vec::with_capacity(meters.len());
    for meter in meters {
        if seen.insert(meter.id.as_str()) {
            unique.push(meter.clone());
        } else {
            warn!("Ignoring duplicate meter id {}", meter.id);
        }
    }
    unique
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use meter_core::models::{
        AnomalyType, ConsumptionWarning, MeterContext, RawPoint, RawValue, Severity,
    };

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn meter(id: &str, meter_type: MeterType, points: &[(&str, f64)]) -> MeterInput {
        MeterInput {
            id: id.to_string(),
            meter_type,
            reading_interval_days: Some(30),
            unit_id: None,
            context: MeterContext::default(),
            readings: points
                .iter()
                .map(|(d, v)| RawPoint {
                    date: d.to_string(),
                    value: Some(RawValue::Number(*v)),
                })
                .collect(),
        }
    }

    fn in_unit(mut m: MeterInput, unit: &str) -> MeterInput {
        m.unit_id = Some(unit.to_string());
        m
    }

    fn anomalies(meters: &[MeterInput], today: NaiveDate) -> AnomalyReport {
        analyze_anomalies(meters, today, &AnomalyConfig::default(), &PriceTable::default())
    }

    fn export_2024(meters: &[MeterInput]) -> ExportReport {
        export_period(
            meters,
            date(2024, 1, 1),
            date(2024, 12, 31),
            &ExportConfig::default(),
            &PriceTable::default(),
        )
        .unwrap()
    }

    // ── analyze_anomalies ────────────────────────────────────────────────────

    #[test]
    fn test_scenario_a_spike_critical() {
        let m = meter(
            "el-1",
            MeterType::Electricity,
            &[("2024-01-01", 100.0), ("2024-02-01", 130.0), ("2024-03-01", 250.0)],
        );
        let report = anomalies(&[m], date(2024, 3, 10));
        assert_eq!(report.meters_analyzed, 1);
        assert_eq!(report.anomalies.len(), 1);
        assert_eq!(report.anomalies[0].anomaly_type, AnomalyType::Spike);
        assert_eq!(report.anomalies[0].severity, Severity::Critical);
    }

    #[test]
    fn test_scenario_b_stale_critical() {
        let m = meter("gas-1", MeterType::Gas, &[("2024-01-01", 10.0)]);
        let report = anomalies(&[m], date(2024, 4, 15));
        assert_eq!(report.anomalies.len(), 1);
        let record = &report.anomalies[0];
        assert_eq!(record.anomaly_type, AnomalyType::Stale);
        assert_eq!(record.severity, Severity::Critical);
        assert!(record.details.contains("105 Tagen"));
    }

    #[test]
    fn test_no_readings_in_window_yields_single_record() {
        let old = meter(
            "w-1",
            MeterType::WaterCold,
            &[("2021-01-01", 1.0), ("2021-02-01", 2.0), ("2021-03-01", 90.0)],
        );
        let empty = meter("w-2", MeterType::WaterHot, &[]);
        let report = anomalies(&[old, empty], date(2024, 6, 1));

        assert_eq!(report.anomalies.len(), 2);
        for record in &report.anomalies {
            assert_eq!(record.anomaly_type, AnomalyType::Stale);
            assert_eq!(record.severity, Severity::Critical);
        }
        assert_eq!(report.anomalies[0].meter_id, "w-1");
        assert_eq!(report.anomalies[1].meter_id, "w-2");
    }

    #[test]
    fn test_invalid_meter_is_isolated() {
        let good = meter("ok", MeterType::Gas, &[("2024-01-01", 10.0)]);
        let bad = meter("bad", MeterType::Gas, &[("01.02.2024", 10.0)]);
        let report = anomalies(&[bad, good], date(2024, 4, 15));

        assert_eq!(report.meters_analyzed, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].meter_id, "bad");
        assert!(report.anomalies.iter().all(|a| a.meter_id == "ok"));
    }

    #[test]
    fn test_duplicate_meter_ids_keep_first() {
        let first = meter("m", MeterType::Gas, &[("2024-04-01", 10.0)]);
        let second = meter("m", MeterType::Gas, &[("2020-01-01", 1.0)]);
        let report = anomalies(&[first, second], date(2024, 4, 15));
        assert_eq!(report.meters_analyzed, 1);
        assert!(report.anomalies.is_empty());
    }

    #[test]
    fn test_anomaly_report_is_idempotent() {
        let meters = vec![
            meter(
                "el-1",
                MeterType::Electricity,
                &[("2024-01-01", 100.0), ("2024-02-01", 130.0), ("2024-03-01", 250.0)],
            ),
            meter("gas-1", MeterType::Gas, &[("2023-12-01", 5.0)]),
        ];
        let a = serde_json::to_string(&anomalies(&meters, date(2024, 4, 15))).unwrap();
        let b = serde_json::to_string(&anomalies(&meters, date(2024, 4, 15))).unwrap();
        assert_eq!(a, b);
    }

    // ── export_period ────────────────────────────────────────────────────────

    #[test]
    fn test_scenario_c_consumption() {
        let m = meter(
            "el-1",
            MeterType::Electricity,
            &[("2023-11-15", 500.0), ("2024-06-10", 900.0)],
        );
        let report = export_2024(&[m]);
        let row = &report.per_unit[0];
        assert_eq!(row.result.consumption, Some(400.0));
        assert!(row.result.has_data);
        assert_eq!(row.result.warning, None);
        assert_eq!(row.result.estimated_cost, Some(128.0));
        assert_eq!(row.result.share_percent, 100.0);
    }

    #[test]
    fn test_scenario_d_single_reading() {
        let m = meter("gas-1", MeterType::Gas, &[("2024-05-01", 42.0)]);
        let report = export_2024(&[m]);
        let row = &report.per_unit[0];
        assert!(!row.result.has_data);
        assert_eq!(row.result.consumption, None);
        assert_eq!(row.result.warning, Some(ConsumptionWarning::SingleReading));

        let json = serde_json::to_value(row).unwrap();
        assert_eq!(json["warning"], "Nur eine Ablesung");
        assert!(json["consumption"].is_null());
    }

    #[test]
    fn test_readings_outside_buffer_are_ignored() {
        // 2023-09-01 lies before the 3-month buffer starting 2023-10-01.
        let m = meter(
            "gas-1",
            MeterType::Gas,
            &[("2023-09-01", 0.0), ("2024-12-01", 500.0)],
        );
        let report = export_2024(&[m]);
        assert_eq!(report.buffer_start, date(2023, 10, 1));
        assert_eq!(report.buffer_end, date(2025, 3, 31));
        let row = &report.per_unit[0];
        assert!(!row.result.has_data);
        assert_eq!(row.result.start_date, Some(date(2024, 12, 1)));
    }

    #[test]
    fn test_shares_and_summary() {
        let meters = vec![
            in_unit(
                meter("el-b", MeterType::Electricity, &[("2024-01-01", 0.0), ("2024-12-31", 300.0)]),
                "unit-2",
            ),
            in_unit(
                meter("el-a", MeterType::Electricity, &[("2024-01-01", 0.0), ("2024-12-31", 100.0)]),
                "unit-1",
            ),
            in_unit(meter("pv-1", MeterType::PvProduction, &[("2024-01-01", 0.0), ("2024-12-31", 800.0)]), "unit-1"),
            in_unit(meter("el-c", MeterType::Electricity, &[]), "unit-1"),
        ];
        let report = export_2024(&meters);

        let ids: Vec<&str> = report.per_unit.iter().map(|r| r.meter_id.as_str()).collect();
        assert_eq!(ids, vec!["el-a", "el-c", "pv-1", "el-b"]);

        let share_sum: f64 = report
            .per_unit
            .iter()
            .filter(|r| r.meter_type == MeterType::Electricity)
            .map(|r| r.result.share_percent)
            .sum();
        assert!(share_sum <= 100.0 + 1e-9);
        assert_eq!(report.per_unit[0].result.share_percent, 25.0);

        let pv = &report.per_unit[2];
        assert_eq!(pv.result.estimated_cost, None);
        assert_eq!(pv.unit_label, "kWh");

        let el = &report.summary_by_type[&MeterType::Electricity];
        assert_eq!(el.meter_count, 3);
        assert_eq!(el.meters_with_data, 2);
        assert_eq!(el.total_consumption, 400.0);
        assert_eq!(el.total_cost, 128.0);

        assert_eq!(report.totals.meter_count, 4);
        assert_eq!(report.totals.meters_with_data, 3);
        assert_eq!(report.totals.total_cost, 128.0);
    }

    #[test]
    fn test_export_partial_failure() {
        let meters = vec![
            meter("ok", MeterType::Gas, &[("2024-01-01", 0.0), ("2024-12-01", 100.0)]),
            meter("bad", MeterType::Gas, &[("2024-01-01", f64::NAN)]),
        ];
        let report = export_2024(&meters);
        assert_eq!(report.per_unit.len(), 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].meter_id, "bad");
        assert_eq!(report.totals.total_cost, 12.0);
    }

    #[test]
    fn test_export_odd_json_shapes_fail_per_meter() {
        let text = r#"[
            { "id": "ok", "type": "gas",
              "readings": [{ "date": "2024-01-01", "value": 0 }, { "date": "2024-12-01", "value": "100" }] },
            { "id": "flag", "type": "gas", "readings": [{ "date": "2024-01-01", "value": true }] },
            { "id": "obj", "type": "gas", "readings": [{ "date": "2024-01-01", "value": {} }] },
            { "id": "num-date", "type": "gas", "readings": [{ "date": 20240101, "value": 5 }] }
        ]"#;
        let meters = crate::reader::parse_snapshot(text).unwrap();
        let report = export_2024(&meters);

        assert_eq!(report.per_unit.len(), 1);
        assert_eq!(report.per_unit[0].meter_id, "ok");
        assert_eq!(report.totals.total_cost, 12.0);
        let failed: Vec<&str> = report.failures.iter().map(|f| f.meter_id.as_str()).collect();
        assert_eq!(failed, vec!["flag", "obj", "num-date"]);
        assert!(report.failures[0].error.contains("Invalid reading value"));
        assert!(report.failures[2].error.contains("Invalid reading date"));
    }

    #[test]
    fn test_export_rejects_reversed_period() {
        let result = export_period(
            &[],
            date(2024, 12, 31),
            date(2024, 1, 1),
            &ExportConfig::default(),
            &PriceTable::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_export_is_idempotent() {
        let meters = vec![
            meter("el-1", MeterType::Electricity, &[("2023-11-15", 500.0), ("2024-06-10", 900.0)]),
            meter("oil-1", MeterType::Oil, &[("2024-02-01", 3000.0), ("2024-11-01", 1200.0)]),
        ];
        let a = serde_json::to_string(&export_2024(&meters)).unwrap();
        let b = serde_json::to_string(&export_2024(&meters)).unwrap();
        assert_eq!(a, b);
    }
}
