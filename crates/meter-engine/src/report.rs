//! Rendering of pipeline reports as text tables and CSV.

use std::io::Write;

use meter_core::formatting::{format_currency, format_percent, format_quantity};
use meter_core::models::MeterFailure;
use meter_data::analysis::{AnomalyReport, ExportReport};
use serde::Serialize;
use unicode_width::UnicodeWidthStr;

// ── Anomaly output ─────────────────────────────────────────────────────────────

/// Result of one snapshot file in the `anomalies` command.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotAnomalies {
    pub source: String,
    /// Set when the file could not be loaded at all.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub report: Option<AnomalyReport>,
}

impl SnapshotAnomalies {
    pub fn analyzed(source: String, report: AnomalyReport) -> Self {
        Self {
            source,
            error: None,
            report: Some(report),
        }
    }

    pub fn failed(source: String, error: String) -> Self {
        Self {
            source,
            error: Some(error),
            report: None,
        }
    }
}

/// Render all anomalies of all snapshots as one table.
pub fn render_anomaly_table(results: &[SnapshotAnomalies]) -> String {
    let mut table = TextTable::new(&["Quelle", "Zähler", "Typ", "Art", "Stufe", "Details"]);
    let mut failures: Vec<(String, String)> = Vec::new();

    for result in results {
        if let Some(error) = &result.error {
            failures.push((result.source.clone(), error.clone()));
        }
        let Some(report) = &result.report else {
            continue;
        };
        for record in &report.anomalies {
            table.push(vec![
                result.source.clone(),
                record.meter_id.clone(),
                record.meter_type.to_string(),
                record.anomaly_type.to_string(),
                record.severity.to_string(),
                record.details.clone(),
            ]);
        }
        failures.extend(
            report
                .failures
                .iter()
                .map(|f| (result.source.clone(), failure_text(f))),
        );
    }

    let mut out = if table.is_empty() {
        "Keine Auffälligkeiten gefunden.\n".to_string()
    } else {
        table.render()
    };
    append_failures(&mut out, &failures);
    out
}

// ── Export output ──────────────────────────────────────────────────────────────

/// Render an export report as a per-meter table followed by the type summary.
pub fn render_export_table(report: &ExportReport) -> String {
    let mut out = format!(
        "Abrechnungszeitraum {} bis {}\n\n",
        report.period_start.format("%d.%m.%Y"),
        report.period_end.format("%d.%m.%Y")
    );

    let mut meters = TextTable::new(&[
        "Einheit", "Zähler", "Typ", "Start", "Ende", "Verbrauch", "Anteil", "Kosten", "Hinweis",
    ]);
    for row in &report.per_unit {
        let r = &row.result;
        meters.push(vec![
            row.context
                .unit_name
                .clone()
                .or_else(|| row.unit_id.clone())
                .unwrap_or_else(|| "–".to_string()),
            row.context
                .meter_number
                .clone()
                .unwrap_or_else(|| row.meter_id.clone()),
            row.meter_type.to_string(),
            r.start_date
                .map(|d| d.format("%d.%m.%Y").to_string())
                .unwrap_or_else(|| "–".to_string()),
            r.end_date
                .map(|d| d.format("%d.%m.%Y").to_string())
                .unwrap_or_else(|| "–".to_string()),
            format_quantity(r.consumption, row.unit_label),
            format_percent(r.share_percent),
            r.estimated_cost
                .map(format_currency)
                .unwrap_or_else(|| "–".to_string()),
            r.warning.map(|w| w.label().to_string()).unwrap_or_default(),
        ]);
    }
    out.push_str(&meters.render());
    out.push('\n');

    let mut summary = TextTable::new(&["Typ", "Verbrauch", "Kosten", "Zähler", "mit Daten"]);
    for entry in report.summary_by_type.values() {
        summary.push(vec![
            entry.meter_type.to_string(),
            format_quantity(Some(entry.total_consumption), entry.unit_label),
            format_currency(entry.total_cost),
            entry.meter_count.to_string(),
            entry.meters_with_data.to_string(),
        ]);
    }
    out.push_str(&summary.render());
    out.push_str(&format!(
        "\nGesamtkosten: {} ({} von {} Zählern mit Daten)\n",
        format_currency(report.totals.total_cost),
        report.totals.meters_with_data,
        report.totals.meter_count
    ));

    let failures: Vec<(String, String)> = report
        .failures
        .iter()
        .map(|f| (f.meter_id.clone(), f.error.clone()))
        .collect();
    append_failures(&mut out, &failures);
    out
}

const CSV_HEADER: [&str; 15] = [
    "row",
    "unit_id",
    "unit_name",
    "meter_id",
    "meter_number",
    "meter_type",
    "unit_label",
    "start_date",
    "start_value",
    "end_date",
    "end_value",
    "consumption",
    "share_percent",
    "estimated_cost",
    "warning",
];

/// Write an export report as CSV: one `meter` row per meter, one `summary`
/// row per type and a final `total` row.
///
/// Numbers use a decimal point so the file stays machine readable.
pub fn write_export_csv<W: Write>(report: &ExportReport, writer: W) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(CSV_HEADER)?;

    for row in &report.per_unit {
        let r = &row.result;
        wtr.write_record([
            "meter".to_string(),
            row.unit_id.clone().unwrap_or_default(),
            row.context.unit_name.clone().unwrap_or_default(),
            row.meter_id.clone(),
            row.context.meter_number.clone().unwrap_or_default(),
            row.meter_type.to_string(),
            row.unit_label.to_string(),
            opt(r.start_date),
            opt(r.start_value),
            opt(r.end_date),
            opt(r.end_value),
            opt(r.consumption),
            r.share_percent.to_string(),
            opt(r.estimated_cost),
            r.warning.map(|w| w.label().to_string()).unwrap_or_default(),
        ])?;
    }

    for entry in report.summary_by_type.values() {
        let mut record = vec![String::new(); CSV_HEADER.len()];
        record[0] = "summary".to_string();
        record[5] = entry.meter_type.to_string();
        record[6] = entry.unit_label.to_string();
        record[11] = entry.total_consumption.to_string();
        record[13] = entry.total_cost.to_string();
        wtr.write_record(&record)?;
    }

    let mut total = vec![String::new(); CSV_HEADER.len()];
    total[0] = "total".to_string();
    total[13] = report.totals.total_cost.to_string();
    wtr.write_record(&total)?;

    wtr.flush()?;
    Ok(())
}

// ── Helpers ────────────────────────────────────────────────────────────────────

fn opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn failure_text(failure: &MeterFailure) -> String {
    format!("{}: {}", failure.meter_id, failure.error)
}

fn append_failures(out: &mut String, failures: &[(String, String)]) {
    if failures.is_empty() {
        return;
    }
    out.push_str(&format!("\nÜbersprungen ({}):\n", failures.len()));
    for (source, error) in failures {
        out.push_str(&format!("  {} – {}\n", source, error));
    }
}

/// Left-aligned plain-text table sized by display width.
struct TextTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl TextTable {
    fn new(headers: &[&str]) -> Self {
        Self {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    fn push(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn render(&self) -> String {
        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.width()).collect();
        for row in &self.rows {
            for (i, cell) in row.iter().enumerate() {
                if let Some(w) = widths.get_mut(i) {
                    *w = (*w).max(cell.width());
                }
            }
        }

        let mut out = String::new();
        Self::render_line(&mut out, &self.headers, &widths);
        let rule: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
        Self::render_line(&mut out, &rule, &widths);
        for row in &self.rows {
            Self::render_line(&mut out, row, &widths);
        }
        out
    }

    fn render_line(out: &mut String, cells: &[String], widths: &[usize]) {
        let mut line = String::new();
        for (i, cell) in cells.iter().enumerate() {
            if i > 0 {
                line.push_str("  ");
            }
            line.push_str(cell);
            let pad = widths.get(i).copied().unwrap_or(0).saturating_sub(cell.width());
            line.push_str(&" ".repeat(pad));
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
