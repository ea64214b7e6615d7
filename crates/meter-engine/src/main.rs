mod bootstrap;
mod report;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use meter_core::error::EngineError;
use meter_core::models::MeterInput;
use meter_core::settings::{resolve_period, Command, EngineConfig, Settings};
use meter_data::analysis::{analyze_anomalies, export_period, ExportReport};
use meter_data::reader::{load_snapshot, parse_snapshot};

use crate::report::SnapshotAnomalies;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load();

    bootstrap::setup_logging(&settings.log_level)?;

    tracing::info!("meter-engine v{} starting", env!("CARGO_PKG_VERSION"));

    let config_path = settings.config_path();
    let config = EngineConfig::load_validated(&config_path)
        .with_context(|| format!("invalid configuration in {}", config_path.display()))?;
    for (meter_type, price) in config.price_table().iter() {
        tracing::debug!("price {} = {} EUR/{}", meter_type, price, meter_type.unit_label());
    }

    match settings.command.clone() {
        Command::Anomalies {
            inputs,
            today,
            format,
        } => {
            let today = today.unwrap_or_else(|| settings.today());
            tracing::info!("Checking anomalies as of {} ({})", today, settings.timezone);

            let results = run_anomalies(&inputs, today, &config).await?;
            print!("{}", render_anomalies(&results, &format)?);
        }

        Command::Export {
            input,
            year,
            from,
            to,
            format,
            output,
        } => {
            let (start, end) = resolve_period(year, from, to, settings.today())?;
            tracing::info!("Exporting {} for {} to {}", input.display(), start, end);

            let report = run_export(input, start, end, &config).await?;
            let bytes = render_export(&report, &format)?;
            match output {
                Some(path) => {
                    tokio::fs::write(&path, &bytes)
                        .await
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    tracing::info!("Wrote export to {}", path.display());
                }
                None => print!("{}", String::from_utf8_lossy(&bytes)),
            }
        }

        Command::Config { save } => {
            print!("{}", run_config(&config, &config_path, save)?);
        }
    }

    Ok(())
}

// ── Commands ───────────────────────────────────────────────────────────────────

/// Analyze every snapshot concurrently; results keep the input order.
async fn run_anomalies(
    inputs: &[PathBuf],
    today: NaiveDate,
    config: &EngineConfig,
) -> Result<Vec<SnapshotAnomalies>> {
    let paths = bootstrap::collect_snapshot_paths(inputs);
    if paths.is_empty() {
        anyhow::bail!("no snapshot files found");
    }

    let prices = config.price_table();
    let mut handles = Vec::with_capacity(paths.len());

    for path in paths {
        let anomaly_config = config.anomaly.clone();
        let prices = prices.clone();
        handles.push(tokio::spawn(async move {
            let source = bootstrap::source_label(&path);
            let meters = match read_snapshot(&path).await {
                Ok(meters) => meters,
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", source, e);
                    return SnapshotAnomalies::failed(source, e.to_string());
                }
            };
            let analysis = tokio::task::spawn_blocking(move || {
                analyze_anomalies(&meters, today, &anomaly_config, &prices)
            })
            .await;
            match analysis {
                Ok(report) => SnapshotAnomalies::analyzed(source, report),
                Err(e) => SnapshotAnomalies::failed(source, e.to_string()),
            }
        }));
    }

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(handle.await?);
    }
    Ok(results)
}

/// Load one building snapshot and export the period off the async runtime.
async fn run_export(
    input: PathBuf,
    start: NaiveDate,
    end: NaiveDate,
    config: &EngineConfig,
) -> Result<ExportReport> {
    let export_config = config.export.clone();
    let prices = config.price_table();
    let report = tokio::task::spawn_blocking(move || {
        let meters = load_snapshot(&input)?;
        export_period(&meters, start, end, &export_config, &prices)
    })
    .await??;
    Ok(report)
}

/// Render the effective configuration, persisting it first with `save`.
fn run_config(config: &EngineConfig, path: &Path, save: bool) -> Result<String> {
    if save {
        config
            .save_to(path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        tracing::info!("Saved configuration to {}", path.display());
    }
    Ok(serde_json::to_string_pretty(config)? + "\n")
}

async fn read_snapshot(path: &Path) -> meter_core::error::Result<Vec<MeterInput>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| EngineError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
    parse_snapshot(&text)
}

// ── Rendering ──────────────────────────────────────────────────────────────────

fn render_anomalies(results: &[SnapshotAnomalies], format: &str) -> Result<String> {
    match format {
        "table" => Ok(report::render_anomaly_table(results)),
        _ => Ok(serde_json::to_string_pretty(results)? + "\n"),
    }
}

fn render_export(report: &ExportReport, format: &str) -> Result<Vec<u8>> {
    match format {
        "csv" => {
            let mut buf = Vec::new();
            report::write_export_csv(report, &mut buf)?;
            Ok(buf)
        }
        "table" => Ok(report::render_export_table(report).into_bytes()),
        _ => Ok((serde_json::to_string_pretty(report)? + "\n").into_bytes()),
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
