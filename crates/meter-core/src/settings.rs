//! Command-line settings and the persisted engine configuration.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::{EngineError, Result};
use crate::models::{MeterType, DEFAULT_READING_INTERVAL_DAYS};
use crate::pricing::PriceTable;
use crate::time_utils;

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Consumption analysis for utility meter readings
#[derive(Parser, Debug, Clone)]
#[command(
    name = "meter-engine",
    about = "Consumption analysis for utility meter readings",
    version
)]
pub struct Settings {
    #[command(subcommand)]
    pub command: Command,

    /// Engine configuration file (defaults to ~/.meter-engine/config.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Timezone used to determine "today" (auto-detected if not specified)
    #[arg(long, global = true, default_value = "auto")]
    pub timezone: String,

    /// Logging level
    #[arg(long, global = true, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"])]
    pub log_level: String,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

/// Pipeline to run.
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Flag consumption spikes, drops and stale meters
    Anomalies {
        /// Snapshot files or directories containing them
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Reference day for staleness checks (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        today: Option<NaiveDate>,

        /// Output format
        #[arg(long, default_value = "json", value_parser = ["json", "table"])]
        format: String,
    },

    /// Compute period consumption and cost per meter for one building
    Export {
        /// Snapshot file of a single building
        input: PathBuf,

        /// Calendar year to export (defaults to the previous year)
        #[arg(long, conflicts_with_all = ["from", "to"])]
        year: Option<i32>,

        /// First day of the period (YYYY-MM-DD)
        #[arg(long, requires = "to")]
        from: Option<NaiveDate>,

        /// Last day of the period (YYYY-MM-DD)
        #[arg(long, requires = "from")]
        to: Option<NaiveDate>,

        /// Output format
        #[arg(long, default_value = "json", value_parser = ["json", "csv", "table"])]
        format: String,

        /// Write the export here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Print the effective engine configuration
    Config {
        /// Also write it to the config file, creating the file if absent
        #[arg(long)]
        save: bool,
    },
}

impl Settings {
    /// Parse CLI arguments and resolve `"auto"` values.
    pub fn load() -> Self {
        Self::load_from_args(std::env::args_os().collect())
    }

    /// Same as [`Settings::load`] but accepts an explicit argument list.
    pub fn load_from_args(args: Vec<std::ffi::OsString>) -> Self {
        Self::resolve_auto_values(Settings::parse_from(args))
    }

    /// Resolve the `"auto"` timezone and apply the `--debug` flag.
    fn resolve_auto_values(mut settings: Settings) -> Settings {
        if settings.timezone == "auto" {
            settings.timezone = time_utils::get_system_timezone();
        }
        if settings.debug {
            settings.log_level = "DEBUG".to_string();
        }
        settings
    }

    /// Path of the engine configuration file to load.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(EngineConfig::config_path)
    }

    /// The current day in the configured timezone.
    pub fn today(&self) -> NaiveDate {
        time_utils::today_in(time_utils::resolve_timezone(&self.timezone))
    }
}

/// Resolve the export period from `--year` / `--from` / `--to`.
///
/// Without any of them the previous calendar year relative to `today` is
/// used.
pub fn resolve_period(
    year: Option<i32>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    today: NaiveDate,
) -> Result<(NaiveDate, NaiveDate)> {
    let (start, end) = match (year, from, to) {
        (Some(year), _, _) => time_utils::year_bounds(year)
            .ok_or_else(|| EngineError::InvalidPeriod(format!("year {} out of range", year)))?,
        (None, Some(from), Some(to)) => (from, to),
        (None, None, None) => {
            let year = time_utils::previous_year(today);
            time_utils::year_bounds(year)
                .ok_or_else(|| EngineError::InvalidPeriod(format!("year {} out of range", year)))?
        }
        _ => {
            return Err(EngineError::InvalidPeriod(
                "--from and --to must be given together".to_string(),
            ))
        }
    };
    if start > end {
        return Err(EngineError::InvalidPeriod(format!(
            "period start {} is after period end {}",
            start, end
        )));
    }
    Ok((start, end))
}

// ── AnomalyConfig ──────────────────────────────────────────────────────────────

/// Thresholds for the anomaly classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    /// Only readings this many months before "today" are considered.
    pub lookback_months: u32,
    /// Cadence used for meters without their own `reading_interval_days`.
    pub default_interval_days: u32,
    /// A meter is stale after `stale_factor × interval` days without a reading.
    pub stale_factor: f64,
    /// ... and critically stale after `stale_critical_factor × interval`.
    pub stale_critical_factor: f64,
    /// Latest/average rate ratio above which a spike is reported.
    pub spike_ratio: f64,
    /// Ratio above which a spike is critical.
    pub spike_critical_ratio: f64,
    /// Ratio below which a drop is reported.
    pub drop_ratio: f64,
    /// Drops are ignored for meters whose average daily rate is this low.
    pub drop_min_average: f64,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            lookback_months: 12,
            default_interval_days: DEFAULT_READING_INTERVAL_DAYS,
            stale_factor: 2.0,
            stale_critical_factor: 3.0,
            spike_ratio: 1.5,
            spike_critical_ratio: 2.0,
            drop_ratio: 0.3,
            drop_min_average: 0.1,
        }
    }
}

impl AnomalyConfig {
    /// Reject threshold combinations that cannot classify anything sensibly.
    pub fn validate(&self) -> Result<()> {
        if self.lookback_months == 0 {
            return Err(EngineError::Config("lookback_months must be at least 1".into()));
        }
        if self.default_interval_days == 0 {
            return Err(EngineError::Config(
                "default_interval_days must be at least 1".into(),
            ));
        }
        if self.stale_factor <= 0.0 || self.stale_critical_factor < self.stale_factor {
            return Err(EngineError::Config(
                "stale factors must be positive and critical >= warning".into(),
            ));
        }
        if self.spike_ratio <= 1.0 || self.spike_critical_ratio < self.spike_ratio {
            return Err(EngineError::Config(
                "spike_ratio must exceed 1.0 and spike_critical_ratio >= spike_ratio".into(),
            ));
        }
        if self.drop_ratio <= 0.0 || self.drop_ratio >= 1.0 {
            return Err(EngineError::Config("drop_ratio must be in (0, 1)".into()));
        }
        Ok(())
    }
}

// ── ExportConfig ───────────────────────────────────────────────────────────────

/// Settings for the period export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Months searched beyond each period edge for boundary readings.
    pub buffer_months: u32,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self { buffer_months: 3 }
    }
}

// ── EngineConfig ───────────────────────────────────────────────────────────────

/// Engine configuration persisted at `~/.meter-engine/config.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub anomaly: AnomalyConfig,
    pub export: ExportConfig,
    /// Per-type price overrides (EUR per unit).
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub prices: BTreeMap<MeterType, f64>,
}

impl EngineConfig {
    /// Return the default path to the config file.
    pub fn config_path() -> PathBuf {
        Self::config_path_in(&dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
    }

    /// Return the config path rooted at `base_dir` (used for testing).
    pub fn config_path_in(base_dir: &Path) -> PathBuf {
        base_dir.join(".meter-engine").join("config.json")
    }

    /// Load the config from an explicit path.
    ///
    /// Returns `Default` when the file is absent; an unparsable file is
    /// logged and also falls back to the defaults.
    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        serde_json::from_str(&content).unwrap_or_else(|err| {
            warn!("ignoring unparsable config {}: {}", path.display(), err);
            Self::default()
        })
    }

    /// Load and validate; invalid thresholds are an error rather than a
    /// silent fallback.
    pub fn load_validated(path: &Path) -> Result<Self> {
        let config = Self::load_from(path);
        config.anomaly.validate()?;
        if let Some((meter_type, price)) = config.prices.iter().find(|(_, p)| **p < 0.0) {
            return Err(EngineError::Config(format!(
                "price for {} must not be negative (got {})",
                meter_type, price
            )));
        }
        Ok(config)
    }

    /// Atomically write the config to an explicit path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self)?;

        // Write to a temp file then rename for atomicity.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, path)?;

        Ok(())
    }

    /// Price table with this config's overrides applied.
    pub fn price_table(&self) -> PriceTable {
        PriceTable::new(Some(&self.prices))
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
