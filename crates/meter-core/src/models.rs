//! Input and output records shared by the pipelines.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::error::ValidationError;
use crate::time_utils::parse_reading_date;

/// Expected reading cadence when a meter does not specify one.
pub const DEFAULT_READING_INTERVAL_DAYS: u32 = 30;

// ── MeterType ─────────────────────────────────────────────────────────────────

/// Consumption category of a meter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeterType {
    Electricity,
    Gas,
    WaterCold,
    WaterHot,
    Heating,
    DistrictHeating,
    Oil,
    Pellets,
    PvProduction,
    PvFeedIn,
    PvSelfConsumption,
    /// Any type string this engine does not know about.
    #[serde(other)]
    Other,
}

impl MeterType {
    /// The wire name, e.g. `"water_cold"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            MeterType::Electricity => "electricity",
            MeterType::Gas => "gas",
            MeterType::WaterCold => "water_cold",
            MeterType::WaterHot => "water_hot",
            MeterType::Heating => "heating",
            MeterType::DistrictHeating => "district_heating",
            MeterType::Oil => "oil",
            MeterType::Pellets => "pellets",
            MeterType::PvProduction => "pv_production",
            MeterType::PvFeedIn => "pv_feed_in",
            MeterType::PvSelfConsumption => "pv_self_consumption",
            MeterType::Other => "other",
        }
    }

    /// Physical unit the cumulative value is recorded in.
    pub fn unit_label(&self) -> &'static str {
        match self {
            MeterType::Electricity
            | MeterType::Heating
            | MeterType::DistrictHeating
            | MeterType::PvProduction
            | MeterType::PvFeedIn
            | MeterType::PvSelfConsumption => "kWh",
            MeterType::Gas | MeterType::WaterCold | MeterType::WaterHot => "m³",
            MeterType::Oil => "Liter",
            MeterType::Pellets => "kg",
            MeterType::Other => "",
        }
    }

    /// Whether the meter counts photovoltaic energy rather than consumption.
    pub fn is_pv(&self) -> bool {
        matches!(
            self,
            MeterType::PvProduction | MeterType::PvFeedIn | MeterType::PvSelfConsumption
        )
    }
}

impl fmt::Display for MeterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Raw input ─────────────────────────────────────────────────────────────────

/// A reading value as delivered by the data layer.
///
/// Database numerics frequently arrive as strings, so both shapes are
/// accepted and validated later by [`RawValue::to_f64`]. Any other JSON
/// shape is kept as-is so it fails validation for its own meter instead of
/// failing the whole document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Number(f64),
    Text(String),
    Other(serde_json::Value),
}

impl RawValue {
    /// Interpret the value as a finite number.
    ///
    /// Strings are trimmed and may use either a decimal comma (`"1234,5"`)
    /// or a decimal point (`"1234.5"`). Grouped forms mixing both
    /// separators (`"1.234,5"`) are rejected.
    pub fn to_f64(&self) -> Option<f64> {
        let value = match self {
            RawValue::Number(n) => *n,
            RawValue::Text(s) => parse_decimal(s)?,
            RawValue::Other(_) => return None,
        };
        value.is_finite().then_some(value)
    }
}

fn parse_decimal(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.contains('.') && text.contains(',') {
        return None;
    }
    text.replace(',', ".").parse::<f64>().ok()
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Number(n) => write!(f, "{}", n),
            RawValue::Text(s) => f.write_str(s),
            RawValue::Other(v) => write!(f, "{}", v),
        }
    }
}

/// Accept any JSON shape as a date. Non-strings keep their JSON text and
/// are rejected by [`RawPoint::parse`].
fn lenient_date<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    })
}

/// One unvalidated `{date, value}` pair nested under its meter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPoint {
    #[serde(default, deserialize_with = "lenient_date")]
    pub date: String,
    #[serde(default)]
    pub value: Option<RawValue>,
}

impl RawPoint {
    /// Validate this point into a [`Reading`] owned by `meter_id`.
    pub fn parse(&self, meter_id: &str) -> Result<Reading, ValidationError> {
        let date = parse_reading_date(&self.date).ok_or_else(|| ValidationError::InvalidDate {
            meter_id: meter_id.to_string(),
            value: self.date.clone(),
        })?;
        let raw = self
            .value
            .as_ref()
            .ok_or_else(|| ValidationError::MissingValue {
                meter_id: meter_id.to_string(),
                date: self.date.clone(),
            })?;
        let value = raw.to_f64().ok_or_else(|| ValidationError::InvalidValue {
            meter_id: meter_id.to_string(),
            value: raw.to_string(),
        })?;
        Ok(Reading { date, value })
    }
}

/// A flat, unvalidated reading record carrying its own meter id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReading {
    pub meter_id: String,
    #[serde(default, deserialize_with = "lenient_date")]
    pub date: String,
    #[serde(default)]
    pub value: Option<RawValue>,
}

impl RawReading {
    /// The nested form of this record, without its meter id.
    pub fn to_point(&self) -> RawPoint {
        RawPoint {
            date: self.date.clone(),
            value: self.value.clone(),
        }
    }
}

// ── Reading ───────────────────────────────────────────────────────────────────

/// A validated cumulative meter value on a calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub date: NaiveDate,
    pub value: f64,
}

impl Reading {
    pub fn new(date: NaiveDate, value: f64) -> Self {
        Self { date, value }
    }
}

// ── Meter ─────────────────────────────────────────────────────────────────────

/// Identifying metadata joined by the caller (meter → unit → building).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeterContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub building_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub building_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meter_number: Option<String>,
}

/// A meter together with its already-fetched readings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeterInput {
    pub id: String,
    #[serde(rename = "type")]
    pub meter_type: MeterType,
    /// Expected cadence; `None` falls back to the configured default.
    #[serde(default)]
    pub reading_interval_days: Option<u32>,
    #[serde(default)]
    pub unit_id: Option<String>,
    #[serde(flatten)]
    pub context: MeterContext,
    #[serde(default)]
    pub readings: Vec<RawPoint>,
}

// ── ConsumptionResult ─────────────────────────────────────────────────────────

/// Data-quality note attached to a period consumption figure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumptionWarning {
    /// No reading could serve as the period start.
    NoStartReading,
    /// No reading exists on or before the period end.
    NoEndReading,
    /// Start and end resolved to the same reading.
    SingleReading,
    /// The cumulative value went down; consumption was clamped to zero.
    PossibleRollover,
}

impl ConsumptionWarning {
    /// The user-facing label.
    pub fn label(&self) -> &'static str {
        match self {
            ConsumptionWarning::NoStartReading => "Kein Startwert",
            ConsumptionWarning::NoEndReading => "Kein Endwert",
            ConsumptionWarning::SingleReading => "Nur eine Ablesung",
            ConsumptionWarning::PossibleRollover => "Möglicher Zählerwechsel",
        }
    }
}

impl fmt::Display for ConsumptionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for ConsumptionWarning {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// Consumption of one meter over one period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsumptionResult {
    pub start_date: Option<NaiveDate>,
    pub start_value: Option<f64>,
    pub end_date: Option<NaiveDate>,
    pub end_value: Option<f64>,
    /// Non-negative delta, `None` without two distinct boundary readings.
    pub consumption: Option<f64>,
    pub has_data: bool,
    pub warning: Option<ConsumptionWarning>,
    /// Share of this meter's type total within the building, two decimals.
    pub share_percent: f64,
    /// Consumption priced with the static table, two decimals.
    pub estimated_cost: Option<f64>,
}

/// One export row: a meter's identity plus its period consumption.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeterConsumption {
    pub meter_id: String,
    pub meter_type: MeterType,
    pub unit_label: &'static str,
    pub unit_id: Option<String>,
    #[serde(flatten)]
    pub context: MeterContext,
    #[serde(flatten)]
    pub result: ConsumptionResult,
}

// ── AnomalyRecord ─────────────────────────────────────────────────────────────

/// Kind of irregularity detected for a meter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalyType {
    Spike,
    Drop,
    Stale,
}

impl fmt::Display for AnomalyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AnomalyType::Spike => "spike",
            AnomalyType::Drop => "drop",
            AnomalyType::Stale => "stale",
        })
    }
}

/// How urgently an anomaly needs attention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        })
    }
}

/// A single flagged condition for one meter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyRecord {
    pub meter_id: String,
    pub meter_type: MeterType,
    pub anomaly_type: AnomalyType,
    pub severity: Severity,
    pub details: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_id: Option<String>,
    #[serde(flatten)]
    pub context: MeterContext,
}

/// A meter that was skipped because its input failed validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeterFailure {
    pub meter_id: String,
    pub error: String,
}

impl From<&ValidationError> for MeterFailure {
    fn from(err: &ValidationError) -> Self {
        Self {
            meter_id: err.meter_id().to_string(),
            error: err.to_string(),
        }
    }
}
