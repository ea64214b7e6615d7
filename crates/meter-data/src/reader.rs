//! Snapshot file discovery and loading.
//!
//! A snapshot is a JSON document holding the already-fetched meters of one
//! building, either as `{ "building": {..}, "meters": [..] }` or as a bare
//! array of meters. Readings may be nested per meter or given as a flat
//! top-level `readings` list keyed by `meter_id`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use meter_core::error::{EngineError, Result};
use meter_core::models::{MeterInput, RawPoint, RawReading};
use serde::Deserialize;
use tracing::{debug, warn};

// ── Public types ──────────────────────────────────────────────────────────────

/// Building metadata applied to every meter lacking its own.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BuildingInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// The document form of a snapshot file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BuildingSnapshot {
    #[serde(default)]
    pub building: Option<BuildingInfo>,
    #[serde(default)]
    pub meters: Vec<MeterInput>,
    /// Flat readings merged into `meters` by id.
    #[serde(default)]
    pub readings: Vec<RawReading>,
}

impl BuildingSnapshot {
    /// Resolve the snapshot into self-contained meters.
    ///
    /// Flat readings for unknown meter ids are dropped with a warning.
    pub fn into_meters(self) -> Vec<MeterInput> {
        let BuildingSnapshot {
            building,
            mut meters,
            readings,
        } = self;

        if !readings.is_empty() {
            let positions: HashMap<String, usize> = meters
                .iter()
                .enumerate()
                .map(|(i, m)| (m.id.clone(), i))
                .collect();
            let mut unknown = 0usize;
            for record in readings {
                match positions.get(&record.meter_id) {
                    Some(&i) => meters[i].readings.push(RawPoint {
                        date: record.date,
                        value: record.value,
                    }),
                    None => unknown += 1,
                }
            }
            if unknown > 0 {
                warn!("Dropped {} readings for unknown meters", unknown);
            }
        }

        if let Some(building) = building {
            for meter in &mut meters {
                if meter.context.building_id.is_none() {
                    meter.context.building_id = building.id.clone();
                }
                if meter.context.building_name.is_none() {
                    meter.context.building_name = building.name.clone();
                }
            }
        }

        meters
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Find all `.json` files under `path`, sorted by path.
///
/// A file path is returned as-is regardless of its extension.
pub fn find_snapshot_files(path: &Path) -> Vec<PathBuf> {
    if path.is_file() {
        return vec![path.to_path_buf()];
    }
    if !path.exists() {
        warn!("Snapshot path does not exist: {}", path.display());
        return Vec::new();
    }

    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(path)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry.file_type().is_file()
                && entry
                    .path()
                    .extension()
                    .map(|ext| ext == "json")
                    .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
        .collect();

    files.sort();
    files
}

/// Parse snapshot JSON text into meters.
pub fn parse_snapshot(text: &str) -> Result<Vec<MeterInput>> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    let meters = if value.is_array() {
        serde_json::from_value::<Vec<MeterInput>>(value)?
    } else {
        serde_json::from_value::<BuildingSnapshot>(value)?.into_meters()
    };
    Ok(meters)
}

/// Read and parse one snapshot file.
pub fn load_snapshot(path: &Path) -> Result<Vec<MeterInput>> {
    let text = std::fs::read_to_string(path).map_err(|source| EngineError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    let meters = parse_snapshot(&text)?;
    debug!("Loaded {} meters from {}", meters.len(), path.display());
    Ok(meters)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
