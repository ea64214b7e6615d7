//! Cost allocation and per-type aggregation of export rows.

use std::collections::BTreeMap;

use meter_core::calculations::round_to;
use meter_core::models::{MeterConsumption, MeterType};
use meter_core::pricing::PriceTable;
use serde::Serialize;

// ── TypeSummary ───────────────────────────────────────────────────────────────

/// Building-wide totals for one meter type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeSummary {
    pub meter_type: MeterType,
    pub unit_label: &'static str,
    /// Sum of known consumption, two decimals.
    pub total_consumption: f64,
    /// Sum of known costs, two decimals.
    pub total_cost: f64,
    /// All meters of this type, with or without data.
    pub meter_count: u32,
    pub meters_with_data: u32,
}

impl TypeSummary {
    fn new(meter_type: MeterType) -> Self {
        Self {
            meter_type,
            unit_label: meter_type.unit_label(),
            total_consumption: 0.0,
            total_cost: 0.0,
            meter_count: 0,
            meters_with_data: 0,
        }
    }

    fn add_row(&mut self, row: &MeterConsumption) {
        self.meter_count += 1;
        if let Some(consumption) = row.result.consumption {
            self.total_consumption += consumption;
            self.meters_with_data += 1;
        }
        if let Some(cost) = row.result.estimated_cost {
            self.total_cost += cost;
        }
    }

    fn finish(&mut self) {
        self.total_consumption = round_to(self.total_consumption, 2);
        self.total_cost = round_to(self.total_cost, 2);
    }
}

/// Grand totals over every type of a building.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExportTotals {
    pub total_cost: f64,
    pub meter_count: u32,
    pub meters_with_data: u32,
}

// ── CostAllocator ─────────────────────────────────────────────────────────────

/// Stateless helper that prices, shares and sums export rows.
pub struct CostAllocator;

impl CostAllocator {
    /// Price every row with known consumption.
    pub fn apply_costs(rows: &mut [MeterConsumption], prices: &PriceTable) {
        for row in rows.iter_mut() {
            row.result.estimated_cost = row
                .result
                .consumption
                .and_then(|consumption| prices.cost(row.meter_type, consumption));
        }
    }

    /// Unrounded sum of known consumption per type.
    pub fn type_totals(rows: &[MeterConsumption]) -> BTreeMap<MeterType, f64> {
        let mut totals: BTreeMap<MeterType, f64> = BTreeMap::new();
        for row in rows {
            if let Some(consumption) = row.result.consumption {
                *totals.entry(row.meter_type).or_default() += consumption;
            }
        }
        totals
    }

    /// Set each row's share of its type total (second pass over all rows).
    ///
    /// Rows without consumption, or of a type whose total is zero, get 0.
    /// Each share is rounded on its own, so a type's shares may sum to up to
    /// `0.005 × rows` away from 100.
    pub fn apply_shares(rows: &mut [MeterConsumption]) {
        let totals = Self::type_totals(rows);
        for row in rows.iter_mut() {
            let total = totals.get(&row.meter_type).copied().unwrap_or(0.0);
            row.result.share_percent = match row.result.consumption {
                Some(consumption) if total > 0.0 => {
                    (consumption / total * 10_000.0).round() / 100.0
                }
                _ => 0.0,
            };
        }
    }

    /// Aggregate rows into one summary per meter type.
    pub fn summarize(rows: &[MeterConsumption]) -> BTreeMap<MeterType, TypeSummary> {
        let mut summary: BTreeMap<MeterType, TypeSummary> = BTreeMap::new();
        for row in rows {
            summary
                .entry(row.meter_type)
                .or_insert_with(|| TypeSummary::new(row.meter_type))
                .add_row(row);
        }
        for entry in summary.values_mut() {
            entry.finish();
        }
        summary
    }

    /// Sum the per-type summaries into building totals.
    pub fn totals(summary: &BTreeMap<MeterType, TypeSummary>) -> ExportTotals {
        let mut totals = ExportTotals::default();
        for entry in summary.values() {
            totals.total_cost += entry.total_cost;
            totals.meter_count += entry.meter_count;
            totals.meters_with_data += entry.meters_with_data;
        }
        totals.total_cost = round_to(totals.total_cost, 2);
        totals
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
