//! Static per-type price table with configurable overrides.

use std::collections::BTreeMap;

use crate::calculations::round_to;
use crate::models::MeterType;
use tracing::warn;

// ── Default prices (EUR per unit) ─────────────────────────────────────────────

/// Built-in price per unit for every billable meter type.
///
/// PV meters and unknown types are not priced.
pub const DEFAULT_PRICES: &[(MeterType, f64)] = &[
    (MeterType::Electricity, 0.32),
    (MeterType::Gas, 0.12),
    (MeterType::WaterCold, 4.50),
    (MeterType::WaterHot, 8.00),
    (MeterType::Heating, 0.10),
    (MeterType::DistrictHeating, 0.10),
    (MeterType::Oil, 1.10),
    (MeterType::Pellets, 0.35),
];

fn default_price_map() -> BTreeMap<MeterType, f64> {
    DEFAULT_PRICES.iter().copied().collect()
}

/// Static per-type price table used for cost estimates.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceTable {
    prices: BTreeMap<MeterType, f64>,
}

impl Default for PriceTable {
    fn default() -> Self {
        Self::new(None)
    }
}

impl PriceTable {
    /// Create a table from the defaults.
    ///
    /// Pass `Some(map)` to override individual prices; types not present in
    /// `overrides` keep their built-in price. PV types are never priced.
    pub fn new(overrides: Option<&BTreeMap<MeterType, f64>>) -> Self {
        let mut prices = default_price_map();
        if let Some(overrides) = overrides {
            for (meter_type, price) in overrides {
                if meter_type.is_pv() {
                    warn!("ignoring price for {}: PV meters are not billed", meter_type);
                    continue;
                }
                prices.insert(*meter_type, *price);
            }
        }
        Self { prices }
    }

    /// Price per unit for `meter_type`, if it is billed at all.
    pub fn price(&self, meter_type: MeterType) -> Option<f64> {
        self.prices.get(&meter_type).copied()
    }

    /// Cost of `consumption` units, rounded to cents.
    ///
    /// `None` when the type carries no price.
    pub fn cost(&self, meter_type: MeterType, consumption: f64) -> Option<f64> {
        self.price(meter_type)
            .map(|price| round_to(consumption * price, 2))
    }

    /// Iterate `(type, price)` pairs in type order.
    pub fn iter(&self) -> impl Iterator<Item = (MeterType, f64)> + '_ {
        self.prices.iter().map(|(t, p)| (*t, *p))
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
