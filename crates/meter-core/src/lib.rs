//! Core types and calculators for the meter consumption engine.
//!
//! Holds the reading/meter data model, the static price table, calendar-date
//! helpers, engine configuration, and the daily-rate normalizer shared by the
//! anomaly and export pipelines in `meter-data`.

pub mod calculations;
pub mod error;
pub mod formatting;
pub mod models;
pub mod pricing;
pub mod settings;
pub mod time_utils;
