//! Consumption pipelines for the meter engine.
//!
//! Indexes raw readings per meter, extracts period consumption, classifies
//! anomalies, allocates costs, and loads building snapshot files for the
//! command-line front end.

pub mod aggregator;
pub mod analysis;
pub mod analyzer;
pub mod extractor;
pub mod index;
pub mod reader;

pub use meter_core as core;
