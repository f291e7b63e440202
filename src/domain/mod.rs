//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - raw and normalized time series (`RawObservation`, `Series`)
//! - the monthly join key (`MonthPeriod`) and resolved inflation (`InflationPoint`)
//! - projection outputs (`Corridor`, `MergedView`) and parameters (`BandsConfig`)

pub mod types;

pub use types::*;
