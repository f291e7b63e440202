//! Write the bands JSON document.
//!
//! The JSON export is the portable representation of one run:
//! - the band parameters used
//! - the summary panel and the monthly drivers of the indexed phase
//! - the merged day-by-day table

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use chrono::Local;
use serde::Serialize;

use crate::bands::MonthlyDriver;
use crate::domain::{BandsConfig, InflationPoint, MergedRow};
use crate::error::AppError;
use crate::report::RunSummary;

#[derive(Debug, Serialize)]
pub struct BandsDocument<'a> {
    pub tool: &'static str,
    pub generated_at: String,
    pub config: &'a BandsConfig,
    pub summary: &'a RunSummary,
    pub inflation: &'a [InflationPoint],
    pub drivers: &'a [MonthlyDriver],
    pub rows: &'a [MergedRow],
}

impl<'a> BandsDocument<'a> {
    pub fn new(
        config: &'a BandsConfig,
        summary: &'a RunSummary,
        inflation: &'a [InflationPoint],
        drivers: &'a [MonthlyDriver],
        rows: &'a [MergedRow],
    ) -> Self {
        Self {
            tool: "bands",
            generated_at: Local::now().to_rfc3339(),
            config,
            summary,
            inflation,
            drivers,
            rows,
        }
    }
}

pub fn write_bands_json(path: &Path, doc: &BandsDocument<'_>) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create bands JSON '{}': {e}", path.display())))?;

    serde_json::to_writer_pretty(BufWriter::new(file), doc)
        .map_err(|e| AppError::new(2, format!("Failed to write bands JSON: {e}")))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bands::{merge_observations, project};
    use crate::domain::{MonthPeriod, Series, SeriesPoint};
    use crate::report::summarize;

    #[test]
    fn document_carries_rows_and_drivers() {
        let cfg = BandsConfig::default();
        let forecast = Series::from_points(vec![SeriesPoint::new(
            MonthPeriod::new(2025, 11).unwrap().first_day(),
            2.0,
        )]);
        let projection = project(&cfg, &Series::empty(), &forecast);
        let merged = merge_observations(&projection.corridor, &Series::empty());
        let summary = summarize(&projection.corridor, &merged, cfg.summary_date);
        let doc = BandsDocument::new(
            &cfg,
            &summary,
            &projection.schedule.inflation,
            &projection.schedule.drivers,
            &merged.rows,
        );

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bands.json");
        write_bands_json(&path, &doc).unwrap();

        let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["tool"], "bands");
        assert_eq!(value["config"]["lower0"], 1000.0);
        assert_eq!(value["drivers"][0]["month"], "2026-01");
        assert_eq!(value["drivers"][0]["source"], "forecast");
        assert_eq!(value["rows"].as_array().unwrap().len(), merged.len());
        assert!(value["rows"][0]["observed"].is_null());
    }
}
