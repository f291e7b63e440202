//! Export the merged corridor/observation table to CSV.
//!
//! One row per calendar day; `observed` is blank where the reference rate has
//! no print. Easy to consume in spreadsheets or downstream scripts.

use std::path::Path;

use crate::domain::MergedView;
use crate::error::AppError;

/// Write `date,lower,upper,observed` rows to a CSV file.
pub fn write_merged_csv(path: &Path, merged: &MergedView) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| AppError::new(2, format!("Failed to create export CSV '{}': {e}", path.display())))?;

    for row in &merged.rows {
        writer
            .serialize(row)
            .map_err(|e| AppError::new(2, format!("Failed to write export CSV row: {e}")))?;
    }
    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush export CSV: {e}")))?;

    Ok(())
}
