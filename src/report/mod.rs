//! Run summary: where the reference rate sits inside the corridor.

use chrono::NaiveDate;
use serde::Serialize;

use crate::domain::{BandPhase, Corridor, MergedView};

pub mod format;

pub use format::{format_drivers, format_run_summary, format_sources, format_warnings};

/// Corridor bounds on one date.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BandSnapshot {
    pub date: NaiveDate,
    pub lower: f64,
    pub upper: f64,
}

/// Latest observed rate and the bounds on that same date.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FxReading {
    pub date: NaiveDate,
    pub fx: f64,
    pub lower: f64,
    pub upper: f64,
    /// `upper / fx - 1`; negative once the rate is above the upper band.
    pub gap_to_upper: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub span: Option<(NaiveDate, NaiveDate)>,
    pub fixed_days: usize,
    pub indexed_days: usize,
    pub last_fx: Option<FxReading>,
    pub summary_date: NaiveDate,
    /// `None` when `summary_date` is outside the corridor.
    pub at_summary_date: Option<BandSnapshot>,
}

pub fn summarize(corridor: &Corridor, merged: &MergedView, summary_date: NaiveDate) -> RunSummary {
    let last_fx = merged.last_observed().and_then(|row| {
        let fx = row.observed?;
        let gap_to_upper = (fx != 0.0 && row.upper.is_finite()).then(|| row.upper / fx - 1.0);
        Some(FxReading {
            date: row.date,
            fx,
            lower: row.lower,
            upper: row.upper,
            gap_to_upper,
        })
    });

    let at_summary_date = corridor.get(summary_date).map(|p| BandSnapshot {
        date: p.date,
        lower: p.lower,
        upper: p.upper,
    });

    RunSummary {
        span: corridor.span(),
        fixed_days: corridor.phase_len(BandPhase::Fixed),
        indexed_days: corridor.phase_len(BandPhase::Indexed),
        last_fx,
        summary_date,
        at_summary_date,
    }
}
