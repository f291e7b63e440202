//! Debug bundle writer for inspecting upstream inputs and the projection schedule.

use std::fs::{File, create_dir_all};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{Datelike, Local};

use crate::app::pipeline::RunOutput;
use crate::domain::{BandsConfig, CorridorPoint};
use crate::error::AppError;

pub fn write_debug_bundle(dir: &Path, run: &RunOutput, config: &BandsConfig) -> Result<PathBuf, AppError> {
    create_dir_all(dir).map_err(|e| AppError::new(4, format!("Failed to create debug dir: {e}")))?;

    let ts = Local::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("bands_debug_{ts}.md"));
    let file = File::create(&path).map_err(|e| AppError::new(4, format!("Failed to create debug file: {e}")))?;
    let mut file = BufWriter::new(file);

    write_bundle(&mut file, run, config).map_err(|e| AppError::new(4, format!("Failed to write debug: {e}")))?;
    file.flush()
        .map_err(|e| AppError::new(4, format!("Failed to write debug: {e}")))?;

    Ok(path)
}

fn write_bundle(file: &mut impl Write, run: &RunOutput, config: &BandsConfig) -> std::io::Result<()> {
    writeln!(file, "# bands debug bundle")?;
    writeln!(file, "- generated: {}", Local::now().to_rfc3339())?;
    writeln!(
        file,
        "- fixed phase: {} .. {} | lower0={:.2} upper0={:.2} rate={:.4} per {}d",
        config.phase1_start,
        config.phase1_end,
        config.lower0,
        config.upper0,
        config.phase1_monthly_rate,
        config.days_per_period
    )?;
    writeln!(
        file,
        "- lag_months={} forecast_horizon={} summary_date={}",
        config.lag_months, config.forecast_horizon, config.summary_date
    )?;

    writeln!(file, "\n## Sources")?;
    writeln!(file, "| source | status | rows | observed | first | last | warning |")?;
    writeln!(file, "| - | - | - | - | - | - | - |")?;
    for f in run.inputs.all() {
        writeln!(
            file,
            "| {} | {} | {} | {} | {} | {} | {} |",
            f.source,
            f.status.label(),
            f.series.len(),
            f.series.observed_count(),
            f.series.first().map(|p| p.date.to_string()).unwrap_or_default(),
            f.series.last().map(|p| p.date.to_string()).unwrap_or_default(),
            f.warning.as_deref().unwrap_or("")
        )?;
    }

    let schedule = &run.projection.schedule;

    writeln!(file, "\n## Monthly inflation (resolved)")?;
    writeln!(file, "| period | rate_pct | source |")?;
    writeln!(file, "| - | - | - |")?;
    for p in &schedule.inflation {
        writeln!(file, "| {} | {:.3} | {} |", p.period, p.monthly_rate * 100.0, p.source.label())?;
    }

    writeln!(file, "\n## Drivers")?;
    match schedule.terminal {
        Some(t) => writeln!(file, "Terminal month: {t}")?,
        None => writeln!(file, "No forecast: indexed phase absent.")?,
    }
    writeln!(file, "| month | reference | from | monthly_pct | daily_pct | source |")?;
    writeln!(file, "| - | - | - | - | - | - |")?;
    for d in &schedule.drivers {
        writeln!(
            file,
            "| {} | {} | {} | {:.4} | {:.6} | {} |",
            d.month,
            d.reference,
            d.resolved_from.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string()),
            d.monthly_rate * 100.0,
            d.daily_rate * 100.0,
            d.source.label()
        )?;
    }

    writeln!(file, "\n## Corridor checkpoints")?;
    writeln!(file, "| date | phase | lower | upper | observed |")?;
    writeln!(file, "| - | - | - | - | - |")?;
    for p in checkpoints(run.projection.corridor.points(), config) {
        let observed = run.merged.row_at(p.date).and_then(|r| r.observed);
        writeln!(
            file,
            "| {} | {:?} | {:.4} | {:.4} | {} |",
            p.date,
            p.phase,
            p.lower,
            p.upper,
            fmt_opt(observed)
        )?;
    }

    if !run.warnings.is_empty() {
        writeln!(file, "\n## Warnings")?;
        for w in &run.warnings {
            writeln!(file, "- {w}")?;
        }
    }

    Ok(())
}

/// First and last day, the first day of every month, both sides of the phase
/// boundary and the summary date.
fn checkpoints<'a>(points: &'a [CorridorPoint], config: &BandsConfig) -> Vec<&'a CorridorPoint> {
    let n = points.len();
    points
        .iter()
        .enumerate()
        .filter(|(i, p)| {
            *i == 0
                || *i + 1 == n
                || p.date.day() == 1
                || p.date == config.phase1_end
                || p.date == config.summary_date
                || points.get(i + 1).is_some_and(|next| next.phase != p.phase)
        })
        .map(|(_, p)| p)
        .collect()
}

fn fmt_opt(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{v:.3}"),
        _ => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::pipeline::{Fetcher, run};
    use crate::data::SourceConfig;

    #[test]
    fn offline_bundle_lists_sources_and_checkpoints() {
        let config = BandsConfig::default();
        let fetcher = Fetcher::new(&SourceConfig::default(), &config, true, false).unwrap();
        let output = run(&config, &fetcher, false).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = write_debug_bundle(dir.path(), &output, &config).unwrap();
        let text = std::fs::read_to_string(path).unwrap();

        assert!(text.starts_with("# bands debug bundle"));
        assert!(text.contains("| reference-rate | skipped | 0 | 0 |"));
        assert!(text.contains("No forecast: indexed phase absent."));
        assert!(text.contains("| 2025-04-14 | Fixed | 1000.0000 | 1400.0000 | - |"));
        assert!(text.contains("| 2025-12-31 | Fixed |"));
        assert!(!text.contains("## Warnings"));
    }
}
