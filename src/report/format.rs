//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the projection code stays clean and testable
//! - output changes are localized

use crate::bands::ProjectionSchedule;
use crate::data::MarketInputs;
use crate::domain::BandsConfig;
use crate::report::RunSummary;

/// Header block: parameters, corridor span and the summary panel.
pub fn format_run_summary(summary: &RunSummary, schedule: &ProjectionSchedule, config: &BandsConfig) -> String {
    let mut out = String::new();

    out.push_str("=== bands - FX corridor (reference rate vs bands) ===\n");
    out.push_str(&format!(
        "Fixed phase: {} .. {} | start=[{:.2}, {:.2}] | {:.2}% per {}d\n",
        config.phase1_start,
        config.phase1_end,
        config.lower0,
        config.upper0,
        config.phase1_monthly_rate * 100.0,
        config.days_per_period,
    ));
    match summary.span {
        Some((from, to)) => out.push_str(&format!(
            "Corridor: {from} .. {to} | fixed={}d indexed={}d\n",
            summary.fixed_days, summary.indexed_days
        )),
        None => out.push_str("Corridor: (empty)\n"),
    }
    match schedule.terminal {
        Some(terminal) => out.push_str(&format!(
            "Indexed through {terminal} (lag {}m, {} inflation periods)\n",
            config.lag_months,
            schedule.inflation.len()
        )),
        None => out.push_str("Indexed phase: none (no forecast available)\n"),
    }

    out.push_str("\nSummary:\n");
    match &summary.last_fx {
        Some(fx) => {
            out.push_str(&format!("- last reference rate: {:.2} ({})\n", fx.fx, fx.date));
            out.push_str(&format!("- bands on that date : [{:.2}, {:.2}]\n", fx.lower, fx.upper));
            out.push_str(&format!("- gap to upper band  : {}\n", fmt_pct(fx.gap_to_upper)));
        }
        None => out.push_str("- no reference rate observations available\n"),
    }
    match &summary.at_summary_date {
        Some(b) => out.push_str(&format!("- bands at {}  : [{:.2}, {:.2}]\n", b.date, b.lower, b.upper)),
        None => out.push_str(&format!("- bands at {}  : n/a (outside corridor)\n", summary.summary_date)),
    }

    out
}

/// Per-month drivers of the indexed phase.
pub fn format_drivers(schedule: &ProjectionSchedule) -> String {
    let mut out = String::new();
    if schedule.drivers.is_empty() {
        return out;
    }

    out.push_str("Monthly drivers:\n");
    out.push_str(&format!(
        "{:<8} {:<9} {:<9} {:>9} {:>10} {:<9}",
        "month", "reference", "from", "m/m %", "daily %", "source"
    ));
    out.push('\n');
    out.push_str(&format!("{:-<8} {:-<9} {:-<9} {:->9} {:->10} {:-<9}", "", "", "", "", "", ""));
    out.push('\n');

    for d in &schedule.drivers {
        let from = d.resolved_from.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string());
        let marker = if d.is_carried_forward() { " (carried)" } else { "" };
        out.push_str(
            format!(
                "{:<8} {:<9} {:<9} {:>9.3} {:>10.5} {:<9}{marker}",
                d.month.to_string(),
                d.reference.to_string(),
                from,
                d.monthly_rate * 100.0,
                d.daily_rate * 100.0,
                d.source.label(),
            )
            .trim_end(),
        );
        out.push('\n');
    }

    out
}

/// One line per upstream: status, row counts, last date.
pub fn format_sources(inputs: &MarketInputs) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{:<18} {:<8} {:>6} {:>8} {:<10}",
        "source", "status", "rows", "observed", "last"
    ));
    out.push('\n');
    out.push_str(&format!("{:-<18} {:-<8} {:->6} {:->8} {:-<10}", "", "", "", "", ""));
    out.push('\n');

    for f in inputs.all() {
        let last = f
            .series
            .last()
            .map(|p| p.date.to_string())
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "{:<18} {:<8} {:>6} {:>8} {:<10}",
            truncate(f.source, 18),
            f.status.label(),
            f.series.len(),
            f.series.observed_count(),
            last,
        ));
        out.push('\n');
    }

    out
}

pub fn format_warnings(warnings: &[String]) -> String {
    let mut out = String::new();
    for w in warnings {
        out.push_str(&format!("warning: {w}\n"));
    }
    out
}

fn fmt_pct(v: Option<f64>) -> String {
    match v {
        Some(v) if v.is_finite() => format!("{:.2}%", v * 100.0),
        _ => "-".to_string(),
    }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    for (i, ch) in s.chars().enumerate() {
        if i + 1 >= max {
            break;
        }
        out.push(ch);
    }
    out.push('.');
    out
}
