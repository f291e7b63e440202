//! Raw rows -> canonical [`Series`].
//!
//! Every source (JSON pages, spreadsheet rows, delimited text) ends up here:
//!
//! - dates are parsed permissively; a row with an unparseable date is dropped
//! - values are coerced to `f64`; an unparseable value becomes `NaN` and the row is kept
//! - on a repeated date the last row wins
//! - output is sorted ascending by date
//!
//! Nothing in this module fails: bad input only shrinks the output.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::domain::{MonthPeriod, RawObservation, RawValue, Series, SeriesPoint};

/// Row accounting for one normalization pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeStats {
    pub rows_read: usize,
    pub dropped_dates: usize,
    pub missing_values: usize,
    pub duplicate_dates: usize,
}

/// Normalize rows into a [`Series`].
pub fn normalize(rows: Vec<RawObservation>) -> Series {
    normalize_with_stats(rows).0
}

/// Normalize rows and report what was dropped or coerced.
pub fn normalize_with_stats(rows: Vec<RawObservation>) -> (Series, NormalizeStats) {
    let mut stats = NormalizeStats {
        rows_read: rows.len(),
        ..NormalizeStats::default()
    };

    let mut points = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(date) = row.date.as_deref().and_then(parse_date) else {
            stats.dropped_dates += 1;
            continue;
        };
        let value = coerce_value(&row.value);
        if !value.is_finite() {
            stats.missing_values += 1;
        }
        points.push(SeriesPoint::new(date, value));
    }

    let kept = points.len();
    let series = Series::from_points(points);
    stats.duplicate_dates = kept - series.len();

    if stats.dropped_dates > 0 || stats.duplicate_dates > 0 {
        tracing::debug!(
            rows_read = stats.rows_read,
            dropped_dates = stats.dropped_dates,
            duplicate_dates = stats.duplicate_dates,
            missing_values = stats.missing_values,
            "normalized series with dropped rows"
        );
    }

    (series, stats)
}

/// Parse a date-like string.
///
/// Accepts ISO dates, ISO datetimes (with or without offset), `DD/MM/YYYY`,
/// `DD-MM-YYYY`, `YYYY/MM/DD`, and month-only forms (`YYYY-MM`, `YYYYMM`)
/// which map to the first day of the month.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    const DATE_FMTS: [&str; 4] = ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%Y/%m/%d"];
    for fmt in DATE_FMTS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }

    const DATETIME_FMTS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%d/%m/%Y %H:%M:%S"];
    for fmt in DATETIME_FMTS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }

    parse_month(s).map(MonthPeriod::first_day)
}

fn parse_month(s: &str) -> Option<MonthPeriod> {
    let (y, m) = match s.len() {
        6 if s.bytes().all(|b| b.is_ascii_digit()) => (&s[..4], &s[4..]),
        7 if matches!(s.as_bytes()[4], b'-' | b'/') => (&s[..4], &s[5..]),
        _ => return None,
    };
    MonthPeriod::new(y.parse().ok()?, m.parse().ok()?)
}

/// Coerce a raw value to `f64`; anything unusable becomes `NaN`.
pub fn coerce_value(value: &RawValue) -> f64 {
    let v = match value {
        RawValue::Number(v) => *v,
        RawValue::Text(s) => parse_number(s).unwrap_or(f64::NAN),
        RawValue::Missing => f64::NAN,
    };
    if v.is_finite() { v } else { f64::NAN }
}

/// Parse a number written with either `.` or `,` as decimal separator.
///
/// When both appear, the right-most one is the decimal separator and the
/// other is thousands grouping (`1.234,5` and `1,234.5` both give `1234.5`).
/// A separator repeated more than once is grouping (`1.234.567`).
pub fn parse_number(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let last_comma = s.rfind(',');
    let last_dot = s.rfind('.');
    let cleaned = match (last_comma, last_dot) {
        (Some(c), Some(d)) if c > d => s.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => s.replace(',', ""),
        (Some(_), None) if s.matches(',').count() == 1 => s.replace(',', "."),
        (Some(_), None) => s.replace(',', ""),
        (None, Some(_)) if s.matches('.').count() > 1 => s.replace('.', ""),
        _ => s.to_string(),
    };

    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}
