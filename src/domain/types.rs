//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during projection
//! - exported to JSON/CSV
//! - cached between refreshes

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// A value as it arrived from an upstream source, before coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Number(f64),
    Text(String),
    Missing,
}

/// A single `(date-like, value-like)` pair from an external source.
///
/// Nothing is validated yet; `data::normalize` turns a batch of these into a
/// [`Series`].
#[derive(Debug, Clone, PartialEq)]
pub struct RawObservation {
    pub date: Option<String>,
    pub value: RawValue,
}

impl RawObservation {
    pub fn new(date: impl Into<String>, value: RawValue) -> Self {
        Self {
            date: Some(date.into()),
            value,
        }
    }

    pub fn number(date: impl Into<String>, value: f64) -> Self {
        Self::new(date, RawValue::Number(value))
    }

    pub fn text(date: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(date, RawValue::Text(value.into()))
    }
}

/// One row of a [`Series`]. `value` is `NaN` when the source had no usable number.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub date: NaiveDate,
    pub value: f64,
}

impl SeriesPoint {
    pub fn new(date: NaiveDate, value: f64) -> Self {
        Self { date, value }
    }

    pub fn is_observed(&self) -> bool {
        self.value.is_finite()
    }
}

/// Canonical time series: unique dates, ascending order.
///
/// The only way to build one is [`Series::from_points`], which enforces the
/// ordering/uniqueness invariant, so every consumer can rely on it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    points: Vec<SeriesPoint>,
}

impl Series {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Sort ascending by date and keep the last row for any repeated date.
    pub fn from_points(mut points: Vec<SeriesPoint>) -> Self {
        // Stable sort keeps the original relative order of equal dates, so
        // "last wins" is deterministic.
        points.sort_by_key(|p| p.date);

        let mut out: Vec<SeriesPoint> = Vec::with_capacity(points.len());
        for p in points {
            match out.last_mut() {
                Some(prev) if prev.date == p.date => *prev = p,
                _ => out.push(p),
            }
        }
        Self { points: out }
    }

    pub fn points(&self) -> &[SeriesPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first(&self) -> Option<&SeriesPoint> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&SeriesPoint> {
        self.points.last()
    }

    /// Value at an exact date (may be `NaN`).
    pub fn get(&self, date: NaiveDate) -> Option<f64> {
        self.points
            .binary_search_by_key(&date, |p| p.date)
            .ok()
            .map(|idx| self.points[idx].value)
    }

    /// Latest row carrying a finite value.
    pub fn last_observed(&self) -> Option<SeriesPoint> {
        self.points.iter().rev().find(|p| p.is_observed()).copied()
    }

    /// Number of rows carrying a finite value.
    pub fn observed_count(&self) -> usize {
        self.points.iter().filter(|p| p.is_observed()).count()
    }

    pub fn map_values(&self, f: impl Fn(f64) -> f64) -> Series {
        Series {
            points: self
                .points
                .iter()
                .map(|p| SeriesPoint::new(p.date, f(p.value)))
                .collect(),
        }
    }

    /// The last `n` rows (all rows when `n >= len`).
    pub fn tail(&self, n: usize) -> Series {
        let start = self.points.len().saturating_sub(n);
        Series {
            points: self.points[start..].to_vec(),
        }
    }

    /// Collapse to monthly cadence: one finite value per period, the latest date wins.
    pub fn monthly(&self) -> BTreeMap<MonthPeriod, f64> {
        let mut out = BTreeMap::new();
        for p in self.points.iter().filter(|p| p.is_observed()) {
            out.insert(MonthPeriod::from_date(p.date), p.value);
        }
        out
    }
}

/// A calendar month, used to join daily and monthly cadences.
///
/// Internally stored as the first day of the month so ordering and month
/// arithmetic come straight from `chrono`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct MonthPeriod(NaiveDate);

impl MonthPeriod {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(Self)
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self(date - Duration::days(i64::from(date.day0())))
    }

    pub fn year(self) -> i32 {
        self.0.year()
    }

    pub fn month(self) -> u32 {
        self.0.month()
    }

    /// `None` when the result falls outside chrono's calendar.
    pub fn add_months(self, n: i32) -> Option<Self> {
        let months = Months::new(n.unsigned_abs());
        if n >= 0 {
            self.0.checked_add_months(months).map(Self)
        } else {
            self.0.checked_sub_months(months).map(Self)
        }
    }

    pub fn succ(self) -> Option<Self> {
        self.add_months(1)
    }

    pub fn first_day(self) -> NaiveDate {
        self.0
    }

    pub fn last_day(self) -> Option<NaiveDate> {
        self.succ().and_then(|next| next.0.pred_opt())
    }

    pub fn contains(self, date: NaiveDate) -> bool {
        Self::from_date(date) == self
    }

    /// Inclusive range of months `from..=to` (empty when `to < from`).
    pub fn range_inclusive(from: Self, to: Self) -> Vec<Self> {
        let mut out = Vec::new();
        let mut cur = from;
        while cur <= to {
            out.push(cur);
            match cur.succ() {
                Some(next) => cur = next,
                None => break,
            }
        }
        out
    }
}

impl fmt::Display for MonthPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year(), self.month())
    }
}

impl FromStr for MonthPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (y, m) = s
            .split_once('-')
            .ok_or_else(|| format!("Invalid month '{s}'. Expected YYYY-MM."))?;
        let year: i32 = y.parse().map_err(|_| format!("Invalid year in '{s}'."))?;
        let month: u32 = m.parse().map_err(|_| format!("Invalid month in '{s}'."))?;
        Self::new(year, month).ok_or_else(|| format!("Invalid month '{s}'."))
    }
}

impl From<MonthPeriod> for String {
    fn from(p: MonthPeriod) -> Self {
        p.to_string()
    }
}

impl TryFrom<String> for MonthPeriod {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Where a resolved monthly inflation rate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateSource {
    /// Published price-index print.
    Realized,
    /// Market-expectations survey median.
    Forecast,
}

impl RateSource {
    pub fn label(self) -> &'static str {
        match self {
            RateSource::Realized => "realized",
            RateSource::Forecast => "forecast",
        }
    }
}

/// The single monthly rate that drives band growth for `period`, as a decimal fraction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InflationPoint {
    pub period: MonthPeriod,
    pub monthly_rate: f64,
    pub source: RateSource,
}

/// Which construction produced a corridor row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BandPhase {
    /// Deterministic schedule with a fixed monthly rate.
    Fixed,
    /// Compounded from lagged monthly inflation.
    Indexed,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CorridorPoint {
    pub date: NaiveDate,
    pub lower: f64,
    pub upper: f64,
    pub phase: BandPhase,
}

/// Lower/upper bounds for every calendar day of one unbroken range.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Corridor {
    points: Vec<CorridorPoint>,
}

impl Corridor {
    /// Build from rows in any order; sorted by date, first row wins on a repeated date.
    pub fn from_points(mut points: Vec<CorridorPoint>) -> Self {
        points.sort_by_key(|p| p.date);
        points.dedup_by_key(|p| p.date);
        Self { points }
    }

    /// Concatenate two consecutive corridors.
    pub fn concat(first: Corridor, second: Corridor) -> Self {
        let mut points = first.points;
        points.extend(second.points);
        Self::from_points(points)
    }

    pub fn points(&self) -> &[CorridorPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first(&self) -> Option<&CorridorPoint> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&CorridorPoint> {
        self.points.last()
    }

    pub fn get(&self, date: NaiveDate) -> Option<&CorridorPoint> {
        self.points
            .binary_search_by_key(&date, |p| p.date)
            .ok()
            .map(|idx| &self.points[idx])
    }

    pub fn span(&self) -> Option<(NaiveDate, NaiveDate)> {
        Some((self.first()?.date, self.last()?.date))
    }

    pub fn phase_len(&self, phase: BandPhase) -> usize {
        self.points.iter().filter(|p| p.phase == phase).count()
    }
}

/// One calendar day of the merged corridor/observation table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MergedRow {
    pub date: NaiveDate,
    pub lower: f64,
    pub upper: f64,
    pub observed: Option<f64>,
}

/// Corridor rows with the observed reference rate attached where one exists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergedView {
    pub rows: Vec<MergedRow>,
}

impl MergedView {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row_at(&self, date: NaiveDate) -> Option<&MergedRow> {
        self.rows
            .binary_search_by_key(&date, |r| r.date)
            .ok()
            .map(|idx| &self.rows[idx])
    }

    pub fn last_observed(&self) -> Option<&MergedRow> {
        self.rows.iter().rev().find(|r| r.observed.is_some())
    }
}

/// Largest accepted `lag_months`.
pub const MAX_LAG_MONTHS: u32 = 24;

/// Band construction parameters.
///
/// Defaults reproduce the published 2025 schedule; every field can be
/// overridden from a TOML file or CLI flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BandsConfig {
    /// First day of the fixed schedule (lower/upper equal `lower0`/`upper0`).
    pub phase1_start: NaiveDate,
    /// Last day of the fixed schedule; indexing starts the day after.
    pub phase1_end: NaiveDate,
    pub lower0: f64,
    pub upper0: f64,
    /// Fixed monthly widening rate of the first phase (decimal).
    pub phase1_monthly_rate: f64,
    /// Days per compounding period (the 30-day month convention).
    pub days_per_period: f64,
    /// Months between the inflation print and the band month it drives.
    pub lag_months: u32,
    /// Number of forecast target periods kept from the latest survey round.
    pub forecast_horizon: usize,
    /// Date at which the summary reports corridor bounds.
    pub summary_date: NaiveDate,
}

impl Default for BandsConfig {
    fn default() -> Self {
        Self {
            phase1_start: ymd(2025, 4, 14),
            phase1_end: ymd(2025, 12, 31),
            lower0: 1000.0,
            upper0: 1400.0,
            phase1_monthly_rate: 0.01,
            days_per_period: 30.0,
            lag_months: 2,
            forecast_horizon: 24,
            summary_date: ymd(2026, 1, 31),
        }
    }
}

impl BandsConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.phase1_start > self.phase1_end {
            return Err(AppError::new(
                2,
                format!(
                    "Invalid band range: start {} is after end {}.",
                    self.phase1_start, self.phase1_end
                ),
            ));
        }
        if !(self.lower0.is_finite() && self.upper0.is_finite() && self.lower0 > 0.0 && self.lower0 <= self.upper0) {
            return Err(AppError::new(
                2,
                "Invalid band endpoints: require 0 < lower0 <= upper0.",
            ));
        }
        if !(self.phase1_monthly_rate.is_finite() && (0.0..1.0).contains(&self.phase1_monthly_rate)) {
            return Err(AppError::new(2, "Invalid phase-1 rate: require 0 <= rate < 1."));
        }
        if !(self.days_per_period.is_finite() && self.days_per_period > 0.0) {
            return Err(AppError::new(2, "Invalid days per period: must be > 0."));
        }
        if self.forecast_horizon == 0 {
            return Err(AppError::new(2, "Forecast horizon must be > 0."));
        }
        if self.lag_months > MAX_LAG_MONTHS {
            return Err(AppError::new(
                2,
                format!("Invalid inflation lag: {} months (max {MAX_LAG_MONTHS}).", self.lag_months),
            ));
        }
        Ok(())
    }

    /// First day projected from inflation data.
    pub fn phase2_start(&self) -> NaiveDate {
        self.phase1_end.succ_opt().unwrap_or(self.phase1_end)
    }

    /// Month containing the first projected day.
    pub fn phase2_first_month(&self) -> MonthPeriod {
        MonthPeriod::from_date(self.phase2_start())
    }
}

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default()
}
