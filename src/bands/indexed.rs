//! Second phase: corridor indexed to lagged monthly inflation.
//!
//! Each band month `M` is driven by the resolved inflation of `M - lag`.
//! Realized prints take precedence over survey forecasts for the same month.
//! The monthly rate is spread evenly over the period as a daily rate
//! `r_d = (1 + m)^(1/p) - 1`, and the bounds compound day by day from the last
//! fixed-phase row:
//!
//! `lower(t) = lower_anchor * prod_{i=1..t} (1 - r_d(i))`
//! `upper(t) = upper_anchor * prod_{i=1..t} (1 + r_d(i))`
//!
//! Day `t = 0` (the first projected date) carries the anchor values unchanged.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::domain::{
    BandPhase, BandsConfig, Corridor, CorridorPoint, InflationPoint, MonthPeriod, RateSource, Series,
};

/// How a band month obtained its driving rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverSource {
    Realized,
    Forecast,
    /// No inflation point at or before the reference month; bounds held flat.
    Held,
}

impl DriverSource {
    pub fn label(self) -> &'static str {
        match self {
            DriverSource::Realized => "realized",
            DriverSource::Forecast => "forecast",
            DriverSource::Held => "held",
        }
    }
}

impl From<RateSource> for DriverSource {
    fn from(value: RateSource) -> Self {
        match value {
            RateSource::Realized => DriverSource::Realized,
            RateSource::Forecast => DriverSource::Forecast,
        }
    }
}

/// Rate applied to every day of one band month.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MonthlyDriver {
    pub month: MonthPeriod,
    /// `month - lag`: the inflation period that should drive this month.
    pub reference: MonthPeriod,
    /// Period actually used; earlier than `reference` when carried forward.
    pub resolved_from: Option<MonthPeriod>,
    pub monthly_rate: f64,
    pub daily_rate: f64,
    pub source: DriverSource,
}

impl MonthlyDriver {
    pub fn is_carried_forward(&self) -> bool {
        self.resolved_from.is_some_and(|p| p != self.reference)
    }
}

/// Monthly inflation table and the per-month drivers derived from it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProjectionSchedule {
    /// One row per period with any usable value, ascending.
    pub inflation: Vec<InflationPoint>,
    /// Last projected band month; `None` when there is no forecast.
    pub terminal: Option<MonthPeriod>,
    /// One row per band month from the first projected month to `terminal`.
    pub drivers: Vec<MonthlyDriver>,
}

impl ProjectionSchedule {
    pub fn driver(&self, month: MonthPeriod) -> Option<&MonthlyDriver> {
        self.drivers.iter().find(|d| d.month == month)
    }

    pub fn held_months(&self) -> usize {
        self.drivers.iter().filter(|d| d.source == DriverSource::Held).count()
    }
}

/// Outer join of realized (decimal) and forecast (percent) monthly rates.
///
/// A realized value wins whenever it is present; missing values on either side
/// never mask the other.
pub fn resolve_inflation(realized: &Series, forecast_pct: &Series) -> Vec<InflationPoint> {
    let mut table: BTreeMap<MonthPeriod, InflationPoint> = forecast_pct
        .monthly()
        .into_iter()
        .map(|(period, pct)| {
            let point = InflationPoint {
                period,
                monthly_rate: pct / 100.0,
                source: RateSource::Forecast,
            };
            (period, point)
        })
        .collect();

    for (period, rate) in realized.monthly() {
        table.insert(
            period,
            InflationPoint {
                period,
                monthly_rate: rate,
                source: RateSource::Realized,
            },
        );
    }

    table.into_values().collect()
}

/// Last band month the forecast can drive: latest forecast period plus the lag.
pub fn terminal_month(forecast_pct: &Series, lag_months: u32) -> Option<MonthPeriod> {
    let last = forecast_pct.monthly().into_keys().next_back()?;
    last.add_months(i32::try_from(lag_months).ok()?)
}

pub fn daily_rate(monthly_rate: f64, days_per_period: f64) -> f64 {
    (1.0 + monthly_rate).powf(1.0 / days_per_period) - 1.0
}

pub fn build_schedule(config: &BandsConfig, realized: &Series, forecast_pct: &Series) -> ProjectionSchedule {
    let inflation = resolve_inflation(realized, forecast_pct);
    let Some(terminal) = terminal_month(forecast_pct, config.lag_months) else {
        return ProjectionSchedule {
            inflation,
            terminal: None,
            drivers: Vec::new(),
        };
    };

    let by_period: BTreeMap<MonthPeriod, &InflationPoint> = inflation.iter().map(|p| (p.period, p)).collect();
    let lag = i32::try_from(config.lag_months).unwrap_or(i32::MAX);

    let drivers = MonthPeriod::range_inclusive(config.phase2_first_month(), terminal)
        .into_iter()
        .map(|month| {
            let lagged = month.add_months(-lag);
            let reference = lagged.unwrap_or(month);
            let resolved = lagged.and_then(|r| by_period.range(..=r).next_back());
            let (resolved_from, monthly_rate, source) = match resolved {
                Some((period, point)) => (Some(*period), point.monthly_rate, point.source.into()),
                None => (None, 0.0, DriverSource::Held),
            };
            MonthlyDriver {
                month,
                reference,
                resolved_from,
                monthly_rate,
                daily_rate: daily_rate(monthly_rate, config.days_per_period),
                source,
            }
        })
        .collect::<Vec<_>>();

    let carried = drivers.iter().filter(|d| d.is_carried_forward()).count();
    let held = drivers.iter().filter(|d| d.source == DriverSource::Held).count();
    if carried > 0 || held > 0 {
        tracing::warn!(carried, held, "inflation gaps in projection window");
    }

    ProjectionSchedule {
        inflation,
        terminal: Some(terminal),
        drivers,
    }
}

/// Compound daily from `anchor`, starting the day after it and ending on the
/// last day of the terminal month.
pub fn build_indexed(anchor: &CorridorPoint, schedule: &ProjectionSchedule) -> Corridor {
    let (Some(end), Some(start)) = (schedule.terminal.and_then(MonthPeriod::last_day), anchor.date.succ_opt()) else {
        return Corridor::default();
    };
    let rates: BTreeMap<MonthPeriod, f64> = schedule.drivers.iter().map(|d| (d.month, d.daily_rate)).collect();

    let mut lower = anchor.lower;
    let mut upper = anchor.upper;
    let mut points = Vec::new();

    for (t, date) in start.iter_days().take_while(|d| *d <= end).enumerate() {
        if t > 0 {
            let r = rates.get(&MonthPeriod::from_date(date)).copied().unwrap_or(0.0);
            lower *= 1.0 - r;
            upper *= 1.0 + r;
        }
        points.push(CorridorPoint {
            date,
            lower,
            upper,
            phase: BandPhase::Indexed,
        });
    }

    Corridor::from_points(points)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    use super::*;
    use crate::domain::SeriesPoint;

    fn m(y: i32, mo: u32) -> MonthPeriod {
        MonthPeriod::new(y, mo).unwrap()
    }

    fn monthly(points: &[((i32, u32), f64)]) -> Series {
        Series::from_points(
            points
                .iter()
                .map(|((y, mo), v)| SeriesPoint::new(m(*y, *mo).first_day(), *v))
                .collect(),
        )
    }

    fn anchor() -> CorridorPoint {
        CorridorPoint {
            date: NaiveDate::from_ymd_opt(2025, 12, 31).unwrap(),
            lower: 950.0,
            upper: 1480.0,
            phase: BandPhase::Fixed,
        }
    }

    #[test]
    fn realized_takes_precedence_over_forecast() {
        let realized = monthly(&[((2025, 10), 0.023), ((2025, 11), 0.025)]);
        let forecast = monthly(&[((2025, 11), 2.1), ((2025, 12), 2.0)]);
        let table = resolve_inflation(&realized, &forecast);

        assert_eq!(table.len(), 3);
        assert_eq!(table[1].period, m(2025, 11));
        assert_eq!(table[1].source, RateSource::Realized);
        assert_relative_eq!(table[1].monthly_rate, 0.025);
        assert_eq!(table[2].source, RateSource::Forecast);
        assert_relative_eq!(table[2].monthly_rate, 0.02, epsilon = 1e-12);
    }

    #[test]
    fn missing_realized_value_does_not_mask_forecast() {
        let realized = monthly(&[((2025, 11), f64::NAN)]);
        let forecast = monthly(&[((2025, 11), 2.1)]);
        let table = resolve_inflation(&realized, &forecast);
        assert_eq!(table[0].source, RateSource::Forecast);
        assert_relative_eq!(table[0].monthly_rate, 0.021, epsilon = 1e-12);
    }

    #[test]
    fn month_is_driven_by_two_months_earlier() {
        let cfg = BandsConfig::default();
        let realized = monthly(&[((2025, 11), 0.025), ((2025, 12), 0.031)]);
        let forecast = monthly(&[((2026, 1), 2.2), ((2026, 2), 2.0)]);
        let schedule = build_schedule(&cfg, &realized, &forecast);

        assert_eq!(schedule.terminal, Some(m(2026, 4)));
        assert_eq!(schedule.drivers.len(), 4);

        let jan = schedule.driver(m(2026, 1)).unwrap();
        assert_eq!(jan.reference, m(2025, 11));
        assert_relative_eq!(jan.monthly_rate, 0.025);
        let apr = schedule.driver(m(2026, 4)).unwrap();
        assert_relative_eq!(apr.monthly_rate, 0.02, epsilon = 1e-12);
        assert_eq!(apr.source, DriverSource::Forecast);
    }

    #[test]
    fn changing_one_period_only_moves_the_lagged_month() {
        let cfg = BandsConfig::default();
        let forecast = monthly(&[((2025, 11), 2.0), ((2025, 12), 2.0), ((2026, 1), 2.0)]);
        let base = build_schedule(&cfg, &Series::empty(), &forecast);
        let bumped = build_schedule(&cfg, &monthly(&[((2025, 12), 0.05)]), &forecast);

        for (a, b) in base.drivers.iter().zip(&bumped.drivers) {
            if a.month == m(2026, 2) {
                assert_relative_eq!(b.monthly_rate, 0.05);
            } else {
                assert_eq!(a.monthly_rate, b.monthly_rate);
            }
        }
    }

    #[test]
    fn gap_is_carried_forward_from_latest_earlier_point() {
        let cfg = BandsConfig::default();
        // 2025-12 missing entirely; February should reuse November.
        let forecast = monthly(&[((2025, 11), 2.4), ((2026, 1), 2.0)]);
        let schedule = build_schedule(&cfg, &Series::empty(), &forecast);
        let feb = schedule.driver(m(2026, 2)).unwrap();
        assert_eq!(feb.resolved_from, Some(m(2025, 11)));
        assert!(feb.is_carried_forward());
        assert_relative_eq!(feb.monthly_rate, 0.024, epsilon = 1e-12);
    }

    #[test]
    fn no_earlier_point_holds_flat() {
        let cfg = BandsConfig::default();
        let forecast = monthly(&[((2026, 3), 2.0)]);
        let schedule = build_schedule(&cfg, &Series::empty(), &forecast);
        let jan = schedule.driver(m(2026, 1)).unwrap();
        assert_eq!(jan.source, DriverSource::Held);
        assert_eq!(jan.daily_rate, 0.0);
        assert_eq!(schedule.held_months(), 4);
    }

    #[test]
    fn empty_forecast_has_no_drivers() {
        let cfg = BandsConfig::default();
        let realized = monthly(&[((2025, 11), 0.025)]);
        let schedule = build_schedule(&cfg, &realized, &Series::empty());
        assert!(schedule.terminal.is_none());
        assert!(schedule.drivers.is_empty());
        assert_eq!(schedule.inflation.len(), 1);
        assert!(build_indexed(&anchor(), &schedule).is_empty());
    }

    #[test]
    fn lag_past_the_calendar_yields_no_indexed_phase() {
        let cfg = BandsConfig {
            lag_months: 200_000_000,
            ..BandsConfig::default()
        };
        let forecast = monthly(&[((2025, 11), 2.0)]);
        let schedule = build_schedule(&cfg, &Series::empty(), &forecast);
        assert!(schedule.terminal.is_none());
        assert!(schedule.drivers.is_empty());
        assert!(build_indexed(&anchor(), &schedule).is_empty());
    }

    #[test]
    fn first_projected_day_equals_anchor_then_compounds() {
        let cfg = BandsConfig::default();
        let realized = monthly(&[((2025, 11), 0.03)]);
        let forecast = monthly(&[((2025, 11), 2.0)]);
        let schedule = build_schedule(&cfg, &realized, &forecast);
        let corridor = build_indexed(&anchor(), &schedule);

        assert_eq!(corridor.len(), 31);
        let first = corridor.first().unwrap();
        assert_eq!(first.date, NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
        assert_eq!(first.lower, 950.0);
        assert_eq!(first.upper, 1480.0);

        let r = daily_rate(0.03, 30.0);
        let last = corridor.last().unwrap();
        assert_relative_eq!(last.lower, 950.0 * (1.0 - r).powi(30), max_relative = 1e-12);
        assert_relative_eq!(last.upper, 1480.0 * (1.0 + r).powi(30), max_relative = 1e-12);
        assert!(corridor.points().iter().all(|p| p.phase == BandPhase::Indexed));
    }

    #[test]
    fn daily_rate_compounds_back_to_monthly() {
        let r = daily_rate(0.025, 30.0);
        assert_relative_eq!((1.0 + r).powi(30) - 1.0, 0.025, epsilon = 1e-12);
    }
}
