//! Band projector: fixed schedule, inflation-indexed continuation, and the
//! merge against observed rates.

use crate::domain::{BandsConfig, Corridor, Series};

mod fixed;
mod indexed;
mod merge;

pub use fixed::build_fixed;
pub use indexed::{
    DriverSource, MonthlyDriver, ProjectionSchedule, build_indexed, build_schedule, daily_rate, resolve_inflation,
    terminal_month,
};
pub use merge::merge_observations;

/// Full corridor plus the monthly schedule that drove its second phase.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub corridor: Corridor,
    pub schedule: ProjectionSchedule,
}

/// Build the two-phase corridor.
///
/// `realized` is monthly inflation as a decimal; `forecast_pct` is the survey
/// median in percent. With no forecast the corridor ends with the fixed phase.
pub fn project(config: &BandsConfig, realized: &Series, forecast_pct: &Series) -> Projection {
    let fixed = build_fixed(config);
    let schedule = build_schedule(config, realized, forecast_pct);

    let indexed = match fixed.last() {
        Some(anchor) => build_indexed(anchor, &schedule),
        None => Corridor::default(),
    };
    tracing::debug!(
        fixed_days = fixed.len(),
        indexed_days = indexed.len(),
        terminal = ?schedule.terminal.map(|m| m.to_string()),
        "corridor projected"
    );

    Projection {
        corridor: Corridor::concat(fixed, indexed),
        schedule,
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    use super::*;
    use crate::domain::{BandPhase, MonthPeriod, SeriesPoint};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn monthly(points: &[(MonthPeriod, f64)]) -> Series {
        Series::from_points(points.iter().map(|(p, v)| SeriesPoint::new(p.first_day(), *v)).collect())
    }

    fn m(y: i32, mo: u32) -> MonthPeriod {
        MonthPeriod::new(y, mo).unwrap()
    }

    #[test]
    fn empty_forecast_yields_fixed_phase_only() {
        let cfg = BandsConfig::default();
        let p = project(&cfg, &Series::empty(), &Series::empty());
        assert_eq!(p.corridor, build_fixed(&cfg));
        assert_eq!(p.corridor.phase_len(BandPhase::Indexed), 0);
    }

    #[test]
    fn phases_join_without_gap_or_jump() {
        let cfg = BandsConfig::default();
        let forecast = monthly(&[(m(2025, 11), 2.3), (m(2025, 12), 2.1), (m(2026, 1), 2.0)]);
        let p = project(&cfg, &Series::empty(), &forecast);

        let last_fixed = p.corridor.get(d(2025, 12, 31)).unwrap();
        let first_indexed = p.corridor.get(d(2026, 1, 1)).unwrap();
        assert_eq!(last_fixed.phase, BandPhase::Fixed);
        assert_eq!(first_indexed.phase, BandPhase::Indexed);
        assert_eq!(first_indexed.lower, last_fixed.lower);
        assert_eq!(first_indexed.upper, last_fixed.upper);

        // Terminal is the last forecast period plus two months.
        assert_eq!(p.corridor.last().unwrap().date, d(2026, 3, 31));
        for w in p.corridor.points().windows(2) {
            assert_eq!(w[1].date, w[0].date.succ_opt().unwrap());
        }
    }

    #[test]
    fn summary_date_is_inside_projection() {
        let cfg = BandsConfig::default();
        let forecast = monthly(&[(m(2025, 11), 2.3)]);
        let p = project(&cfg, &Series::empty(), &forecast);
        let row = p.corridor.get(cfg.summary_date).unwrap();
        let r = daily_rate(0.023, 30.0);
        let anchor = p.corridor.get(d(2025, 12, 31)).unwrap();
        assert_relative_eq!(row.upper, anchor.upper * (1.0 + r).powi(30), max_relative = 1e-12);
    }

    #[test]
    fn mid_month_fixed_end_continues_next_day() {
        let cfg = BandsConfig {
            phase1_end: d(2025, 12, 15),
            ..BandsConfig::default()
        };
        let forecast = monthly(&[(m(2025, 10), 2.0)]);
        let p = project(&cfg, &Series::empty(), &forecast);
        let first_indexed = p.corridor.get(d(2025, 12, 16)).unwrap();
        assert_eq!(first_indexed.phase, BandPhase::Indexed);
        assert_eq!(p.corridor.last().unwrap().date, d(2025, 12, 31));
    }

    proptest! {
        #[test]
        fn bounds_move_monotonically(rate_pct in 0.05f64..15.0, months in 1usize..12) {
            let cfg = BandsConfig::default();
            let points: Vec<_> = (0..months).map(|i| (m(2025, 11).add_months(i as i32).unwrap(), rate_pct)).collect();
            let p = project(&cfg, &Series::empty(), &monthly(&points));

            for w in p.corridor.points().windows(2) {
                prop_assert!(w[0].lower <= w[0].upper);
                prop_assert!(w[1].lower <= w[0].lower);
                prop_assert!(w[1].upper >= w[0].upper);
                if w[0].phase == BandPhase::Indexed {
                    prop_assert!(w[1].lower < w[0].lower);
                    prop_assert!(w[1].upper > w[0].upper);
                }
            }
        }
    }
}
