//! First phase: deterministic corridor.
//!
//! For day offset `t` from the start date, with monthly rate `r` applied over
//! `p`-day periods:
//!
//! `lower(t) = lower0 * (1 - r)^(t/p)`, `upper(t) = upper0 * (1 + r)^(t/p)`

use crate::domain::{BandPhase, BandsConfig, Corridor, CorridorPoint};

/// Build the fixed-schedule corridor, one row per calendar day (both ends inclusive).
pub fn build_fixed(config: &BandsConfig) -> Corridor {
    let down = 1.0 - config.phase1_monthly_rate;
    let up = 1.0 + config.phase1_monthly_rate;

    let points = config
        .phase1_start
        .iter_days()
        .take_while(|d| *d <= config.phase1_end)
        .enumerate()
        .map(|(t, date)| {
            let periods = t as f64 / config.days_per_period;
            CorridorPoint {
                date,
                lower: config.lower0 * down.powf(periods),
                upper: config.upper0 * up.powf(periods),
                phase: BandPhase::Fixed,
            }
        })
        .collect();

    Corridor::from_points(points)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn starts_exactly_at_endpoints() {
        let corridor = build_fixed(&BandsConfig::default());
        let first = corridor.first().unwrap();
        assert_eq!(first.date, d(2025, 4, 14));
        assert_eq!(first.lower, 1000.0);
        assert_eq!(first.upper, 1400.0);
    }

    #[test]
    fn second_day_matches_published_schedule() {
        let corridor = build_fixed(&BandsConfig::default());
        let p = corridor.get(d(2025, 4, 15)).unwrap();
        assert_relative_eq!(p.lower, 1000.0 * 0.99_f64.powf(1.0 / 30.0), max_relative = 1e-12);
        assert_relative_eq!(p.upper, 1400.0 * 1.01_f64.powf(1.0 / 30.0), max_relative = 1e-12);
        assert!((p.lower - 999.665).abs() < 1e-3);
        assert!((p.upper - 1400.464).abs() < 1e-3);
    }

    #[test]
    fn covers_every_calendar_day_and_widens() {
        let corridor = build_fixed(&BandsConfig::default());
        assert_eq!(corridor.len(), 262);
        assert_eq!(corridor.last().unwrap().date, d(2025, 12, 31));
        for w in corridor.points().windows(2) {
            assert_eq!(w[1].date, w[0].date.succ_opt().unwrap());
            assert!(w[1].lower < w[0].lower);
            assert!(w[1].upper > w[0].upper);
        }
    }

    #[test]
    fn single_day_range() {
        let cfg = BandsConfig {
            phase1_start: d(2025, 4, 14),
            phase1_end: d(2025, 4, 14),
            ..BandsConfig::default()
        };
        assert_eq!(build_fixed(&cfg).len(), 1);
    }
}
