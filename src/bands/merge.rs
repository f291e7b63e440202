//! Attach the observed reference rate to the corridor calendar.

use crate::domain::{Corridor, MergedRow, MergedView, Series};

/// Left join on the corridor's dates. Observations outside the corridor are
/// dropped; corridor days without an observation (weekends, holidays, future)
/// carry `None`.
pub fn merge_observations(corridor: &Corridor, observed: &Series) -> MergedView {
    let rows = corridor
        .points()
        .iter()
        .map(|p| MergedRow {
            date: p.date,
            lower: p.lower,
            upper: p.upper,
            observed: observed.get(p.date).filter(|v| v.is_finite()),
        })
        .collect();
    MergedView { rows }
}
