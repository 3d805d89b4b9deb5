//! Drift weights: snapshot weights floated with relative price performance.
//!
//! For constituent `c` with base close `P_c(s)` on the anchor date `s`:
//!
//! ```text
//! raw_c(d)   = w_c * P_c(d) / P_c(s)
//! drift_c(d) = raw_c(d) / Σ_valid raw(d)
//! ```
//!
//! Constituents without a usable base close are left out of both the
//! numerator and the denominator; they are not treated as zero weight.

use super::panel::PricePanel;
use super::segment::Interval;

/// Drift weights for one interval, indexed `[day][constituent]` in interval
/// day order and snapshot constituent order.
#[derive(Debug, Clone, PartialEq)]
pub struct DriftGrid {
    values: Vec<Vec<Option<f64>>>,
}

impl DriftGrid {
    /// Drift weight of constituent `con_idx` on interval day `day_idx`.
    pub fn get(&self, day_idx: usize, con_idx: usize) -> Option<f64> {
        self.values.get(day_idx)?.get(con_idx).copied().flatten()
    }

    /// Number of days covered.
    pub fn days(&self) -> usize {
        self.values.len()
    }

    /// Sum of the defined drift weights on one day.
    pub fn day_sum(&self, day_idx: usize) -> Option<f64> {
        let day = self.values.get(day_idx)?;
        let mut defined = day.iter().flatten().peekable();
        defined.peek()?;
        Some(defined.sum())
    }
}

/// Compute drift weights for `interval` from the anchor snapshot's
/// `(con_code, weight)` set.
pub fn drift_weights(
    interval: &Interval,
    constituents: &[(String, f64)],
    panel: &PricePanel,
) -> DriftGrid {
    // Base close per constituent; None excludes it for the whole interval.
    let bases: Vec<Option<f64>> = constituents
        .iter()
        .map(|(code, weight)| {
            if !weight.is_finite() {
                return None;
            }
            panel
                .get(interval.snapshot_date, code)
                .filter(|p| p.is_finite() && *p != 0.0)
        })
        .collect();

    let values = interval
        .days
        .iter()
        .map(|&day| {
            let raw: Vec<Option<f64>> = constituents
                .iter()
                .zip(&bases)
                .map(|((code, weight), base)| {
                    let base = (*base)?;
                    let price = panel.get(day, code)?;
                    Some(weight * price / base)
                })
                .collect();

            let sum: f64 = raw.iter().flatten().sum();
            if sum == 0.0 || !sum.is_finite() {
                return vec![None; constituents.len()];
            }
            raw.into_iter().map(|r| r.map(|v| v / sum)).collect()
        })
        .collect();

    DriftGrid { values }
}
