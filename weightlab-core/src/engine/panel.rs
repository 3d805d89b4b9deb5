//! Price panel: closes aligned to a trading-day axis, forward-filled.
//!
//! Unlike raw bar alignment, constituent prices ARE carried forward: a
//! missing close on day `d` takes the last known close on an earlier day of
//! the axis. Observations on dates outside the axis are discarded before the
//! fill, so nothing leaks in from non-trading days.

use crate::domain::PriceRow;
use chrono::NaiveDate;
use std::collections::{BTreeSet, HashMap};

/// Date-indexed, instrument-keyed close lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct PricePanel {
    /// The trading-day axis (sorted ascending, distinct).
    dates: Vec<NaiveDate>,
    /// Closes per instrument, aligned to `dates`.
    closes: HashMap<String, Vec<Option<f64>>>,
}

impl PricePanel {
    /// Build a panel from raw price rows restricted to `trading_days`.
    ///
    /// Rows with an empty instrument or a missing/non-finite close are
    /// dropped. Returns `None` when nothing usable remains.
    pub fn build(rows: &[PriceRow], trading_days: &[NaiveDate]) -> Option<Self> {
        let dates: Vec<NaiveDate> = trading_days
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if dates.is_empty() {
            return None;
        }

        let mut closes: HashMap<String, Vec<Option<f64>>> = HashMap::new();
        let mut usable = 0usize;
        for row in rows {
            let Some(close) = row.close.filter(|c| c.is_finite()) else {
                continue;
            };
            if row.instrument.is_empty() {
                continue;
            }
            usable += 1;
            let Ok(pos) = dates.binary_search(&row.trade_date) else {
                continue;
            };
            let series = closes
                .entry(row.instrument.clone())
                .or_insert_with(|| vec![None; dates.len()]);
            series[pos] = Some(close);
        }

        if usable == 0 {
            return None;
        }

        for series in closes.values_mut() {
            forward_fill(series);
        }

        Some(Self { dates, closes })
    }

    /// The panel's date axis.
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn contains_date(&self, date: NaiveDate) -> bool {
        self.dates.binary_search(&date).is_ok()
    }

    /// Instruments with at least one on-axis observation, sorted.
    pub fn instruments(&self) -> Vec<&str> {
        let mut out: Vec<&str> = self.closes.keys().map(String::as_str).collect();
        out.sort_unstable();
        out
    }

    /// Forward-filled close for `instrument` on `date`.
    ///
    /// `None` if the date is off-axis, the instrument is unknown, or no
    /// observation exists on or before `date`.
    pub fn get(&self, date: NaiveDate, instrument: &str) -> Option<f64> {
        let pos = self.dates.binary_search(&date).ok()?;
        self.closes.get(instrument)?.get(pos).copied().flatten()
    }
}

/// Carry each defined value forward over the following `None`s.
fn forward_fill(series: &mut [Option<f64>]) {
    let mut last = None;
    for slot in series.iter_mut() {
        match slot {
            Some(v) => last = Some(*v),
            None => *slot = last,
        }
    }
}
