//! Snapshot-to-daily expansion.
//!
//! Each index partition is segmented against the full calendar; every
//! interval emits one row per `(day, constituent)` of its anchor snapshot.
//! Partitions are independent, so they are expanded in parallel and
//! concatenated in index-code order.

use super::drift::drift_weights;
use super::panel::PricePanel;
use super::segment::segment;
use crate::data::sink::DailySink;
use crate::data::DataError;
use crate::domain::{DailyWeightRow, Snapshot, SnapshotTable};
use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// How static snapshot weights are emitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightNormalization {
    /// Emit source weights unchanged, whatever their sum.
    #[default]
    AsIs,
    /// Rescale each snapshot's weights to sum to one. Snapshots with a
    /// zero or non-finite sum are emitted unchanged.
    UnitSum,
}

/// Options for [`expand`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpandOptions {
    pub normalization: WeightNormalization,
}

/// Expand a snapshot table into daily rows over `trading_days`.
///
/// `drift_weight` is filled only when a panel is supplied.
pub fn expand(
    table: &SnapshotTable,
    trading_days: &[NaiveDate],
    price_panel: Option<&PricePanel>,
    opts: &ExpandOptions,
) -> Vec<DailyWeightRow> {
    if table.is_empty() {
        return Vec::new();
    }

    let calendar: Vec<NaiveDate> = trading_days
        .iter()
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let partitions: Vec<(String, Vec<Snapshot>)> = table.partitions().into_iter().collect();

    partitions
        .par_iter()
        .map(|(index_code, snapshots)| {
            expand_partition(index_code, snapshots, &calendar, price_panel, opts)
        })
        .collect::<Vec<_>>()
        .into_iter()
        .flatten()
        .collect()
}

/// Expand and, when a sink is given, persist the result. Returns the row
/// count. An empty table still writes a header-only output.
pub fn expand_to(
    table: &SnapshotTable,
    trading_days: &[NaiveDate],
    sink: Option<&dyn DailySink>,
    price_panel: Option<&PricePanel>,
    opts: &ExpandOptions,
) -> Result<usize, DataError> {
    let rows = expand(table, trading_days, price_panel, opts);
    if let Some(sink) = sink {
        sink.write(&rows)?;
        tracing::info!(rows = rows.len(), target = %sink.describe(), "daily weights written");
    }
    Ok(rows.len())
}

fn expand_partition(
    index_code: &str,
    snapshots: &[Snapshot],
    calendar: &[NaiveDate],
    price_panel: Option<&PricePanel>,
    opts: &ExpandOptions,
) -> Vec<DailyWeightRow> {
    let snapshot_dates: Vec<NaiveDate> = snapshots.iter().map(|s| s.date).collect();
    let intervals = segment(&snapshot_dates, calendar);

    let mut rows = Vec::new();
    for interval in &intervals {
        let Ok(pos) = snapshots.binary_search_by_key(&interval.snapshot_date, |s| s.date) else {
            continue;
        };
        let snapshot = &snapshots[pos];
        let weights = static_weights(snapshot, opts.normalization);
        let drift = price_panel.map(|panel| drift_weights(interval, &snapshot.constituents, panel));

        rows.reserve(interval.days.len() * snapshot.constituents.len());
        for (day_idx, &trade_date) in interval.days.iter().enumerate() {
            for (con_idx, (con_code, _)) in snapshot.constituents.iter().enumerate() {
                rows.push(DailyWeightRow {
                    trade_date,
                    snapshot_date: snapshot.date,
                    index_code: index_code.to_string(),
                    con_code: con_code.clone(),
                    weight: weights[con_idx],
                    drift_weight: drift.as_ref().and_then(|g| g.get(day_idx, con_idx)),
                });
            }
        }
    }

    tracing::debug!(
        index_code,
        snapshots = snapshots.len(),
        intervals = intervals.len(),
        rows = rows.len(),
        "partition expanded"
    );
    rows
}

fn static_weights(snapshot: &Snapshot, normalization: WeightNormalization) -> Vec<f64> {
    let raw = snapshot.constituents.iter().map(|(_, w)| *w);
    match normalization {
        WeightNormalization::AsIs => raw.collect(),
        WeightNormalization::UnitSum => {
            let sum = snapshot.weight_sum();
            if sum == 0.0 || !sum.is_finite() {
                raw.collect()
            } else {
                raw.map(|w| w / sum).collect()
            }
        }
    }
}
