//! Fixed-field row records for snapshots, prices and daily output.

use super::dates::yyyymmdd;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Column order of the persisted snapshot table.
pub const SNAPSHOT_COLUMNS: [&str; 4] = ["index_code", "con_code", "snapshot_date", "weight"];

/// Column order of the expanded daily output.
pub const DAILY_COLUMNS: [&str; 6] = [
    "trade_date",
    "snapshot_date",
    "index_code",
    "con_code",
    "weight",
    "drift_weight",
];

/// Identity of a snapshot row for merge purposes.
pub type SnapshotKey = (String, String, NaiveDate);

/// One constituent weight of one index as observed on one date.
///
/// Weights are treated as relative within an `(index_code, snapshot_date)`
/// group; they are not required to sum to one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRow {
    pub index_code: String,
    pub con_code: String,
    /// Upstream dumps name this column `trade_date`.
    #[serde(with = "yyyymmdd", alias = "trade_date")]
    pub snapshot_date: NaiveDate,
    pub weight: f64,
}

impl SnapshotRow {
    pub fn new(
        index_code: impl Into<String>,
        con_code: impl Into<String>,
        snapshot_date: NaiveDate,
        weight: f64,
    ) -> Self {
        Self {
            index_code: index_code.into(),
            con_code: con_code.into(),
            snapshot_date,
            weight,
        }
    }

    /// Dedup key: `(index_code, con_code, snapshot_date)`.
    pub fn key(&self) -> SnapshotKey {
        (
            self.index_code.clone(),
            self.con_code.clone(),
            self.snapshot_date,
        )
    }
}

/// A daily close for one instrument. `close` is `None` when the source had
/// no usable value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRow {
    /// Upstream dumps name this column `ts_code`.
    #[serde(alias = "ts_code")]
    pub instrument: String,
    #[serde(with = "yyyymmdd")]
    pub trade_date: NaiveDate,
    #[serde(default)]
    pub close: Option<f64>,
}

impl PriceRow {
    pub fn new(instrument: impl Into<String>, trade_date: NaiveDate, close: f64) -> Self {
        Self {
            instrument: instrument.into(),
            trade_date,
            close: Some(close),
        }
    }
}

/// One constituent's weight on one trading day.
///
/// `weight` is the anchor snapshot's static value. `drift_weight` is present
/// only when prices were supplied and the constituent had a usable base
/// price on the anchor date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyWeightRow {
    #[serde(with = "yyyymmdd")]
    pub trade_date: NaiveDate,
    #[serde(with = "yyyymmdd")]
    pub snapshot_date: NaiveDate,
    pub index_code: String,
    pub con_code: String,
    pub weight: f64,
    pub drift_weight: Option<f64>,
}
