//! Domain types: snapshot, price and daily weight rows

pub mod dates;
pub mod rows;
pub mod table;

pub use dates::{format_date, parse_date};
pub use rows::{
    DailyWeightRow, PriceRow, SnapshotKey, SnapshotRow, DAILY_COLUMNS, SNAPSHOT_COLUMNS,
};
pub use table::{Snapshot, SnapshotTable};
