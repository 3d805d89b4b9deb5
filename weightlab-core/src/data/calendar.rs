//! Offline trading calendars.
//!
//! The live calendar comes from [`super::MarketDataSource::trading_days`].
//! For offline expansion the calendar is either read from a CSV export
//! (`cal_date[,is_open]`) or approximated by Monday to Friday.

use super::provider::DataError;
use crate::domain::parse_date;
use chrono::{Datelike, Days, NaiveDate, Weekday};
use std::collections::BTreeSet;
use std::path::Path;

/// Every Monday to Friday in `[start, end]`. Exchange holidays are not known.
pub fn weekday_calendar(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut days = Vec::new();
    let mut current = start;
    while current <= end {
        if !matches!(current.weekday(), Weekday::Sat | Weekday::Sun) {
            days.push(current);
        }
        match current.checked_add_days(Days::new(1)) {
            Some(next) => current = next,
            None => break,
        }
    }
    days
}

/// Load a calendar CSV with a `cal_date` column and an optional `is_open`
/// column. Closed days (`is_open != 1`) are skipped; the result is sorted
/// and distinct.
pub fn load_calendar(path: &Path) -> Result<Vec<NaiveDate>, DataError> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| DataError::Csv(format!("{}: {e}", path.display())))?;

    let headers = reader
        .headers()
        .map_err(|e| DataError::Csv(format!("{}: {e}", path.display())))?
        .clone();
    let date_col = headers
        .iter()
        .position(|h| h == "cal_date" || h == "trade_date")
        .ok_or_else(|| DataError::Csv(format!("{}: no cal_date column", path.display())))?;
    let open_col = headers.iter().position(|h| h == "is_open");

    let mut days = BTreeSet::new();
    for record in reader.records() {
        let record = record.map_err(|e| DataError::Csv(format!("{}: {e}", path.display())))?;
        if let Some(col) = open_col {
            if record.get(col).map(str::trim) != Some("1") {
                continue;
            }
        }
        let raw = record.get(date_col).unwrap_or_default();
        let day = parse_date(raw).ok_or_else(|| DataError::InvalidDate(raw.to_string()))?;
        days.insert(day);
    }
    Ok(days.into_iter().collect())
}
