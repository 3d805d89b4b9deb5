//! Durable targets for the expanded daily table.

use super::provider::DataError;
use super::storage::{save_daily, write_atomic, DailyFormat};
use crate::domain::DailyWeightRow;
use chrono::NaiveDate;
use polars::prelude::*;
use std::path::{Path, PathBuf};

/// Where expanded daily rows are persisted.
pub trait DailySink: Send + Sync {
    /// Replace the target's contents with `rows`.
    fn write(&self, rows: &[DailyWeightRow]) -> Result<(), DataError>;

    /// Human-readable target, for logs.
    fn describe(&self) -> String;
}

/// CSV file target.
#[derive(Debug, Clone)]
pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DailySink for CsvSink {
    fn write(&self, rows: &[DailyWeightRow]) -> Result<(), DataError> {
        save_daily(rows, &self.path)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Parquet file target with the same six columns as the CSV output.
#[derive(Debug, Clone)]
pub struct ParquetSink {
    path: PathBuf,
}

impl ParquetSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DailySink for ParquetSink {
    fn write(&self, rows: &[DailyWeightRow]) -> Result<(), DataError> {
        let mut df = rows_to_dataframe(rows)?;
        let mut buf = Vec::new();
        ParquetWriter::new(&mut buf)
            .finish(&mut df)
            .map_err(|e| DataError::Parquet(format!("write parquet: {e}")))?;
        write_atomic(&self.path, &buf)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Sink for `path` in the given format.
pub fn sink_for(path: impl Into<PathBuf>, format: DailyFormat) -> Box<dyn DailySink> {
    match format {
        DailyFormat::Csv => Box::new(CsvSink::new(path)),
        DailyFormat::Parquet => Box::new(ParquetSink::new(path)),
    }
}

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

fn days_since_epoch(date: NaiveDate) -> i32 {
    (date - epoch()).num_days() as i32
}

fn rows_to_dataframe(rows: &[DailyWeightRow]) -> Result<DataFrame, DataError> {
    let trade_dates: Vec<i32> = rows.iter().map(|r| days_since_epoch(r.trade_date)).collect();
    let snapshot_dates: Vec<i32> = rows
        .iter()
        .map(|r| days_since_epoch(r.snapshot_date))
        .collect();
    let index_codes: Vec<String> = rows.iter().map(|r| r.index_code.clone()).collect();
    let con_codes: Vec<String> = rows.iter().map(|r| r.con_code.clone()).collect();
    let weights: Vec<f64> = rows.iter().map(|r| r.weight).collect();
    let drift: Vec<Option<f64>> = rows.iter().map(|r| r.drift_weight).collect();

    let date_col = |name: &str, values: Vec<i32>| {
        Column::new(name.into(), values)
            .cast(&DataType::Date)
            .map_err(|e| DataError::Parquet(format!("{name} cast: {e}")))
    };

    DataFrame::new(vec![
        date_col("trade_date", trade_dates)?,
        date_col("snapshot_date", snapshot_dates)?,
        Column::new("index_code".into(), index_codes),
        Column::new("con_code".into(), con_codes),
        Column::new("weight".into(), weights),
        Column::new("drift_weight".into(), drift),
    ])
    .map_err(|e| DataError::Parquet(format!("dataframe creation: {e}")))
}

/// Read a daily parquet file back into rows.
pub fn load_daily_parquet(path: &Path) -> Result<Vec<DailyWeightRow>, DataError> {
    let map_err = |e: PolarsError| DataError::Parquet(format!("{}: {e}", path.display()));

    let file = std::fs::File::open(path)
        .map_err(|e| DataError::Io(format!("{}: {e}", path.display())))?;
    let df = ParquetReader::new(file).finish().map_err(map_err)?;

    let trade_dates = df.column("trade_date").map_err(map_err)?.date().map_err(map_err)?;
    let snapshot_dates = df.column("snapshot_date").map_err(map_err)?.date().map_err(map_err)?;
    let index_codes = df.column("index_code").map_err(map_err)?.str().map_err(map_err)?;
    let con_codes = df.column("con_code").map_err(map_err)?.str().map_err(map_err)?;
    let weights = df.column("weight").map_err(map_err)?.f64().map_err(map_err)?;
    let drift = df.column("drift_weight").map_err(map_err)?.f64().map_err(map_err)?;

    let null_at = |col: &str, i: usize| DataError::Parquet(format!("null {col} at row {i}"));
    let to_date = |days: i32| epoch() + chrono::Duration::days(days as i64);

    let mut rows = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        rows.push(DailyWeightRow {
            trade_date: to_date(trade_dates.get(i).ok_or_else(|| null_at("trade_date", i))?),
            snapshot_date: to_date(
                snapshot_dates
                    .get(i)
                    .ok_or_else(|| null_at("snapshot_date", i))?,
            ),
            index_code: index_codes
                .get(i)
                .ok_or_else(|| null_at("index_code", i))?
                .to_string(),
            con_code: con_codes
                .get(i)
                .ok_or_else(|| null_at("con_code", i))?
                .to_string(),
            weight: weights.get(i).ok_or_else(|| null_at("weight", i))?,
            drift_weight: drift.get(i),
        });
    }
    Ok(rows)
}
