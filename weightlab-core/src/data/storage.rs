//! Flat-file storage for snapshot tables and daily output.
//!
//! Layout under the data directory:
//!
//! ```text
//! {data_dir}/index_weight/index_weight_{CODE}.csv            snapshot history
//! {data_dir}/index_weight/index_weight_{CODE}.csv.meta.json  metadata sidecar
//! {data_dir}/index_weight_daily/index_weight_daily_{CODE}.{csv,parquet}
//! ```
//!
//! Features:
//! - Atomic writes (write to .tmp, rename into place)
//! - Corrupt snapshot tables are quarantined (`{file}.quarantined`) and
//!   treated as absent, which triggers a full fetch
//! - Metadata sidecar per snapshot table (row count, date range, BLAKE3 hash)

use super::provider::DataError;
use crate::domain::dates::yyyymmdd_opt;
use crate::domain::{
    DailyWeightRow, PriceRow, SnapshotRow, SnapshotTable, DAILY_COLUMNS, SNAPSHOT_COLUMNS,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

/// Output format of the expanded daily table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DailyFormat {
    #[default]
    Csv,
    Parquet,
}

impl DailyFormat {
    pub fn extension(self) -> &'static str {
        match self {
            DailyFormat::Csv => "csv",
            DailyFormat::Parquet => "parquet",
        }
    }
}

/// Resolves per-index file locations under one data directory.
#[derive(Debug, Clone)]
pub struct TableStore {
    data_dir: PathBuf,
}

impl TableStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Directory holding every snapshot table.
    pub fn snapshot_dir(&self) -> PathBuf {
        self.data_dir.join("index_weight")
    }

    /// `{data_dir}/index_weight/index_weight_{CODE}.csv`
    pub fn snapshot_path(&self, index_code: &str) -> PathBuf {
        self.snapshot_dir()
            .join(format!("index_weight_{}.csv", safe_code(index_code)))
    }

    /// `{data_dir}/index_weight_daily/index_weight_daily_{CODE}.{ext}`
    pub fn daily_path(&self, index_code: &str, format: DailyFormat) -> PathBuf {
        self.data_dir.join("index_weight_daily").join(format!(
            "index_weight_daily_{}.{}",
            safe_code(index_code),
            format.extension()
        ))
    }
}

/// File-name-safe index code: `000300.SH` → `000300_SH`.
pub fn safe_code(index_code: &str) -> String {
    index_code.replace('.', "_")
}

/// Metadata sidecar written next to every saved snapshot table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMeta {
    pub rows: usize,
    pub snapshots: usize,
    pub index_codes: Vec<String>,
    #[serde(with = "yyyymmdd_opt")]
    pub first_snapshot: Option<NaiveDate>,
    #[serde(with = "yyyymmdd_opt")]
    pub last_snapshot: Option<NaiveDate>,
    pub data_hash: String,
    pub written_at: chrono::NaiveDateTime,
}

fn sidecar_path(path: &Path) -> PathBuf {
    with_suffix(path, ".meta.json")
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn io_err(path: &Path, e: impl std::fmt::Display) -> DataError {
    DataError::Io(format!("{}: {e}", path.display()))
}

fn csv_err(path: &Path, e: impl std::fmt::Display) -> DataError {
    DataError::Csv(format!("{}: {e}", path.display()))
}

/// Write `bytes` to `path` via a temp file and rename.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), DataError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let tmp_path = with_suffix(path, ".tmp");
    fs::write(&tmp_path, bytes).map_err(|e| io_err(&tmp_path, e))?;
    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        io_err(path, format!("atomic rename failed: {e}"))
    })
}

/// Serialize rows under an explicit header so empty tables keep their schema.
fn to_csv_bytes<T: Serialize>(header: &[&str], rows: &[T]) -> Result<Vec<u8>, String> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(header).map_err(|e| e.to_string())?;
    for row in rows {
        writer.serialize(row).map_err(|e| e.to_string())?;
    }
    writer.into_inner().map_err(|e| e.to_string())
}

fn read_csv<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>, DataError> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| csv_err(path, e))?;
    reader
        .deserialize()
        .collect::<Result<Vec<T>, _>>()
        .map_err(|e| csv_err(path, e))
}

/// True if `path` exists and holds at least one row beyond the header.
pub fn has_data_rows(path: &Path) -> bool {
    match fs::metadata(path) {
        Ok(meta) if meta.len() > 0 => {}
        _ => return false,
    }
    let Ok(mut reader) = csv::ReaderBuilder::new().has_headers(true).from_path(path) else {
        return false;
    };
    let mut record = csv::StringRecord::new();
    match reader.read_record(&mut record) {
        Ok(found) => found,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "unreadable table, treating as missing");
            false
        }
    }
}

/// Read snapshot rows from any CSV with the snapshot columns. Unlike
/// [`load_snapshot_table`], parse failures are returned, not quarantined.
pub fn load_snapshot_rows(path: &Path) -> Result<Vec<SnapshotRow>, DataError> {
    read_csv(path)
}

/// Load a persisted snapshot table.
///
/// A missing file yields `None`. An unreadable or corrupt file is
/// quarantined and also yields `None`, so the caller falls back to a full
/// fetch instead of merging into bad data.
pub fn load_snapshot_table(path: &Path) -> Option<SnapshotTable> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no persisted snapshot table");
        return None;
    }

    match read_csv::<SnapshotRow>(path) {
        Ok(rows) => Some(SnapshotTable::new(rows)),
        Err(e) => {
            let quarantine = with_suffix(path, ".quarantined");
            tracing::warn!(
                path = %path.display(),
                quarantine = %quarantine.display(),
                error = %e,
                "corrupt snapshot table, quarantining and treating as absent"
            );
            let _ = fs::rename(path, &quarantine);
            None
        }
    }
}

/// Persist a snapshot table atomically and refresh its metadata sidecar.
pub fn save_snapshot_table(table: &SnapshotTable, path: &Path) -> Result<TableMeta, DataError> {
    let bytes = to_csv_bytes(&SNAPSHOT_COLUMNS, table.rows()).map_err(|e| csv_err(path, e))?;
    write_atomic(path, &bytes)?;

    let meta = TableMeta {
        rows: table.len(),
        snapshots: table.snapshot_count(),
        index_codes: table.index_codes(),
        first_snapshot: table.earliest_snapshot_date(),
        last_snapshot: table.latest_snapshot_date(),
        data_hash: blake3::hash(&bytes).to_hex().to_string(),
        written_at: chrono::Local::now().naive_local(),
    };
    let meta_json = serde_json::to_string_pretty(&meta)
        .map_err(|e| DataError::Other(format!("meta serialization: {e}")))?;
    write_atomic(&sidecar_path(path), meta_json.as_bytes())?;

    Ok(meta)
}

/// Metadata sidecar of a saved snapshot table, if present and readable.
pub fn read_meta(path: &Path) -> Option<TableMeta> {
    let content = fs::read_to_string(sidecar_path(path)).ok()?;
    serde_json::from_str(&content).ok()
}

/// Load raw price rows (`instrument` or `ts_code`, `trade_date`, `close`).
pub fn load_prices(path: &Path) -> Result<Vec<PriceRow>, DataError> {
    read_csv(path)
}

/// Write the expanded daily table as CSV (header always present).
pub fn save_daily(rows: &[DailyWeightRow], path: &Path) -> Result<(), DataError> {
    let bytes = to_csv_bytes(&DAILY_COLUMNS, rows).map_err(|e| csv_err(path, e))?;
    write_atomic(path, &bytes)
}

/// Read a daily CSV table back.
pub fn load_daily(path: &Path) -> Result<Vec<DailyWeightRow>, DataError> {
    read_csv(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, day).unwrap()
    }

    fn table() -> SnapshotTable {
        SnapshotTable::new(vec![
            SnapshotRow::new("000300.SH", "600519.SH", d(2, 28), 5.12),
            SnapshotRow::new("000300.SH", "300750.SZ", d(2, 28), 3.3),
        ])
    }

    #[test]
    fn store_paths_use_safe_codes() {
        let store = TableStore::new("data");
        assert_eq!(
            store.snapshot_path("000300.SH"),
            PathBuf::from("data/index_weight/index_weight_000300_SH.csv")
        );
        assert_eq!(
            store.daily_path("000905.SH", DailyFormat::Parquet),
            PathBuf::from("data/index_weight_daily/index_weight_daily_000905_SH.parquet")
        );
    }

    #[test]
    fn snapshot_table_roundtrip_with_meta() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/index_weight.csv");

        let meta = save_snapshot_table(&table(), &path).unwrap();
        assert_eq!(meta.rows, 2);
        assert_eq!(meta.snapshots, 1);
        assert_eq!(meta.last_snapshot, Some(d(2, 28)));

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("index_code,con_code,snapshot_date,weight\n"));
        assert!(text.contains("000300.SH,600519.SH,20250228,5.12"));

        assert_eq!(load_snapshot_table(&path), Some(table()));
        assert_eq!(read_meta(&path), Some(meta));
    }

    #[test]
    fn upstream_dump_with_trade_date_column_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.csv");
        fs::write(
            &path,
            "index_code,con_code,trade_date,weight\n000300.SH,600519.SH,20250228,5.12\n",
        )
        .unwrap();

        let loaded = load_snapshot_table(&path).unwrap();
        assert_eq!(loaded.rows()[0].snapshot_date, d(2, 28));
    }

    #[test]
    fn corrupt_table_is_quarantined_and_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index_weight.csv");
        fs::write(
            &path,
            "index_code,con_code,snapshot_date,weight\n000300.SH,A,not-a-date,0.5\n",
        )
        .unwrap();

        assert_eq!(load_snapshot_table(&path), None);
        assert!(!path.exists());
        assert!(dir.path().join("index_weight.csv.quarantined").exists());
    }

    #[test]
    fn missing_table_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load_snapshot_table(&dir.path().join("nope.csv")), None);
    }

    #[test]
    fn has_data_rows_checks_beyond_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.csv");

        assert!(!has_data_rows(&path));

        fs::write(&path, "a,b\n").unwrap();
        assert!(!has_data_rows(&path));

        fs::write(&path, "a,b\n1,2\n").unwrap();
        assert!(has_data_rows(&path));

        fs::write(&path, "").unwrap();
        assert!(!has_data_rows(&path));
    }

    #[test]
    fn empty_daily_output_keeps_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daily.csv");
        save_daily(&[], &path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "trade_date,snapshot_date,index_code,con_code,weight,drift_weight\n"
        );
        assert!(!has_data_rows(&path));
        assert!(load_daily(&path).unwrap().is_empty());
    }

    #[test]
    fn daily_roundtrip_keeps_missing_drift() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daily.csv");
        let rows = vec![
            DailyWeightRow {
                trade_date: d(3, 3),
                snapshot_date: d(2, 28),
                index_code: "000300.SH".into(),
                con_code: "A".into(),
                weight: 0.6,
                drift_weight: Some(0.61),
            },
            DailyWeightRow {
                trade_date: d(3, 3),
                snapshot_date: d(2, 28),
                index_code: "000300.SH".into(),
                con_code: "B".into(),
                weight: 0.4,
                drift_weight: None,
            },
        ];
        save_daily(&rows, &path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("20250303,20250228,000300.SH,B,0.4,\n"));
        assert_eq!(load_daily(&path).unwrap(), rows);
    }

    #[test]
    fn prices_load_with_ts_code_alias_and_blank_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prices.csv");
        fs::write(&path, "ts_code,trade_date,close\nA,20250303,10.5\nA,20250304,\n").unwrap();

        let prices = load_prices(&path).unwrap();
        assert_eq!(prices.len(), 2);
        assert_eq!(prices[0].instrument, "A");
        assert_eq!(prices[0].close, Some(10.5));
        assert_eq!(prices[1].close, None);
    }
}
