//! Refresh pipeline runs against an in-memory source and a temp data dir.

use chrono::NaiveDate;
use std::path::Path;
use std::sync::Mutex;
use weightlab_core::config::RefreshConfig;
use weightlab_core::data::{
    load_daily, load_daily_parquet, load_snapshot_table, read_meta, weekday_calendar, DailyFormat,
    DataError, MarketDataSource, RetryPolicy, TableStore,
};
use weightlab_core::domain::{PriceRow, SnapshotRow};

fn d(m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, m, day).unwrap()
}

/// Serves rows from shared vectors so tests can publish new snapshots
/// between runs.
#[derive(Default)]
struct MemorySource {
    snapshots: Mutex<Vec<SnapshotRow>>,
    prices: Vec<PriceRow>,
    requests: Mutex<Vec<(String, NaiveDate, NaiveDate)>>,
}

impl MemorySource {
    fn publish(&self, rows: Vec<SnapshotRow>) {
        self.snapshots.lock().unwrap().extend(rows);
    }

    fn last_request(&self) -> (String, NaiveDate, NaiveDate) {
        self.requests.lock().unwrap().last().cloned().unwrap()
    }
}

impl MarketDataSource for MemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    fn fetch_snapshots(
        &self,
        index_code: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<SnapshotRow>, DataError> {
        self.requests
            .lock()
            .unwrap()
            .push((index_code.to_string(), start, end));
        Ok(self
            .snapshots
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.index_code == index_code)
            .filter(|r| r.snapshot_date >= start && r.snapshot_date <= end)
            .cloned()
            .collect())
    }

    fn fetch_prices(
        &self,
        instruments: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceRow>, DataError> {
        Ok(self
            .prices
            .iter()
            .filter(|p| instruments.contains(&p.instrument))
            .filter(|p| p.trade_date >= start && p.trade_date <= end)
            .cloned()
            .collect())
    }

    fn trading_days(
        &self,
        _exchange: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NaiveDate>, DataError> {
        Ok(weekday_calendar(start, end))
    }
}

fn source() -> MemorySource {
    let source = MemorySource {
        prices: vec![
            PriceRow::new("A", d(2, 28), 10.0),
            PriceRow::new("B", d(2, 28), 20.0),
            PriceRow::new("C", d(2, 28), 30.0),
            PriceRow::new("A", d(3, 31), 13.0),
            PriceRow::new("B", d(3, 31), 23.0),
            PriceRow::new("C", d(3, 31), 34.0),
            PriceRow::new("X", d(2, 28), 5.0),
        ],
        ..MemorySource::default()
    };
    source.publish(vec![
        SnapshotRow::new("000300.SH", "A", d(2, 28), 0.6),
        SnapshotRow::new("000300.SH", "B", d(2, 28), 0.4),
        SnapshotRow::new("000905.SH", "X", d(2, 28), 1.0),
    ]);
    source
}

fn config(dir: &Path, end: NaiveDate) -> RefreshConfig {
    RefreshConfig {
        data_dir: dir.to_path_buf(),
        index_codes: vec!["000300.SH".into(), "000905.SH".into()],
        start_date: Some(d(2, 1)),
        end_date: Some(end),
        retry: RetryPolicy::immediate(2),
        ..RefreshConfig::default()
    }
}

#[test]
fn refreshes_every_configured_index() {
    let dir = tempfile::tempdir().unwrap();
    let source = source();
    let summary = weightlab_core::run(&config(dir.path(), d(3, 7)), &source).unwrap();

    assert_eq!(summary.outcomes.len(), 2);
    assert_eq!(summary.outcomes[0].index_code, "000300.SH");
    assert_eq!(summary.outcomes[0].table_rows, 2);
    assert_eq!(summary.outcomes[1].index_code, "000905.SH");
    assert_eq!(summary.outcomes[1].table_rows, 1);
    assert_eq!(summary.rows_added(), 3);

    let store = TableStore::new(dir.path());
    // 02-28 plus 03-03..03-07
    let daily = load_daily(&store.daily_path("000300.SH", DailyFormat::Csv)).unwrap();
    assert_eq!(daily.len(), 6 * 2);
    let daily = load_daily(&store.daily_path("000905.SH", DailyFormat::Csv)).unwrap();
    assert_eq!(daily.len(), 6);
    assert!(daily.iter().all(|r| r.drift_weight == Some(1.0)));
}

#[test]
fn new_snapshot_is_merged_incrementally() {
    let dir = tempfile::tempdir().unwrap();
    let source = source();
    weightlab_core::run(&config(dir.path(), d(3, 7)), &source).unwrap();

    source.publish(vec![
        SnapshotRow::new("000300.SH", "A", d(3, 31), 0.7),
        SnapshotRow::new("000300.SH", "C", d(3, 31), 0.3),
    ]);
    let summary = weightlab_core::run(&config(dir.path(), d(3, 31)), &source).unwrap();

    // 000905.SH was asked only for the days after its last snapshot
    assert_eq!(source.last_request(), ("000905.SH".to_string(), d(3, 1), d(3, 31)));

    let outcome = &summary.outcomes[0];
    assert_eq!(outcome.rows_added, 2);
    assert_eq!(outcome.net_added, 2);
    assert_eq!(outcome.table_rows, 4);
    assert!(outcome.saved);

    let store = TableStore::new(dir.path());
    let table = load_snapshot_table(&store.snapshot_path("000300.SH")).unwrap();
    assert_eq!(table.latest_snapshot_date(), Some(d(3, 31)));
    assert_eq!(read_meta(&store.snapshot_path("000300.SH")).unwrap().snapshots, 2);

    let daily = load_daily(&outcome.daily.as_ref().unwrap().path).unwrap();
    let on_31 = daily.iter().filter(|r| r.trade_date == d(3, 31));
    let codes: Vec<&str> = on_31.map(|r| r.con_code.as_str()).collect();
    assert_eq!(codes, vec!["A", "C"]);
    // Daily history is rebuilt from the first snapshot
    assert_eq!(daily.first().unwrap().trade_date, d(2, 28));
}

#[test]
fn refetched_rows_do_not_duplicate_history() {
    let dir = tempfile::tempdir().unwrap();
    let source = source();
    let cfg = RefreshConfig {
        force_full_refresh: true,
        ..config(dir.path(), d(3, 7))
    };

    weightlab_core::run(&cfg, &source).unwrap();
    let summary = weightlab_core::run(&cfg, &source).unwrap();

    let outcome = &summary.outcomes[0];
    assert_eq!(outcome.rows_added, 2);
    assert_eq!(outcome.net_added, 0);
    assert_eq!(outcome.table_rows, 2);
}

#[test]
fn corrupt_table_triggers_full_fetch() {
    let dir = tempfile::tempdir().unwrap();
    let source = source();
    let cfg = config(dir.path(), d(3, 7));
    weightlab_core::run(&cfg, &source).unwrap();

    let store = TableStore::new(dir.path());
    let path = store.snapshot_path("000300.SH");
    std::fs::write(&path, "index_code,con_code,snapshot_date,weight\n000300.SH,A,garbage,x\n")
        .unwrap();

    let summary = weightlab_core::run(&cfg, &source).unwrap();
    assert_eq!(summary.outcomes[0].rows_added, 2);
    assert_eq!(summary.outcomes[0].table_rows, 2);
    assert!(dir
        .path()
        .join("index_weight/index_weight_000300_SH.csv.quarantined")
        .exists());
    assert_eq!(load_snapshot_table(&path).unwrap().len(), 2);
}

#[test]
fn parquet_daily_output() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = RefreshConfig {
        index_codes: vec!["000300.SH".into()],
        daily_format: DailyFormat::Parquet,
        ..config(dir.path(), d(3, 4))
    };
    let summary = weightlab_core::run(&cfg, &source()).unwrap();

    let daily = summary.outcomes[0].daily.as_ref().unwrap();
    assert!(daily.path.ends_with("index_weight_daily/index_weight_daily_000300_SH.parquet"));
    assert_eq!(load_daily_parquet(&daily.path).unwrap().len(), 3 * 2);

    // A second run finds the parquet output and leaves it alone
    let again = weightlab_core::run(&cfg, &source()).unwrap();
    assert!(again.outcomes[0].daily.is_none());
}

#[test]
fn invalid_config_is_rejected_before_any_fetch() {
    let dir = tempfile::tempdir().unwrap();
    let source = source();
    let cfg = RefreshConfig {
        start_date: Some(d(4, 1)),
        ..config(dir.path(), d(3, 1))
    };

    let err = weightlab_core::run(&cfg, &source).unwrap_err();
    assert!(matches!(err, DataError::Config(_)));
    assert!(source.requests.lock().unwrap().is_empty());
}

#[test]
fn daily_output_follows_the_calendar_between_snapshots() {
    let dir = tempfile::tempdir().unwrap();
    let source = source();
    let single = |end| RefreshConfig {
        index_codes: vec!["000300.SH".into()],
        ..config(dir.path(), end)
    };
    weightlab_core::run(&single(d(3, 7)), &source).unwrap();

    // 03-09 is a Sunday: nothing new to cover
    let weekend = weightlab_core::run(&single(d(3, 9)), &source).unwrap();
    assert!(weekend.outcomes[0].daily.is_none());

    let summary = weightlab_core::run(&single(d(3, 14)), &source).unwrap();
    let outcome = &summary.outcomes[0];
    assert_eq!(outcome.rows_added, 0);
    assert!(!outcome.saved);

    let daily = load_daily(&outcome.daily.as_ref().unwrap().path).unwrap();
    // 02-28 plus 03-03..03-14
    assert_eq!(daily.len(), 11 * 2);
    assert_eq!(daily.last().unwrap().trade_date, d(3, 14));
    assert!(daily.iter().all(|r| r.drift_weight.is_some()));
}

#[test]
fn empty_full_refresh_keeps_stored_history_and_daily_output() {
    let dir = tempfile::tempdir().unwrap();
    let source = source();
    let store = TableStore::new(dir.path());
    let daily_path = store.daily_path("000300.SH", DailyFormat::Csv);
    let base = RefreshConfig {
        index_codes: vec!["000300.SH".into()],
        ..config(dir.path(), d(3, 4))
    };
    weightlab_core::run(&base, &source).unwrap();
    assert_eq!(load_daily(&daily_path).unwrap().len(), 3 * 2);

    let full = |start, end| RefreshConfig {
        force_full_refresh: true,
        start_date: Some(start),
        end_date: Some(end),
        ..base.clone()
    };

    // Nothing published in the window: both files stay as they were
    let summary = weightlab_core::run(&full(d(3, 1), d(3, 4)), &source).unwrap();
    let outcome = &summary.outcomes[0];
    assert_eq!(outcome.rows_added, 0);
    assert!(!outcome.saved);
    assert_eq!(outcome.table_rows, 2);
    assert!(outcome.daily.is_none());
    assert_eq!(load_snapshot_table(&store.snapshot_path("000300.SH")).unwrap().len(), 2);
    assert_eq!(load_daily(&daily_path).unwrap().len(), 3 * 2);

    // A later end date extends the daily output from the stored table
    let summary = weightlab_core::run(&full(d(3, 5), d(3, 6)), &source).unwrap();
    assert_eq!(summary.outcomes[0].daily.as_ref().unwrap().rows, 5 * 2);
    let daily = load_daily(&daily_path).unwrap();
    assert_eq!(daily.first().unwrap().trade_date, d(2, 28));
    assert_eq!(daily.last().unwrap().trade_date, d(3, 6));
}
