//! Data sources, retry, calendars and flat-file storage

pub mod calendar;
pub mod provider;
pub mod retry;
pub mod sink;
pub mod storage;
pub mod tushare;

pub use calendar::{load_calendar, weekday_calendar};
pub use provider::{DataError, MarketDataSource};
pub use retry::{retry, RetryPolicy};
pub use sink::{load_daily_parquet, sink_for, CsvSink, DailySink, ParquetSink};
pub use storage::{
    has_data_rows, load_daily, load_prices, load_snapshot_rows, load_snapshot_table, read_meta,
    save_daily, save_snapshot_table, DailyFormat, TableMeta, TableStore,
};
pub use tushare::TushareSource;
