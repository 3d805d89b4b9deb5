//! Refresh pipeline: fetch, merge, persist, expand.
//!
//! One index at a time:
//! 1. load the persisted snapshot table (corrupt files are quarantined)
//! 2. fetch only the dates after its latest snapshot
//! 3. merge and persist
//! 4. regenerate the daily expansion when the table changed or the daily
//!    output is missing or stops short of the latest trading day
//!
//! Any fatal error stops the run.

use crate::config::{today_cst, RefreshConfig};
use crate::data::retry::retry;
use crate::data::sink::{load_daily_parquet, sink_for};
use crate::data::storage::{
    has_data_rows, load_daily, load_snapshot_table, save_snapshot_table, DailyFormat, TableStore,
};
use crate::data::{DataError, MarketDataSource};
use crate::domain::SnapshotTable;
use crate::engine::{expand_to, fetch_window, refresh, ExpandOptions, FetchWindow, PricePanel};
use chrono::{Days, NaiveDate};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// What happened to one index during a run.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexOutcome {
    pub index_code: String,
    pub snapshot_path: PathBuf,
    /// Rows in the stored snapshot table after this run.
    pub table_rows: usize,
    /// Rows fetched this run, duplicates included.
    pub rows_added: usize,
    /// Change in snapshot table length.
    pub net_added: i64,
    /// Whether the snapshot table was written this run.
    pub saved: bool,
    /// Daily output, when it was regenerated.
    pub daily: Option<DailyOutcome>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyOutcome {
    pub path: PathBuf,
    pub rows: usize,
    /// Whether drift weights were computed.
    pub drift: bool,
}

/// Per-index outcomes of a full run, in configuration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub data_dir: PathBuf,
    pub outcomes: Vec<IndexOutcome>,
}

impl RunSummary {
    /// Plain-text report, one line per written table.
    pub fn render(&self) -> String {
        let mut out = String::from("Index weight refresh summary:");
        for outcome in &self.outcomes {
            let _ = write!(
                out,
                "\n- index_weight {}: {} rows (+{} fetched) -> {}",
                outcome.index_code,
                outcome.table_rows,
                outcome.rows_added,
                display_relative(&outcome.snapshot_path, &self.data_dir),
            );
            if !outcome.saved {
                out.push_str(" (unchanged)");
            }
            if let Some(daily) = &outcome.daily {
                let _ = write!(
                    out,
                    "\n- index_weight_daily {}: {} rows -> {}",
                    outcome.index_code,
                    daily.rows,
                    display_relative(&daily.path, &self.data_dir),
                );
                if !daily.drift {
                    out.push_str(" (no drift)");
                }
            }
        }
        out
    }

    /// Total rows fetched across all indices.
    pub fn rows_added(&self) -> usize {
        self.outcomes.iter().map(|o| o.rows_added).sum()
    }
}

fn display_relative(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .display()
        .to_string()
}

/// Refresh every configured index in order.
pub fn run(config: &RefreshConfig, source: &dyn MarketDataSource) -> Result<RunSummary, DataError> {
    config.validate(today_cst())?;
    let store = TableStore::new(&config.data_dir);

    tracing::info!(
        source = source.name(),
        indices = config.index_codes.len(),
        data_dir = %config.data_dir.display(),
        full_refresh = config.force_full_refresh,
        "starting refresh"
    );

    let mut summary = RunSummary {
        data_dir: config.data_dir.clone(),
        outcomes: Vec::with_capacity(config.index_codes.len()),
    };
    for index_code in &config.index_codes {
        summary
            .outcomes
            .push(refresh_index(config, source, &store, index_code)?);
    }
    Ok(summary)
}

/// Refresh one index: incremental fetch, merge, persist, expand.
pub fn refresh_index(
    config: &RefreshConfig,
    source: &dyn MarketDataSource,
    store: &TableStore,
    index_code: &str,
) -> Result<IndexOutcome, DataError> {
    let (start, end) = config.date_range(today_cst());
    let full_refresh = config.force_full_refresh;
    let snapshot_path = store.snapshot_path(index_code);

    let existing = load_snapshot_table(&snapshot_path);
    let fetched = match fetch_window(existing.as_ref(), start, end, full_refresh) {
        FetchWindow::UpToDate => {
            tracing::info!(index_code, %end, "snapshot table already up to date");
            Vec::new()
        }
        FetchWindow::Fetch { start, end } => {
            let label = format!("index_weight {index_code}");
            let rows = retry(&config.retry, &label, || {
                source.fetch_snapshots(index_code, start, end)
            })?;
            tracing::info!(index_code, %start, %end, rows = rows.len(), "fetched snapshots");
            rows
        }
    };

    let outcome = refresh(existing, fetched, full_refresh);
    tracing::info!(
        index_code,
        rows_added = outcome.rows_added,
        net_added = outcome.net_added,
        table_rows = outcome.table.len(),
        "merged snapshot history"
    );

    let mut saved = false;
    if outcome.rows_added > 0 || full_refresh {
        if outcome.table.is_empty() {
            tracing::warn!(
                index_code,
                path = %snapshot_path.display(),
                "merged table is empty, not overwriting"
            );
        } else {
            let meta = save_snapshot_table(&outcome.table, &snapshot_path)?;
            tracing::info!(
                index_code,
                path = %snapshot_path.display(),
                rows = meta.rows,
                snapshots = meta.snapshots,
                "snapshot table saved"
            );
            saved = true;
        }
    }

    // The daily output always follows the table on disk.
    let table = if saved || !outcome.table.is_empty() {
        outcome.table
    } else {
        load_snapshot_table(&snapshot_path).unwrap_or_default()
    };

    let daily_path = store.daily_path(index_code, config.daily_format);
    let daily = if config.generate_daily
        && (saved || !daily_is_current(config, source, &table, end, &daily_path)?)
    {
        Some(write_daily(config, source, &table, end, &daily_path)?)
    } else {
        None
    };

    Ok(IndexOutcome {
        index_code: index_code.to_string(),
        snapshot_path,
        table_rows: table.len(),
        rows_added: outcome.rows_added,
        net_added: outcome.net_added,
        saved,
        daily,
    })
}

/// Last trade date in a stored daily output, `None` when it is missing,
/// unreadable, or header-only.
fn last_daily_date(path: &Path, format: DailyFormat) -> Option<NaiveDate> {
    let rows = match format {
        DailyFormat::Csv if !has_data_rows(path) => return None,
        DailyFormat::Csv => load_daily(path),
        DailyFormat::Parquet if !path.exists() => return None,
        DailyFormat::Parquet => load_daily_parquet(path),
    };
    match rows {
        Ok(rows) => rows.iter().map(|r| r.trade_date).max(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "unreadable daily output, rebuilding");
            None
        }
    }
}

/// True when the daily output at `path` already reaches the last trading
/// day on or before `max(end, latest snapshot)`.
fn daily_is_current(
    config: &RefreshConfig,
    source: &dyn MarketDataSource,
    table: &SnapshotTable,
    end: NaiveDate,
    path: &Path,
) -> Result<bool, DataError> {
    let Some(covered) = last_daily_date(path, config.daily_format) else {
        return Ok(false);
    };
    let Some(latest) = table.latest_snapshot_date() else {
        return Ok(false);
    };
    let through = end.max(latest);
    let Some(next) = covered.checked_add_days(Days::new(1)) else {
        return Ok(true);
    };
    if next > through {
        return Ok(true);
    }

    let missing = retry(&config.retry, &format!("trade_cal {}", config.exchange), || {
        source.trading_days(&config.exchange, next, through)
    })?;
    if !missing.is_empty() {
        tracing::info!(
            path = %path.display(),
            %covered,
            %through,
            days = missing.len(),
            "daily output behind the calendar"
        );
    }
    Ok(missing.is_empty())
}

/// Expand `table` over the exchange calendar from its first snapshot to
/// `end` and write it to `path`.
fn write_daily(
    config: &RefreshConfig,
    source: &dyn MarketDataSource,
    table: &SnapshotTable,
    end: NaiveDate,
    path: &Path,
) -> Result<DailyOutcome, DataError> {
    let sink = sink_for(path, config.daily_format);
    let opts = ExpandOptions {
        normalization: config.weight_normalization,
    };

    let (Some(first), Some(latest)) = (table.earliest_snapshot_date(), table.latest_snapshot_date())
    else {
        let rows = expand_to(table, &[], Some(sink.as_ref()), None, &opts)?;
        return Ok(DailyOutcome {
            path: path.to_path_buf(),
            rows,
            drift: false,
        });
    };
    let end = end.max(latest);

    let calendar = retry(&config.retry, &format!("trade_cal {}", config.exchange), || {
        source.trading_days(&config.exchange, first, end)
    })?;
    tracing::info!(exchange = %config.exchange, %first, %end, days = calendar.len(), "trading calendar loaded");

    let panel = if config.drift {
        let instruments = table.instruments();
        let prices = retry(&config.retry, "daily prices", || {
            source.fetch_prices(&instruments, first, end)
        })?;
        let panel = PricePanel::build(&prices, &calendar);
        if panel.is_none() {
            tracing::warn!(
                instruments = instruments.len(),
                "no usable prices, drift weights left empty"
            );
        }
        panel
    } else {
        None
    };

    let rows = expand_to(table, &calendar, Some(sink.as_ref()), panel.as_ref(), &opts)?;
    Ok(DailyOutcome {
        path: path.to_path_buf(),
        rows,
        drift: panel.is_some(),
    })
}
