//! WeightLab CLI: refresh, expand, and status commands.
//!
//! Commands:
//! - `refresh`: fetch new snapshots from Tushare, merge, persist, expand to daily rows
//! - `expand`: offline expansion of a snapshot CSV (optional prices and calendar)
//! - `status`: report stored snapshot tables and their date ranges

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use weightlab_core::config::{parse_index_codes, today_cst, RefreshConfig};
use weightlab_core::data::{
    load_calendar, load_prices, load_snapshot_rows, read_meta, sink_for, weekday_calendar,
    DailyFormat, TableStore, TushareSource,
};
use weightlab_core::domain::{format_date, parse_date, SnapshotTable};
use weightlab_core::engine::{expand_to, ExpandOptions, PricePanel, WeightNormalization};

#[derive(Parser)]
#[command(
    name = "weightlab",
    about = "WeightLab CLI: daily index constituent weights from periodic snapshots"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch new snapshots, merge into history, and regenerate daily weights.
    Refresh {
        /// Path to a TOML config file. Flags override its values.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Index codes to refresh (e.g., 000300.SH). Repeatable or comma-separated.
        #[arg(long = "index", env = "INDEX_CODES", value_delimiter = ',')]
        index_codes: Vec<String>,

        /// Start date (YYYYMMDD). Defaults to the first day of this month.
        #[arg(long, env = "INDEX_START_DATE", value_parser = parse_date_arg)]
        start: Option<NaiveDate>,

        /// End date (YYYYMMDD). Defaults to today.
        #[arg(long, env = "INDEX_END_DATE", value_parser = parse_date_arg)]
        end: Option<NaiveDate>,

        /// Ignore stored history and refetch the whole range.
        #[arg(long, default_value_t = false)]
        full: bool,

        /// Skip daily expansion.
        #[arg(long, default_value_t = false)]
        no_daily: bool,

        /// Skip price fetching; drift_weight stays empty.
        #[arg(long, default_value_t = false)]
        no_drift: bool,

        /// Data directory. Defaults to ./data.
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Write daily output as Parquet instead of CSV.
        #[arg(long, default_value_t = false)]
        parquet: bool,

        /// Tushare API token.
        #[arg(long, env = "TUSHARE_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },
    /// Expand a snapshot CSV to daily rows without network access.
    Expand {
        /// Snapshot CSV (index_code, con_code, snapshot_date|trade_date, weight).
        #[arg(long)]
        snapshots: PathBuf,

        /// Output file; `.parquet` selects Parquet, anything else CSV.
        #[arg(long)]
        out: PathBuf,

        /// Price CSV (instrument|ts_code, trade_date, close) for drift weights.
        #[arg(long)]
        prices: Option<PathBuf>,

        /// Calendar CSV (cal_date[, is_open]). Defaults to Monday to Friday.
        #[arg(long)]
        calendar: Option<PathBuf>,

        /// First calendar day (YYYYMMDD). Defaults to the earliest snapshot.
        #[arg(long, value_parser = parse_date_arg)]
        start: Option<NaiveDate>,

        /// Last calendar day (YYYYMMDD). Defaults to today.
        #[arg(long, value_parser = parse_date_arg)]
        end: Option<NaiveDate>,

        /// Rescale each snapshot's weights to sum to one.
        #[arg(long, default_value_t = false)]
        unit_sum: bool,
    },
    /// Report stored snapshot tables.
    Status {
        /// Data directory. Defaults to ./data.
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,

        /// Only these index codes. Defaults to every stored table.
        #[arg(long = "index")]
        index_codes: Vec<String>,
    },
}

fn parse_date_arg(raw: &str) -> std::result::Result<NaiveDate, String> {
    parse_date(raw).ok_or_else(|| format!("invalid date '{raw}' (expected YYYYMMDD)"))
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("weightlab=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = dispatch(Cli::parse()) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Refresh {
            config,
            index_codes,
            start,
            end,
            full,
            no_daily,
            no_drift,
            data_dir,
            parquet,
            token,
        } => {
            let mut cfg = match config {
                Some(path) => RefreshConfig::from_file(&path)?,
                None => RefreshConfig::default(),
            };
            let overrides = RefreshOverrides {
                index_codes,
                start,
                end,
                full,
                no_daily,
                no_drift,
                data_dir,
                parquet,
            };
            overrides.apply(&mut cfg);
            run_refresh(&cfg, token)
        }
        Commands::Expand {
            snapshots,
            out,
            prices,
            calendar,
            start,
            end,
            unit_sum,
        } => run_expand(
            &snapshots,
            &out,
            prices.as_deref(),
            calendar.as_deref(),
            start,
            end,
            unit_sum,
        ),
        Commands::Status {
            data_dir,
            index_codes,
        } => run_status(&data_dir, &index_codes),
    }
}

/// Flag values layered over the config file.
struct RefreshOverrides {
    index_codes: Vec<String>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    full: bool,
    no_daily: bool,
    no_drift: bool,
    data_dir: Option<PathBuf>,
    parquet: bool,
}

impl RefreshOverrides {
    fn apply(self, cfg: &mut RefreshConfig) {
        let codes: Vec<String> = self
            .index_codes
            .iter()
            .flat_map(|raw| parse_index_codes(raw))
            .collect();
        if !codes.is_empty() {
            cfg.index_codes = codes;
        }
        if self.start.is_some() {
            cfg.start_date = self.start;
        }
        if self.end.is_some() {
            cfg.end_date = self.end;
        }
        if let Some(dir) = self.data_dir {
            cfg.data_dir = dir;
        }
        cfg.force_full_refresh |= self.full;
        if self.no_daily {
            cfg.generate_daily = false;
        }
        if self.no_drift {
            cfg.drift = false;
        }
        if self.parquet {
            cfg.daily_format = DailyFormat::Parquet;
        }
    }
}

fn run_refresh(cfg: &RefreshConfig, token: Option<String>) -> Result<()> {
    let Some(token) = token.filter(|t| !t.trim().is_empty()) else {
        bail!("missing Tushare token: pass --token or set TUSHARE_TOKEN");
    };
    let source = TushareSource::new(token).context("building Tushare client")?;

    let summary = weightlab_core::run(cfg, &source).context("refresh failed")?;
    println!("{}", summary.render());
    Ok(())
}

fn run_expand(
    snapshots: &Path,
    out: &Path,
    prices: Option<&Path>,
    calendar: Option<&Path>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    unit_sum: bool,
) -> Result<()> {
    let rows = load_snapshot_rows(snapshots)
        .with_context(|| format!("reading snapshots from {}", snapshots.display()))?;
    let table = SnapshotTable::new(rows);

    let start = start
        .or_else(|| table.earliest_snapshot_date())
        .unwrap_or_else(today_cst);
    let end = end.unwrap_or_else(today_cst);
    if start > end {
        bail!("start {start} is after end {end}");
    }

    let days: Vec<NaiveDate> = match calendar {
        Some(path) => load_calendar(path)
            .with_context(|| format!("reading calendar from {}", path.display()))?
            .into_iter()
            .filter(|d| *d >= start && *d <= end)
            .collect(),
        None => weekday_calendar(start, end),
    };

    let panel = match prices {
        Some(path) => {
            let price_rows = load_prices(path)
                .with_context(|| format!("reading prices from {}", path.display()))?;
            let panel = PricePanel::build(&price_rows, &days);
            if panel.is_none() {
                tracing::warn!(path = %path.display(), "no usable prices, drift weights left empty");
            }
            panel
        }
        None => None,
    };

    let format = match out.extension().and_then(|e| e.to_str()) {
        Some("parquet") => DailyFormat::Parquet,
        _ => DailyFormat::Csv,
    };
    let sink = sink_for(out, format);
    let opts = ExpandOptions {
        normalization: if unit_sum {
            WeightNormalization::UnitSum
        } else {
            WeightNormalization::AsIs
        },
    };

    let written = expand_to(&table, &days, Some(sink.as_ref()), panel.as_ref(), &opts)?;
    println!(
        "Expanded {} snapshot rows over {} trading days -> {} daily rows in {}",
        table.len(),
        days.len(),
        written,
        out.display()
    );
    Ok(())
}

fn run_status(data_dir: &Path, index_codes: &[String]) -> Result<()> {
    let store = TableStore::new(data_dir);
    let table_dir = store.snapshot_dir();
    if !table_dir.exists() {
        println!("No snapshot tables under {}", data_dir.display());
        return Ok(());
    }

    let mut paths: Vec<(String, PathBuf)> = if index_codes.is_empty() {
        let mut found = Vec::new();
        for entry in std::fs::read_dir(&table_dir)? {
            let name = entry?.file_name().to_string_lossy().to_string();
            if let Some(code) = name
                .strip_prefix("index_weight_")
                .and_then(|rest| rest.strip_suffix(".csv"))
            {
                found.push((code.to_string(), table_dir.join(&name)));
            }
        }
        found
    } else {
        index_codes
            .iter()
            .map(|code| (code.clone(), store.snapshot_path(code)))
            .collect()
    };
    paths.sort();

    if paths.is_empty() {
        println!("No snapshot tables under {}", table_dir.display());
        return Ok(());
    }

    println!("Data: {}", data_dir.display());
    println!();
    println!(
        "{:<12} {:>8} {:>10} {:<21} {:<6}",
        "Index", "Rows", "Snapshots", "Range", "Daily"
    );
    println!("{}", "-".repeat(61));
    for (code, path) in &paths {
        let daily = [DailyFormat::Csv, DailyFormat::Parquet]
            .iter()
            .find(|fmt| store.daily_path(code, **fmt).exists())
            .map_or("-", |fmt| fmt.extension());

        match read_meta(path) {
            Some(meta) => {
                let code = status_label(code, &meta.index_codes);
                let range = match (meta.first_snapshot, meta.last_snapshot) {
                    (Some(first), Some(last)) => {
                        format!("{}-{}", format_date(first), format_date(last))
                    }
                    _ => "(empty)".to_string(),
                };
                println!(
                    "{:<12} {:>8} {:>10} {:<21} {:<6}",
                    code, meta.rows, meta.snapshots, range, daily
                );
            }
            None if path.exists() => {
                println!("{:<12} {:>8} {:>10} {:<21} {:<6}", code, "?", "?", "(no meta)", daily);
            }
            None => {
                println!("{:<12} {:>8} {:>10} {:<21} {:<6}", code, "-", "-", "(missing)", daily);
            }
        }
    }
    Ok(())
}

/// Index label for a status row. File names carry `000300_SH`; the meta
/// sidecar keeps the real code.
fn status_label(file_code: &str, index_codes: &[String]) -> String {
    if index_codes.is_empty() {
        file_code.to_string()
    } else {
        index_codes.join(",")
    }
}
