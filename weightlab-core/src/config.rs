//! Refresh configuration.
//!
//! Everything the pipeline needs is carried in one explicit struct built by
//! the caller (TOML file, CLI flags, environment); nothing is read from
//! process-wide state inside the core.

use crate::data::retry::RetryPolicy;
use crate::data::storage::DailyFormat;
use crate::data::DataError;
use crate::domain::dates::yyyymmdd_opt;
use crate::engine::WeightNormalization;
use chrono::{Datelike, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Indices refreshed when none are configured: CSI 300 and CSI 500.
pub const DEFAULT_INDEX_CODES: [&str; 2] = ["000300.SH", "000905.SH"];

/// Snapshot dates are published in China Standard Time.
const CST_OFFSET_SECS: i32 = 8 * 3600;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Root of the on-disk tables.
    pub data_dir: PathBuf,
    pub index_codes: Vec<String>,
    /// First date to fetch when no history exists. Defaults to the first
    /// day of the current month.
    #[serde(with = "yyyymmdd_opt", skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    /// Last date to fetch. Defaults to today.
    #[serde(with = "yyyymmdd_opt", skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    /// Ignore persisted history and refetch `[start_date, end_date]`.
    pub force_full_refresh: bool,
    /// Regenerate the daily expansion after the merge.
    pub generate_daily: bool,
    /// Fetch prices and compute drift weights during expansion.
    pub drift: bool,
    /// Exchange whose calendar defines trading days.
    pub exchange: String,
    pub weight_normalization: WeightNormalization,
    pub daily_format: DailyFormat,
    pub retry: RetryPolicy,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            index_codes: DEFAULT_INDEX_CODES.iter().map(|s| s.to_string()).collect(),
            start_date: None,
            end_date: None,
            force_full_refresh: false,
            generate_daily: true,
            drift: true,
            exchange: "SSE".to_string(),
            weight_normalization: WeightNormalization::AsIs,
            daily_format: DailyFormat::Csv,
            retry: RetryPolicy::default(),
        }
    }
}

impl RefreshConfig {
    /// Load a config from a TOML file. Missing keys take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, DataError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DataError::Config(format!("read {}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, DataError> {
        toml::from_str(content).map_err(|e| DataError::Config(format!("parse config TOML: {e}")))
    }

    /// Resolved `(start, end)` fetch range relative to `today`.
    pub fn date_range(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let start = self
            .start_date
            .unwrap_or_else(|| today.with_day(1).unwrap_or(today));
        let end = self.end_date.unwrap_or(today);
        (start, end)
    }

    /// Reject configurations the pipeline cannot run.
    pub fn validate(&self, today: NaiveDate) -> Result<(), DataError> {
        if self.index_codes.is_empty() {
            return Err(DataError::Config("no index codes configured".into()));
        }
        if let Some(code) = self.index_codes.iter().find(|c| c.trim().is_empty()) {
            return Err(DataError::Config(format!("blank index code '{code}'")));
        }
        let (start, end) = self.date_range(today);
        if start > end {
            return Err(DataError::Config(format!(
                "start date {start} is after end date {end}"
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(DataError::Config("retry.max_attempts must be at least 1".into()));
        }
        Ok(())
    }
}

/// Today's date in China Standard Time.
pub fn today_cst() -> NaiveDate {
    match FixedOffset::east_opt(CST_OFFSET_SECS) {
        Some(tz) => Utc::now().with_timezone(&tz).date_naive(),
        None => Utc::now().date_naive(),
    }
}

/// Split a comma-separated index list (`INDEX_CODES` style), dropping blanks.
pub fn parse_index_codes(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(String::from)
        .collect()
}
