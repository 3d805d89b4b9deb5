//! Market data source trait and structured error types.
//!
//! The MarketDataSource trait abstracts over where snapshots, prices and the
//! trading calendar come from (the Tushare HTTP API, files, in-memory
//! fixtures) so the pipeline can be driven by a mock in tests.

use crate::domain::{PriceRow, SnapshotRow};
use chrono::NaiveDate;
use thiserror::Error;

/// Structured error types for data operations.
///
/// These are designed to be displayable directly by the CLI.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider: {0}")]
    RateLimited(String),

    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("provider returned error {code}: {msg}")]
    Api { code: i64, msg: String },

    #[error("{label}: giving up after {attempts} attempts: {last}")]
    RetriesExhausted {
        label: String,
        attempts: u32,
        last: Box<DataError>,
    },

    #[error("I/O error: {0}")]
    Io(String),

    #[error("CSV error: {0}")]
    Csv(String),

    #[error("parquet error: {0}")]
    Parquet(String),

    #[error("invalid date '{0}' (expected YYYYMMDD)")]
    InvalidDate(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("data error: {0}")]
    Other(String),
}

impl DataError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DataError::NetworkUnreachable(_) | DataError::RateLimited(_)
        )
    }
}

/// Trait for upstream data sources.
///
/// Implementations fetch exactly the requested range; retry and backoff are
/// the caller's concern (see [`super::retry`]).
pub trait MarketDataSource: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Constituent weight snapshots of `index_code` observed in `[start, end]`.
    fn fetch_snapshots(
        &self,
        index_code: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<SnapshotRow>, DataError>;

    /// Daily closes of `instruments` in `[start, end]`.
    fn fetch_prices(
        &self,
        instruments: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceRow>, DataError>;

    /// Open trading days of `exchange` in `[start, end]`, ascending.
    fn trading_days(
        &self,
        exchange: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NaiveDate>, DataError>;
}
