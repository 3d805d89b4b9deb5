//! Tushare Pro data source.
//!
//! Every endpoint is a JSON POST of `{api_name, token, params, fields}` to a
//! single URL; responses carry a column list plus row arrays. Results are
//! capped per call, so snapshot and price queries are paged with
//! `limit`/`offset`. The API is rate limited per minute: requests are spaced
//! by a minimum interval, and rate-limit responses surface as
//! [`DataError::RateLimited`] for the caller's retry loop.

use super::provider::{DataError, MarketDataSource};
use crate::domain::{format_date, parse_date, PriceRow, SnapshotRow};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub const DEFAULT_ENDPOINT: &str = "http://api.tushare.pro";

/// Rows per page; the provider's hard cap for `index_weight` and `daily`.
const PAGE_SIZE: usize = 6000;

/// Upper bound on pages per query, in case `has_more` never clears.
const MAX_PAGES: usize = 500;

/// Instruments per `daily` request (comma-joined `ts_code`).
const PRICE_BATCH: usize = 50;

const CODE_RATE_LIMITED: i64 = 40203;
const AUTH_CODES: [i64; 3] = [40001, 40101, -2001];

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    api_name: &'a str,
    token: &'a str,
    params: Map<String, Value>,
    fields: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    code: i64,
    #[serde(default)]
    msg: Option<String>,
    data: Option<Frame>,
}

/// Column-oriented result frame: `fields` names the columns of each item.
#[derive(Debug, Deserialize)]
struct Frame {
    fields: Vec<String>,
    items: Vec<Vec<Value>>,
    #[serde(default)]
    has_more: bool,
}

impl Frame {
    fn column(&self, name: &str) -> Result<usize, DataError> {
        self.fields
            .iter()
            .position(|f| f == name)
            .ok_or_else(|| DataError::ResponseFormatChanged(format!("missing field '{name}'")))
    }
}

fn text(item: &[Value], idx: usize) -> Option<String> {
    match item.get(idx)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn number(item: &[Value], idx: usize) -> Option<f64> {
    match item.get(idx)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Tushare Pro HTTP source.
pub struct TushareSource {
    client: reqwest::blocking::Client,
    endpoint: String,
    token: String,
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl TushareSource {
    pub fn new(token: impl Into<String>) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| DataError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            token: token.into(),
            min_interval: Duration::from_millis(300),
            last_request: Mutex::new(None),
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_min_interval(mut self, min_interval: Duration) -> Self {
        self.min_interval = min_interval;
        self
    }

    /// Sleep until `min_interval` has passed since the previous request.
    fn throttle(&self) {
        let mut last = self
            .last_request
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                std::thread::sleep(self.min_interval - elapsed);
            }
        }
        *last = Some(Instant::now());
    }

    /// One API call, returning the result frame.
    fn call(
        &self,
        api_name: &str,
        params: Map<String, Value>,
        fields: &str,
    ) -> Result<Frame, DataError> {
        self.throttle();

        let request = ApiRequest {
            api_name,
            token: &self.token,
            params,
            fields,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .map_err(|e| DataError::NetworkUnreachable(format!("{api_name}: {e}")))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(DataError::RateLimited(format!("{api_name}: HTTP 429")));
        }
        if status.is_server_error() {
            return Err(DataError::NetworkUnreachable(format!(
                "{api_name}: HTTP {status}"
            )));
        }
        if !status.is_success() {
            return Err(DataError::ResponseFormatChanged(format!(
                "{api_name}: unexpected HTTP {status}"
            )));
        }

        let body: ApiResponse = response
            .json()
            .map_err(|e| DataError::ResponseFormatChanged(format!("{api_name}: {e}")))?;
        into_frame(api_name, body)
    }

    /// Call a paged endpoint until a short page or `has_more == false`.
    fn call_paged(
        &self,
        api_name: &str,
        params: Map<String, Value>,
        fields: &str,
    ) -> Result<Vec<Frame>, DataError> {
        let mut frames = Vec::new();
        let mut offset = 0usize;
        for _ in 0..MAX_PAGES {
            let mut page_params = params.clone();
            page_params.insert("limit".into(), PAGE_SIZE.into());
            page_params.insert("offset".into(), offset.into());

            let frame = self.call(api_name, page_params, fields)?;
            let len = frame.items.len();
            let more = frame.has_more || len == PAGE_SIZE;
            tracing::debug!(api_name, offset, rows = len, more, "page fetched");
            frames.push(frame);

            if len == 0 || !more {
                return Ok(frames);
            }
            offset += len;
        }
        Err(DataError::ResponseFormatChanged(format!(
            "{api_name}: still paging after {MAX_PAGES} pages"
        )))
    }
}

fn into_frame(api_name: &str, body: ApiResponse) -> Result<Frame, DataError> {
    let msg = body.msg.unwrap_or_default();
    match body.code {
        0 => body
            .data
            .ok_or_else(|| DataError::ResponseFormatChanged(format!("{api_name}: no data"))),
        CODE_RATE_LIMITED => Err(DataError::RateLimited(format!("{api_name}: {msg}"))),
        code if AUTH_CODES.contains(&code) => {
            Err(DataError::AuthenticationRequired(format!("{api_name}: {msg}")))
        }
        code => Err(DataError::Api { code, msg }),
    }
}

fn date_params(start: NaiveDate, end: NaiveDate) -> Map<String, Value> {
    let mut params = Map::new();
    params.insert("start_date".into(), format_date(start).into());
    params.insert("end_date".into(), format_date(end).into());
    params
}

fn parse_snapshots(frame: &Frame) -> Result<Vec<SnapshotRow>, DataError> {
    let index_col = frame.column("index_code")?;
    let con_col = frame.column("con_code")?;
    let date_col = frame.column("trade_date")?;
    let weight_col = frame.column("weight")?;

    let mut rows = Vec::with_capacity(frame.items.len());
    for item in &frame.items {
        let (Some(index_code), Some(con_code), Some(raw_date), Some(weight)) = (
            text(item, index_col),
            text(item, con_col),
            text(item, date_col),
            number(item, weight_col),
        ) else {
            tracing::warn!(?item, "skipping incomplete index_weight row");
            continue;
        };
        let snapshot_date = parse_date(&raw_date).ok_or(DataError::InvalidDate(raw_date))?;
        rows.push(SnapshotRow {
            index_code,
            con_code,
            snapshot_date,
            weight,
        });
    }
    Ok(rows)
}

fn parse_prices(frame: &Frame) -> Result<Vec<PriceRow>, DataError> {
    let code_col = frame.column("ts_code")?;
    let date_col = frame.column("trade_date")?;
    let close_col = frame.column("close")?;

    let mut rows = Vec::with_capacity(frame.items.len());
    for item in &frame.items {
        let (Some(instrument), Some(raw_date)) = (text(item, code_col), text(item, date_col))
        else {
            continue;
        };
        let trade_date = parse_date(&raw_date).ok_or(DataError::InvalidDate(raw_date))?;
        rows.push(PriceRow {
            instrument,
            trade_date,
            close: number(item, close_col),
        });
    }
    Ok(rows)
}

fn parse_calendar(frame: &Frame) -> Result<Vec<NaiveDate>, DataError> {
    let date_col = frame.column("cal_date")?;
    let open_col = frame.column("is_open")?;

    let mut days = BTreeSet::new();
    for item in &frame.items {
        if number(item, open_col) != Some(1.0) {
            continue;
        }
        let Some(raw_date) = text(item, date_col) else {
            continue;
        };
        days.insert(parse_date(&raw_date).ok_or(DataError::InvalidDate(raw_date))?);
    }
    Ok(days.into_iter().collect())
}

impl MarketDataSource for TushareSource {
    fn name(&self) -> &str {
        "tushare"
    }

    fn fetch_snapshots(
        &self,
        index_code: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<SnapshotRow>, DataError> {
        let mut params = date_params(start, end);
        params.insert("index_code".into(), index_code.into());

        let frames = self.call_paged("index_weight", params, "index_code,con_code,trade_date,weight")?;
        let mut rows = Vec::new();
        for frame in &frames {
            rows.extend(parse_snapshots(frame)?);
        }
        Ok(rows)
    }

    fn fetch_prices(
        &self,
        instruments: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceRow>, DataError> {
        let mut rows = Vec::new();
        for batch in instruments.chunks(PRICE_BATCH) {
            let mut params = date_params(start, end);
            params.insert("ts_code".into(), batch.join(",").into());

            let frames = self.call_paged("daily", params, "ts_code,trade_date,close")?;
            for frame in &frames {
                rows.extend(parse_prices(frame)?);
            }
        }
        Ok(rows)
    }

    fn trading_days(
        &self,
        exchange: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NaiveDate>, DataError> {
        let mut params = date_params(start, end);
        params.insert("exchange".into(), exchange.into());

        let frame = self.call("trade_cal", params, "cal_date,is_open")?;
        parse_calendar(&frame)
    }
}
