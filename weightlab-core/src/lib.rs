//! WeightLab Core: index constituent weights, from sparse snapshots to daily rows.
//!
//! This crate contains:
//! - Domain rows (snapshot, price, daily weight) and the snapshot table
//! - Expansion engine: price panel, segmenter, drift calculator, orchestrator
//! - Incremental merge of persisted history with newly fetched snapshots
//! - Data sources (Tushare HTTP API), retry, calendars, flat-file storage
//! - The refresh pipeline driving all of the above for a list of indices

pub mod config;
pub mod data;
pub mod domain;
pub mod engine;
pub mod pipeline;

pub use config::RefreshConfig;
pub use pipeline::{refresh_index, run, IndexOutcome, RunSummary};
