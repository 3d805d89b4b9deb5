//! Incremental merge of persisted snapshot history with freshly fetched rows.
//!
//! Repeated runs are idempotent: re-fetching rows already in the table
//! replaces them in place (last seen wins) instead of duplicating them.

use crate::domain::{SnapshotRow, SnapshotTable};
use chrono::{Days, NaiveDate};
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

/// Result of [`refresh`].
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    /// The authoritative snapshot table after the merge.
    pub table: SnapshotTable,
    /// Number of rows fetched in this batch, duplicates included.
    pub rows_added: usize,
    /// Change in table length relative to the existing table.
    pub net_added: i64,
}

/// Date window to fetch new snapshot rows for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchWindow {
    Fetch { start: NaiveDate, end: NaiveDate },
    /// The existing table already reaches past `end`.
    UpToDate,
}

/// Decide which dates still need fetching.
///
/// Without a usable existing table (or on a full refresh) the whole
/// `[default_start, end]` range is fetched. Otherwise fetching resumes the
/// day after the latest persisted snapshot.
pub fn fetch_window(
    existing: Option<&SnapshotTable>,
    default_start: NaiveDate,
    end: NaiveDate,
    full_refresh: bool,
) -> FetchWindow {
    let resume_from = if full_refresh {
        None
    } else {
        existing
            .and_then(SnapshotTable::latest_snapshot_date)
            .and_then(|latest| latest.checked_add_days(Days::new(1)))
    };

    let start = resume_from.unwrap_or(default_start);
    if start > end {
        FetchWindow::UpToDate
    } else {
        FetchWindow::Fetch { start, end }
    }
}

/// Merge `fetched` into `existing` keyed on `(index_code, con_code, snapshot_date)`.
pub fn refresh(
    existing: Option<SnapshotTable>,
    fetched: Vec<SnapshotRow>,
    full_refresh: bool,
) -> MergeOutcome {
    refresh_by(existing, fetched, SnapshotRow::key, full_refresh)
}

/// [`refresh`] with a caller-supplied dedup key.
///
/// The merged table is sorted by `(snapshot_date, index_code, con_code)`.
pub fn refresh_by<K, F>(
    existing: Option<SnapshotTable>,
    fetched: Vec<SnapshotRow>,
    key: F,
    full_refresh: bool,
) -> MergeOutcome
where
    K: Eq + Hash,
    F: Fn(&SnapshotRow) -> K,
{
    let rows_added = fetched.len();

    let existing = match existing {
        Some(table) if !full_refresh => table,
        previous => {
            let previous_len = previous.map_or(0, |t| t.len());
            return MergeOutcome {
                net_added: fetched.len() as i64 - previous_len as i64,
                table: SnapshotTable::new(fetched),
                rows_added,
            };
        }
    };
    let previous_len = existing.len();

    // Last seen wins: later positions overwrite earlier ones per key.
    let mut latest: HashMap<K, usize> = HashMap::new();
    let combined: Vec<SnapshotRow> = existing.into_rows().into_iter().chain(fetched).collect();
    for (pos, row) in combined.iter().enumerate() {
        latest.insert(key(row), pos);
    }

    let mut ordered: BTreeMap<SortKey, SnapshotRow> = BTreeMap::new();
    for (pos, row) in combined.into_iter().enumerate() {
        if latest.get(&key(&row)) == Some(&pos) {
            let sort_key = (
                row.snapshot_date,
                row.index_code.clone(),
                row.con_code.clone(),
                pos,
            );
            ordered.insert(sort_key, row);
        }
    }

    let table = SnapshotTable::new(ordered.into_values().collect());
    MergeOutcome {
        net_added: table.len() as i64 - previous_len as i64,
        table,
        rows_added,
    }
}

/// `(snapshot_date, index_code, con_code, position)`; the position breaks
/// ties when a custom key keeps rows that share the sort columns.
type SortKey = (NaiveDate, String, String, usize);
