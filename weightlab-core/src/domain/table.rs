//! The authoritative snapshot table and its per-index snapshot view.

use super::rows::SnapshotRow;
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};

/// One index's full constituent composition on one date.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub date: NaiveDate,
    /// `(con_code, weight)` in input order.
    pub constituents: Vec<(String, f64)>,
}

impl Snapshot {
    /// Sum of the raw snapshot weights.
    pub fn weight_sum(&self) -> f64 {
        self.constituents.iter().map(|(_, w)| w).sum()
    }
}

/// Set of snapshot rows across one or more indices.
///
/// Row order carries no meaning; [`SnapshotTable::partitions`] produces the
/// chronological view the engine works on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotTable {
    rows: Vec<SnapshotRow>,
}

impl SnapshotTable {
    pub fn new(rows: Vec<SnapshotRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[SnapshotRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<SnapshotRow> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Distinct index codes, sorted.
    pub fn index_codes(&self) -> Vec<String> {
        self.rows
            .iter()
            .map(|r| r.index_code.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Distinct constituent codes across all indices, sorted.
    pub fn instruments(&self) -> Vec<String> {
        self.rows
            .iter()
            .map(|r| r.con_code.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn earliest_snapshot_date(&self) -> Option<NaiveDate> {
        self.rows.iter().map(|r| r.snapshot_date).min()
    }

    pub fn latest_snapshot_date(&self) -> Option<NaiveDate> {
        self.rows.iter().map(|r| r.snapshot_date).max()
    }

    /// Number of distinct `(index_code, snapshot_date)` groups.
    pub fn snapshot_count(&self) -> usize {
        self.rows
            .iter()
            .map(|r| (r.index_code.as_str(), r.snapshot_date))
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Group rows by index, then by date into chronologically ordered snapshots.
    pub fn partitions(&self) -> BTreeMap<String, Vec<Snapshot>> {
        let mut grouped: BTreeMap<&str, BTreeMap<NaiveDate, Vec<(String, f64)>>> = BTreeMap::new();
        for row in &self.rows {
            grouped
                .entry(row.index_code.as_str())
                .or_default()
                .entry(row.snapshot_date)
                .or_default()
                .push((row.con_code.clone(), row.weight));
        }

        grouped
            .into_iter()
            .map(|(index_code, by_date)| {
                let snapshots = by_date
                    .into_iter()
                    .map(|(date, constituents)| Snapshot { date, constituents })
                    .collect();
                (index_code.to_string(), snapshots)
            })
            .collect()
    }
}

impl From<Vec<SnapshotRow>> for SnapshotTable {
    fn from(rows: Vec<SnapshotRow>) -> Self {
        Self::new(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn sample() -> SnapshotTable {
        SnapshotTable::new(vec![
            SnapshotRow::new("000905.SH", "X", d(2025, 3, 31), 1.0),
            SnapshotRow::new("000300.SH", "A", d(2025, 3, 31), 0.7),
            SnapshotRow::new("000300.SH", "A", d(2025, 2, 28), 0.6),
            SnapshotRow::new("000300.SH", "B", d(2025, 2, 28), 0.4),
            SnapshotRow::new("000300.SH", "C", d(2025, 3, 31), 0.3),
        ])
    }

    #[test]
    fn partitions_are_chronological_per_index() {
        let parts = sample().partitions();
        assert_eq!(parts.len(), 2);

        let csi300 = &parts["000300.SH"];
        assert_eq!(csi300.len(), 2);
        assert_eq!(csi300[0].date, d(2025, 2, 28));
        assert_eq!(
            csi300[0].constituents,
            vec![("A".to_string(), 0.6), ("B".to_string(), 0.4)]
        );
        assert_eq!(csi300[1].date, d(2025, 3, 31));
        assert_eq!(
            csi300[1].constituents,
            vec![("A".to_string(), 0.7), ("C".to_string(), 0.3)]
        );
    }

    #[test]
    fn summary_accessors() {
        let table = sample();
        assert_eq!(table.index_codes(), vec!["000300.SH", "000905.SH"]);
        assert_eq!(table.instruments(), vec!["A", "B", "C", "X"]);
        assert_eq!(table.earliest_snapshot_date(), Some(d(2025, 2, 28)));
        assert_eq!(table.latest_snapshot_date(), Some(d(2025, 3, 31)));
        assert_eq!(table.snapshot_count(), 3);
    }

    #[test]
    fn empty_table_has_no_dates() {
        let table = SnapshotTable::default();
        assert!(table.is_empty());
        assert_eq!(table.latest_snapshot_date(), None);
        assert!(table.partitions().is_empty());
    }
}
