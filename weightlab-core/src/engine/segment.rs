//! Segmentation of a trading-day calendar into snapshot-bounded intervals.

use chrono::NaiveDate;

/// The trading days governed by one snapshot: the half-open span
/// `[snapshot_date, next_snapshot_date)` intersected with the calendar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interval {
    pub snapshot_date: NaiveDate,
    /// `None` for the last snapshot, whose interval is open-ended.
    pub next_snapshot_date: Option<NaiveDate>,
    pub days: Vec<NaiveDate>,
}

/// Partition `calendar` into one interval per snapshot date.
///
/// `snapshot_dates` must be ascending and distinct; `calendar` must be
/// ascending. A calendar day equal to a snapshot date opens that snapshot's
/// interval. Days before the first snapshot belong to no interval, and
/// snapshots whose span holds no calendar day are skipped.
pub fn segment(snapshot_dates: &[NaiveDate], calendar: &[NaiveDate]) -> Vec<Interval> {
    let mut intervals = Vec::with_capacity(snapshot_dates.len());

    for (i, &snapshot_date) in snapshot_dates.iter().enumerate() {
        let next_snapshot_date = snapshot_dates.get(i + 1).copied();

        let lo = calendar.partition_point(|d| *d < snapshot_date);
        let hi = match next_snapshot_date {
            Some(next) => calendar.partition_point(|d| *d < next),
            None => calendar.len(),
        };
        if lo >= hi {
            continue;
        }

        intervals.push(Interval {
            snapshot_date,
            next_snapshot_date,
            days: calendar[lo..hi].to_vec(),
        });
    }

    intervals
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, day).unwrap()
    }

    #[test]
    fn snapshot_day_opens_new_interval() {
        let snaps = [d(2, 28), d(3, 31)];
        let cal = [d(2, 28), d(3, 3), d(3, 4), d(3, 31)];
        let intervals = segment(&snaps, &cal);

        assert_eq!(intervals.len(), 2);
        assert_eq!(intervals[0].snapshot_date, d(2, 28));
        assert_eq!(intervals[0].next_snapshot_date, Some(d(3, 31)));
        assert_eq!(intervals[0].days, vec![d(2, 28), d(3, 3), d(3, 4)]);
        assert_eq!(intervals[1].snapshot_date, d(3, 31));
        assert_eq!(intervals[1].next_snapshot_date, None);
        assert_eq!(intervals[1].days, vec![d(3, 31)]);
    }

    #[test]
    fn days_before_first_snapshot_are_unassigned() {
        let snaps = [d(3, 3)];
        let cal = [d(2, 27), d(2, 28), d(3, 3), d(3, 4)];
        let intervals = segment(&snaps, &cal);

        assert_eq!(intervals.len(), 1);
        assert_eq!(intervals[0].days, vec![d(3, 3), d(3, 4)]);
    }

    #[test]
    fn snapshot_on_non_trading_day_starts_at_next_trading_day() {
        // 03-01 is a Saturday
        let snaps = [d(3, 1)];
        let cal = [d(2, 28), d(3, 3)];
        let intervals = segment(&snaps, &cal);

        assert_eq!(intervals[0].snapshot_date, d(3, 1));
        assert_eq!(intervals[0].days, vec![d(3, 3)]);
    }

    #[test]
    fn empty_spans_are_skipped() {
        // Two snapshots with no trading day between them
        let snaps = [d(3, 1), d(3, 2), d(3, 3)];
        let cal = [d(3, 3), d(3, 4)];
        let intervals = segment(&snaps, &cal);

        assert_eq!(intervals.len(), 1);
        assert_eq!(intervals[0].snapshot_date, d(3, 3));
    }

    #[test]
    fn calendar_ending_before_snapshots_yields_nothing() {
        let snaps = [d(3, 31)];
        let cal = [d(3, 3), d(3, 4)];
        assert!(segment(&snaps, &cal).is_empty());
        assert!(segment(&[], &cal).is_empty());
        assert!(segment(&snaps, &[]).is_empty());
    }
}
