//! Request sizing policy.
//!
//! The registry caps how many records one request may cover (see
//! [`ContentKind::record_ceiling`]); record counts are unknowable up front,
//! so the policy is narrow windows: a caller range is split into short
//! sub-ranges (default 7 days) that each become an independent request.

use chrono::Days;

use super::types::DateRange;

/// Splits a caller date range into inclusive sub-ranges of at most
/// `window_days` days each.
///
/// A `window_days` of zero is treated as one. Sub-ranges tile the input
/// exactly: contiguous, non-overlapping, in ascending order.
#[must_use]
pub fn split_range(range: DateRange, window_days: u32) -> Vec<DateRange> {
    let width = u64::from(window_days.max(1));
    let mut out = Vec::new();
    let mut start = range.start;
    while start <= range.end {
        let end = (start + Days::new(width - 1)).min(range.end);
        out.push(DateRange { start, end });
        match end.checked_add_days(Days::new(1)) {
            Some(next) => start = next,
            None => break,
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rstest::rstest;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_month_splits_into_seven_day_windows() {
        let ranges = split_range(DateRange::new(d(2025, 1, 1), d(2025, 1, 31)), 7);
        assert_eq!(ranges.len(), 5);
        assert_eq!(ranges[0], DateRange::new(d(2025, 1, 1), d(2025, 1, 7)));
        assert_eq!(ranges[1], DateRange::new(d(2025, 1, 8), d(2025, 1, 14)));
        assert_eq!(ranges[4], DateRange::new(d(2025, 1, 29), d(2025, 1, 31)));
    }

    #[test]
    fn test_windows_tile_exactly() {
        let range = DateRange::new(d(2025, 1, 1), d(2025, 3, 31));
        let ranges = split_range(range, 7);
        assert_eq!(ranges.first().unwrap().start, range.start);
        assert_eq!(ranges.last().unwrap().end, range.end);
        for pair in ranges.windows(2) {
            assert_eq!(pair[0].end + Days::new(1), pair[1].start);
        }
        let total: i64 = ranges.iter().map(DateRange::days).sum();
        assert_eq!(total, range.days());
    }

    #[rstest]
    #[case(1)]
    #[case(7)]
    #[case(30)]
    fn test_single_day_range_is_one_window(#[case] window: u32) {
        let ranges = split_range(DateRange::new(d(2025, 2, 14), d(2025, 2, 14)), window);
        assert_eq!(ranges, vec![DateRange::new(d(2025, 2, 14), d(2025, 2, 14))]);
    }

    #[test]
    fn test_zero_window_treated_as_one_day() {
        let ranges = split_range(DateRange::new(d(2025, 1, 1), d(2025, 1, 3)), 0);
        assert_eq!(ranges.len(), 3);
        assert!(ranges.iter().all(|r| r.days() == 1));
    }
}
