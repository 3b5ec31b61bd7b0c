//! Download-count aggregation into calendar-aligned rollups
//!
//! Raw daily samples are reduced to a lifetime total, a sliding 30-day
//! total, and fixed-length bucket series per week, month and year. Bucket
//! boundaries are calendar-aligned (ISO week, calendar month, calendar
//! year) so chart labels stay stable regardless of crawl time-of-day;
//! `last30days` alone is a sliding window because it answers "how popular
//! right now".

use crate::config::BucketConfig;
use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// One raw point of the download time series, immutable once fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadSample {
    #[serde(rename = "date")]
    pub day: NaiveDate,
    pub value: u64,
}

/// Sum over one calendar-aligned period, boundaries inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodTotal {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub value: u64,
}

/// Precomputed statistics stored alongside the raw series.
///
/// Field names match the persisted document layout consumed by the
/// reporting layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollupStats {
    pub total: u64,
    #[serde(rename = "last30days")]
    pub last_30_days: u64,
    #[serde(rename = "perWeek")]
    pub per_week: Vec<PeriodTotal>,
    #[serde(rename = "perMonth")]
    pub per_month: Vec<PeriodTotal>,
    #[serde(rename = "perYears")]
    pub per_years: Vec<PeriodTotal>,
}

/// Full rollup document for one package, overwritten on every crawl.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRollup {
    pub name: String,
    pub downloads: Vec<DownloadSample>,
    pub stats: RollupStats,
}

/// Sum of every sample whose day lies in `[start, end]`, inclusive on
/// both ends.
pub fn sum_range(samples: &[DownloadSample], start: NaiveDate, end: NaiveDate) -> u64 {
    samples
        .iter()
        .filter(|s| s.day >= start && s.day <= end)
        .map(|s| s.value)
        .sum()
}

/// Unconditional sum over all samples.
pub fn total(samples: &[DownloadSample]) -> u64 {
    samples.iter().map(|s| s.value).sum()
}

/// Sliding-window sum over `[now - 30x24h, now]`.
pub fn last_30_days(samples: &[DownloadSample], now: NaiveDate) -> u64 {
    let start = now - Duration::hours(30 * 24);
    sum_range(samples, start, now)
}

/// Weekly buckets, most recent first, exactly `count` entries.
///
/// The cursor starts one week back from `now`; each bucket spans the ISO
/// week (Monday through Sunday) containing the cursor.
pub fn bucket_by_week(samples: &[DownloadSample], now: NaiveDate, count: usize) -> Vec<PeriodTotal> {
    let mut cursor = now - Duration::weeks(1);
    let mut results = Vec::with_capacity(count);

    for _ in 0..count {
        let start = iso_week_start(cursor);
        let end = start + Duration::days(6);

        results.push(PeriodTotal {
            start,
            end,
            value: sum_range(samples, start, end),
        });

        cursor = cursor - Duration::weeks(1);
    }

    results
}

/// Monthly buckets, most recent first, exactly `count` entries.
///
/// The cursor starts one month back from `now`; each bucket spans the
/// calendar month containing the cursor.
pub fn bucket_by_month(
    samples: &[DownloadSample],
    now: NaiveDate,
    count: usize,
) -> Vec<PeriodTotal> {
    let mut cursor = previous_month(now);
    let mut results = Vec::with_capacity(count);

    for _ in 0..count {
        let start = month_start(cursor);
        let end = month_end(cursor);

        results.push(PeriodTotal {
            start,
            end,
            value: sum_range(samples, start, end),
        });

        cursor = previous_month(cursor);
    }

    results
}

/// Yearly buckets, most recent first, exactly `count` entries.
///
/// Unlike weeks and months the cursor starts at `now` itself, so the
/// current (partial) year is the first bucket.
pub fn bucket_by_year(samples: &[DownloadSample], now: NaiveDate, count: usize) -> Vec<PeriodTotal> {
    let mut year = now.year();
    let mut results = Vec::with_capacity(count);

    for _ in 0..count {
        let start = NaiveDate::from_ymd_opt(year, 1, 1).unwrap_or(now);
        let end = NaiveDate::from_ymd_opt(year, 12, 31).unwrap_or(now);

        results.push(PeriodTotal {
            start,
            end,
            value: sum_range(samples, start, end),
        });

        year -= 1;
    }

    results
}

/// Compose the full rollup for one package.
///
/// An empty sample list yields zero totals and full-length zero-valued
/// bucket series; it is not an error.
pub fn rollup(
    name: &str,
    samples: Vec<DownloadSample>,
    now: NaiveDate,
    buckets: BucketConfig,
) -> DownloadRollup {
    let stats = RollupStats {
        total: total(&samples),
        last_30_days: last_30_days(&samples, now),
        per_week: bucket_by_week(&samples, now, buckets.weeks),
        per_month: bucket_by_month(&samples, now, buckets.months),
        per_years: bucket_by_year(&samples, now, buckets.years),
    };

    DownloadRollup {
        name: name.to_string(),
        downloads: samples,
        stats,
    }
}

/// Monday of the ISO week containing `date`.
fn iso_week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

fn month_start(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1).unwrap_or(date)
}

fn month_end(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };

    NaiveDate::from_ymd_opt(year, month, 1)
        .map(|next| next - Duration::days(1))
        .unwrap_or(date)
}

/// Any day inside the calendar month before the one containing `date`.
fn previous_month(date: NaiveDate) -> NaiveDate {
    month_start(date) - Duration::days(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn sample(y: i32, m: u32, day: u32, value: u64) -> DownloadSample {
        DownloadSample {
            day: d(y, m, day),
            value,
        }
    }

    #[test]
    fn test_sum_range_inclusive_boundaries() {
        // Test: Samples exactly on both window boundaries are counted
        let samples = vec![
            sample(2024, 1, 1, 10),
            sample(2024, 1, 15, 5),
            sample(2024, 1, 31, 20),
        ];

        assert_eq!(sum_range(&samples, d(2024, 1, 1), d(2024, 1, 31)), 35);
        assert_eq!(sum_range(&samples, d(2024, 1, 2), d(2024, 1, 31)), 25);
        assert_eq!(sum_range(&samples, d(2024, 1, 1), d(2024, 1, 30)), 15);
        assert_eq!(sum_range(&samples, d(2024, 2, 1), d(2024, 2, 28)), 0);
    }

    #[test]
    fn test_total() {
        let samples = vec![sample(2023, 5, 1, 7), sample(2024, 5, 1, 3)];
        assert_eq!(total(&samples), 10);
        assert_eq!(total(&[]), 0);
    }

    #[test]
    fn test_last_30_days_sliding_window() {
        // Test: Scenario from the collector requirements - now is 2024-02-02,
        // window covers Jan 3 through Feb 2
        let samples = vec![
            sample(2024, 1, 1, 10),
            sample(2024, 1, 15, 5),
            sample(2024, 2, 1, 20),
        ];

        assert_eq!(last_30_days(&samples, d(2024, 2, 2)), 25);
    }

    #[test]
    fn test_week_buckets_are_iso_aligned() {
        // 2024-02-02 is a Friday; one week back is Friday Jan 26, whose ISO
        // week runs Mon Jan 22 through Sun Jan 28
        let samples = vec![sample(2024, 1, 22, 4), sample(2024, 1, 28, 6)];

        let buckets = bucket_by_week(&samples, d(2024, 2, 2), 2);

        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].start, d(2024, 1, 22));
        assert_eq!(buckets[0].end, d(2024, 1, 28));
        assert_eq!(buckets[0].value, 10);
        assert_eq!(buckets[1].start, d(2024, 1, 15));
        assert_eq!(buckets[1].end, d(2024, 1, 21));
        assert_eq!(buckets[1].value, 0);
    }

    #[test]
    fn test_month_buckets_most_recent_first() {
        let samples = vec![
            sample(2024, 1, 1, 10),
            sample(2024, 1, 15, 5),
            sample(2024, 2, 1, 20),
        ];

        // Cursor starts one month back from Feb 2, so the first bucket is
        // January; February (in progress) is not bucketed yet
        let buckets = bucket_by_month(&samples, d(2024, 2, 2), 3);

        assert_eq!(buckets.len(), 3);
        assert_eq!(buckets[0].start, d(2024, 1, 1));
        assert_eq!(buckets[0].end, d(2024, 1, 31));
        assert_eq!(buckets[0].value, 15);
        assert_eq!(buckets[1].start, d(2023, 12, 1));
        assert_eq!(buckets[1].end, d(2023, 12, 31));
        assert_eq!(buckets[1].value, 0);
        assert_eq!(buckets[2].start, d(2023, 11, 1));
    }

    #[test]
    fn test_month_buckets_cross_year_boundary() {
        let buckets = bucket_by_month(&[], d(2024, 3, 15), 14);

        assert_eq!(buckets.len(), 14);
        // 14 buckets back from Feb 2024 ends at Jan 2023
        assert_eq!(buckets[13].start, d(2023, 1, 1));
        assert_eq!(buckets[13].end, d(2023, 1, 31));
    }

    #[test]
    fn test_year_buckets_include_current_year() {
        let samples = vec![sample(2024, 1, 5, 8), sample(2023, 6, 1, 2)];

        let buckets = bucket_by_year(&samples, d(2024, 2, 2), 3);

        assert_eq!(buckets.len(), 3);
        assert_eq!(buckets[0].start, d(2024, 1, 1));
        assert_eq!(buckets[0].end, d(2024, 12, 31));
        assert_eq!(buckets[0].value, 8);
        assert_eq!(buckets[1].value, 2);
        assert_eq!(buckets[2].value, 0);
    }

    #[test]
    fn test_bucket_counts_fixed_on_empty_input() {
        // Test: Charting code assumes fixed-length series even with no data
        let now = d(2024, 2, 2);

        assert_eq!(bucket_by_week(&[], now, 216).len(), 216);
        assert_eq!(bucket_by_month(&[], now, 48).len(), 48);
        assert_eq!(bucket_by_year(&[], now, 4).len(), 4);
        assert!(bucket_by_week(&[], now, 5).iter().all(|b| b.value == 0));
    }

    #[test]
    fn test_rollup_empty_samples() {
        let rollup = rollup("left-pad", Vec::new(), d(2024, 2, 2), BucketConfig::default());

        assert_eq!(rollup.stats.total, 0);
        assert_eq!(rollup.stats.last_30_days, 0);
        assert_eq!(rollup.stats.per_week.len(), 216);
        assert_eq!(rollup.stats.per_month.len(), 48);
        assert_eq!(rollup.stats.per_years.len(), 4);
        assert!(rollup.downloads.is_empty());
    }

    #[test]
    fn test_rollup_left_pad_scenario() {
        // Test: End-to-end numbers from the collector requirements
        let samples = vec![
            sample(2024, 1, 1, 10),
            sample(2024, 1, 15, 5),
            sample(2024, 2, 1, 20),
        ];

        let rollup = rollup(
            "left-pad",
            samples,
            d(2024, 2, 2),
            BucketConfig {
                weeks: 8,
                months: 6,
                years: 2,
            },
        );

        assert_eq!(rollup.name, "left-pad");
        assert_eq!(rollup.stats.total, 35);
        assert_eq!(rollup.stats.last_30_days, 25);
        assert_eq!(rollup.stats.per_month[0].value, 15); // January
        assert_eq!(rollup.stats.per_years[0].value, 35); // 2024 so far
    }
}
