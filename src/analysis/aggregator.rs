//! Aggregation primitives shared by the domain analyses.
//!
//! Everything here works on row indices into a [`crate::dataset::Dataset`]
//! column slice, so analyses can filter, group and rank without copying or
//! mutating the prepared data.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::hash::Hash;

/// Indices of every row in a table of `len` rows.
pub fn all_rows(len: usize) -> Vec<usize> {
    (0..len).collect()
}

/// Indices of the rows matching a predicate, in original order.
pub fn rows_where(len: usize, pred: impl Fn(usize) -> bool) -> Vec<usize> {
    (0..len).filter(|&i| pred(i)).collect()
}

/// Partition rows by a key. Groups come back in ascending key order and every
/// distinct key present in `rows` gets a group (blank keys included).
pub fn group_by<K: Ord>(rows: &[usize], key: impl Fn(usize) -> K) -> BTreeMap<K, Vec<usize>> {
    let mut grouped: BTreeMap<K, Vec<usize>> = BTreeMap::new();

    for &row in rows {
        grouped.entry(key(row)).or_default().push(row);
    }

    grouped
}

/// Group by a categorical column.
pub fn group_by_category<'a>(values: &'a [String], rows: &[usize]) -> BTreeMap<&'a str, Vec<usize>> {
    group_by(rows, |i| values[i].as_str())
}

/// Sum of `values` over `rows`.
pub fn sum(values: &[f64], rows: &[usize]) -> f64 {
    rows.iter().map(|&i| values[i]).sum()
}

/// Mean of `values` over `rows`; `0.0` for an empty selection.
pub fn mean(values: &[f64], rows: &[usize]) -> f64 {
    ratio(sum(values, rows), rows.len() as f64)
}

/// Number of distinct values over `rows`.
pub fn distinct_count<T: Eq + Hash>(values: &[T], rows: &[usize]) -> usize {
    rows.iter().map(|&i| &values[i]).collect::<HashSet<_>>().len()
}

/// Descriptive statistics of one numeric selection.
///
/// Empty selections report zeros; the standard deviation is the sample
/// deviation and is zero for fewer than two values.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Stats {
    pub count: usize,
    pub sum: f64,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

impl Stats {
    pub fn of(values: &[f64], rows: &[usize]) -> Self {
        let mut selected: Vec<f64> = rows.iter().map(|&i| values[i]).collect();
        Self::from_values(&mut selected)
    }

    /// Statistics of an owned series (sorted in place).
    pub fn from_values(values: &mut [f64]) -> Self {
        let count = values.len();
        if count == 0 {
            return Self::default();
        }

        values.sort_by(f64::total_cmp);
        let sum: f64 = values.iter().sum();
        let mean = sum / count as f64;

        let median = if count % 2 == 1 {
            values[count / 2]
        } else {
            (values[count / 2 - 1] + values[count / 2]) / 2.0
        };

        let std_dev = if count < 2 {
            0.0
        } else {
            let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1) as f64;
            var.sqrt()
        };

        Self {
            count,
            sum,
            mean,
            median,
            std_dev,
            min: values[0],
            max: values[count - 1],
        }
    }
}

/// Zero-guarded division: `0.0` when the denominator is zero.
pub fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

/// Zero-guarded percentage (0-100 scale): `0.0` when the denominator is zero.
pub fn percentage(numerator: f64, denominator: f64) -> f64 {
    ratio(numerator, denominator) * 100.0
}

/// Period size for time bucketing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Day,
    /// Weeks ending on Sunday.
    #[allow(dead_code)] // No registered analysis buckets by week yet
    Week,
    /// Calendar months, keyed by their last day.
    #[default]
    Month,
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Granularity::Day => write!(f, "day"),
            Granularity::Week => write!(f, "week"),
            Granularity::Month => write!(f, "month"),
        }
    }
}

impl Granularity {
    /// Last day of the period containing `date`.
    pub fn period_end(self, date: NaiveDate) -> NaiveDate {
        match self {
            Granularity::Day => date,
            Granularity::Week => {
                let to_sunday = 6 - i64::from(date.weekday().num_days_from_monday());
                date + Duration::days(to_sunday)
            }
            Granularity::Month => {
                let (y, m) = if date.month() == 12 {
                    (date.year() + 1, 1)
                } else {
                    (date.year(), date.month() + 1)
                };
                NaiveDate::from_ymd_opt(y, m, 1)
                    .and_then(|first| first.pred_opt())
                    .unwrap_or(date)
            }
        }
    }

    /// End of the period following the one ending at `end`.
    fn next_end(self, end: NaiveDate) -> NaiveDate {
        match self.period_end(end).succ_opt() {
            Some(next_start) => self.period_end(next_start),
            None => end,
        }
    }

    /// Presentation label of the period ending at `end`.
    pub fn label(self, end: NaiveDate) -> String {
        match self {
            Granularity::Day => end.format("%Y-%m-%d").to_string(),
            Granularity::Week => end.format("%Y-W%U").to_string(),
            Granularity::Month => end.format("%Y-%m").to_string(),
        }
    }
}

/// One time bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct Period {
    pub end: NaiveDate,
    pub label: String,
    pub rows: Vec<usize>,
}

/// Assign rows to periods of the given granularity, oldest first.
///
/// Rows without a timestamp are skipped. With `fill_gaps`, every period
/// between the first and last populated one is emitted, empty or not.
pub fn time_buckets(
    timestamps: &[Option<NaiveDateTime>],
    rows: &[usize],
    granularity: Granularity,
    fill_gaps: bool,
) -> Vec<Period> {
    let grouped = group_by(
        &rows
            .iter()
            .copied()
            .filter(|&i| timestamps[i].is_some())
            .collect::<Vec<_>>(),
        |i| {
            timestamps[i]
                .map(|ts| granularity.period_end(ts.date()))
                .unwrap_or(NaiveDate::MIN)
        },
    );

    let (Some(&first), Some(&last)) = (grouped.keys().next(), grouped.keys().next_back()) else {
        return Vec::new();
    };

    let make = |end: NaiveDate, rows: Vec<usize>| Period {
        end,
        label: granularity.label(end),
        rows,
    };

    if !fill_gaps {
        return grouped.into_iter().map(|(end, rows)| make(end, rows)).collect();
    }

    let mut grouped = grouped;
    let mut periods = Vec::new();
    let mut end = first;
    loop {
        periods.push(make(end, grouped.remove(&end).unwrap_or_default()));
        if end >= last {
            break;
        }
        end = granularity.next_end(end);
    }
    periods
}

/// Rank rows by a key, largest first, keeping at most `n`. Ties keep their
/// original relative order, so the selection is deterministic.
pub fn top_n(rows: &[usize], key: impl Fn(usize) -> f64, n: usize) -> Vec<usize> {
    let mut ranked = rows.to_vec();
    ranked.sort_by(|&a, &b| key(b).total_cmp(&key(a)));
    ranked.truncate(n);
    ranked
}

/// Ordered, labeled buckets over a continuous metric.
///
/// Each bucket has an inclusive upper edge. The first bucket also takes
/// everything below its edge and the last bucket is unbounded, so every value
/// lands in exactly one bucket.
#[derive(Debug, Clone)]
pub struct Segmentation {
    labels: Vec<String>,
    upper_edges: Vec<f64>,
}

impl Segmentation {
    /// `labels` must hold one more entry than `upper_edges`; the extra label
    /// names the unbounded top bucket.
    pub fn new(upper_edges: &[f64], labels: &[&str]) -> Self {
        assert_eq!(
            labels.len(),
            upper_edges.len() + 1,
            "segmentation needs one label per edge plus an overflow label"
        );
        Self {
            labels: labels.iter().map(|l| l.to_string()).collect(),
            upper_edges: upper_edges.to_vec(),
        }
    }

    /// Index of the bucket that holds `value`.
    pub fn assign(&self, value: f64) -> usize {
        self.upper_edges
            .iter()
            .position(|&edge| value <= edge)
            .unwrap_or(self.upper_edges.len())
    }

    pub fn label(&self, bucket: usize) -> &str {
        &self.labels[bucket]
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Split rows into every declared bucket, in declaration order. Buckets
    /// with no rows are still returned.
    pub fn partition(&self, values: &[f64], rows: &[usize]) -> Vec<(&str, Vec<usize>)> {
        let mut buckets: Vec<Vec<usize>> = vec![Vec::new(); self.labels.len()];
        for &row in rows {
            buckets[self.assign(values[row])].push(row);
        }
        self.labels
            .iter()
            .map(String::as_str)
            .zip(buckets)
            .collect()
    }
}

/// Two-key grouping with the second key pivoted into columns.
#[derive(Debug, Clone, Default)]
pub struct Pivot {
    row_keys: BTreeSet<String>,
    cells: BTreeMap<(String, String), f64>,
}

impl Pivot {
    /// Sum `values` per (row key, column key).
    pub fn sum(
        rows: &[usize],
        row_key: impl Fn(usize) -> String,
        column_key: impl Fn(usize) -> String,
        values: &[f64],
    ) -> Self {
        let mut pivot = Self::default();
        for &i in rows {
            let r = row_key(i);
            pivot.row_keys.insert(r.clone());
            *pivot.cells.entry((r, column_key(i))).or_insert(0.0) += values[i];
        }
        pivot
    }

    pub fn row_keys(&self) -> impl Iterator<Item = &str> {
        self.row_keys.iter().map(String::as_str)
    }

    /// Cell value; absent combinations are `0.0`.
    pub fn get(&self, row: &str, column: &str) -> f64 {
        self.cells
            .get(&(row.to_string(), column.to_string()))
            .copied()
            .unwrap_or(0.0)
    }
}
