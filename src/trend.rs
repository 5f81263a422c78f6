//! Trend module: multi-series daily table for cohort × period lines.
//!
//! Building is split in two steps so that points produced elsewhere (the
//! remote backend's `time_series`) go through the same shaping:
//! - `trend_points` buckets rows by (date, series) and aggregates each bucket
//! - `shape_trend_series` densifies points into a date-ordered table and
//!   attaches a label and a stable color to every series key
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::aggregation::{aggregate, AggMethod};
use crate::comparison::{CohortType, Comparison, Period};
use crate::metric::Metric;
use crate::row::{DateRange, Row};
use crate::schema::breakout::KEY_SEPARATOR;
use crate::summary::breakout_value;

// ── Palette ─────────────────────────────────────────────────────────────────

pub const PALETTE: [&str; 10] = [
    "#4e79a7", "#f28e2b", "#e15759", "#76b7b2", "#59a14f", "#edc948", "#b07aa1", "#ff9da7",
    "#9c755f", "#bab0ac",
];

// ── Data structures ─────────────────────────────────────────────────────────

/// One aggregated bucket, shaped like an entry of the backend `time_series`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub date: String,
    pub cohort_type: CohortType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<Period>,
    pub metric: String,
    pub agg_func: AggMethod,
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breakout_value: Option<String>,
}

impl TimeSeriesPoint {
    /// `cohortType_period`, prefixed with `breakout::` when a breakout is set.
    pub fn series_key(&self) -> String {
        let segment = match self.period {
            Some(period) => format!("{}_{}", self.cohort_type, period),
            None => self.cohort_type.to_string(),
        };
        match &self.breakout_value {
            Some(value) => format!("{value}{KEY_SEPARATOR}{segment}"),
            None => segment,
        }
    }
}

/// One date of the chart table: a value slot for every series key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendRow {
    pub date: String,
    #[serde(flatten)]
    pub values: BTreeMap<String, Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeriesLine {
    pub key: String,
    pub label: String,
    pub color: &'static str,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct TrendMultiSeries {
    pub data: Vec<TrendRow>,
    pub lines: Vec<SeriesLine>,
}

impl TrendMultiSeries {
    pub fn value(&self, date: &str, key: &str) -> Option<f64> {
        self.data
            .iter()
            .find(|row| row.date == date)
            .and_then(|row| row.values.get(key).copied().flatten())
    }
}

// ── Building ────────────────────────────────────────────────────────────────

/// Aggregate rows into sparse points, one per non-empty (date, series) bucket.
///
/// Rows must lie in `date_range` and in pre or post; the period is resolved
/// post-first.
pub fn trend_points(
    rows: &[Row],
    cmp: &Comparison,
    metric: &Metric,
    agg: AggMethod,
    date_range: &DateRange,
    breakout_column: Option<&str>,
) -> Vec<TimeSeriesPoint> {
    type BucketKey = (String, Option<String>, CohortType, Period);
    let mut buckets: BTreeMap<BucketKey, Vec<&Row>> = BTreeMap::new();

    for row in rows {
        if !date_range.contains(row.time()) {
            continue;
        }
        let Some(cohort_type) = cmp.cohort_type(row.cohort()) else {
            continue;
        };
        let Some(period) = cmp.period(row.time()) else {
            continue;
        };
        let breakout = breakout_column.map(|col| breakout_value(row, col));
        buckets
            .entry((row.time().to_string(), breakout, cohort_type, period))
            .or_default()
            .push(row);
    }

    debug!(metric = %metric.key, buckets = buckets.len(), "trend buckets");

    buckets
        .into_iter()
        .map(|((date, breakout_value, cohort_type, period), bucket)| TimeSeriesPoint {
            date,
            cohort_type,
            period: Some(period),
            metric: metric.key.clone(),
            agg_func: agg,
            value: aggregate(&bucket, metric, agg),
            breakout_value,
        })
        .collect()
}

/// Densify points into a date-ordered table. Dates and series keys ascend;
/// a series without a point on a date gets `None` there.
pub fn shape_trend_series(points: &[TimeSeriesPoint]) -> TrendMultiSeries {
    let mut dates: BTreeSet<&str> = BTreeSet::new();
    let mut keys: BTreeSet<String> = BTreeSet::new();
    let mut cells: BTreeMap<(&str, String), Option<f64>> = BTreeMap::new();

    for point in points {
        let key = point.series_key();
        dates.insert(point.date.as_str());
        keys.insert(key.clone());
        cells.insert((point.date.as_str(), key), point.value);
    }

    let data = dates
        .into_iter()
        .map(|date| TrendRow {
            date: date.to_string(),
            values: keys
                .iter()
                .map(|key| {
                    let value = cells.get(&(date, key.clone())).copied().flatten();
                    (key.clone(), value)
                })
                .collect(),
        })
        .collect();

    let lines = keys
        .into_iter()
        .map(|key| SeriesLine {
            label: series_label(&key),
            color: series_color(&key),
            key,
        })
        .collect();

    TrendMultiSeries { data, lines }
}

pub fn compute_trend_series(
    rows: &[Row],
    cmp: &Comparison,
    metric: &Metric,
    agg: AggMethod,
    date_range: &DateRange,
    breakout_column: Option<&str>,
) -> TrendMultiSeries {
    let points = trend_points(rows, cmp, metric, agg, date_range, breakout_column);
    shape_trend_series(&points)
}

// ── Labels and colors ───────────────────────────────────────────────────────

/// Polynomial base-31 hash over UTF-16 code units with 32-bit wraparound.
pub fn series_hash(key: &str) -> i32 {
    key.encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(i32::from(unit)))
}

pub fn series_color(key: &str) -> &'static str {
    let index = series_hash(key).unsigned_abs() % PALETTE.len() as u32;
    PALETTE[index as usize]
}

pub fn series_label(key: &str) -> String {
    match key.rsplit_once(KEY_SEPARATOR) {
        Some((breakout, segment)) => format!("{breakout} • {}", segment_label(segment)),
        None => segment_label(key).to_string(),
    }
}

fn segment_label(segment: &str) -> &str {
    match segment {
        "test_pre" => "Test (Pre)",
        "test_post" => "Test (Post)",
        "control_pre" => "Control (Pre)",
        "control_post" => "Control (Post)",
        "test" => "Test",
        "control" => "Control",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::ingest::ingest_csv;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
    }

    fn comparison(pre: (u32, u32), post: (u32, u32)) -> Comparison {
        Comparison::new(
            "test",
            "control",
            DateRange::new(day(pre.0), day(pre.1)).unwrap(),
            DateRange::new(day(post.0), day(post.1)).unwrap(),
        )
    }

    #[test]
    fn sparse_buckets_become_nulls_on_a_dense_date_axis() {
        let ds = ingest_csv(
            "cohort,captain_id,time,v\n\
             test,t1,2025-01-01,10\n\
             control,c1,2025-01-02,5\n",
        )
        .unwrap();
        let cmp = comparison((1, 1), (2, 2));
        let range = DateRange::new(day(1), day(2)).unwrap();
        let series = compute_trend_series(
            ds.rows(),
            &cmp,
            &Metric::column("v"),
            AggMethod::Sum,
            &range,
            None,
        );

        let dates: Vec<&str> = series.data.iter().map(|r| r.date.as_str()).collect();
        assert_eq!(dates, ["2025-01-01", "2025-01-02"]);
        let keys: Vec<&str> = series.lines.iter().map(|l| l.key.as_str()).collect();
        assert_eq!(keys, ["control_post", "test_pre"]);

        assert_eq!(series.value("2025-01-01", "test_pre"), Some(10.0));
        assert_eq!(series.value("2025-01-02", "test_pre"), None);
        assert_eq!(series.value("2025-01-02", "control_post"), Some(5.0));
        assert_eq!(series.value("2025-01-01", "control_post"), None);
        assert_eq!(series.data[1].values.get("test_pre"), Some(&None));
    }

    #[test]
    fn rows_outside_periods_or_cohorts_are_dropped() {
        let ds = ingest_csv(
            "cohort,captain_id,time,v\n\
             test,t1,2025-01-01,1\n\
             test,t1,2025-01-05,1\n\
             other,o1,2025-01-01,1\n\
             control,c1,2025-01-09,1\n",
        )
        .unwrap();
        let cmp = comparison((1, 2), (8, 9));
        // The date range cuts off 2025-01-09 even though it is in post.
        let range = DateRange::new(day(1), day(8)).unwrap();
        let points = trend_points(
            ds.rows(),
            &cmp,
            &Metric::column("v"),
            AggMethod::Count,
            &range,
            None,
        );
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].date, "2025-01-01");
        assert_eq!(points[0].series_key(), "test_pre");
    }

    #[test]
    fn overlapping_dates_resolve_to_post() {
        let ds = ingest_csv("cohort,captain_id,time,v\ntest,t1,2025-01-05,3\n").unwrap();
        let cmp = comparison((1, 6), (5, 9));
        let range = DateRange::new(day(1), day(9)).unwrap();
        let points = trend_points(
            ds.rows(),
            &cmp,
            &Metric::column("v"),
            AggMethod::Sum,
            &range,
            None,
        );
        assert_eq!(points[0].period, Some(Period::Post));
    }

    #[test]
    fn breakout_prefixes_series_keys_and_labels() {
        let ds = ingest_csv(
            "cohort,captain_id,time,v,city\n\
             test,t1,2025-01-01,1,north\n\
             test,t2,2025-01-01,2,\n",
        )
        .unwrap();
        let cmp = comparison((1, 1), (2, 2));
        let range = DateRange::new(day(1), day(2)).unwrap();
        let series = compute_trend_series(
            ds.rows(),
            &cmp,
            &Metric::column("v"),
            AggMethod::Sum,
            &range,
            Some("city"),
        );

        let lines: Vec<(&str, &str)> = series
            .lines
            .iter()
            .map(|l| (l.key.as_str(), l.label.as_str()))
            .collect();
        assert_eq!(
            lines,
            [
                ("Unknown::test_pre", "Unknown • Test (Pre)"),
                ("north::test_pre", "north • Test (Pre)"),
            ]
        );
        assert_eq!(series.value("2025-01-01", "Unknown::test_pre"), Some(2.0));
    }

    #[test]
    fn labels_for_canonical_segments() {
        assert_eq!(series_label("test_pre"), "Test (Pre)");
        assert_eq!(series_label("test_post"), "Test (Post)");
        assert_eq!(series_label("control_pre"), "Control (Pre)");
        assert_eq!(series_label("control_post"), "Control (Post)");
    }

    #[test]
    fn colors_are_a_pure_function_of_the_key() {
        assert_eq!(series_hash("a"), 97);
        assert_eq!(series_hash("ab"), 97 * 31 + 98);
        assert_eq!(series_color("a"), PALETTE[7]);
        for key in ["test_pre", "control_post", "north::test_post"] {
            assert_eq!(series_color(key), series_color(&key.to_string()));
        }
    }

    #[test]
    fn hash_wraps_instead_of_overflowing() {
        let long = "control_post".repeat(64);
        let color = series_color(&long);
        assert!(PALETTE.contains(&color));
    }
}
