use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::metric::{Metric, MetricKind};
use crate::row::Row;

/// How a set of rows is reduced to one scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggMethod {
    Sum,
    /// Sum divided by the number of distinct captains in the set.
    SumPerCaptain,
    #[serde(alias = "mean")]
    Avg,
    Median,
    Count,
    #[serde(alias = "nunique")]
    CountDistinct,
    /// Only meaningful for ratio metrics.
    Ratio,
}

impl AggMethod {
    pub const ALL: [AggMethod; 7] = [
        AggMethod::Sum,
        AggMethod::SumPerCaptain,
        AggMethod::Avg,
        AggMethod::Median,
        AggMethod::Count,
        AggMethod::CountDistinct,
        AggMethod::Ratio,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AggMethod::Sum => "sum",
            AggMethod::SumPerCaptain => "sum_per_captain",
            AggMethod::Avg => "avg",
            AggMethod::Median => "median",
            AggMethod::Count => "count",
            AggMethod::CountDistinct => "count_distinct",
            AggMethod::Ratio => "ratio",
        }
    }

    /// Counts render as integers.
    pub fn is_count(self) -> bool {
        matches!(self, AggMethod::Count | AggMethod::CountDistinct)
    }
}

impl fmt::Display for AggMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggMethod {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = match s.trim() {
            "mean" => "avg",
            "nunique" => "count_distinct",
            other => other,
        };
        AggMethod::ALL
            .into_iter()
            .find(|m| m.as_str() == name)
            .ok_or_else(|| {
                EngineError::InvalidAggregation(format!(
                    "'{}'. Must be one of: sum, sum_per_captain, avg, median, count, count_distinct, ratio",
                    s
                ))
            })
    }
}

/// `a / b`, or `None` when either side is missing or non-finite, or `b == 0`.
pub fn safe_divide(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) if a.is_finite() && b.is_finite() && b != 0.0 => Some(a / b),
        _ => None,
    }
}

/// Reduce `rows` to a single value for `metric`.
///
/// Empty sets give `0` for every column aggregation except `Ratio`, which
/// keeps diff-in-diff arithmetic defined when a segment has no rows.
pub fn aggregate(rows: &[&Row], metric: &Metric, method: AggMethod) -> Option<f64> {
    match &metric.kind {
        // The method is ignored for ratio metrics. Note the inversion:
        // sum(denominator) / sum(numerator).
        MetricKind::Ratio {
            numerator,
            denominator,
        } => safe_divide(
            Some(sum_column(rows, denominator)),
            Some(sum_column(rows, numerator)),
        ),
        MetricKind::Column { column } => {
            if method == AggMethod::Ratio {
                return None;
            }
            if rows.is_empty() {
                return Some(0.0);
            }
            aggregate_column(rows, column, method)
        }
    }
}

fn aggregate_column(rows: &[&Row], column: &str, method: AggMethod) -> Option<f64> {
    match method {
        AggMethod::Sum => Some(sum_column(rows, column)),
        AggMethod::SumPerCaptain => {
            let captains = distinct_captains(rows);
            if captains == 0 {
                Some(0.0)
            } else {
                Some(sum_column(rows, column) / captains as f64)
            }
        }
        AggMethod::Avg => {
            let values = finite_values(rows, column);
            if values.is_empty() {
                None
            } else {
                Some(values.iter().sum::<f64>() / values.len() as f64)
            }
        }
        AggMethod::Median => median(finite_values(rows, column)),
        AggMethod::Count => {
            Some(rows.iter().filter(|r| r.get(column).is_present()).count() as f64)
        }
        AggMethod::CountDistinct => {
            let distinct: BTreeSet<String> = rows
                .iter()
                .map(|r| r.get(column).key_string())
                .filter(|s| !s.is_empty())
                .collect();
            Some(distinct.len() as f64)
        }
        AggMethod::Ratio => None,
    }
}

fn finite_values(rows: &[&Row], column: &str) -> Vec<f64> {
    rows.iter().filter_map(|r| r.get(column).as_f64()).collect()
}

fn sum_column(rows: &[&Row], column: &str) -> f64 {
    rows.iter().filter_map(|r| r.get(column).as_f64()).sum()
}

fn distinct_captains(rows: &[&Row]) -> usize {
    rows.iter()
        .map(|r| r.captain_id().trim())
        .filter(|id| !id.is_empty())
        .collect::<BTreeSet<_>>()
        .len()
}

/// Standard median; even counts average the two middle values.
pub fn median(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}
