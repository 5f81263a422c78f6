use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::aggregation::{aggregate, safe_divide, AggMethod};
use crate::comparison::Comparison;
use crate::metric::{Metric, MetricCatalog};
use crate::row::Row;
use crate::schema::breakout;

/// One requested (metric, aggregation) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub metric: String,
    #[serde(rename = "agg_func")]
    pub agg: AggMethod,
}

impl Selection {
    pub fn new(metric: impl Into<String>, agg: AggMethod) -> Self {
        Self {
            metric: metric.into(),
            agg,
        }
    }
}

/// Diff-in-diff result for one selection (and, with a breakout, one group).
///
/// Field names match the backend `summary` contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutiveRow {
    pub metric: String,
    #[serde(default)]
    pub label: String,
    #[serde(rename = "agg_func")]
    pub agg: AggMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breakout_value: Option<String>,
    pub control_pre: Option<f64>,
    pub control_post: Option<f64>,
    pub control_delta: Option<f64>,
    #[serde(default)]
    pub control_delta_pct: Option<f64>,
    pub test_pre: Option<f64>,
    pub test_post: Option<f64>,
    pub test_delta: Option<f64>,
    #[serde(default)]
    pub test_delta_pct: Option<f64>,
    pub diff_in_diff: Option<f64>,
    pub diff_in_diff_pct: Option<f64>,
}

impl ExecutiveRow {
    /// Derive deltas, diff-in-diff and lift from the four segment values.
    /// The label defaults to the metric key.
    pub fn from_segments(
        selection: &Selection,
        control_pre: Option<f64>,
        control_post: Option<f64>,
        test_pre: Option<f64>,
        test_post: Option<f64>,
    ) -> Self {
        let control_delta = delta(control_pre, control_post);
        let test_delta = delta(test_pre, test_post);
        let diff_in_diff = match (test_delta, control_delta) {
            (Some(t), Some(c)) => Some(t - c),
            _ => None,
        };

        Self {
            metric: selection.metric.clone(),
            label: selection.metric.clone(),
            agg: selection.agg,
            breakout_value: None,
            control_pre,
            control_post,
            control_delta,
            control_delta_pct: percent_of(control_delta, control_pre),
            test_pre,
            test_post,
            test_delta,
            test_delta_pct: percent_of(test_delta, test_pre),
            diff_in_diff,
            diff_in_diff_pct: percent_of(diff_in_diff, control_pre),
        }
    }
}

/// `part / base × 100`; null when `base` is zero or either side is null.
fn percent_of(part: Option<f64>, base: Option<f64>) -> Option<f64> {
    safe_divide(part, base).map(|v| v * 100.0)
}

fn delta(pre: Option<f64>, post: Option<f64>) -> Option<f64> {
    match (pre, post) {
        (Some(pre), Some(post)) => Some(post - pre),
        _ => None,
    }
}

/// The four cohort × period row sets. A row may land in both periods when
/// the ranges overlap; rows outside both cohorts or ranges are absent.
#[derive(Debug, Default)]
pub struct Segments<'a> {
    pub control_pre: Vec<&'a Row>,
    pub control_post: Vec<&'a Row>,
    pub test_pre: Vec<&'a Row>,
    pub test_post: Vec<&'a Row>,
}

impl<'a> Segments<'a> {
    pub fn partition(rows: impl IntoIterator<Item = &'a Row>, cmp: &Comparison) -> Self {
        let mut segments = Segments::default();
        for row in rows {
            let in_pre = cmp.pre.contains(row.time());
            let in_post = cmp.post.contains(row.time());
            if row.cohort() == cmp.control_cohort {
                if in_pre {
                    segments.control_pre.push(row);
                }
                if in_post {
                    segments.control_post.push(row);
                }
            }
            if row.cohort() == cmp.test_cohort {
                if in_pre {
                    segments.test_pre.push(row);
                }
                if in_post {
                    segments.test_post.push(row);
                }
            }
        }
        segments
    }

    pub fn evaluate(&self, metric: &Metric, selection: &Selection) -> ExecutiveRow {
        let mut row = ExecutiveRow::from_segments(
            selection,
            aggregate(&self.control_pre, metric, selection.agg),
            aggregate(&self.control_post, metric, selection.agg),
            aggregate(&self.test_pre, metric, selection.agg),
            aggregate(&self.test_post, metric, selection.agg),
        );
        row.label = metric.label.clone();
        row
    }
}

fn summarize<'a>(
    rows: impl IntoIterator<Item = &'a Row>,
    cmp: &Comparison,
    catalog: &MetricCatalog,
    selections: &[Selection],
) -> Vec<ExecutiveRow> {
    let segments = Segments::partition(rows, cmp);
    selections
        .iter()
        .filter_map(|selection| match catalog.get(&selection.metric) {
            Some(metric) => Some(segments.evaluate(&metric, selection)),
            None => {
                warn!(metric = %selection.metric, "selection skipped, metric not in catalog");
                None
            }
        })
        .collect()
}

/// Diff-in-diff rows in selection order. Unknown metrics are skipped.
pub fn compute_executive_summary(
    rows: &[Row],
    cmp: &Comparison,
    catalog: &MetricCatalog,
    selections: &[Selection],
) -> Vec<ExecutiveRow> {
    summarize(rows, cmp, catalog, selections)
}

/// Distinct captains across both cohorts within pre or post.
pub fn total_participants(rows: &[Row], cmp: &Comparison) -> usize {
    rows.iter()
        .filter(|r| cmp.is_relevant(r))
        .map(Row::captain_id)
        .collect::<BTreeSet<_>>()
        .len()
}

/// Relevant rows grouped by the trimmed value of `column`. Missing or blank
/// values group under `"Unknown"`, which sorts first; the rest ascend.
pub fn breakout_groups<'a>(
    rows: impl IntoIterator<Item = &'a Row>,
    cmp: &Comparison,
    column: &str,
) -> Vec<(String, Vec<&'a Row>)> {
    let mut groups: BTreeMap<String, Vec<&'a Row>> = BTreeMap::new();
    for row in rows.into_iter().filter(|r| cmp.is_relevant(r)) {
        groups.entry(breakout_value(row, column)).or_default().push(row);
    }

    let unknown = groups.remove(breakout::UNKNOWN);
    let mut ordered: Vec<(String, Vec<&'a Row>)> = Vec::with_capacity(groups.len() + 1);
    if let Some(rows) = unknown {
        ordered.push((breakout::UNKNOWN.to_string(), rows));
    }
    ordered.extend(groups);
    ordered
}

pub fn breakout_value(row: &Row, column: &str) -> String {
    let value = row.get(column).key_string();
    if value.is_empty() {
        breakout::UNKNOWN.to_string()
    } else {
        value
    }
}

/// Diff-in-diff rows per breakout group, ordered by group then selection.
pub fn compute_executive_summary_by_breakout(
    rows: &[Row],
    cmp: &Comparison,
    catalog: &MetricCatalog,
    selections: &[Selection],
    breakout_column: &str,
) -> Vec<ExecutiveRow> {
    let groups = breakout_groups(rows, cmp, breakout_column);
    debug!(column = breakout_column, groups = groups.len(), "breakout summary");

    let mut out = Vec::new();
    for (value, group) in groups {
        for mut row in summarize(group, cmp, catalog, selections) {
            row.breakout_value = Some(value.clone());
            out.push(row);
        }
    }
    out
}
