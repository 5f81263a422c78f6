use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::aggregation::AggMethod;
use crate::comparison::Comparison;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::ingest::Dataset;
use crate::metric::MetricCatalog;
use crate::row::DateRange;
use crate::summary::{
    compute_executive_summary, compute_executive_summary_by_breakout, total_participants,
    ExecutiveRow, Selection,
};
use crate::trend::{shape_trend_series, trend_points, TimeSeriesPoint, TrendMultiSeries};

// ── Request / response ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendRequest {
    pub metric: String,
    #[serde(rename = "agg_func")]
    pub agg: AggMethod,
    pub date_range: DateRange,
}

/// Everything one analysis run needs besides the rows themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    #[serde(flatten)]
    pub comparison: Comparison,
    pub selections: Vec<Selection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breakout_column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trend: Option<TrendRequest>,
}

/// `summary` and `time_series` as produced by any backend.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub summary: Vec<ExecutiveRow>,
    #[serde(default)]
    pub time_series: Vec<TimeSeriesPoint>,
    /// Distinct captains of both cohorts inside pre or post.
    #[serde(default)]
    pub total_participants: usize,
}

impl AnalysisResponse {
    pub fn trend_series(&self) -> TrendMultiSeries {
        shape_trend_series(&self.time_series)
    }
}

// ── Backends ────────────────────────────────────────────────────────────────

pub trait ComputeBackend {
    fn run(&self, request: &AnalysisRequest) -> Result<AnalysisResponse>;
}

/// Computes over rows already held in memory.
pub struct InProcessBackend<'a> {
    dataset: &'a Dataset,
    catalog: &'a MetricCatalog,
}

impl<'a> InProcessBackend<'a> {
    pub fn new(dataset: &'a Dataset, catalog: &'a MetricCatalog) -> Self {
        Self { dataset, catalog }
    }
}

impl ComputeBackend for InProcessBackend<'_> {
    fn run(&self, request: &AnalysisRequest) -> Result<AnalysisResponse> {
        let rows = self.dataset.rows();
        let cmp = &request.comparison;

        let summary = match request.breakout_column.as_deref() {
            Some(column) => compute_executive_summary_by_breakout(
                rows,
                cmp,
                self.catalog,
                &request.selections,
                column,
            ),
            None => compute_executive_summary(rows, cmp, self.catalog, &request.selections),
        };

        let time_series = match &request.trend {
            Some(trend) => {
                let metric = self
                    .catalog
                    .get(&trend.metric)
                    .ok_or_else(|| EngineError::MetricNotFound(trend.metric.clone()))?;
                trend_points(
                    rows,
                    cmp,
                    &metric,
                    trend.agg,
                    &trend.date_range,
                    request.breakout_column.as_deref(),
                )
            }
            None => Vec::new(),
        };

        let total_participants = total_participants(rows, cmp);
        debug!(
            summary = summary.len(),
            points = time_series.len(),
            total_participants,
            "in-process run finished"
        );
        Ok(AnalysisResponse {
            summary,
            time_series,
            total_participants,
        })
    }
}

/// Carries a serialized request to a remote service and returns its body.
pub trait Transport {
    fn send(&self, body: &str) -> Result<String>;
}

impl<F> Transport for F
where
    F: Fn(&str) -> Result<String>,
{
    fn send(&self, body: &str) -> Result<String> {
        self(body)
    }
}

/// Delegates to a service implementing the same aggregation contract.
pub struct RemoteBackend<T> {
    transport: T,
}

impl<T: Transport> RemoteBackend<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }
}

impl<T: Transport> ComputeBackend for RemoteBackend<T> {
    fn run(&self, request: &AnalysisRequest) -> Result<AnalysisResponse> {
        let body = serde_json::to_string(request)?;
        let reply = self.transport.send(&body).map_err(|err| match err {
            EngineError::Backend(_) => err,
            other => EngineError::Backend(other.to_string()),
        })?;
        let response: AnalysisResponse = serde_json::from_str(&reply)
            .map_err(|err| EngineError::Backend(format!("malformed response: {err}")))?;
        Ok(response)
    }
}

// ── Selection strategy ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    InProcess,
    Remote,
}

/// Picks where a run is computed, from the size of the uploaded input.
#[derive(Debug, Clone, Copy)]
pub struct BackendStrategy {
    in_process_max_bytes: usize,
}

impl BackendStrategy {
    pub fn new(in_process_max_bytes: usize) -> Self {
        Self {
            in_process_max_bytes,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.in_process_max_bytes)
    }

    pub fn choose(&self, input_bytes: usize) -> BackendKind {
        let kind = if input_bytes > self.in_process_max_bytes {
            BackendKind::Remote
        } else {
            BackendKind::InProcess
        };
        info!(input_bytes, ?kind, "backend selected");
        kind
    }
}

// ── Run tracking ────────────────────────────────────────────────────────────

/// Tracks the latest run so that responses for superseded runs are dropped.
#[derive(Debug, Default)]
pub struct RunTracker {
    current: Option<Uuid>,
}

impl RunTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a run; any run begun earlier becomes stale.
    pub fn begin(&mut self) -> Uuid {
        let id = Uuid::new_v4();
        self.current = Some(id);
        id
    }

    pub fn is_current(&self, run: Uuid) -> bool {
        self.current == Some(run)
    }

    /// Hand back `response` only if `run` is still the latest run.
    pub fn accept<R>(&self, run: Uuid, response: R) -> Option<R> {
        if self.is_current(run) {
            Some(response)
        } else {
            warn!(%run, "discarding response from stale run");
            None
        }
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

    fn request(trend_metric: &str) -> AnalysisRequest {
        AnalysisRequest {
            comparison: Comparison::new(
                "test",
                "control",
                DateRange::new(day(1), day(1)).unwrap(),
                DateRange::new(day(2), day(2)).unwrap(),
            ),
            selections: vec![Selection::new("v", AggMethod::Sum)],
            breakout_column: None,
            trend: Some(TrendRequest {
                metric: trend_metric.into(),
                agg: AggMethod::Sum,
                date_range: DateRange::new(day(1), day(2)).unwrap(),
            }),
        }
    }

    const CSV: &str = "cohort,captain_id,time,v\n\
        test,t1,2025-01-01,10\n\
        control,c1,2025-01-02,5\n";

    #[test]
    fn in_process_backend_answers_summary_and_points() {
        let ds = ingest_csv(CSV).unwrap();
        let catalog = MetricCatalog::for_dataset(&ds, &[]);
        let response = InProcessBackend::new(&ds, &catalog).run(&request("v")).unwrap();

        assert_eq!(response.summary.len(), 1);
        assert_eq!(response.time_series.len(), 2);
        assert_eq!(response.total_participants, 2);
        let trend = response.trend_series();
        assert_eq!(trend.value("2025-01-01", "test_pre"), Some(10.0));
        assert_eq!(trend.value("2025-01-02", "control_post"), Some(5.0));
    }

    #[test]
    fn unknown_trend_metric_is_an_error() {
        let ds = ingest_csv(CSV).unwrap();
        let catalog = MetricCatalog::for_dataset(&ds, &[]);
        let err = InProcessBackend::new(&ds, &catalog)
            .run(&request("nope"))
            .unwrap_err();
        assert!(matches!(err, EngineError::MetricNotFound(m) if m == "nope"));
    }

    #[test]
    fn remote_backend_round_trips_through_transport() {
        let ds = ingest_csv(CSV).unwrap();
        let catalog = MetricCatalog::for_dataset(&ds, &[]);
        let local = InProcessBackend::new(&ds, &catalog);

        // A stand-in service that computes locally and answers in JSON.
        let transport = |body: &str| -> Result<String> {
            let request: AnalysisRequest = serde_json::from_str(body)?;
            Ok(serde_json::to_string(&local.run(&request)?)?)
        };
        let remote = RemoteBackend::new(transport).run(&request("v")).unwrap();
        let expected = local.run(&request("v")).unwrap();

        assert_eq!(remote, expected);
        assert_eq!(remote.trend_series(), expected.trend_series());
    }

    #[test]
    fn remote_failures_surface_as_backend_errors() {
        let failing = |_: &str| -> Result<String> { Err(EngineError::Io(std::io::ErrorKind::TimedOut.into())) };
        let err = RemoteBackend::new(failing).run(&request("v")).unwrap_err();
        assert!(matches!(err, EngineError::Backend(_)));

        let garbage = |_: &str| -> Result<String> { Ok("<html>".into()) };
        let err = RemoteBackend::new(garbage).run(&request("v")).unwrap_err();
        assert!(matches!(err, EngineError::Backend(_)));
    }

    #[test]
    fn backend_response_contract_parses() {
        let body = r#"{
            "summary": [{
                "metric": "trips", "agg_func": "sum",
                "control_pre": 20.0, "control_post": 30.0, "control_delta": 10.0,
                "test_pre": 5.0, "test_post": 20.0, "test_delta": 15.0,
                "diff_in_diff": 5.0, "diff_in_diff_pct": null
            }],
            "time_series": [
                {"date": "2025-01-02", "cohort_type": "control", "period": "post",
                 "metric": "trips", "agg_func": "sum", "value": 5.0},
                {"date": "2025-01-01", "cohort_type": "test", "period": "pre",
                 "metric": "trips", "agg_func": "sum", "value": 10.0,
                 "breakout_value": "north"}
            ]
        }"#;
        let response: AnalysisResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.summary[0].diff_in_diff_pct, None);
        assert_eq!(response.summary[0].breakout_value, None);

        let trend = response.trend_series();
        let keys: Vec<&str> = trend.lines.iter().map(|l| l.key.as_str()).collect();
        assert_eq!(keys, ["control_post", "north::test_pre"]);
        assert_eq!(trend.value("2025-01-01", "north::test_pre"), Some(10.0));
    }

    #[test]
    fn service_replies_with_its_own_method_names_parse() {
        let body = r#"{
            "summary": [
                {"metric": "trips", "agg_func": "mean",
                 "control_pre": 2.0, "control_post": 3.0, "control_delta": 1.0,
                 "control_delta_pct": 50.0,
                 "test_pre": 0.0, "test_post": 1.0, "test_delta": 1.0,
                 "test_delta_pct": null,
                 "diff_in_diff": 0.0, "diff_in_diff_pct": 0.0},
                {"metric": "captain_id", "agg_func": "nunique",
                 "control_pre": 1.0, "control_post": 1.0, "control_delta": 0.0,
                 "control_delta_pct": 0.0,
                 "test_pre": 1.0, "test_post": 2.0, "test_delta": 1.0,
                 "test_delta_pct": 100.0,
                 "diff_in_diff": 1.0, "diff_in_diff_pct": 100.0}
            ],
            "time_series": [
                {"date": "2025-01-01", "cohort_type": "test", "period": "pre",
                 "metric": "trips", "agg_func": "mean", "value": 0.0}
            ],
            "total_participants": 3
        }"#;
        let transport = |_: &str| -> Result<String> { Ok(body.to_string()) };
        let response = RemoteBackend::new(transport).run(&request("trips")).unwrap();

        let methods: Vec<AggMethod> = response.summary.iter().map(|r| r.agg).collect();
        assert_eq!(methods, [AggMethod::Avg, AggMethod::CountDistinct]);
        assert_eq!(response.summary[0].control_delta_pct, Some(50.0));
        assert_eq!(response.summary[0].test_delta_pct, None);
        assert_eq!(response.summary[0].label, "");
        assert_eq!(response.time_series[0].agg_func, AggMethod::Avg);
        assert_eq!(response.total_participants, 3);
    }

    #[test]
    fn strategy_uses_configured_threshold() {
        let strategy = BackendStrategy::new(100);
        assert_eq!(strategy.choose(100), BackendKind::InProcess);
        assert_eq!(strategy.choose(101), BackendKind::Remote);
        let default = BackendStrategy::from_config(&EngineConfig::default());
        assert_eq!(default.choose(1024), BackendKind::InProcess);
    }

    #[test]
    fn stale_runs_are_discarded() {
        let mut tracker = RunTracker::new();
        let first = tracker.begin();
        let second = tracker.begin();
        assert_eq!(tracker.accept(first, "old"), None);
        assert_eq!(tracker.accept(second, "new"), Some("new"));
    }
}
