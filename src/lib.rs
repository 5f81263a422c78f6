//! Cohort experiment analysis: CSV ingestion into typed rows, metric
//! aggregation, diff-in-diff executive summaries with optional breakout,
//! and multi-series daily trends.

pub mod aggregation;
pub mod backend;
pub mod comparison;
pub mod config;
pub mod error;
pub mod format;
pub mod frame;
pub mod ingest;
pub mod metric;
pub mod row;
pub mod schema;
pub mod summary;
pub mod trend;

#[cfg(feature = "python")]
mod python;

pub use aggregation::{aggregate, safe_divide, AggMethod};
pub use backend::{
    AnalysisRequest, AnalysisResponse, BackendKind, BackendStrategy, ComputeBackend,
    InProcessBackend, RemoteBackend, RunTracker, Transport, TrendRequest,
};
pub use comparison::{CohortType, Comparison, Period};
pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use ingest::{detect_delimiter, ingest_csv, ingest_path, Dataset, IngestStats};
pub use metric::{Metric, MetricCatalog, MetricKind, RatioDefinition};
pub use row::{DateRange, Row, Value};
pub use summary::{
    breakout_groups, compute_executive_summary, compute_executive_summary_by_breakout,
    total_participants, ExecutiveRow, Selection,
};
pub use trend::{
    compute_trend_series, shape_trend_series, trend_points, SeriesLine, TimeSeriesPoint,
    TrendMultiSeries, TrendRow,
};
