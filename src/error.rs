use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Metric not found: {0}")]
    MetricNotFound(String),

    #[error("Invalid aggregation: {0}")]
    InvalidAggregation(String),

    #[error("Invalid date range: {0}")]
    InvalidDateRange(String),

    #[error("Backend: {0}")]
    Backend(String),

    #[error("Config: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(feature = "python")]
impl From<EngineError> for pyo3::PyErr {
    fn from(err: EngineError) -> pyo3::PyErr {
        pyo3::exceptions::PyRuntimeError::new_err(err.to_string())
    }
}
