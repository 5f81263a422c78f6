use chrono::NaiveDate;
use pyo3::prelude::*;
use pyo3::types::PyModule;
use pyo3_polars::PyDataFrame;

use crate::aggregation::AggMethod;
use crate::comparison::Comparison;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::frame::{summary_frame, trend_frame};
use crate::ingest::{ingest_csv, ingest_path, Dataset};
use crate::metric::MetricCatalog;
use crate::row::DateRange;
use crate::schema;
use crate::summary::{compute_executive_summary, compute_executive_summary_by_breakout, Selection};
use crate::trend::compute_trend_series;

/// Export schema constants as Python submodules
fn add_schema_exports(m: &Bound<'_, PyModule>) -> PyResult<()> {
    let input = PyModule::new(m.py(), "input")?;
    input.add("COHORT", schema::input::COHORT)?;
    input.add("CAPTAIN_ID", schema::input::CAPTAIN_ID)?;
    input.add("TIME", schema::input::TIME)?;
    m.add_submodule(&input)?;

    let breakout = PyModule::new(m.py(), "breakout")?;
    breakout.add("UNKNOWN", schema::breakout::UNKNOWN)?;
    breakout.add("KEY_SEPARATOR", schema::breakout::KEY_SEPARATOR)?;
    m.add_submodule(&breakout)?;

    let agg_func = PyModule::new(m.py(), "agg_func")?;
    for method in AggMethod::ALL {
        agg_func.add(method.as_str().to_uppercase(), method.as_str())?;
    }
    m.add_submodule(&agg_func)?;

    Ok(())
}

/// A loaded dataset plus its metric catalog.
#[pyclass(name = "CohortAnalysis")]
pub struct PyCohortAnalysis {
    dataset: Dataset,
    catalog: MetricCatalog,
}

impl PyCohortAnalysis {
    fn build(dataset: Dataset, config_json: Option<&str>) -> Result<Self, EngineError> {
        let config = match config_json {
            Some(text) => EngineConfig::from_json(text)?,
            None => EngineConfig::default(),
        };
        let catalog = MetricCatalog::for_dataset(&dataset, &config.ratio_metrics);
        Ok(Self { dataset, catalog })
    }

    fn comparison(
        test_cohort: String,
        control_cohort: String,
        pre: (NaiveDate, NaiveDate),
        post: (NaiveDate, NaiveDate),
    ) -> Result<Comparison, EngineError> {
        Ok(Comparison::new(
            test_cohort,
            control_cohort,
            DateRange::new(pre.0, pre.1)?,
            DateRange::new(post.0, post.1)?,
        ))
    }
}

#[pymethods]
impl PyCohortAnalysis {
    /// Parse CSV text. `config_json` may declare ratio metrics.
    #[staticmethod]
    #[pyo3(signature = (text, config_json=None))]
    fn from_csv(text: &str, config_json: Option<&str>) -> PyResult<Self> {
        Ok(Self::build(ingest_csv(text)?, config_json)?)
    }

    #[staticmethod]
    #[pyo3(signature = (path, config_json=None))]
    fn from_path(path: &str, config_json: Option<&str>) -> PyResult<Self> {
        Ok(Self::build(ingest_path(path)?, config_json)?)
    }

    // ── Properties ──────────────────────────────────────────────────────────

    #[getter]
    fn columns(&self) -> Vec<String> {
        self.dataset.columns().to_vec()
    }

    #[getter]
    fn numeric_columns(&self) -> Vec<String> {
        self.dataset.numeric_columns().to_vec()
    }

    #[getter]
    fn categorical_columns(&self) -> Vec<String> {
        self.dataset.categorical_columns().to_vec()
    }

    #[getter]
    fn cohorts(&self) -> Vec<String> {
        self.dataset.cohorts().to_vec()
    }

    #[getter]
    fn date_min(&self) -> Option<NaiveDate> {
        self.dataset.date_min()
    }

    #[getter]
    fn date_max(&self) -> Option<NaiveDate> {
        self.dataset.date_max()
    }

    #[getter]
    fn metrics(&self) -> Vec<(String, String)> {
        self.catalog
            .metrics()
            .iter()
            .map(|m| (m.key.clone(), m.label.clone()))
            .collect()
    }

    // ── Computation ─────────────────────────────────────────────────────────

    /// Diff-in-diff table. `selections` is a list of `(metric, agg_func)`.
    #[pyo3(signature = (test_cohort, control_cohort, pre, post, selections, breakout=None))]
    fn executive_summary(
        &self,
        test_cohort: String,
        control_cohort: String,
        pre: (NaiveDate, NaiveDate),
        post: (NaiveDate, NaiveDate),
        selections: Vec<(String, String)>,
        breakout: Option<&str>,
    ) -> PyResult<PyDataFrame> {
        let cmp = Self::comparison(test_cohort, control_cohort, pre, post)?;
        let selections = selections
            .into_iter()
            .map(|(metric, agg)| -> Result<Selection, EngineError> {
                Ok(Selection::new(metric, agg.parse::<AggMethod>()?))
            })
            .collect::<Result<Vec<_>, EngineError>>()?;

        let rows = self.dataset.rows();
        let summary = match breakout {
            Some(column) => {
                compute_executive_summary_by_breakout(rows, &cmp, &self.catalog, &selections, column)
            }
            None => compute_executive_summary(rows, &cmp, &self.catalog, &selections),
        };
        Ok(PyDataFrame(summary_frame(&summary)?))
    }

    /// Daily trend table with one column per series key.
    #[pyo3(signature = (test_cohort, control_cohort, pre, post, metric, agg_func, date_range, breakout=None))]
    #[allow(clippy::too_many_arguments)]
    fn trend_series(
        &self,
        test_cohort: String,
        control_cohort: String,
        pre: (NaiveDate, NaiveDate),
        post: (NaiveDate, NaiveDate),
        metric: &str,
        agg_func: &str,
        date_range: (NaiveDate, NaiveDate),
        breakout: Option<&str>,
    ) -> PyResult<PyDataFrame> {
        let cmp = Self::comparison(test_cohort, control_cohort, pre, post)?;
        let metric = self
            .catalog
            .get(metric)
            .ok_or_else(|| EngineError::MetricNotFound(metric.to_string()))?;
        let agg = agg_func.parse::<AggMethod>()?;
        let range = DateRange::new(date_range.0, date_range.1)?;

        let series =
            compute_trend_series(self.dataset.rows(), &cmp, &metric, agg, &range, breakout);
        Ok(PyDataFrame(trend_frame(&series)?))
    }
}

#[pymodule]
#[pyo3(name = "_core")]
fn core_module(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyCohortAnalysis>()?;
    add_schema_exports(m)?;
    Ok(())
}
