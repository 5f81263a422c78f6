use polars::prelude::{Column, DataFrame, NamedFrom, Series};

use crate::error::Result;
use crate::schema::{summary, timeseries};
use crate::summary::ExecutiveRow;
use crate::trend::TrendMultiSeries;

type ValueGetter = fn(&ExecutiveRow) -> Option<f64>;

const SUMMARY_VALUES: [(&str, ValueGetter); 10] = [
    (summary::CONTROL_PRE, |r| r.control_pre),
    (summary::CONTROL_POST, |r| r.control_post),
    (summary::CONTROL_DELTA, |r| r.control_delta),
    (summary::CONTROL_DELTA_PCT, |r| r.control_delta_pct),
    (summary::TEST_PRE, |r| r.test_pre),
    (summary::TEST_POST, |r| r.test_post),
    (summary::TEST_DELTA, |r| r.test_delta),
    (summary::TEST_DELTA_PCT, |r| r.test_delta_pct),
    (summary::DIFF_IN_DIFF, |r| r.diff_in_diff),
    (summary::DIFF_IN_DIFF_PCT, |r| r.diff_in_diff_pct),
];

/// Executive rows as a frame: `metric`, `label`, `agg_func`, `breakout_value`
/// (only when any row has one), then the value columns.
pub fn summary_frame(rows: &[ExecutiveRow]) -> Result<DataFrame> {
    let mut columns: Vec<Column> = Vec::with_capacity(SUMMARY_VALUES.len() + 4);

    let metric: Vec<&str> = rows.iter().map(|r| r.metric.as_str()).collect();
    columns.push(Series::new(summary::METRIC.into(), metric).into());

    let label: Vec<&str> = rows.iter().map(|r| r.label.as_str()).collect();
    columns.push(Series::new(summary::LABEL.into(), label).into());

    let agg: Vec<&str> = rows.iter().map(|r| r.agg.as_str()).collect();
    columns.push(Series::new(summary::AGG_FUNC.into(), agg).into());

    if rows.iter().any(|r| r.breakout_value.is_some()) {
        let breakout: Vec<Option<&str>> =
            rows.iter().map(|r| r.breakout_value.as_deref()).collect();
        columns.push(Series::new(summary::BREAKOUT_VALUE.into(), breakout).into());
    }

    for (name, get) in SUMMARY_VALUES {
        let values: Vec<Option<f64>> = rows.iter().map(get).collect();
        columns.push(Series::new(name.into(), values).into());
    }

    Ok(DataFrame::new(columns)?)
}

/// Trend table as a frame: `date`, then one column per series key.
pub fn trend_frame(series: &TrendMultiSeries) -> Result<DataFrame> {
    let mut columns: Vec<Column> = Vec::with_capacity(series.lines.len() + 1);

    let dates: Vec<&str> = series.data.iter().map(|r| r.date.as_str()).collect();
    columns.push(Series::new(timeseries::DATE.into(), dates).into());

    for line in &series.lines {
        let values: Vec<Option<f64>> = series
            .data
            .iter()
            .map(|r| r.values.get(&line.key).copied().flatten())
            .collect();
        columns.push(Series::new(line.key.as_str().into(), values).into());
    }

    Ok(DataFrame::new(columns)?)
}
