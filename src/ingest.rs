use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufRead, BufReader, Cursor};
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use polars::prelude::{CsvParseOptions, CsvReadOptions, DataFrame, SerReader};
use tracing::{debug, info};

use crate::error::{EngineError, Result};
use crate::row::{Row, Value};
use crate::schema::input;

/// Counters describing what ingestion kept and dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub records_read: usize,
    pub rows_kept: usize,
    pub rows_dropped: usize,
}

/// A parsed upload: typed rows plus the column classification snapshot.
#[derive(Debug, Clone)]
pub struct Dataset {
    rows: Vec<Row>,
    columns: Vec<String>,
    metric_columns: Vec<String>,
    numeric_columns: Vec<String>,
    categorical_columns: Vec<String>,
    cohorts: Vec<String>,
    date_min: Option<NaiveDate>,
    date_max: Option<NaiveDate>,
    stats: IngestStats,
}

impl Dataset {
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Every normalized header, ascending.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// All columns except `cohort` and `time`.
    pub fn metric_columns(&self) -> &[String] {
        &self.metric_columns
    }

    pub fn numeric_columns(&self) -> &[String] {
        &self.numeric_columns
    }

    pub fn categorical_columns(&self) -> &[String] {
        &self.categorical_columns
    }

    pub fn cohorts(&self) -> &[String] {
        &self.cohorts
    }

    pub fn date_min(&self) -> Option<NaiveDate> {
        self.date_min
    }

    pub fn date_max(&self) -> Option<NaiveDate> {
        self.date_max
    }

    pub fn stats(&self) -> IngestStats {
        self.stats
    }

    pub fn is_numeric(&self, column: &str) -> bool {
        self.numeric_columns.iter().any(|c| c == column)
    }
}

// ── Entry points ────────────────────────────────────────────────────────────

/// Ingest delimited text held in memory.
pub fn ingest_csv(text: &str) -> Result<Dataset> {
    let separator = detect_delimiter(text.lines().next().unwrap_or_default());
    let df = read_options(separator)
        .into_reader_with_file_handle(Cursor::new(text.as_bytes().to_vec()))
        .finish()?;
    dataset_from_frame(&df)
}

/// Ingest a delimited file from disk.
pub fn ingest_path(path: impl AsRef<Path>) -> Result<Dataset> {
    let path = path.as_ref();
    let mut header = String::new();
    BufReader::new(File::open(path)?).read_line(&mut header)?;

    let df = read_options(detect_delimiter(&header))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;
    dataset_from_frame(&df)
}

fn read_options(separator: u8) -> CsvReadOptions {
    CsvReadOptions::default()
        .with_has_header(false)
        .with_infer_schema_length(Some(0)) // all columns as String
        .with_parse_options(CsvParseOptions::default().with_separator(separator))
}

const DELIMITERS: [u8; 4] = [b',', b';', b'\t', b'|'];

/// Pick the candidate delimiter that occurs most often in the header line.
/// Ties go to the earlier candidate, so plain CSV wins by default.
pub fn detect_delimiter(header: &str) -> u8 {
    let mut best = (b',', 0);
    for candidate in DELIMITERS {
        let count = header.bytes().filter(|&b| b == candidate).count();
        if count > best.1 {
            best = (candidate, count);
        }
    }
    best.0
}

// ── Frame → rows ────────────────────────────────────────────────────────────

/// The header row is read as data (row 0) so that blank header cells can be
/// dropped instead of receiving generated names.
fn dataset_from_frame(df: &DataFrame) -> Result<Dataset> {
    let mut headers: Vec<String> = Vec::new();
    let mut cells = Vec::new();
    for column in df.get_columns() {
        let values = column.as_materialized_series().str()?;
        let header = values.get(0).map(normalize_header).unwrap_or_default();
        if header.is_empty() {
            continue;
        }
        if headers.contains(&header) {
            debug!(column = %header, "duplicate header ignored");
            continue;
        }
        headers.push(header);
        cells.push(values);
    }

    let position = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| EngineError::MissingColumn(name.to_string()))
    };
    let mut required = [0usize; 3];
    for (slot, name) in required.iter_mut().zip(input::REQUIRED) {
        *slot = position(name)?;
    }
    let [cohort_idx, captain_idx, time_idx] = required;

    // Everything except cohort and time lands in the row's field map.
    let field_idx: Vec<usize> = (0..headers.len())
        .filter(|&i| i != cohort_idx && i != time_idx)
        .collect();

    let records_read = df.height().saturating_sub(1);
    let mut pending = Vec::with_capacity(records_read);
    let mut numeric_seen: BTreeSet<usize> = BTreeSet::new();

    for r in 1..df.height() {
        let cell = |c: usize| cells[c].get(r).map(str::trim).filter(|s| !s.is_empty());
        let (Some(cohort), Some(captain_id), Some(time)) = (
            cell(cohort_idx),
            cell(captain_idx),
            cell(time_idx).and_then(parse_day),
        ) else {
            debug!(record = r, "record dropped");
            continue;
        };

        let raw: Vec<Option<&str>> = field_idx.iter().map(|&c| cell(c)).collect();
        for (slot, value) in raw.iter().enumerate() {
            if value.and_then(parse_number).is_some() {
                numeric_seen.insert(slot);
            }
        }
        pending.push((cohort, captain_id, time, raw));
    }

    // Second pass: coerce with the now-final classification.
    let mut rows = Vec::with_capacity(pending.len());
    for (cohort, captain_id, time, raw) in pending {
        let fields: BTreeMap<String, Value> = raw
            .into_iter()
            .enumerate()
            .map(|(slot, value)| {
                let name = headers[field_idx[slot]].clone();
                let value = match value {
                    None => Value::Null,
                    Some(s) if numeric_seen.contains(&slot) => {
                        parse_number(s).map_or(Value::Null, Value::Numeric)
                    }
                    Some(s) => Value::Text(s.to_string()),
                };
                (name, value)
            })
            .collect();
        rows.push(Row::new(cohort, captain_id, time, fields));
    }

    let stats = IngestStats {
        records_read,
        rows_kept: rows.len(),
        rows_dropped: records_read - rows.len(),
    };

    let mut columns = headers.clone();
    columns.sort();

    let metric_columns: Vec<String> = columns
        .iter()
        .filter(|c| c.as_str() != input::COHORT && c.as_str() != input::TIME)
        .cloned()
        .collect();
    let numeric_names: BTreeSet<&str> = numeric_seen
        .iter()
        .map(|&slot| headers[field_idx[slot]].as_str())
        .collect();
    let numeric_columns: Vec<String> = metric_columns
        .iter()
        .filter(|c| numeric_names.contains(c.as_str()))
        .cloned()
        .collect();
    let categorical_columns: Vec<String> = metric_columns
        .iter()
        .filter(|c| !numeric_names.contains(c.as_str()) && c.as_str() != input::CAPTAIN_ID)
        .cloned()
        .collect();

    let cohorts: Vec<String> = rows
        .iter()
        .map(|r| r.cohort().to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let date_min = rows.iter().map(Row::time).min();
    let date_max = rows.iter().map(Row::time).max();

    info!(
        records = stats.records_read,
        kept = stats.rows_kept,
        dropped = stats.rows_dropped,
        numeric = numeric_columns.len(),
        categorical = categorical_columns.len(),
        "ingested dataset"
    );

    Ok(Dataset {
        rows,
        columns,
        metric_columns,
        numeric_columns,
        categorical_columns,
        cohorts,
        date_min,
        date_max,
        stats,
    })
}

fn normalize_header(raw: &str) -> String {
    raw.trim_start_matches('\u{feff}').trim().to_string()
}

// ── Value parsing ───────────────────────────────────────────────────────────

/// Integers and decimals; anything non-finite is rejected.
pub fn parse_number(raw: &str) -> Option<f64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse a calendar day. `YYYY-MM-DD` and `YYYYMMDD` are recognised directly;
/// other encodings go through a set of generic formats and keep only the date.
pub fn parse_day(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    let bytes = s.as_bytes();
    if bytes.len() == 10 && bytes[4] == b'-' && bytes[7] == b'-' {
        return NaiveDate::parse_from_str(s, "%Y-%m-%d").ok();
    }
    if bytes.len() == 8 && bytes.iter().all(u8::is_ascii_digit) {
        let year = s[0..4].parse().ok()?;
        let month = s[4..6].parse().ok()?;
        let day = s[6..8].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }
    parse_day_generic(s)
}

fn parse_day_generic(s: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt.date());
        }
    }
    for format in ["%Y/%m/%d", "%m/%d/%Y", "%Y-%m-%d"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, format) {
            return Some(d);
        }
    }
    None
}
