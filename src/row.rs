use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// A single field value after ingestion.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Numeric(f64),
    Text(String),
    Null,
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Numeric(v) if v.is_finite() => Some(*v),
            _ => None,
        }
    }

    /// Present and, for text, non-blank.
    pub fn is_present(&self) -> bool {
        match self {
            Value::Numeric(_) => true,
            Value::Text(s) => !s.trim().is_empty(),
            Value::Null => false,
        }
    }

    /// Trimmed string rendering used for distinct counting and breakout keys.
    /// Empty for `Null` and blank text.
    pub fn key_string(&self) -> String {
        match self {
            Value::Numeric(v) => format_number_key(*v),
            Value::Text(s) => s.trim().to_string(),
            Value::Null => String::new(),
        }
    }
}

/// Integral values render without a fractional part so that `3` and `3.0`
/// collapse to the same key.
fn format_number_key(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            other => f.write_str(&other.key_string()),
        }
    }
}

/// One observation: an entity (captain) in a cohort on a calendar day.
///
/// `fields` holds every non-reserved column, including `captain_id` itself,
/// so the identifier can be counted like any other metric column.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub(crate) cohort: String,
    pub(crate) captain_id: String,
    pub(crate) time: NaiveDate,
    pub(crate) fields: BTreeMap<String, Value>,
}

impl Row {
    pub fn new(
        cohort: impl Into<String>,
        captain_id: impl Into<String>,
        time: NaiveDate,
        fields: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            cohort: cohort.into(),
            captain_id: captain_id.into(),
            time,
            fields,
        }
    }

    pub fn cohort(&self) -> &str {
        &self.cohort
    }

    pub fn captain_id(&self) -> &str {
        &self.captain_id
    }

    pub fn time(&self) -> NaiveDate {
        self.time
    }

    pub fn get(&self, column: &str) -> &Value {
        self.fields.get(column).unwrap_or(&Value::Null)
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }
}

/// Inclusive range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(EngineError::InvalidDateRange(format!(
                "start {start} is after end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}
