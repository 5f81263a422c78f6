use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::row::{DateRange, Row};
use crate::schema::{cohort_type, period};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CohortType {
    Test,
    Control,
}

impl CohortType {
    pub fn as_str(self) -> &'static str {
        match self {
            CohortType::Test => cohort_type::TEST,
            CohortType::Control => cohort_type::CONTROL,
        }
    }
}

impl fmt::Display for CohortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Pre,
    Post,
}

impl Period {
    pub fn as_str(self) -> &'static str {
        match self {
            Period::Pre => period::PRE,
            Period::Post => period::POST,
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The user's choice of cohorts and periods for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comparison {
    pub test_cohort: String,
    pub control_cohort: String,
    pub pre: DateRange,
    pub post: DateRange,
}

impl Comparison {
    pub fn new(
        test_cohort: impl Into<String>,
        control_cohort: impl Into<String>,
        pre: DateRange,
        post: DateRange,
    ) -> Self {
        Self {
            test_cohort: test_cohort.into(),
            control_cohort: control_cohort.into(),
            pre,
            post,
        }
    }

    /// Test is checked before control.
    pub fn cohort_type(&self, cohort: &str) -> Option<CohortType> {
        if cohort == self.test_cohort {
            Some(CohortType::Test)
        } else if cohort == self.control_cohort {
            Some(CohortType::Control)
        } else {
            None
        }
    }

    /// Post wins when the ranges overlap on `date`.
    pub fn period(&self, date: NaiveDate) -> Option<Period> {
        if self.post.contains(date) {
            Some(Period::Post)
        } else if self.pre.contains(date) {
            Some(Period::Pre)
        } else {
            None
        }
    }

    /// In either cohort and in either period.
    pub fn is_relevant(&self, row: &Row) -> bool {
        (row.cohort() == self.test_cohort || row.cohort() == self.control_cohort)
            && (self.pre.contains(row.time()) || self.post.contains(row.time()))
    }
}
