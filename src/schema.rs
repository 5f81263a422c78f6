/// Column-name and field-name constants for cohort-lift.
/// Single source of truth - exported to Python via PyO3.

// ── Reserved input columns ──────────────────────────────────────────────────
pub mod input {
    pub const COHORT: &str = "cohort";
    pub const CAPTAIN_ID: &str = "captain_id";
    pub const TIME: &str = "time";

    pub const REQUIRED: [&str; 3] = [COHORT, CAPTAIN_ID, TIME];
}

// ── Cohort types ────────────────────────────────────────────────────────────
pub mod cohort_type {
    pub const TEST: &str = "test";
    pub const CONTROL: &str = "control";
}

// ── Periods ─────────────────────────────────────────────────────────────────
pub mod period {
    pub const PRE: &str = "pre";
    pub const POST: &str = "post";
}

// ── Breakout ────────────────────────────────────────────────────────────────
pub mod breakout {
    /// Stand-in for an empty or missing breakout value. Always sorts first.
    pub const UNKNOWN: &str = "Unknown";
    /// Separator between the breakout value and the segment in a series key.
    pub const KEY_SEPARATOR: &str = "::";
}

// ── Summary (executive row) fields ──────────────────────────────────────────
pub mod summary {
    pub const METRIC: &str = "metric";
    pub const LABEL: &str = "label";
    pub const AGG_FUNC: &str = "agg_func";
    pub const BREAKOUT_VALUE: &str = "breakout_value";
    pub const CONTROL_PRE: &str = "control_pre";
    pub const CONTROL_POST: &str = "control_post";
    pub const CONTROL_DELTA: &str = "control_delta";
    pub const CONTROL_DELTA_PCT: &str = "control_delta_pct";
    pub const TEST_PRE: &str = "test_pre";
    pub const TEST_POST: &str = "test_post";
    pub const TEST_DELTA: &str = "test_delta";
    pub const TEST_DELTA_PCT: &str = "test_delta_pct";
    pub const DIFF_IN_DIFF: &str = "diff_in_diff";
    pub const DIFF_IN_DIFF_PCT: &str = "diff_in_diff_pct";
}

// ── Time series columns ─────────────────────────────────────────────────────
pub mod timeseries {
    pub const DATE: &str = "date";
}
