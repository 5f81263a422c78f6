//! Display formatting for summary cells: en-US digit grouping, fixed
//! precision per value kind, signed deltas.

use crate::aggregation::AggMethod;

/// Rendered in place of a missing value.
pub const MISSING: &str = "—";

const MINUS: char = '\u{2212}';

/// Which precision rule applies to a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Counts: grouped, no decimals.
    Integer,
    /// Ratio metrics: between two and four decimals.
    Ratio,
    /// Everything else: two decimals.
    Decimal,
}

impl ValueKind {
    pub fn for_selection(agg: AggMethod, is_ratio_metric: bool) -> Self {
        if is_ratio_metric || agg == AggMethod::Ratio {
            ValueKind::Ratio
        } else if agg.is_count() {
            ValueKind::Integer
        } else {
            ValueKind::Decimal
        }
    }

    fn fraction_digits(self) -> (usize, usize) {
        match self {
            ValueKind::Integer => (0, 0),
            ValueKind::Ratio => (2, 4),
            ValueKind::Decimal => (2, 2),
        }
    }
}

pub fn format_value(value: Option<f64>, kind: ValueKind) -> String {
    match value.filter(|v| v.is_finite()) {
        None => MISSING.to_string(),
        Some(v) => {
            let (min, max) = kind.fraction_digits();
            let (negative, digits) = render(v, min, max);
            if negative {
                format!("-{digits}")
            } else {
                digits
            }
        }
    }
}

/// Like [`format_value`] but always signed with `+` or `−`.
pub fn format_delta(value: Option<f64>, kind: ValueKind) -> String {
    match value.filter(|v| v.is_finite()) {
        None => MISSING.to_string(),
        Some(v) => {
            let (min, max) = kind.fraction_digits();
            signed(render(v, min, max))
        }
    }
}

/// Signed percentage with two decimals, e.g. `+12.50%`.
pub fn format_lift_pct(value: Option<f64>) -> String {
    match value.filter(|v| v.is_finite()) {
        None => MISSING.to_string(),
        Some(v) => format!("{}%", signed(render(v, 2, 2))),
    }
}

fn signed((negative, digits): (bool, String)) -> String {
    if negative {
        format!("{MINUS}{digits}")
    } else {
        format!("+{digits}")
    }
}

/// Round `v` to at most `max` decimals, trim trailing zeros down to `min`,
/// and group the integer part. The sign is reported separately and is
/// dropped when the rounded value is zero.
fn render(v: f64, min: usize, max: usize) -> (bool, String) {
    let fixed = format!("{:.*}", max, v.abs());
    let (int_part, frac_part) = match fixed.split_once('.') {
        Some((i, f)) => (i, f),
        None => (fixed.as_str(), ""),
    };

    let mut frac = frac_part.to_string();
    while frac.len() > min && frac.ends_with('0') {
        frac.pop();
    }

    let is_zero = fixed.bytes().all(|b| b == b'0' || b == b'.');
    let grouped = group_thousands(int_part);
    let digits = if frac.is_empty() {
        grouped
    } else {
        format!("{grouped}.{frac}")
    };
    (v < 0.0 && !is_zero, digits)
}

fn group_thousands(digits: &str) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_are_grouped_without_decimals() {
        assert_eq!(format_value(Some(1234567.0), ValueKind::Integer), "1,234,567");
        assert_eq!(format_value(Some(999.4), ValueKind::Integer), "999");
        assert_eq!(format_value(Some(-1500.0), ValueKind::Integer), "-1,500");
    }

    #[test]
    fn decimals_use_two_places() {
        assert_eq!(format_value(Some(1234.5), ValueKind::Decimal), "1,234.50");
        assert_eq!(format_value(Some(0.126), ValueKind::Decimal), "0.13");
    }

    #[test]
    fn ratios_use_two_to_four_places() {
        assert_eq!(format_value(Some(2.0), ValueKind::Ratio), "2.00");
        assert_eq!(format_value(Some(0.12346), ValueKind::Ratio), "0.1235");
        assert_eq!(format_value(Some(1.5), ValueKind::Ratio), "1.50");
        assert_eq!(format_value(Some(0.125), ValueKind::Ratio), "0.125");
    }

    #[test]
    fn deltas_are_always_signed() {
        assert_eq!(format_delta(Some(3.0), ValueKind::Integer), "+3");
        assert_eq!(format_delta(Some(-2.5), ValueKind::Decimal), "\u{2212}2.50");
        assert_eq!(format_delta(Some(0.0), ValueKind::Decimal), "+0.00");
        assert_eq!(format_delta(Some(-0.001), ValueKind::Decimal), "+0.00");
        assert_eq!(format_lift_pct(Some(12.5)), "+12.50%");
    }

    #[test]
    fn missing_values_render_as_dash() {
        assert_eq!(format_value(None, ValueKind::Decimal), MISSING);
        assert_eq!(format_delta(Some(f64::NAN), ValueKind::Ratio), MISSING);
        assert_eq!(format_lift_pct(None), MISSING);
    }

    #[test]
    fn kind_follows_selection() {
        assert_eq!(ValueKind::for_selection(AggMethod::Count, false), ValueKind::Integer);
        assert_eq!(ValueKind::for_selection(AggMethod::Sum, true), ValueKind::Ratio);
        assert_eq!(ValueKind::for_selection(AggMethod::Median, false), ValueKind::Decimal);
    }
}
