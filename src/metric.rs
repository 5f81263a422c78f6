use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ingest::Dataset;

/// A derived ratio metric as declared in configuration.
///
/// NOTE: the key follows the "x2y" convention, which reads as y per x. The
/// aggregate is `sum(denominator) / sum(numerator)`: `numerator` names the
/// `x` column and `denominator` names the `y` column. Labels already shipped
/// with this convention, so the direction must not be "fixed" here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatioDefinition {
    pub key: String,
    pub label: String,
    pub numerator: String,
    pub denominator: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetricKind {
    Column {
        column: String,
    },
    /// Aggregates as `sum(denominator) / sum(numerator)`, see [`RatioDefinition`].
    Ratio {
        numerator: String,
        denominator: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metric {
    pub key: String,
    pub label: String,
    pub kind: MetricKind,
}

impl Metric {
    pub fn column(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            key: name.clone(),
            label: name.clone(),
            kind: MetricKind::Column { column: name },
        }
    }

    pub fn ratio(def: &RatioDefinition) -> Self {
        Self {
            key: def.key.clone(),
            label: def.label.clone(),
            kind: MetricKind::Ratio {
                numerator: def.numerator.clone(),
                denominator: def.denominator.clone(),
            },
        }
    }

    pub fn is_ratio(&self) -> bool {
        matches!(self.kind, MetricKind::Ratio { .. })
    }
}

/// Metrics available for one dataset: configured ratios first, then one
/// column metric per dataset metric column. Any other `x2y` key whose parts
/// are both numeric columns resolves on lookup.
#[derive(Debug, Clone, Default)]
pub struct MetricCatalog {
    metrics: Vec<Metric>,
    numeric_columns: Vec<String>,
}

impl MetricCatalog {
    pub fn new(metrics: Vec<Metric>) -> Self {
        Self {
            metrics,
            numeric_columns: Vec::new(),
        }
    }

    /// Ratios are kept only when both of their columns are numeric in the
    /// dataset. A dataset column whose name collides with a ratio key is
    /// shadowed by the ratio.
    pub fn for_dataset(dataset: &Dataset, ratios: &[RatioDefinition]) -> Self {
        let mut metrics: Vec<Metric> = Vec::new();
        for def in ratios {
            if dataset.is_numeric(&def.numerator) && dataset.is_numeric(&def.denominator) {
                metrics.push(Metric::ratio(def));
            } else {
                debug!(metric = %def.key, "ratio metric skipped, columns not numeric in dataset");
            }
        }
        for column in dataset.metric_columns() {
            if metrics.iter().any(|m| &m.key == column) {
                continue;
            }
            metrics.push(Metric::column(column.as_str()));
        }
        Self {
            metrics,
            numeric_columns: dataset.numeric_columns().to_vec(),
        }
    }

    pub fn get(&self, key: &str) -> Option<Cow<'_, Metric>> {
        if let Some(metric) = self.metrics.iter().find(|m| m.key == key) {
            return Some(Cow::Borrowed(metric));
        }
        self.implicit_ratio(key).map(Cow::Owned)
    }

    /// `x2y` over two numeric columns, tried at every `2` so that column
    /// names containing the digit still split.
    fn implicit_ratio(&self, key: &str) -> Option<Metric> {
        let is_numeric = |column: &str| self.numeric_columns.iter().any(|c| c == column);
        key.match_indices('2').find_map(|(at, _)| {
            let (numerator, denominator) = (&key[..at], &key[at + 1..]);
            (is_numeric(numerator) && is_numeric(denominator)).then(|| {
                Metric::ratio(&RatioDefinition {
                    key: key.to_string(),
                    label: key.to_string(),
                    numerator: numerator.to_string(),
                    denominator: denominator.to_string(),
                })
            })
        })
    }

    pub fn metrics(&self) -> &[Metric] {
        &self.metrics
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::ingest_csv;

    fn orders_per_trip() -> RatioDefinition {
        RatioDefinition {
            key: "trips2orders".into(),
            label: "Orders per trip".into(),
            numerator: "trips".into(),
            denominator: "orders".into(),
        }
    }

    #[test]
    fn catalog_exposes_ratios_and_dataset_columns() {
        let ds = ingest_csv(
            "cohort,captain_id,time,trips,orders,city\n\
             a,c1,2025-01-01,2,3,north\n",
        )
        .unwrap();
        let missing = RatioDefinition {
            key: "trips2tips".into(),
            label: "Tips per trip".into(),
            numerator: "trips".into(),
            denominator: "tips".into(),
        };
        let catalog = MetricCatalog::for_dataset(&ds, &[orders_per_trip(), missing]);

        let keys: Vec<&str> = catalog.metrics().iter().map(|m| m.key.as_str()).collect();
        assert_eq!(
            keys,
            ["trips2orders", "captain_id", "city", "orders", "trips"]
        );
        assert!(catalog.get("trips2orders").unwrap().is_ratio());
        assert!(catalog.get("trips2tips").is_none());
        assert_eq!(catalog.get("city").unwrap().label, "city");
    }

    #[test]
    fn undeclared_ratio_keys_resolve_over_numeric_columns() {
        let ds = ingest_csv(
            "cohort,captain_id,time,trips,orders,l2_hours,city\n\
             a,c1,2025-01-01,2,3,4,north\n",
        )
        .unwrap();
        let catalog = MetricCatalog::for_dataset(&ds, &[]);

        let metric = catalog.get("trips2orders").unwrap();
        assert_eq!(
            metric.kind,
            MetricKind::Ratio {
                numerator: "trips".into(),
                denominator: "orders".into(),
            }
        );
        assert_eq!(metric.label, "trips2orders");

        let metric = catalog.get("l2_hours2trips").unwrap();
        assert_eq!(
            metric.kind,
            MetricKind::Ratio {
                numerator: "l2_hours".into(),
                denominator: "trips".into(),
            }
        );

        // Text columns and unknown columns never form a ratio.
        assert!(catalog.get("trips2city").is_none());
        assert!(catalog.get("trips2tips").is_none());
        assert!(!catalog.metrics().iter().any(|m| m.key == "trips2orders"));
    }
}
