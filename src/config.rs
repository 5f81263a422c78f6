use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::metric::RatioDefinition;

/// Engine settings. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Inputs larger than this are computed by the remote backend.
    pub in_process_max_bytes: usize,
    /// Derived ratio metrics offered alongside the dataset columns.
    pub ratio_metrics: Vec<RatioDefinition>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            in_process_max_bytes: 25 * 1024 * 1024,
            ratio_metrics: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<()> {
        let mut keys = BTreeSet::new();
        for def in &self.ratio_metrics {
            if def.key.trim().is_empty() {
                return Err(EngineError::Config("ratio metric with empty key".into()));
            }
            if def.numerator.trim().is_empty() || def.denominator.trim().is_empty() {
                return Err(EngineError::Config(format!(
                    "ratio metric '{}' must name both columns",
                    def.key
                )));
            }
            if !keys.insert(def.key.as_str()) {
                return Err(EngineError::Config(format!(
                    "duplicate ratio metric '{}'",
                    def.key
                )));
            }
        }
        Ok(())
    }
}
