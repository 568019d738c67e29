//! Engine configuration.
//!
//! Loaded from a JSON file, a JSON string, or the file named by
//! `PRISM_QUERY_CONFIG`. Missing keys take their defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_PATH_ENV: &str = "PRISM_QUERY_CONFIG";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: std::io::Error },
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Window applied when a TimeRange node names none.
    pub default_time_range: String,
    pub default_event_before_days: i64,
    pub default_event_after_days: i64,
    /// Trailing window for rolling regressions and rolling transforms.
    pub default_rolling_window: usize,
    /// N for Top N / Bottom N when the node gives none.
    pub default_classification_count: usize,
    /// Evaluate sibling subtrees on the rayon pool.
    pub parallel_children: bool,
    pub max_tree_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_time_range: "Last Twelve Months".to_string(),
            default_event_before_days: 5,
            default_event_after_days: 5,
            default_rolling_window: 60,
            default_classification_count: 10,
            parallel_children: false,
            max_tree_depth: 64,
        }
    }
}

impl EngineConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let cfg: EngineConfig = serde_json::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        Self::from_json(&text)
    }

    /// Reads the file named by `PRISM_QUERY_CONFIG`, falling back to the
    /// defaults when the variable is unset or the file is unusable.
    pub fn from_env() -> Self {
        let Some(path) = std::env::var(CONFIG_PATH_ENV)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
        else {
            return Self::default();
        };
        let path = PathBuf::from(path);
        match Self::load(&path) {
            Ok(cfg) => cfg,
            Err(err) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to load engine config; using defaults"
                );
                Self::default()
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_tree_depth == 0 {
            return Err(ConfigError::Invalid("max_tree_depth must be positive".into()));
        }
        if self.default_rolling_window < 2 {
            return Err(ConfigError::Invalid("default_rolling_window must be at least 2".into()));
        }
        if self.default_event_before_days < 0 || self.default_event_after_days < 0 {
            return Err(ConfigError::Invalid("event window days must not be negative".into()));
        }
        Ok(())
    }
}
