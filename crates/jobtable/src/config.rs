//! Runtime configuration for a job table.
//!
//! [`TableConfig`] holds the defaults the query-string codec falls back to
//! and the limits the bulk-action coordinator works within. It can be built
//! in code or loaded from JSON; missing fields take their defaults.
//!
//! ```rust
//! use jobtable::config::TableConfig;
//!
//! let config = TableConfig::from_json_str(r#"{ "defaultPageSize": 100 }"#).unwrap();
//! assert_eq!(config.default_page_size, 100);
//! assert_eq!(config.mutation_batch_size, 10_000);
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::column::ColumnId;
use crate::state::{Sort, SortDirection};

/// Configuration for the table engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TableConfig {
    /// Page size used when the URL does not carry one.
    pub default_page_size: usize,

    /// Sort used when the URL does not carry one.
    pub default_sort: Sort,

    /// Window size when enumerating the jobs under a selected group.
    pub max_jobs_per_request: usize,

    /// Maximum number of job ids sent in one mutation call.
    pub mutation_batch_size: usize,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            default_page_size: 50,
            default_sort: Sort::new(ColumnId::JobId, SortDirection::Descending),
            max_jobs_per_request: 10_000,
            mutation_batch_size: 10_000,
        }
    }
}

impl TableConfig {
    /// Create a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON document and validates it.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(path.to_path_buf(), e.to_string()))?;
        Self::from_json_str(&json)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_page_size == 0 {
            return Err(ConfigError::ZeroSize("defaultPageSize"));
        }
        if self.max_jobs_per_request == 0 {
            return Err(ConfigError::ZeroSize("maxJobsPerRequest"));
        }
        if self.mutation_batch_size == 0 {
            return Err(ConfigError::ZeroSize("mutationBatchSize"));
        }
        Ok(())
    }
}

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("cannot read config file {0}: {1}")]
    Read(PathBuf, String),

    /// Config document is not valid JSON for this schema.
    #[error("invalid config: {0}")]
    Parse(String),

    /// A size setting was zero.
    #[error("{0} must be greater than zero")]
    ZeroSize(&'static str),
}
