//! # Engine Configuration
//!
//! Tunables for query compilation and execution, loaded from YAML with
//! per-environment overrides or built from defaults plus environment
//! variables.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use graphload_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load_from_file("config/graphload.yaml")?;
//! let depth = manager.config().max_association_depth;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::constants::{DEFAULT_MAX_ASSOCIATION_DEPTH, DEFAULT_PAGE_SIZE};
use serde::{Deserialize, Serialize};

pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigManager;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on join steps emitted for one association path
    pub max_association_depth: usize,
    /// Emit the rendered SQL of every round-trip at debug level
    pub log_sql: bool,
    /// Page size used when a page request does not name one
    pub default_page_size: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_association_depth: DEFAULT_MAX_ASSOCIATION_DEPTH,
            log_sql: false,
            default_page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl EngineConfig {
    /// Defaults overlaid with `GRAPHLOAD_MAX_ASSOCIATION_DEPTH` and
    /// `GRAPHLOAD_LOG_SQL`
    pub fn from_env() -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Ok(depth) = std::env::var("GRAPHLOAD_MAX_ASSOCIATION_DEPTH") {
            config.max_association_depth = depth.parse().map_err(|e| {
                ConfigError::invalid_value(
                    "max_association_depth",
                    depth.clone(),
                    format!("{e}"),
                )
            })?;
        }

        if let Ok(log_sql) = std::env::var("GRAPHLOAD_LOG_SQL") {
            config.log_sql = log_sql.parse().map_err(|e| {
                ConfigError::invalid_value("log_sql", log_sql.clone(), format!("{e}"))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_association_depth == 0 {
            return Err(ConfigError::invalid_value(
                "max_association_depth",
                "0",
                "must allow at least one join step",
            ));
        }
        if self.default_page_size == 0 {
            return Err(ConfigError::invalid_value(
                "default_page_size",
                "0",
                "page size must be positive",
            ));
        }
        Ok(())
    }
}
