//! Compiler configuration

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::optimizer::OptimizationLevel;

/// Settings for one `Engine`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// SQL optimizer passes to run
    pub optimization_level: OptimizationLevel,
    /// First value handed out by each compilation's id allocator
    pub id_start: u64,
    /// Allow two-hop joins (`account_id__customer_id__customer_name`)
    pub enable_multi_hop_joins: bool,
    /// Calendar table cumulative metrics are computed over
    pub time_spine: TimeSpineSource,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            optimization_level: OptimizationLevel::O4,
            id_start: 0,
            enable_multi_hop_joins: true,
            time_spine: TimeSpineSource::default(),
        }
    }
}

/// A warehouse table holding one row per day, with no gaps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeSpineSource {
    pub table_name: String,
    /// Date column of the table, at day granularity
    pub column_name: String,
}

impl Default for TimeSpineSource {
    fn default() -> Self {
        Self {
            table_name: "time_spine".to_string(),
            column_name: "ds".to_string(),
        }
    }
}

impl CompilerConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("failed to read {}: {}", path.as_ref().display(), e)))?;
        Self::from_yaml_str(&contents)
    }
}
