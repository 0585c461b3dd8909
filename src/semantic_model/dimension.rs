//! Dimension and identifier types

use serde::{Deserialize, Serialize};
use super::types::{DimensionType, IdentifierType, TimeGranularity};

/// A dimension: a categorical attribute or a time column of a data source
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Dimension {
    pub name: String,
    #[serde(rename = "type")]
    pub dimension_type: DimensionType,
    #[serde(default)]
    pub expr: Option<String>,
    pub description: Option<String>,
    /// Partition column; joins between sources sharing it add an equality predicate
    #[serde(default)]
    pub is_partition: bool,
    #[serde(default)]
    pub type_params: Option<TimeDimensionParams>,
}

/// Parameters only meaningful for time dimensions
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimeDimensionParams {
    pub time_granularity: TimeGranularity,
    #[serde(default)]
    pub is_primary: bool,
    #[serde(default)]
    pub validity_params: Option<ValidityParams>,
}

/// Marks a time dimension as the start or end of an SCD validity window
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ValidityParams {
    #[serde(default)]
    pub is_start: bool,
    #[serde(default)]
    pub is_end: bool,
}

impl Dimension {
    pub fn expr(&self) -> &str {
        self.expr.as_deref().unwrap_or(&self.name)
    }

    pub fn is_time(&self) -> bool {
        self.dimension_type == DimensionType::Time
    }

    /// Declared granularity, for time dimensions
    pub fn time_granularity(&self) -> Option<TimeGranularity> {
        if !self.is_time() {
            return None;
        }
        self.type_params.as_ref().map(|p| p.time_granularity)
    }

    pub fn is_primary_time(&self) -> bool {
        self.is_time() && self.type_params.as_ref().map(|p| p.is_primary).unwrap_or(false)
    }

    pub fn is_validity_start(&self) -> bool {
        self.validity().map(|v| v.is_start).unwrap_or(false)
    }

    pub fn is_validity_end(&self) -> bool {
        self.validity().map(|v| v.is_end).unwrap_or(false)
    }

    fn validity(&self) -> Option<&ValidityParams> {
        self.type_params.as_ref().and_then(|p| p.validity_params.as_ref())
    }
}

/// An identifier (entity key) of a data source
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Identifier {
    pub name: String,
    #[serde(rename = "type")]
    pub identifier_type: IdentifierType,
    #[serde(default)]
    pub expr: Option<String>,
    pub description: Option<String>,
}

impl Identifier {
    pub fn expr(&self) -> &str {
        self.expr.as_deref().unwrap_or(&self.name)
    }
}
