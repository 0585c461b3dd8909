//! Planner errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("metric '{0}' is not defined in the semantic model")]
    UnknownMetric(String),

    #[error("metric '{metric}' reads measure '{measure}', which no data source defines")]
    UnknownMeasure { metric: String, measure: String },

    #[error("metric '{name}' cannot be planned: {reason}")]
    InvalidMetric { name: String, reason: String },

    /// Measure without an aggregation time dimension, or one without a granularity
    #[error("measure '{measure}' in data source '{data_source}' has no usable aggregation time dimension")]
    MissingAggregationTimeDimension { measure: String, data_source: String },

    #[error("data source '{data_source}' cannot reach: {}", .specs.join(", "))]
    UnjoinableSpecs { data_source: String, specs: Vec<String> },

    /// Dimension-only query that no single start node can satisfy
    #[error("no data source can provide: {}", .specs.join(", "))]
    NoSourceSatisfies { specs: Vec<String> },
}
