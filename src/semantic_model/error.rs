//! Model invariant errors, raised once when a `SemanticModel` is built

use thiserror::Error;

use super::types::AggregationType;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("data source '{name}' is declared more than once")]
    DuplicateDataSource { name: String },

    #[error("metric '{name}' is declared more than once")]
    DuplicateMetric { name: String },

    #[error("'{name}' is declared more than once in data source '{data_source}'")]
    DuplicateElement { data_source: String, name: String },

    #[error("'{name}' in data source '{data_source}' is reserved")]
    ReservedName { data_source: String, name: String },

    #[error("data source '{data_source}' has neither sql_table nor sql_query")]
    MissingOrigin { data_source: String },

    #[error("measure '{measure}' is declared with conflicting aggregations {first} and {second}")]
    ConflictingAggregation {
        measure: String,
        first: AggregationType,
        second: AggregationType,
    },

    #[error("data source '{data_source}' has more than one primary time dimension")]
    MultiplePrimaryTimeDimensions { data_source: String },

    #[error("measure '{measure}' in data source '{data_source}' has no aggregation time dimension")]
    MissingAggTimeDimension { data_source: String, measure: String },

    #[error("aggregation time dimension '{dimension}' of measure '{measure}' is not a time dimension of '{data_source}'")]
    InvalidAggTimeDimension {
        data_source: String,
        measure: String,
        dimension: String,
    },

    #[error("time dimension '{dimension}' in data source '{data_source}' has no time_granularity")]
    MissingTimeGranularity { data_source: String, dimension: String },

    #[error("invalid validity window in data source '{data_source}': {reason}")]
    InvalidValidityWindow { data_source: String, reason: String },

    #[error("invalid measure '{measure}' in '{data_source}': {reason}")]
    InvalidMeasure {
        data_source: String,
        measure: String,
        reason: String,
    },

    #[error("invalid non-additive dimension on measure '{measure}' in '{data_source}': {reason}")]
    InvalidNonAdditiveDimension {
        data_source: String,
        measure: String,
        reason: String,
    },

    #[error("metric '{metric}' references unknown measure '{measure}'")]
    UnknownMeasure { metric: String, measure: String },

    #[error("metric '{metric}' references unknown metric '{input}'")]
    UnknownMetric { metric: String, input: String },

    #[error("invalid metric '{metric}': {reason}")]
    InvalidMetric { metric: String, reason: String },
}
