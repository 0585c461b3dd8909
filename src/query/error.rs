//! Query validation errors

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum QueryError {
    #[error("query must request at least one metric or group-by")]
    EmptyQuery,

    #[error("unknown metric '{name}'{}", suggestion_text(.suggestions))]
    UnknownMetric { name: String, suggestions: Vec<String> },

    #[error("unknown group-by '{name}'{}", suggestion_text(.suggestions))]
    UnknownGroupBy { name: String, suggestions: Vec<String> },

    /// A name that is neither a metric nor a group-by element was used in a filter
    #[error("where filter references unknown name '{name}'")]
    UnknownFilterName { name: String },

    #[error("'{name}' is ambiguous: {reason}")]
    AmbiguousName { name: String, reason: String },

    /// The group-by exists, but not every requested metric can reach it
    #[error("'{spec}' cannot be joined to the data source of metric '{metric}'")]
    UnresolvableJoin { spec: String, metric: String },

    #[error("metric '{metric}' needs a primary time dimension to be grouped by metric_time")]
    MissingPrimaryTimeDimension { metric: String },

    #[error("metric '{metric}' cannot be grouped by '{spec}': its time dimension starts at {granularity}")]
    GranularityTooFine {
        spec: String,
        metric: String,
        granularity: String,
    },

    #[error("'{name}' can only be requested together with a metric")]
    MetricTimeWithoutMetrics { name: String },

    #[error("invalid time range: start {start} is after end {end}")]
    InvalidTimeRange { start: String, end: String },

    #[error("invalid time constraint '{value}': expected YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS")]
    InvalidTimeConstraint { value: String },

    /// Period arithmetic on a time constraint left the representable calendar
    #[error("time constraint {value} is out of range for {operation}")]
    TimeOutOfRange { value: String, operation: String },

    #[error("limit must not be negative, got {limit}")]
    NegativeLimit { limit: i64 },

    #[error("order-by '{name}' is not a requested metric or group-by")]
    InvalidOrderBy { name: String },

    #[error("'{name}' is requested more than once")]
    DuplicateRequest { name: String },
}

fn suggestion_text(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        String::new()
    } else {
        format!(" (did you mean: {})", suggestions.join(", "))
    }
}
