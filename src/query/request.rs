use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A metric query as a caller writes it: every element is named by string
///
/// Group-by names are qualified (`listing__country_latest`, `metric_time__month`); the
/// where constraint is SQL text over those same names and may use `:name` bind parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryRequest {
    pub metrics: Vec<String>,
    pub group_by: Vec<String>,
    pub where_constraint: Option<String>,
    pub where_bind_parameters: BTreeMap<String, serde_json::Value>,
    /// ISO date or datetime
    pub time_constraint_start: Option<String>,
    pub time_constraint_end: Option<String>,
    /// Metric or group-by names; a leading `-` sorts descending
    pub order_by: Vec<String>,
    pub limit: Option<i64>,
    /// Materialize into this table instead of returning rows
    pub output_table: Option<String>,
}

impl QueryRequest {
    pub fn new<M, G>(metrics: M, group_by: G) -> Self
    where
        M: IntoIterator,
        M::Item: Into<String>,
        G: IntoIterator,
        G::Item: Into<String>,
    {
        QueryRequest {
            metrics: metrics.into_iter().map(Into::into).collect(),
            group_by: group_by.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_where(mut self, where_constraint: impl Into<String>) -> Self {
        self.where_constraint = Some(where_constraint.into());
        self
    }

    pub fn with_bind_parameter(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.where_bind_parameters.insert(key.into(), value);
        self
    }

    pub fn with_time_range(mut self, start: Option<&str>, end: Option<&str>) -> Self {
        self.time_constraint_start = start.map(str::to_string);
        self.time_constraint_end = end.map(str::to_string);
        self
    }

    pub fn with_order_by<O>(mut self, order_by: O) -> Self
    where
        O: IntoIterator,
        O::Item: Into<String>,
    {
        self.order_by = order_by.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_output_table(mut self, output_table: impl Into<String>) -> Self {
        self.output_table = Some(output_table.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_partial_request() {
        let request: QueryRequest = serde_yaml::from_str(
            "metrics: [bookings]\ngroup_by: [metric_time__month]\norder_by: ['-bookings']\nlimit: 10\n",
        )
        .unwrap();
        assert_eq!(request.metrics, vec!["bookings"]);
        assert_eq!(request.order_by, vec!["-bookings"]);
        assert_eq!(request.limit, Some(10));
        assert!(request.where_constraint.is_none());
    }

    #[test]
    fn test_builder() {
        let request = QueryRequest::new(["bookings"], ["listing__country_latest"])
            .with_where("listing__country_latest = :country")
            .with_bind_parameter("country", serde_json::json!("us"))
            .with_limit(5);
        assert_eq!(request.group_by, vec!["listing__country_latest"]);
        assert_eq!(request.where_bind_parameters.len(), 1);
        assert_eq!(request.limit, Some(5));
    }
}
