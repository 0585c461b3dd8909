//! Integration tests for dataflow plan shape
//!
//! Runs requests against the YAML fixtures at O0 so the SQL plan mirrors the dataflow plan
//! one statement per node.

mod common;

use common::{count_joins, count_table_scans, engine, run_pipeline, statement_descriptions, table_names};
use semquel::sql::SqlJoinType;
use semquel::{DataflowNode, OptimizationLevel, QueryRequest};

fn count_nodes(explained: &semquel::ExplainResult, node_type: &str) -> usize {
    explained
        .dataflow_plan
        .nodes()
        .iter()
        .filter(|n| n.node_type() == node_type)
        .count()
}

#[test]
fn test_plan_has_single_sink_and_is_acyclic() {
    let engine = engine("simple_model.yaml", OptimizationLevel::O0);
    let requests = [
        QueryRequest::new(["bookings"], ["metric_time__day"]),
        QueryRequest::new(["bookings", "views"], ["metric_time__day", "listing__country_latest"]),
        QueryRequest::new(["bookings_per_view"], ["listing__is_lux_latest"]),
        QueryRequest::new(Vec::<String>::new(), ["listing__country_latest"]),
    ];

    for request in &requests {
        let explained = run_pipeline(&engine, request).expect("Pipeline should succeed");
        let plan = &explained.dataflow_plan;
        assert_eq!(plan.sink_nodes.len(), 1, "{:?} should have one sink", request.metrics);
        assert!(plan.sink_node().unwrap().is_sink());
        assert!(plan.is_acyclic(), "{:?} should be acyclic", request.metrics);
    }
}

#[test]
fn test_local_dimension_needs_no_join() {
    let engine = engine("simple_model.yaml", OptimizationLevel::O0);
    let request = QueryRequest::new(["bookings"], ["booking__is_instant", "metric_time__day"]);

    let explained = run_pipeline(&engine, &request).expect("Pipeline should succeed");

    assert_eq!(count_joins(&explained.sql_plan, None), 0, "Local dimension should not join");
    assert_eq!(count_table_scans(&explained.sql_plan), 1);
}

#[test]
fn test_joined_dimension_uses_left_outer_join() {
    let engine = engine("simple_model.yaml", OptimizationLevel::O0);
    let request = QueryRequest::new(["bookings"], ["metric_time__day", "listing__country_latest"]);

    let explained = run_pipeline(&engine, &request).expect("Pipeline should succeed");

    // Fact + listings dimension
    assert_eq!(count_table_scans(&explained.sql_plan), 2);
    assert_eq!(count_joins(&explained.sql_plan, Some(SqlJoinType::LeftOuter)), 1);
    assert_eq!(count_joins(&explained.sql_plan, None), 1);
}

#[test]
fn test_ratio_metric_aggregates_each_side_before_joining() {
    let engine = engine("simple_model.yaml", OptimizationLevel::O0);
    let request = QueryRequest::new(["bookings_per_view"], ["metric_time__day"]);

    let explained = run_pipeline(&engine, &request).expect("Pipeline should succeed");

    assert_eq!(count_nodes(&explained, "AggregateMeasuresNode"), 2);
    assert_eq!(count_nodes(&explained, "JoinAggregatedMeasuresByGroupByColumnsNode"), 1);
    assert_eq!(count_joins(&explained.sql_plan, Some(SqlJoinType::Inner)), 1);

    let descriptions = statement_descriptions(&explained.sql_plan);
    let join_position = descriptions
        .iter()
        .position(|d| d == "Join Aggregated Measures with Standard Outputs")
        .expect("Plan should join aggregated measures");
    let aggregations: Vec<usize> = descriptions
        .iter()
        .enumerate()
        .filter(|(_, d)| d.as_str() == "Aggregate Measures")
        .map(|(i, _)| i)
        .collect();
    assert_eq!(aggregations.len(), 2);
    // Outermost first, so every aggregation sits below the join
    assert!(aggregations.iter().all(|&i| i > join_position));
}

#[test]
fn test_metrics_from_two_sources_are_combined_with_full_outer_join() {
    let engine = engine("simple_model.yaml", OptimizationLevel::O0);
    let request = QueryRequest::new(["bookings", "views"], ["metric_time__day"]);

    let explained = run_pipeline(&engine, &request).expect("Pipeline should succeed");

    assert_eq!(count_nodes(&explained, "CombineMetricsNode"), 1);
    assert_eq!(count_joins(&explained.sql_plan, Some(SqlJoinType::FullOuter)), 1);
    assert!(explained.sql.contains("COALESCE("));
}

#[test]
fn test_each_metric_reads_its_own_branch() {
    let engine = engine("simple_model.yaml", OptimizationLevel::O0);
    let request = QueryRequest::new(["bookings", "instant_bookings"], ["metric_time__day"]);

    let explained = run_pipeline(&engine, &request).expect("Pipeline should succeed");

    // Same table, one read per metric
    assert_eq!(count_table_scans(&explained.sql_plan), 2);
    assert_eq!(count_nodes(&explained, "CombineMetricsNode"), 1);
}

#[test]
fn test_dimension_only_query_is_distinct() {
    let engine = engine("simple_model.yaml", OptimizationLevel::O0);
    let request = QueryRequest::new(Vec::<String>::new(), ["listing__country_latest"]);

    let explained = run_pipeline(&engine, &request).expect("Pipeline should succeed");

    assert_eq!(count_nodes(&explained, "AggregateMeasuresNode"), 0);
    assert!(explained.sql.contains("SELECT DISTINCT"));
}

#[test]
fn test_dimension_only_query_reads_from_owning_source() {
    let engine = engine("simple_model.yaml", OptimizationLevel::O0);
    let request = QueryRequest::new(
        Vec::<String>::new(),
        ["listing__country_latest", "listing__user__home_state"],
    );

    let explained = run_pipeline(&engine, &request).expect("Pipeline should succeed");

    // Listings own `listing`, so users join straight onto them
    assert_eq!(table_names(&explained.sql_plan), vec!["dim_listings_latest", "dim_users"]);
    assert_eq!(count_joins(&explained.sql_plan, Some(SqlJoinType::LeftOuter)), 1);
    assert!(!explained.sql.contains("fct_bookings"), "{}", explained.sql);
    assert!(explained.sql.contains("AS listing__user__home_state"), "{}", explained.sql);
}

#[test]
fn test_validity_window_join_bounds_metric_time() {
    let engine = engine("scd_model.yaml", OptimizationLevel::O0);
    let request = QueryRequest::new(["bookings"], ["metric_time__day", "listing__capacity"]);

    let explained = run_pipeline(&engine, &request).expect("Pipeline should succeed");

    let join = explained
        .dataflow_plan
        .nodes()
        .into_iter()
        .find_map(|n| match n.as_ref() {
            DataflowNode::JoinToBaseOutput(j) => Some(j.join_targets.clone()),
            _ => None,
        })
        .expect("Plan should join the history table");
    assert!(join[0].validity_window.is_some());

    assert_eq!(count_joins(&explained.sql_plan, Some(SqlJoinType::LeftOuter)), 1);
    assert!(explained.sql.contains("dim_listings_history"));
    assert!(explained.sql.contains("IS NULL"));
}

#[test]
fn test_unknown_metric_is_rejected_before_planning() {
    let engine = engine("simple_model.yaml", OptimizationLevel::O0);
    let request = QueryRequest::new(["booking"], ["metric_time__day"]);

    let err = run_pipeline(&engine, &request).unwrap_err();
    assert!(err.contains("unknown metric 'booking'"), "{}", err);
    assert!(err.contains("did you mean: booking_value"), "Should suggest close matches: {}", err);
}
