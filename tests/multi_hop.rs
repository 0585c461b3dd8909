//! Integration tests for multi-hop joins and cost-based join selection

mod common;

use common::{count_joins, count_table_scans, load_fixture, run_pipeline};
use semquel::dataflow::DefaultCostFunction;
use semquel::{parser, CompilerConfig, Engine, OptimizationLevel, QueryRequest};

fn multi_hop_engine(enabled: bool) -> Engine {
    let config = CompilerConfig {
        optimization_level: OptimizationLevel::O0,
        enable_multi_hop_joins: enabled,
        ..Default::default()
    };
    Engine::new(load_fixture("multi_hop_model.yaml"), config)
}

#[test]
fn test_two_hop_dimension_joins_through_bridge() {
    let engine = multi_hop_engine(true);
    let request = QueryRequest::new(["txn_count"], ["account_id__customer_id__customer_name"]);

    let explained = run_pipeline(&engine, &request).expect("Pipeline should succeed");

    let cost = DefaultCostFunction::new().calculate_cost(explained.dataflow_plan.sink_node().unwrap());
    assert_eq!(cost.num_joins, 2);
    // Transactions, bridge and customers
    assert_eq!(count_table_scans(&explained.sql_plan), 3);
    assert_eq!(count_joins(&explained.sql_plan, None), 2);
    assert!(explained.sql.contains("dim_bridge"));
    assert!(explained.sql.contains("dim_customers"));
}

#[test]
fn test_two_hop_dimension_rejected_when_disabled() {
    let engine = multi_hop_engine(false);
    let request = QueryRequest::new(["txn_count"], ["account_id__customer_id__customer_name"]);

    let err = run_pipeline(&engine, &request).unwrap_err();
    assert!(err.contains("account_id__customer_id__customer_name"), "{}", err);
}

#[test]
fn test_one_hop_dimension_unaffected_by_toggle() {
    let request = QueryRequest::new(["txn_count"], ["account_id__extra_dim"]);
    for enabled in [true, false] {
        let explained = run_pipeline(&multi_hop_engine(enabled), &request).expect("Pipeline should succeed");
        assert_eq!(count_joins(&explained.sql_plan, None), 1);
    }
}

#[test]
fn test_partitioned_sources_join_on_partition_column() {
    let engine = multi_hop_engine(true);
    let request = QueryRequest::new(["txn_count"], ["account_id__extra_dim"]);

    let explained = run_pipeline(&engine, &request).expect("Pipeline should succeed");

    assert!(explained.sql.contains("ds_partitioned"), "{}", explained.sql);
}

#[test]
fn test_cheaper_direct_source_beats_two_hops() {
    // Same model plus a table that maps accounts straight to customer names
    let yaml = r#"
data_sources:
  - name: account_month_txns
    sql_table: fct_account_month_txns
    identifiers:
      - name: account_id
        type: foreign
    measures:
      - name: txn_count
        agg: sum
    dimensions:
      - name: ds
        type: time
        type_params:
          time_granularity: day
          is_primary: true

  - name: bridge_table
    sql_table: dim_bridge
    identifiers:
      - name: account_id
        type: primary
      - name: customer_id
        type: foreign

  - name: customer_table
    sql_table: dim_customers
    identifiers:
      - name: customer_id
        type: primary
    dimensions:
      - name: customer_name
        type: categorical

  - name: customer_accounts
    sql_table: dim_customer_accounts
    identifiers:
      - name: account_id
        type: primary
      - name: customer_id
        type: unique
    dimensions:
      - name: customer_name
        type: categorical

metrics:
  - name: txn_count
    type: measure_proxy
    type_params:
      measure: txn_count
"#;
    let model = parser::load_model_str(yaml).expect("Model should parse");
    let engine = Engine::new(
        model,
        CompilerConfig {
            optimization_level: OptimizationLevel::O0,
            ..Default::default()
        },
    );
    let request = QueryRequest::new(["txn_count"], ["account_id__customer_id__customer_name"]);

    let explained = run_pipeline(&engine, &request).expect("Pipeline should succeed");

    assert_eq!(count_joins(&explained.sql_plan, None), 1);
    assert!(explained.sql.contains("dim_customer_accounts"));
    assert!(!explained.sql.contains("dim_bridge"));
}
