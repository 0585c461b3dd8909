//! Dataflow plan nodes
//!
//! Each node is immutable once built and shared through `Arc`; a node only knows its parents.

use std::sync::Arc;

use crate::ids::{IdAllocator, NodeId};
use crate::query::TimeRangeConstraint;
use crate::semantic_model::{AggregationType, MetricTimeWindow, TimeGranularity};
use crate::specs::{
    IdentifierSpec, InstanceSpecSet, LinkableSpec, MeasureSpec, MetricSpec, OrderBySpec, TimeDimensionSpec,
    WhereFilterSpec,
};

pub type DataflowNodeRef = Arc<DataflowNode>;

#[derive(Debug)]
pub enum DataflowNode {
    ReadSqlSource(ReadSqlSourceNode),
    MetricTimeDimensionTransform(MetricTimeDimensionTransformNode),
    JoinToBaseOutput(JoinToBaseOutputNode),
    FilterElements(FilterElementsNode),
    WhereConstraint(WhereConstraintNode),
    ConstrainTimeRange(ConstrainTimeRangeNode),
    JoinOverTimeRange(JoinOverTimeRangeNode),
    SemiAdditiveJoin(SemiAdditiveJoinNode),
    AggregateMeasures(AggregateMeasuresNode),
    ComputeMetrics(ComputeMetricsNode),
    JoinAggregatedMeasuresByGroupByColumns(JoinAggregatedMeasuresByGroupByColumnsNode),
    CombineMetrics(CombineMetricsNode),
    OrderByLimit(OrderByLimitNode),
    WriteToResultDataframe(WriteToResultDataframeNode),
    WriteToResultTable(WriteToResultTableNode),
}

/// Reads every element of a data source
#[derive(Debug)]
pub struct ReadSqlSourceNode {
    pub id: NodeId,
    pub data_source: String,
}

/// Adds `metric_time` columns copied from an aggregation time dimension and keeps only
/// the measures aggregated over it
#[derive(Debug)]
pub struct MetricTimeDimensionTransformNode {
    pub id: NodeId,
    pub parent: DataflowNodeRef,
    pub aggregation_time_dimension: String,
}

/// Equality of a partition column present on both sides of a join
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionJoinDescription {
    pub start_node_spec: LinkableSpec,
    pub node_to_join_spec: LinkableSpec,
}

/// Restricts a join to the SCD row valid at the left side's time
#[derive(Debug, Clone, PartialEq)]
pub struct ValidityWindowJoinDescription {
    pub left_time_dimension: TimeDimensionSpec,
    pub window_start_dimension: TimeDimensionSpec,
    pub window_end_dimension: TimeDimensionSpec,
}

#[derive(Debug, Clone)]
pub struct JoinDescription {
    pub join_node: DataflowNodeRef,
    pub join_on_identifier: IdentifierSpec,
    pub join_on_partitions: Vec<PartitionJoinDescription>,
    pub validity_window: Option<ValidityWindowJoinDescription>,
}

/// LEFT OUTER JOIN of linkable elements of other nodes onto a base node
#[derive(Debug)]
pub struct JoinToBaseOutputNode {
    pub id: NodeId,
    pub left: DataflowNodeRef,
    pub join_targets: Vec<JoinDescription>,
}

/// Projection to a set of specs
#[derive(Debug)]
pub struct FilterElementsNode {
    pub id: NodeId,
    pub parent: DataflowNodeRef,
    pub include_specs: InstanceSpecSet,
    pub distinct: bool,
}

#[derive(Debug)]
pub struct WhereConstraintNode {
    pub id: NodeId,
    pub parent: DataflowNodeRef,
    pub where_filter: WhereFilterSpec,
}

/// Keeps rows whose `metric_time` falls in a range
#[derive(Debug)]
pub struct ConstrainTimeRangeNode {
    pub id: NodeId,
    pub parent: DataflowNodeRef,
    pub time_range: TimeRangeConstraint,
    pub metric_time_spec: TimeDimensionSpec,
}

/// For each `metric_time` value, joins in every parent row in the cumulative window ending there
#[derive(Debug)]
pub struct JoinOverTimeRangeNode {
    pub id: NodeId,
    pub parent: DataflowNodeRef,
    pub metric_time_spec: TimeDimensionSpec,
    pub window: Option<MetricTimeWindow>,
    pub grain_to_date: Option<TimeGranularity>,
    pub time_range: Option<TimeRangeConstraint>,
    /// Finest `metric_time` granularity the query groups by. Each period of it gets a single
    /// window, ending at its last date; `None` means one window for the whole range.
    pub output_granularity: Option<TimeGranularity>,
}

/// Keeps, per window grouping, only the rows at the MIN or MAX of a time dimension
#[derive(Debug)]
pub struct SemiAdditiveJoinNode {
    pub id: NodeId,
    pub parent: DataflowNodeRef,
    pub entity_specs: Vec<IdentifierSpec>,
    pub time_dimension_spec: TimeDimensionSpec,
    pub agg_by_function: AggregationType,
    /// Requested `metric_time`, kept as an extra grouping of the window subquery
    pub queried_time_dimension_spec: Option<TimeDimensionSpec>,
}

#[derive(Debug)]
pub struct AggregateMeasuresNode {
    pub id: NodeId,
    pub parent: DataflowNodeRef,
    pub measure_specs: Vec<MeasureSpec>,
}

#[derive(Debug)]
pub struct ComputeMetricsNode {
    pub id: NodeId,
    pub parent: DataflowNodeRef,
    pub metric_specs: Vec<MetricSpec>,
}

/// Joins aggregated measure sets on their shared group-by columns
#[derive(Debug)]
pub struct JoinAggregatedMeasuresByGroupByColumnsNode {
    pub id: NodeId,
    pub parents: Vec<DataflowNodeRef>,
}

/// FULL OUTER JOIN of independently computed metrics
#[derive(Debug)]
pub struct CombineMetricsNode {
    pub id: NodeId,
    pub parents: Vec<DataflowNodeRef>,
}

#[derive(Debug)]
pub struct OrderByLimitNode {
    pub id: NodeId,
    pub parent: DataflowNodeRef,
    pub order_by_specs: Vec<OrderBySpec>,
    pub limit: Option<u64>,
}

#[derive(Debug)]
pub struct WriteToResultDataframeNode {
    pub id: NodeId,
    pub parent: DataflowNodeRef,
}

#[derive(Debug)]
pub struct WriteToResultTableNode {
    pub id: NodeId,
    pub parent: DataflowNodeRef,
    pub output_table: String,
}

impl DataflowNode {
    pub fn read_sql_source(ids: &mut IdAllocator, data_source: impl Into<String>) -> DataflowNodeRef {
        Arc::new(DataflowNode::ReadSqlSource(ReadSqlSourceNode {
            id: ids.next_id("rss"),
            data_source: data_source.into(),
        }))
    }

    pub fn metric_time_transform(
        ids: &mut IdAllocator,
        parent: DataflowNodeRef,
        aggregation_time_dimension: impl Into<String>,
    ) -> DataflowNodeRef {
        Arc::new(DataflowNode::MetricTimeDimensionTransform(MetricTimeDimensionTransformNode {
            id: ids.next_id("sma"),
            parent,
            aggregation_time_dimension: aggregation_time_dimension.into(),
        }))
    }

    pub fn join_to_base_output(
        ids: &mut IdAllocator,
        left: DataflowNodeRef,
        join_targets: Vec<JoinDescription>,
    ) -> DataflowNodeRef {
        Arc::new(DataflowNode::JoinToBaseOutput(JoinToBaseOutputNode {
            id: ids.next_id("jso"),
            left,
            join_targets,
        }))
    }

    pub fn filter_elements(
        ids: &mut IdAllocator,
        parent: DataflowNodeRef,
        include_specs: InstanceSpecSet,
        distinct: bool,
    ) -> DataflowNodeRef {
        Arc::new(DataflowNode::FilterElements(FilterElementsNode {
            id: ids.next_id("pfe"),
            parent,
            include_specs,
            distinct,
        }))
    }

    pub fn where_constraint(ids: &mut IdAllocator, parent: DataflowNodeRef, where_filter: WhereFilterSpec) -> DataflowNodeRef {
        Arc::new(DataflowNode::WhereConstraint(WhereConstraintNode {
            id: ids.next_id("wcc"),
            parent,
            where_filter,
        }))
    }

    pub fn constrain_time_range(
        ids: &mut IdAllocator,
        parent: DataflowNodeRef,
        time_range: TimeRangeConstraint,
        metric_time_spec: TimeDimensionSpec,
    ) -> DataflowNodeRef {
        Arc::new(DataflowNode::ConstrainTimeRange(ConstrainTimeRangeNode {
            id: ids.next_id("ctr"),
            parent,
            time_range,
            metric_time_spec,
        }))
    }

    pub fn join_over_time_range(
        ids: &mut IdAllocator,
        parent: DataflowNodeRef,
        metric_time_spec: TimeDimensionSpec,
        window: Option<MetricTimeWindow>,
        grain_to_date: Option<TimeGranularity>,
        time_range: Option<TimeRangeConstraint>,
        output_granularity: Option<TimeGranularity>,
    ) -> DataflowNodeRef {
        Arc::new(DataflowNode::JoinOverTimeRange(JoinOverTimeRangeNode {
            id: ids.next_id("jotr"),
            parent,
            metric_time_spec,
            window,
            grain_to_date,
            time_range,
            output_granularity,
        }))
    }

    pub fn semi_additive_join(
        ids: &mut IdAllocator,
        parent: DataflowNodeRef,
        entity_specs: Vec<IdentifierSpec>,
        time_dimension_spec: TimeDimensionSpec,
        agg_by_function: AggregationType,
        queried_time_dimension_spec: Option<TimeDimensionSpec>,
    ) -> DataflowNodeRef {
        Arc::new(DataflowNode::SemiAdditiveJoin(SemiAdditiveJoinNode {
            id: ids.next_id("saj"),
            parent,
            entity_specs,
            time_dimension_spec,
            agg_by_function,
            queried_time_dimension_spec,
        }))
    }

    pub fn aggregate_measures(ids: &mut IdAllocator, parent: DataflowNodeRef, measure_specs: Vec<MeasureSpec>) -> DataflowNodeRef {
        Arc::new(DataflowNode::AggregateMeasures(AggregateMeasuresNode {
            id: ids.next_id("am"),
            parent,
            measure_specs,
        }))
    }

    pub fn compute_metrics(ids: &mut IdAllocator, parent: DataflowNodeRef, metric_specs: Vec<MetricSpec>) -> DataflowNodeRef {
        Arc::new(DataflowNode::ComputeMetrics(ComputeMetricsNode {
            id: ids.next_id("cm"),
            parent,
            metric_specs,
        }))
    }

    pub fn join_aggregated_measures(ids: &mut IdAllocator, parents: Vec<DataflowNodeRef>) -> DataflowNodeRef {
        Arc::new(DataflowNode::JoinAggregatedMeasuresByGroupByColumns(
            JoinAggregatedMeasuresByGroupByColumnsNode {
                id: ids.next_id("jamgc"),
                parents,
            },
        ))
    }

    pub fn combine_metrics(ids: &mut IdAllocator, parents: Vec<DataflowNodeRef>) -> DataflowNodeRef {
        Arc::new(DataflowNode::CombineMetrics(CombineMetricsNode {
            id: ids.next_id("cbm"),
            parents,
        }))
    }

    pub fn order_by_limit(
        ids: &mut IdAllocator,
        parent: DataflowNodeRef,
        order_by_specs: Vec<OrderBySpec>,
        limit: Option<u64>,
    ) -> DataflowNodeRef {
        Arc::new(DataflowNode::OrderByLimit(OrderByLimitNode {
            id: ids.next_id("obl"),
            parent,
            order_by_specs,
            limit,
        }))
    }

    pub fn write_to_result_dataframe(ids: &mut IdAllocator, parent: DataflowNodeRef) -> DataflowNodeRef {
        Arc::new(DataflowNode::WriteToResultDataframe(WriteToResultDataframeNode {
            id: ids.next_id("wrd"),
            parent,
        }))
    }

    pub fn write_to_result_table(
        ids: &mut IdAllocator,
        parent: DataflowNodeRef,
        output_table: impl Into<String>,
    ) -> DataflowNodeRef {
        Arc::new(DataflowNode::WriteToResultTable(WriteToResultTableNode {
            id: ids.next_id("wrt"),
            parent,
            output_table: output_table.into(),
        }))
    }

    pub fn id(&self) -> &NodeId {
        match self {
            DataflowNode::ReadSqlSource(n) => &n.id,
            DataflowNode::MetricTimeDimensionTransform(n) => &n.id,
            DataflowNode::JoinToBaseOutput(n) => &n.id,
            DataflowNode::FilterElements(n) => &n.id,
            DataflowNode::WhereConstraint(n) => &n.id,
            DataflowNode::ConstrainTimeRange(n) => &n.id,
            DataflowNode::JoinOverTimeRange(n) => &n.id,
            DataflowNode::SemiAdditiveJoin(n) => &n.id,
            DataflowNode::AggregateMeasures(n) => &n.id,
            DataflowNode::ComputeMetrics(n) => &n.id,
            DataflowNode::JoinAggregatedMeasuresByGroupByColumns(n) => &n.id,
            DataflowNode::CombineMetrics(n) => &n.id,
            DataflowNode::OrderByLimit(n) => &n.id,
            DataflowNode::WriteToResultDataframe(n) => &n.id,
            DataflowNode::WriteToResultTable(n) => &n.id,
        }
    }

    /// Parents in join order: the base or left node first
    pub fn parents(&self) -> Vec<&DataflowNodeRef> {
        match self {
            DataflowNode::ReadSqlSource(_) => Vec::new(),
            DataflowNode::JoinToBaseOutput(n) => std::iter::once(&n.left)
                .chain(n.join_targets.iter().map(|t| &t.join_node))
                .collect(),
            DataflowNode::JoinAggregatedMeasuresByGroupByColumns(n) => n.parents.iter().collect(),
            DataflowNode::CombineMetrics(n) => n.parents.iter().collect(),
            DataflowNode::MetricTimeDimensionTransform(n) => vec![&n.parent],
            DataflowNode::FilterElements(n) => vec![&n.parent],
            DataflowNode::WhereConstraint(n) => vec![&n.parent],
            DataflowNode::ConstrainTimeRange(n) => vec![&n.parent],
            DataflowNode::JoinOverTimeRange(n) => vec![&n.parent],
            DataflowNode::SemiAdditiveJoin(n) => vec![&n.parent],
            DataflowNode::AggregateMeasures(n) => vec![&n.parent],
            DataflowNode::ComputeMetrics(n) => vec![&n.parent],
            DataflowNode::OrderByLimit(n) => vec![&n.parent],
            DataflowNode::WriteToResultDataframe(n) => vec![&n.parent],
            DataflowNode::WriteToResultTable(n) => vec![&n.parent],
        }
    }

    pub fn is_sink(&self) -> bool {
        matches!(
            self,
            DataflowNode::WriteToResultDataframe(_) | DataflowNode::WriteToResultTable(_)
        )
    }

    pub fn node_type(&self) -> &'static str {
        match self {
            DataflowNode::ReadSqlSource(_) => "ReadSqlSourceNode",
            DataflowNode::MetricTimeDimensionTransform(_) => "MetricTimeDimensionTransformNode",
            DataflowNode::JoinToBaseOutput(_) => "JoinToBaseOutputNode",
            DataflowNode::FilterElements(_) => "FilterElementsNode",
            DataflowNode::WhereConstraint(_) => "WhereConstraintNode",
            DataflowNode::ConstrainTimeRange(_) => "ConstrainTimeRangeNode",
            DataflowNode::JoinOverTimeRange(_) => "JoinOverTimeRangeNode",
            DataflowNode::SemiAdditiveJoin(_) => "SemiAdditiveJoinNode",
            DataflowNode::AggregateMeasures(_) => "AggregateMeasuresNode",
            DataflowNode::ComputeMetrics(_) => "ComputeMetricsNode",
            DataflowNode::JoinAggregatedMeasuresByGroupByColumns(_) => "JoinAggregatedMeasuresByGroupByColumnsNode",
            DataflowNode::CombineMetrics(_) => "CombineMetricsNode",
            DataflowNode::OrderByLimit(_) => "OrderByLimitNode",
            DataflowNode::WriteToResultDataframe(_) => "WriteToResultDataframeNode",
            DataflowNode::WriteToResultTable(_) => "WriteToResultTableNode",
        }
    }

    /// One-line human description, also used as the SQL comment of the node's statement
    pub fn description(&self) -> String {
        match self {
            DataflowNode::ReadSqlSource(n) => format!("Read Elements From Data Source '{}'", n.data_source),
            DataflowNode::MetricTimeDimensionTransform(n) => {
                format!("Metric Time Dimension '{}'", n.aggregation_time_dimension)
            }
            DataflowNode::JoinToBaseOutput(_) => "Join Standard Outputs".to_string(),
            DataflowNode::FilterElements(n) => {
                let mut names: Vec<String> = n.include_specs.measures.iter().map(|m| m.element_name.clone()).collect();
                names.extend(n.include_specs.linkable_specs().iter().map(|s| s.qualified_name()));
                format!("Pass Only Elements: [{}]", names.join(", "))
            }
            DataflowNode::WhereConstraint(_) => "Constrain Output with WHERE".to_string(),
            DataflowNode::ConstrainTimeRange(n) => format!("Constrain Time Range to {}", n.time_range),
            DataflowNode::JoinOverTimeRange(_) => "Join Over Time Range".to_string(),
            DataflowNode::SemiAdditiveJoin(n) => {
                format!("Join on {} and {} grouping by entities", n.agg_by_function.as_str().to_uppercase(), n.time_dimension_spec.qualified_name())
            }
            DataflowNode::AggregateMeasures(_) => "Aggregate Measures".to_string(),
            DataflowNode::ComputeMetrics(n) => {
                let names: Vec<&str> = n.metric_specs.iter().map(|m| m.element_name.as_str()).collect();
                format!("Compute Metrics via Expressions: [{}]", names.join(", "))
            }
            DataflowNode::JoinAggregatedMeasuresByGroupByColumns(_) => {
                "Join Aggregated Measures with Standard Outputs".to_string()
            }
            DataflowNode::CombineMetrics(_) => "Combine Metrics".to_string(),
            DataflowNode::OrderByLimit(n) => match n.limit {
                Some(limit) => format!("Order By {} Limit {}", order_names(&n.order_by_specs), limit),
                None => format!("Order By {}", order_names(&n.order_by_specs)),
            },
            DataflowNode::WriteToResultDataframe(_) => "Write to Dataframe".to_string(),
            DataflowNode::WriteToResultTable(n) => format!("Write to Table '{}'", n.output_table),
        }
    }
}

fn order_names(specs: &[OrderBySpec]) -> String {
    let names: Vec<String> = specs
        .iter()
        .map(|s| if s.descending { format!("-{}", s.qualified_name()) } else { s.qualified_name() })
        .collect();
    format!("[{}]", names.join(", "))
}
