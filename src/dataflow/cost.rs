//! Cost of a dataflow subtree, used to choose between equivalent plans

use std::collections::HashMap;
use std::ops::Add;

use crate::ids::NodeId;
use super::node::{DataflowNode, DataflowNodeRef};

const JOIN_WEIGHT: usize = 10;
const AGGREGATION_WEIGHT: usize = 1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DataflowPlanNodeCost {
    pub num_joins: usize,
    pub num_aggregations: usize,
}

impl DataflowPlanNodeCost {
    pub fn as_int(&self) -> usize {
        JOIN_WEIGHT * self.num_joins + AGGREGATION_WEIGHT * self.num_aggregations
    }
}

impl Add for DataflowPlanNodeCost {
    type Output = DataflowPlanNodeCost;

    fn add(self, other: Self) -> Self {
        DataflowPlanNodeCost {
            num_joins: self.num_joins + other.num_joins,
            num_aggregations: self.num_aggregations + other.num_aggregations,
        }
    }
}

impl PartialOrd for DataflowPlanNodeCost {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.as_int().cmp(&other.as_int()))
    }
}

/// Sums the joins and aggregations of a subtree. Results are memoized per node id, so one
/// instance must only see nodes from one id allocator.
#[derive(Debug, Default)]
pub struct DefaultCostFunction {
    memo: HashMap<NodeId, DataflowPlanNodeCost>,
}

impl DefaultCostFunction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calculate_cost(&mut self, node: &DataflowNodeRef) -> DataflowPlanNodeCost {
        if let Some(cost) = self.memo.get(node.id()) {
            return *cost;
        }
        let parents_cost = node
            .parents()
            .into_iter()
            .map(|p| self.calculate_cost(p))
            .fold(DataflowPlanNodeCost::default(), Add::add);
        let cost = parents_cost + node_cost(node);
        self.memo.insert(node.id().clone(), cost);
        cost
    }
}

fn node_cost(node: &DataflowNode) -> DataflowPlanNodeCost {
    let joins = |n: usize| DataflowPlanNodeCost { num_joins: n, num_aggregations: 0 };
    match node {
        DataflowNode::JoinToBaseOutput(n) => joins(n.join_targets.len()),
        DataflowNode::JoinAggregatedMeasuresByGroupByColumns(n) => joins(n.parents.len().saturating_sub(1)),
        DataflowNode::CombineMetrics(n) => joins(n.parents.len().saturating_sub(1)),
        DataflowNode::JoinOverTimeRange(_) => joins(1),
        DataflowNode::SemiAdditiveJoin(_) => DataflowPlanNodeCost { num_joins: 1, num_aggregations: 1 },
        DataflowNode::AggregateMeasures(_) => DataflowPlanNodeCost { num_joins: 0, num_aggregations: 1 },
        DataflowNode::FilterElements(n) if n.distinct => DataflowPlanNodeCost { num_joins: 0, num_aggregations: 1 },
        DataflowNode::ReadSqlSource(_)
        | DataflowNode::MetricTimeDimensionTransform(_)
        | DataflowNode::FilterElements(_)
        | DataflowNode::WhereConstraint(_)
        | DataflowNode::ConstrainTimeRange(_)
        | DataflowNode::ComputeMetrics(_)
        | DataflowNode::OrderByLimit(_)
        | DataflowNode::WriteToResultDataframe(_)
        | DataflowNode::WriteToResultTable(_) => DataflowPlanNodeCost::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::IdAllocator;
    use crate::specs::{IdentifierSpec, InstanceSpecSet, MeasureSpec};
    use crate::dataflow::JoinDescription;

    #[test]
    fn test_cost_counts_joins_and_aggregations() {
        let mut ids = IdAllocator::default();
        let bookings = DataflowNode::read_sql_source(&mut ids, "bookings_source");
        let listings = DataflowNode::read_sql_source(&mut ids, "listings_latest");
        let listings_filtered = DataflowNode::filter_elements(&mut ids, listings, InstanceSpecSet::default(), false);
        let joined = DataflowNode::join_to_base_output(
            &mut ids,
            bookings.clone(),
            vec![JoinDescription {
                join_node: listings_filtered,
                join_on_identifier: IdentifierSpec::new("listing", vec![]),
                join_on_partitions: Vec::new(),
                validity_window: None,
            }],
        );
        let aggregated = DataflowNode::aggregate_measures(&mut ids, joined, vec![MeasureSpec::new("bookings")]);

        let mut cost_fn = DefaultCostFunction::new();
        assert_eq!(cost_fn.calculate_cost(&bookings).as_int(), 0);
        let cost = cost_fn.calculate_cost(&aggregated);
        assert_eq!(cost.num_joins, 1);
        assert_eq!(cost.num_aggregations, 1);
        assert_eq!(cost.as_int(), 11);
    }
}
