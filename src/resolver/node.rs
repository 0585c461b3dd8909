//! Node evaluator: how the linkable specs a query needs can be obtained from a start node

use tracing::debug;

use crate::dataflow::{
    DataflowNode, DataflowNodeRef, DefaultCostFunction, JoinDescription, PartitionJoinDescription,
    ValidityWindowJoinDescription,
};
use crate::error::{Error, Result};
use crate::ids::IdAllocator;
use crate::instances::InstanceSet;
use crate::semantic_model::{DataSource, Dimension, SemanticModel};
use crate::specs::{DimensionSpec, IdentifierSpec, InstanceSpecSet, LinkableSpec, TimeDimensionSpec};
use super::join::JoinEvaluator;

/// Resolves the output columns of a dataflow node
pub trait NodeDataSetResolver {
    fn resolve_instance_set(&mut self, node: &DataflowNodeRef) -> Result<InstanceSet>;
}

/// A node that can be joined onto a start node, with the data source it is rooted in
#[derive(Debug, Clone)]
pub struct JoinCandidate {
    pub node: DataflowNodeRef,
    pub data_source: String,
}

/// One join that brings in a group of specs
#[derive(Debug, Clone)]
pub struct JoinLinkableInstancesRecipe {
    pub node_to_join: DataflowNodeRef,
    pub join_on_identifier: IdentifierSpec,
    pub satisfiable_linkable_specs: Vec<LinkableSpec>,
    pub join_on_partitions: Vec<PartitionJoinDescription>,
    pub validity_window: Option<ValidityWindowJoinDescription>,
}

impl JoinLinkableInstancesRecipe {
    /// Join description whose right side only passes the columns the join needs
    pub fn join_description(&self, ids: &mut IdAllocator) -> JoinDescription {
        let mut include = InstanceSpecSet::default();
        include.add_linkable(IdentifierSpec::new(self.join_on_identifier.element_name.clone(), Vec::new()).into());
        let depth = self.join_on_identifier.identifier_links.len() + 1;
        for spec in &self.satisfiable_linkable_specs {
            if let Some(stripped) = spec.without_leading_links(depth) {
                include.add_linkable(stripped);
            }
        }
        for partition in &self.join_on_partitions {
            include.add_linkable(partition.node_to_join_spec.clone());
        }
        if let Some(window) = &self.validity_window {
            include.add_linkable(window.window_start_dimension.clone().into());
            include.add_linkable(window.window_end_dimension.clone().into());
        }
        JoinDescription {
            join_node: DataflowNode::filter_elements(ids, self.node_to_join.clone(), include, false),
            join_on_identifier: self.join_on_identifier.clone(),
            join_on_partitions: self.join_on_partitions.clone(),
            validity_window: self.validity_window.clone(),
        }
    }
}

/// Result of evaluating a start node against the specs a query needs
#[derive(Debug, Clone, Default)]
pub struct LinkableInstanceSatisfiability {
    pub local_linkable_specs: Vec<LinkableSpec>,
    pub joinable_linkable_specs: Vec<LinkableSpec>,
    pub join_recipes: Vec<JoinLinkableInstancesRecipe>,
    pub unjoinable_linkable_specs: Vec<LinkableSpec>,
}

impl LinkableInstanceSatisfiability {
    pub fn is_satisfied(&self) -> bool {
        self.unjoinable_linkable_specs.is_empty()
    }
}

struct Candidate {
    pool_index: usize,
    join_on_identifier: IdentifierSpec,
    satisfiable: Vec<LinkableSpec>,
    cost: usize,
}

pub struct NodeEvaluator<'a> {
    model: &'a SemanticModel,
    join_evaluator: JoinEvaluator<'a>,
    pool: &'a [JoinCandidate],
}

impl<'a> NodeEvaluator<'a> {
    pub fn new(model: &'a SemanticModel, pool: &'a [JoinCandidate]) -> Self {
        NodeEvaluator {
            model,
            join_evaluator: JoinEvaluator::new(model),
            pool,
        }
    }

    /// Split `required` into specs the start node already has, specs reachable through
    /// join recipes (chosen greedily: most specs first, then cheapest node, then pool order),
    /// and specs no join can provide.
    pub fn evaluate_node(
        &self,
        start_node: &DataflowNodeRef,
        start_source: &str,
        required: &[LinkableSpec],
        resolver: &mut dyn NodeDataSetResolver,
        cost_function: &mut DefaultCostFunction,
    ) -> Result<LinkableInstanceSatisfiability> {
        let start_ds = self
            .model
            .data_source(start_source)
            .ok_or_else(|| Error::internal(format!("unknown start data source '{}'", start_source)))?;
        let start_specs = resolver.resolve_instance_set(start_node)?.spec_set();

        let mut result = LinkableInstanceSatisfiability::default();
        let mut remaining = Vec::new();
        for spec in required {
            if start_specs.contains_linkable(spec) {
                result.local_linkable_specs.push(spec.clone());
            } else if !remaining.contains(spec) {
                remaining.push(spec.clone());
            }
        }

        let candidates = self.find_candidates(start_ds, &start_specs, &remaining, resolver, cost_function)?;
        let mut used = vec![false; candidates.len()];

        while !remaining.is_empty() {
            let mut best: Option<(usize, usize)> = None;
            for (i, candidate) in candidates.iter().enumerate() {
                if used[i] {
                    continue;
                }
                let count = candidate.satisfiable.iter().filter(|s| remaining.contains(s)).count();
                if count == 0 {
                    continue;
                }
                best = match best {
                    Some((b, best_count))
                        if count < best_count || (count == best_count && candidate.cost >= candidates[b].cost) =>
                    {
                        Some((b, best_count))
                    }
                    _ => Some((i, count)),
                };
            }
            let Some((chosen, _)) = best else {
                break;
            };
            used[chosen] = true;

            let candidate = &candidates[chosen];
            let satisfied: Vec<LinkableSpec> = candidate
                .satisfiable
                .iter()
                .filter(|s| remaining.contains(s))
                .cloned()
                .collect();
            remaining.retain(|s| !satisfied.contains(s));

            let pool_entry = &self.pool[candidate.pool_index];
            let right_ds = self.right_data_source(pool_entry)?;
            let right_specs = resolver.resolve_instance_set(&pool_entry.node)?.spec_set();

            debug!(
                node = %pool_entry.node.id(),
                identifier = %candidate.join_on_identifier.element_name,
                satisfied = satisfied.len(),
                cost = candidate.cost,
                "Selected join recipe"
            );
            result.joinable_linkable_specs.extend(satisfied.iter().cloned());
            result.join_recipes.push(JoinLinkableInstancesRecipe {
                node_to_join: pool_entry.node.clone(),
                join_on_identifier: candidate.join_on_identifier.clone(),
                satisfiable_linkable_specs: satisfied,
                join_on_partitions: partition_joins(start_ds, &start_specs, right_ds, &right_specs),
                validity_window: validity_window_join(start_ds, &start_specs, right_ds),
            });
        }

        result.unjoinable_linkable_specs = remaining;
        Ok(result)
    }

    fn is_joinable(
        &self,
        start_ds: &DataSource,
        start_specs: &InstanceSpecSet,
        right_ds: &DataSource,
        right_specs: &InstanceSpecSet,
        spec: &LinkableSpec,
        join_on: &IdentifierSpec,
    ) -> bool {
        let Some(stripped) = spec.without_leading_links(join_on.identifier_links.len() + 1) else {
            return false;
        };
        let right_identifier = IdentifierSpec::new(join_on.element_name.clone(), Vec::new());
        right_specs.contains_linkable(&stripped)
            && right_specs.identifiers.contains(&right_identifier)
            && start_specs.identifiers.contains(join_on)
            && self
                .join_evaluator
                .is_valid_data_source_join(start_ds, right_ds, &join_on.element_name)
    }

    fn right_data_source(&self, entry: &JoinCandidate) -> Result<&'a DataSource> {
        self.model
            .data_source(&entry.data_source)
            .ok_or_else(|| Error::internal(format!("unknown data source '{}' in join pool", entry.data_source)))
    }

    fn find_candidates(
        &self,
        start_ds: &DataSource,
        start_specs: &InstanceSpecSet,
        remaining: &[LinkableSpec],
        resolver: &mut dyn NodeDataSetResolver,
        cost_function: &mut DefaultCostFunction,
    ) -> Result<Vec<Candidate>> {
        let mut candidates = Vec::new();
        if remaining.is_empty() {
            return Ok(candidates);
        }

        for (pool_index, entry) in self.pool.iter().enumerate() {
            if entry.data_source == start_ds.name {
                continue;
            }
            let right_ds = self.right_data_source(entry)?;
            if right_ds.has_validity_window() && validity_window_join(start_ds, start_specs, right_ds).is_none() {
                continue;
            }
            let right_specs = resolver.resolve_instance_set(&entry.node)?.spec_set();

            let mut by_identifier: Vec<(IdentifierSpec, Vec<LinkableSpec>)> = Vec::new();
            for spec in remaining {
                let Some(join_on) = join_routes(start_ds, spec).into_iter().find(|join_on| {
                    self.is_joinable(start_ds, start_specs, right_ds, &right_specs, spec, join_on)
                }) else {
                    continue;
                };
                match by_identifier.iter_mut().find(|(id, _)| *id == join_on) {
                    Some((_, specs)) => specs.push(spec.clone()),
                    None => by_identifier.push((join_on, vec![spec.clone()])),
                }
            }

            if by_identifier.is_empty() {
                continue;
            }
            let cost = cost_function.calculate_cost(&entry.node).as_int();
            for (join_on_identifier, satisfiable) in by_identifier {
                candidates.push(Candidate {
                    pool_index,
                    join_on_identifier,
                    satisfiable,
                    cost,
                });
            }
        }
        Ok(candidates)
    }
}

/// The identifiers `spec` could be joined on from `start_ds`: its first link, and for a spec
/// led by an identifier `start_ds` owns (`listing__user__home_state` from listings), the
/// second link reached through the owned one (`listing__user`).
fn join_routes(start_ds: &DataSource, spec: &LinkableSpec) -> Vec<IdentifierSpec> {
    let links = spec.identifier_links();
    let mut routes = Vec::new();
    if let Some(first) = links.first() {
        routes.push(IdentifierSpec::new(first.clone(), Vec::new()));
    }
    if links.len() >= 2 && owns_identifier(start_ds, &links[0]) {
        routes.push(IdentifierSpec::new(links[1].clone(), vec![links[0].clone()]));
    }
    routes
}

/// Whether each row of `ds` is one `identifier`
pub fn owns_identifier(ds: &DataSource, identifier: &str) -> bool {
    ds.identifiers
        .iter()
        .any(|i| i.name == identifier && i.identifier_type.links_local_dimensions())
}

/// Unlinked spec of a dimension at its declared granularity
fn local_dimension_spec(dimension: &Dimension) -> LinkableSpec {
    match dimension.time_granularity() {
        Some(granularity) => TimeDimensionSpec::new(dimension.name.clone(), Vec::new(), granularity).into(),
        None => DimensionSpec::new(dimension.name.clone(), Vec::new()).into(),
    }
}

fn partition_joins(
    start_ds: &DataSource,
    start_specs: &InstanceSpecSet,
    right_ds: &DataSource,
    right_specs: &InstanceSpecSet,
) -> Vec<PartitionJoinDescription> {
    let mut out = Vec::new();
    for left in start_ds.partition_dimensions() {
        let Some(right) = right_ds.get_dimension(&left.name).filter(|d| d.is_partition) else {
            continue;
        };
        let start_node_spec = local_dimension_spec(left);
        let node_to_join_spec = local_dimension_spec(right);
        if start_specs.contains_linkable(&start_node_spec) && right_specs.contains_linkable(&node_to_join_spec) {
            out.push(PartitionJoinDescription {
                start_node_spec,
                node_to_join_spec,
            });
        }
    }
    out
}

/// For a right side with a validity window, the left time column its window is matched
/// against: the finest `metric_time`, else the primary time dimension.
fn validity_window_join(
    start_ds: &DataSource,
    start_specs: &InstanceSpecSet,
    right_ds: &DataSource,
) -> Option<ValidityWindowJoinDescription> {
    let window = right_ds.validity_window()?;
    let left_time_dimension = start_specs
        .time_dimensions
        .iter()
        .filter(|s| s.is_metric_time())
        .min_by_key(|s| s.time_granularity)
        .cloned()
        .or_else(|| {
            let primary = start_ds.primary_time_dimension()?;
            let spec = TimeDimensionSpec::new(primary.name.clone(), Vec::new(), primary.time_granularity()?);
            start_specs.time_dimensions.contains(&spec).then_some(spec)
        })?;
    Some(ValidityWindowJoinDescription {
        left_time_dimension,
        window_start_dimension: TimeDimensionSpec::new(
            window.start.name.clone(),
            Vec::new(),
            window.start.time_granularity()?,
        ),
        window_end_dimension: TimeDimensionSpec::new(window.end.name.clone(), Vec::new(), window.end.time_granularity()?),
    })
}
