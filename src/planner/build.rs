//! Dataflow plan building
//!
//! A metric query becomes one branch per metric. Each branch reads the data sources of its
//! measures, joins in the linkable specs the query asks for, aggregates, and computes the
//! metric; branches are then combined, ordered and written to a sink.

use std::cmp::Reverse;
use std::collections::HashMap;

use tracing::{debug, info};

use super::error::PlanError;
use crate::dataflow::{DataflowNode, DataflowNodeRef, DataflowPlan, DefaultCostFunction};
use crate::emitter::DataflowToSqlQueryPlanConverter;
use crate::error::Result;
use crate::ids::IdAllocator;
use crate::query::QuerySpec;
use crate::resolver::{
    owns_identifier, JoinCandidate, JoinEvaluator, JoinLinkableInstancesRecipe, LinkableInstanceSatisfiability,
    NodeDataSetResolver, NodeEvaluator,
};
use crate::semantic_model::{CumulativeWindow, DataSource, Dimension, Measure, Metric, MetricType, SemanticModel};
use crate::specs::{
    ColumnAssociationResolver, IdentifierSpec, InstanceSpecSet, LinkableSpec, MeasureSpec, MetricSpec,
    TimeDimensionSpec, WhereFilterSpec,
};

/// Builds dataflow plans for query specs against one semantic model
pub struct DataflowPlanBuilder<'a> {
    model: &'a SemanticModel,
    column_resolver: &'a dyn ColumnAssociationResolver,
    include_multi_hop: bool,
}

impl<'a> DataflowPlanBuilder<'a> {
    pub fn new(
        model: &'a SemanticModel,
        column_resolver: &'a dyn ColumnAssociationResolver,
        include_multi_hop: bool,
    ) -> Self {
        DataflowPlanBuilder {
            model,
            column_resolver,
            include_multi_hop,
        }
    }

    /// Build the plan for `query`. Node ids are drawn from `ids`.
    pub fn build_plan(&self, query: &QuerySpec, ids: &mut IdAllocator) -> Result<DataflowPlan> {
        let mut ctx = BuildContext::new(self, query, ids);

        let output = if query.is_dimension_only() {
            ctx.build_dimension_only()?
        } else {
            let mut branches = Vec::with_capacity(query.metric_specs.len());
            for spec in &query.metric_specs {
                let metric = ctx.metric(&spec.element_name)?;
                branches.push(ctx.build_metric(metric, &[])?);
            }
            match branches.len() {
                1 => branches.remove(0),
                _ => DataflowNode::combine_metrics(ctx.ids, branches),
            }
        };

        let output = if query.order_by_specs.is_empty() && query.limit.is_none() {
            output
        } else {
            DataflowNode::order_by_limit(ctx.ids, output, query.order_by_specs.clone(), query.limit)
        };
        let sink = match &query.output_table {
            Some(table) => DataflowNode::write_to_result_table(ctx.ids, output, table.clone()),
            None => DataflowNode::write_to_result_dataframe(ctx.ids, output),
        };

        let cost = ctx.cost_function.calculate_cost(&sink);
        let plan = DataflowPlan::new(vec![sink]);
        info!(
            metrics = query.metric_specs.len(),
            group_by = query.linkable_specs.len(),
            nodes = plan.nodes().len(),
            joins = cost.num_joins,
            aggregations = cost.num_aggregations,
            "Built dataflow plan"
        );
        Ok(plan)
    }
}

/// Measures aggregated together: same data source, same aggregation time dimension
struct MeasureGroup<'m> {
    data_source: &'m DataSource,
    agg_time_dimension: &'m Dimension,
    measures: Vec<&'m Measure>,
}

impl MeasureGroup<'_> {
    fn measure_specs(&self) -> Vec<MeasureSpec> {
        self.measures.iter().map(|m| MeasureSpec::new(m.name.clone())).collect()
    }

    fn is_semi_additive(&self) -> bool {
        self.measures.iter().any(|m| m.non_additive_dimension.is_some())
    }
}

/// State of one `build_plan` call
struct BuildContext<'a, 'q> {
    model: &'a SemanticModel,
    query: &'q QuerySpec,
    ids: &'q mut IdAllocator,
    read_nodes: HashMap<String, DataflowNodeRef>,
    /// Nodes the node evaluator may join onto a start node
    pool: Vec<JoinCandidate>,
    /// Lowers candidate nodes to learn their output columns
    resolver: DataflowToSqlQueryPlanConverter<'a>,
    cost_function: DefaultCostFunction,
}

impl<'a, 'q> BuildContext<'a, 'q> {
    fn new(builder: &DataflowPlanBuilder<'a>, query: &'q QuerySpec, ids: &'q mut IdAllocator) -> Self {
        let model = builder.model;
        let mut read_nodes = HashMap::new();
        for ds in model.data_sources() {
            read_nodes.insert(ds.name.clone(), DataflowNode::read_sql_source(ids, ds.name.clone()));
        }

        // Each data source, followed by its one-hop joins when multi-hop is on. The joined
        // node exposes specs like `customer_id__customer_name` under the left source's name.
        let join_evaluator = JoinEvaluator::new(model);
        let mut pool = Vec::new();
        for ds in model.data_sources() {
            let Some(read) = read_nodes.get(&ds.name) else {
                continue;
            };
            pool.push(JoinCandidate {
                node: read.clone(),
                data_source: ds.name.clone(),
            });
            if !builder.include_multi_hop {
                continue;
            }
            for (identifier, right) in join_evaluator.direct_joins(ds) {
                if right.has_validity_window() {
                    continue;
                }
                let Some(right_read) = read_nodes.get(&right.name) else {
                    continue;
                };
                let recipe = JoinLinkableInstancesRecipe {
                    node_to_join: right_read.clone(),
                    join_on_identifier: IdentifierSpec::new(identifier, Vec::new()),
                    satisfiable_linkable_specs: unlinked_specs(right, identifier),
                    join_on_partitions: Vec::new(),
                    validity_window: None,
                };
                let description = recipe.join_description(ids);
                pool.push(JoinCandidate {
                    node: DataflowNode::join_to_base_output(ids, read.clone(), vec![description]),
                    data_source: ds.name.clone(),
                });
            }
        }
        debug!(pool = pool.len(), include_multi_hop = builder.include_multi_hop, "Built join candidate pool");

        BuildContext {
            model,
            query,
            ids,
            read_nodes,
            pool,
            resolver: DataflowToSqlQueryPlanConverter::new(model, builder.column_resolver, IdAllocator::new(0)),
            cost_function: DefaultCostFunction::new(),
        }
    }

    fn metric(&self, name: &str) -> Result<&'a Metric> {
        Ok(self
            .model
            .metric(name)
            .ok_or_else(|| PlanError::UnknownMetric(name.to_string()))?)
    }

    fn read_node(&self, data_source: &str) -> Result<DataflowNodeRef> {
        self.read_nodes
            .get(data_source)
            .cloned()
            .ok_or_else(|| crate::error::Error::internal(format!("no read node for data source '{}'", data_source)))
    }

    fn evaluate(
        &mut self,
        start: &DataflowNodeRef,
        data_source: &str,
        required: &[LinkableSpec],
    ) -> Result<LinkableInstanceSatisfiability> {
        let evaluator = NodeEvaluator::new(self.model, &self.pool);
        evaluator.evaluate_node(start, data_source, required, &mut self.resolver, &mut self.cost_function)
    }

    fn join(&mut self, start: DataflowNodeRef, recipes: &[JoinLinkableInstancesRecipe]) -> DataflowNodeRef {
        if recipes.is_empty() {
            return start;
        }
        let descriptions = recipes.iter().map(|r| r.join_description(self.ids)).collect();
        DataflowNode::join_to_base_output(self.ids, start, descriptions)
    }

    fn cost(&mut self, node: &DataflowNodeRef) -> usize {
        self.cost_function.calculate_cost(node).as_int()
    }

    /// Metric branch: aggregated measures (or input metrics) with the metric computed on top
    fn build_metric(&mut self, metric: &'a Metric, inherited_filters: &[WhereFilterSpec]) -> Result<DataflowNodeRef> {
        let mut filters = inherited_filters.to_vec();
        if let Some(filter) = self.query.metric_filters.get(&metric.name) {
            filters.push(filter.clone());
        }
        let metric_spec = MetricSpec::new(metric.name.clone());

        if metric.metric_type == MetricType::Derived {
            let mut inputs = Vec::new();
            for input in metric.input_metrics() {
                let input_metric = self.metric(&input.name)?;
                inputs.push(self.build_metric(input_metric, &filters)?);
            }
            let parent = match inputs.len() {
                0 => {
                    return Err(PlanError::InvalidMetric {
                        name: metric.name.clone(),
                        reason: "derived metric has no input metrics".to_string(),
                    }
                    .into())
                }
                1 => inputs.remove(0),
                _ => DataflowNode::combine_metrics(self.ids, inputs),
            };
            debug!(metric = %metric.name, inputs = metric.input_metrics().len(), "Planned derived metric");
            return Ok(DataflowNode::compute_metrics(self.ids, parent, vec![metric_spec]));
        }

        let cumulative = metric.cumulative_window();
        let groups = self.measure_groups(metric, &filters, cumulative)?;
        let mut aggregated = Vec::with_capacity(groups.len());
        for group in &groups {
            aggregated.push(self.build_measure_branch(group, &filters, cumulative)?);
        }
        let parent = match aggregated.len() {
            0 => {
                return Err(PlanError::InvalidMetric {
                    name: metric.name.clone(),
                    reason: "metric reads no measures".to_string(),
                }
                .into())
            }
            1 => aggregated.remove(0),
            _ => DataflowNode::join_aggregated_measures(self.ids, aggregated),
        };
        debug!(metric = %metric.name, measure_groups = groups.len(), "Planned metric");
        Ok(DataflowNode::compute_metrics(self.ids, parent, vec![metric_spec]))
    }

    /// The metric's measures, each assigned to a data source and grouped by (data source,
    /// aggregation time dimension). A semi-additive measure always gets a group of its own.
    fn measure_groups(
        &mut self,
        metric: &Metric,
        filters: &[WhereFilterSpec],
        cumulative: Option<CumulativeWindow>,
    ) -> Result<Vec<MeasureGroup<'a>>> {
        let mut groups: Vec<MeasureGroup<'a>> = Vec::new();
        for name in metric.input_measures() {
            let (ds, measure) = self.choose_measure_source(metric, name, filters, cumulative)?;
            let agg_time_dimension = agg_time_dimension(ds, measure)?;
            let shareable = measure.non_additive_dimension.is_none();
            let existing = groups.iter_mut().find(|g| {
                shareable
                    && !g.is_semi_additive()
                    && g.data_source.name == ds.name
                    && g.agg_time_dimension.name == agg_time_dimension.name
            });
            match existing {
                Some(group) => {
                    if !group.measures.iter().any(|m| m.name == measure.name) {
                        group.measures.push(measure);
                    }
                }
                None => groups.push(MeasureGroup {
                    data_source: ds,
                    agg_time_dimension,
                    measures: vec![measure],
                }),
            }
        }
        Ok(groups)
    }

    /// The data source a measure is read from. When several define it, each is planned on
    /// its own and the cheapest satisfiable branch wins; ties keep declaration order.
    fn choose_measure_source(
        &mut self,
        metric: &Metric,
        measure_name: &str,
        filters: &[WhereFilterSpec],
        cumulative: Option<CumulativeWindow>,
    ) -> Result<(&'a DataSource, &'a Measure)> {
        let candidates: Vec<(&'a DataSource, &'a Measure)> = self
            .model
            .sources_for_measure(measure_name)
            .filter_map(|ds| ds.get_measure(measure_name).map(|m| (ds, m)))
            .collect();

        match candidates.as_slice() {
            [] => Err(PlanError::UnknownMeasure {
                metric: metric.name.clone(),
                measure: measure_name.to_string(),
            }
            .into()),
            [only] => Ok(*only),
            _ => {
                let mut best: Option<(usize, (&'a DataSource, &'a Measure))> = None;
                let mut first_error = None;
                for (ds, measure) in candidates {
                    let group = MeasureGroup {
                        data_source: ds,
                        agg_time_dimension: agg_time_dimension(ds, measure)?,
                        measures: vec![measure],
                    };
                    match self.build_measure_branch(&group, filters, cumulative) {
                        Ok(node) => {
                            let cost = self.cost(&node);
                            debug!(measure = measure_name, data_source = %ds.name, cost, "Evaluated measure source");
                            if best.map_or(true, |(best_cost, _)| cost < best_cost) {
                                best = Some((cost, (ds, measure)));
                            }
                        }
                        Err(e) if first_error.is_none() => first_error = Some(e),
                        Err(_) => {}
                    }
                }
                match (best, first_error) {
                    (Some((_, choice)), _) => Ok(choice),
                    (None, Some(e)) => Err(e),
                    (None, None) => Err(PlanError::UnknownMeasure {
                        metric: metric.name.clone(),
                        measure: measure_name.to_string(),
                    }
                    .into()),
                }
            }
        }
    }

    /// read → metric time → time range → local filters → joins → other filters →
    /// semi-additive join → projection → (cumulative window) → aggregation
    fn build_measure_branch(
        &mut self,
        group: &MeasureGroup<'a>,
        filters: &[WhereFilterSpec],
        cumulative: Option<CumulativeWindow>,
    ) -> Result<DataflowNodeRef> {
        let ds = group.data_source;
        let query = self.query;
        let agg_granularity = group.agg_time_dimension.time_granularity().ok_or_else(|| {
            PlanError::MissingAggregationTimeDimension {
                measure: group.measures.first().map(|m| m.name.clone()).unwrap_or_default(),
                data_source: ds.name.clone(),
            }
        })?;

        let read = self.read_node(&ds.name)?;
        let transformed = DataflowNode::metric_time_transform(self.ids, read, group.agg_time_dimension.name.clone());
        let local_specs = self.resolver.resolve_instance_set(&transformed)?.spec_set();

        // Cumulative metrics accumulate over metric_time at the measure's own granularity
        let metric_time = match cumulative {
            Some(_) => TimeDimensionSpec::metric_time(agg_granularity),
            None => query
                .finest_metric_time()
                .cloned()
                .unwrap_or_else(|| TimeDimensionSpec::metric_time(agg_granularity)),
        };

        let mut node = transformed;
        let input_range = match (query.time_range, cumulative) {
            (None, _) | (Some(_), Some(CumulativeWindow::AllTime)) => None,
            (Some(range), None) => Some(range),
            (Some(range), Some(CumulativeWindow::Trailing(window))) => Some(range.widen_for_window(window)?),
            (Some(range), Some(CumulativeWindow::GrainToDate(granularity))) => {
                Some(range.widen_for_grain_to_date(granularity)?)
            }
        };
        if let Some(range) = input_range {
            node = DataflowNode::constrain_time_range(self.ids, node, range, metric_time.clone());
        }

        let mut all_filters: Vec<&WhereFilterSpec> = query.where_filter.iter().collect();
        all_filters.extend(filters);
        let (local_filters, joined_filters): (Vec<&WhereFilterSpec>, Vec<&WhereFilterSpec>) =
            all_filters.into_iter().partition(|f| f.is_local_to(&local_specs));
        for filter in local_filters {
            node = DataflowNode::where_constraint(self.ids, node, filter.clone());
        }

        let mut required = query.linkable_specs.clone();
        for filter in &joined_filters {
            for spec in &filter.linkable_specs {
                if !required.contains(spec) {
                    required.push(spec.clone());
                }
            }
        }
        let satisfiability = self.evaluate(&node, &ds.name, &required)?;
        if !satisfiability.is_satisfied() {
            return Err(PlanError::UnjoinableSpecs {
                data_source: ds.name.clone(),
                specs: satisfiability
                    .unjoinable_linkable_specs
                    .iter()
                    .map(LinkableSpec::qualified_name)
                    .collect(),
            }
            .into());
        }
        node = self.join(node, &satisfiability.join_recipes);
        for filter in joined_filters {
            node = DataflowNode::where_constraint(self.ids, node, filter.clone());
        }

        if let Some(nad) = group.measures.iter().find_map(|m| m.non_additive_dimension.as_ref()) {
            let granularity = ds
                .get_dimension(&nad.name)
                .and_then(Dimension::time_granularity)
                .ok_or_else(|| PlanError::MissingAggregationTimeDimension {
                    measure: group.measures.first().map(|m| m.name.clone()).unwrap_or_default(),
                    data_source: ds.name.clone(),
                })?;
            let entity_specs = nad
                .window_groupings
                .iter()
                .map(|g| IdentifierSpec::new(g.clone(), Vec::new()))
                .collect();
            node = DataflowNode::semi_additive_join(
                self.ids,
                node,
                entity_specs,
                TimeDimensionSpec::new(nad.name.clone(), Vec::new(), granularity),
                nad.window_choice,
                query.finest_metric_time().cloned(),
            );
        }

        let measure_specs = group.measure_specs();
        let mut output_specs = InstanceSpecSet::from_linkable(&query.linkable_specs);
        for spec in &measure_specs {
            output_specs.add_measure(spec.clone());
        }

        if let Some(window) = cumulative {
            let mut with_time = output_specs.clone();
            with_time.add_linkable(metric_time.clone().into());
            node = DataflowNode::filter_elements(self.ids, node, with_time, false);
            let (trailing, grain_to_date) = match window {
                CumulativeWindow::Trailing(w) => (Some(w), None),
                CumulativeWindow::GrainToDate(g) => (None, Some(g)),
                CumulativeWindow::AllTime => (None, None),
            };
            node = DataflowNode::join_over_time_range(
                self.ids,
                node,
                metric_time.clone(),
                trailing,
                grain_to_date,
                query.time_range,
                query.finest_metric_time().map(|s| s.time_granularity),
            );
            if let Some(range) = query.time_range {
                node = DataflowNode::constrain_time_range(self.ids, node, range, metric_time.clone());
            }
            if !output_specs.contains_linkable(&metric_time.into()) {
                node = DataflowNode::filter_elements(self.ids, node, output_specs, false);
            }
        } else {
            node = DataflowNode::filter_elements(self.ids, node, output_specs, false);
        }

        Ok(DataflowNode::aggregate_measures(self.ids, node, measure_specs))
    }

    /// Distinct group-by values from the cheapest data source that reaches them all. On equal
    /// cost, the source owning the identifiers the specs are linked through wins.
    fn build_dimension_only(&mut self) -> Result<DataflowNodeRef> {
        let query = self.query;
        let mut best: Option<((usize, Reverse<usize>), DataflowNodeRef)> = None;

        for ds in self.model.data_sources() {
            let start = self.read_node(&ds.name)?;
            let local_specs = self.resolver.resolve_instance_set(&start)?.spec_set();
            let (local_filters, joined_filters): (Vec<&WhereFilterSpec>, Vec<&WhereFilterSpec>) =
                query.where_filter.iter().partition(|f| f.is_local_to(&local_specs));

            let mut required = query.linkable_specs.clone();
            for filter in &joined_filters {
                for spec in &filter.linkable_specs {
                    if !required.contains(spec) {
                        required.push(spec.clone());
                    }
                }
            }
            let satisfiability = self.evaluate(&start, &ds.name, &required)?;
            if !satisfiability.is_satisfied() {
                continue;
            }

            let mut node = start;
            for filter in local_filters {
                node = DataflowNode::where_constraint(self.ids, node, filter.clone());
            }
            node = self.join(node, &satisfiability.join_recipes);
            for filter in joined_filters {
                node = DataflowNode::where_constraint(self.ids, node, filter.clone());
            }

            let cost = self.cost(&node);
            let owned = query
                .linkable_specs
                .iter()
                .filter(|s| s.identifier_links().first().is_some_and(|link| owns_identifier(ds, link)))
                .count();
            debug!(data_source = %ds.name, cost, owned, "Evaluated start node for dimension query");
            let rank = (cost, Reverse(owned));
            if best.as_ref().map_or(true, |(best_rank, _)| rank < *best_rank) {
                best = Some((rank, node));
            }
        }

        let Some((_, node)) = best else {
            return Err(PlanError::NoSourceSatisfies {
                specs: query.linkable_specs.iter().map(LinkableSpec::qualified_name).collect(),
            }
            .into());
        };
        let include = InstanceSpecSet::from_linkable(&query.linkable_specs);
        Ok(DataflowNode::filter_elements(self.ids, node, include, true))
    }
}

fn agg_time_dimension<'m>(ds: &'m DataSource, measure: &Measure) -> Result<&'m Dimension> {
    Ok(ds
        .agg_time_dimension(measure)
        .ok_or_else(|| PlanError::MissingAggregationTimeDimension {
            measure: measure.name.clone(),
            data_source: ds.name.clone(),
        })?)
}

/// The unlinked dimensions and identifiers of `ds`, as seen across a join on `identifier`
fn unlinked_specs(ds: &DataSource, identifier: &str) -> Vec<LinkableSpec> {
    crate::resolver::local_linkable_specs(ds)
        .into_iter()
        .filter(|s| s.identifier_links().is_empty())
        .filter(|s| !matches!(s, LinkableSpec::Identifier(i) if i.element_name == identifier))
        .map(|s| s.with_prefix_link(identifier))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{load_model_file, load_model_str};
    use crate::query::{QueryParser, QueryRequest};
    use crate::specs::DunderColumnAssociationResolver;
    use crate::semantic_model::TimeGranularity;

    fn plan_for(model: &SemanticModel, request: QueryRequest, multi_hop: bool) -> Result<DataflowPlan> {
        let query = QueryParser::new(model, multi_hop).parse(&request)?;
        let resolver = DunderColumnAssociationResolver;
        DataflowPlanBuilder::new(model, &resolver, multi_hop).build_plan(&query, &mut IdAllocator::new(0))
    }

    fn count_nodes(plan: &DataflowPlan, node_type: &str) -> usize {
        plan.nodes().iter().filter(|n| n.node_type() == node_type).count()
    }

    fn simple_model() -> SemanticModel {
        load_model_file("tests/test_data/simple_model.yaml").unwrap()
    }

    #[test]
    fn test_simple_metric_plan_shape() {
        let model = simple_model();
        let plan = plan_for(&model, QueryRequest::new(["bookings"], ["metric_time__day"]), true).unwrap();
        assert!(plan.is_acyclic());
        let sink = plan.sink_node().unwrap();
        assert_eq!(sink.node_type(), "WriteToResultDataframeNode");
        assert_eq!(count_nodes(&plan, "AggregateMeasuresNode"), 1);
        assert_eq!(count_nodes(&plan, "ComputeMetricsNode"), 1);
        assert_eq!(count_nodes(&plan, "JoinToBaseOutputNode"), 0);
    }

    #[test]
    fn test_joined_dimension_adds_one_join() {
        let model = simple_model();
        let plan = plan_for(&model, QueryRequest::new(["bookings"], ["listing__country_latest"]), true).unwrap();
        assert_eq!(count_nodes(&plan, "JoinToBaseOutputNode"), 1);
        let cost = DefaultCostFunction::new().calculate_cost(plan.sink_node().unwrap());
        assert_eq!(cost.num_joins, 1);
    }

    #[test]
    fn test_ratio_over_two_sources_aggregates_before_join() {
        let model = simple_model();
        let plan = plan_for(&model, QueryRequest::new(["bookings_per_view"], ["metric_time__day"]), true).unwrap();
        let join = plan
            .nodes()
            .into_iter()
            .find(|n| n.node_type() == "JoinAggregatedMeasuresByGroupByColumnsNode")
            .unwrap();
        let parents = join.parents();
        assert_eq!(parents.len(), 2);
        assert!(parents.iter().all(|p| p.node_type() == "AggregateMeasuresNode"));
    }

    #[test]
    fn test_two_metrics_are_combined() {
        let model = simple_model();
        let plan = plan_for(&model, QueryRequest::new(["bookings", "views"], ["metric_time__day"]), true).unwrap();
        assert_eq!(count_nodes(&plan, "CombineMetricsNode"), 1);
        assert_eq!(count_nodes(&plan, "ComputeMetricsNode"), 2);
    }

    #[test]
    fn test_cumulative_metric_joins_over_time_range() {
        let model = simple_model();
        let request = QueryRequest::new(["trailing_2_day_bookings"], ["metric_time__day"])
            .with_time_range(Some("2021-01-05"), Some("2021-01-10"));
        let plan = plan_for(&model, request, true).unwrap();
        assert_eq!(count_nodes(&plan, "JoinOverTimeRangeNode"), 1);
        let ranges: Vec<String> = plan
            .nodes()
            .iter()
            .filter_map(|n| match n.as_ref() {
                DataflowNode::ConstrainTimeRange(c) => Some(c.time_range.to_string()),
                _ => None,
            })
            .collect();
        assert_eq!(ranges, vec!["[2021-01-03, 2021-01-10]", "[2021-01-05, 2021-01-10]"]);
    }

    #[test]
    fn test_cumulative_metric_at_coarser_grain_keeps_measure_grain_window() {
        let model = simple_model();
        let request = QueryRequest::new(["trailing_2_day_bookings"], ["metric_time__month"]);
        let plan = plan_for(&model, request, true).unwrap();
        let (metric_time, output_granularity) = plan
            .nodes()
            .iter()
            .find_map(|n| match n.as_ref() {
                DataflowNode::JoinOverTimeRange(j) => Some((j.metric_time_spec.clone(), j.output_granularity)),
                _ => None,
            })
            .unwrap();
        assert_eq!(metric_time.qualified_name(), "metric_time__day");
        assert_eq!(output_granularity, Some(TimeGranularity::Month));

        let plan = plan_for(&model, QueryRequest::new(["bookings_all_time"], Vec::<String>::new()), true).unwrap();
        let output_granularity = plan.nodes().iter().find_map(|n| match n.as_ref() {
            DataflowNode::JoinOverTimeRange(j) => Some(j.output_granularity),
            _ => None,
        });
        assert_eq!(output_granularity, Some(None));
    }

    #[test]
    fn test_semi_additive_measure_gets_window_join() {
        let model = simple_model();
        let plan = plan_for(
            &model,
            QueryRequest::new(["current_account_balance_by_user"], ["metric_time__month"]),
            true,
        )
        .unwrap();
        let saj = plan
            .nodes()
            .into_iter()
            .find_map(|n| match n.as_ref() {
                DataflowNode::SemiAdditiveJoin(s) => Some((s.entity_specs.clone(), s.queried_time_dimension_spec.clone())),
                _ => None,
            })
            .unwrap();
        assert_eq!(saj.0, vec![IdentifierSpec::new("user", Vec::new())]);
        assert_eq!(saj.1.unwrap().qualified_name(), "metric_time__month");
    }

    #[test]
    fn test_derived_metric_computes_inputs_first() {
        let model = simple_model();
        let plan = plan_for(&model, QueryRequest::new(["non_instant_bookings"], ["metric_time__day"]), true).unwrap();
        assert_eq!(count_nodes(&plan, "ComputeMetricsNode"), 3);
        assert_eq!(count_nodes(&plan, "CombineMetricsNode"), 1);
    }

    #[test]
    fn test_dimension_only_query_prefers_local_source() {
        let model = simple_model();
        let plan = plan_for(
            &model,
            QueryRequest::new(Vec::<String>::new(), ["listing__country_latest"]),
            true,
        )
        .unwrap();
        assert_eq!(count_nodes(&plan, "JoinToBaseOutputNode"), 0);
        let distinct = plan
            .nodes()
            .iter()
            .any(|n| matches!(n.as_ref(), DataflowNode::FilterElements(f) if f.distinct));
        assert!(distinct);
    }

    #[test]
    fn test_dimension_only_query_joins_through_owned_identifier() {
        let model = simple_model();
        let request = QueryRequest::new(
            Vec::<String>::new(),
            ["listing__country_latest", "listing__user__home_state"],
        );
        let plan = plan_for(&model, request, true).unwrap();

        let (left, targets) = plan
            .nodes()
            .into_iter()
            .find_map(|n| match n.as_ref() {
                DataflowNode::JoinToBaseOutput(j) => Some((j.left.clone(), j.join_targets.clone())),
                _ => None,
            })
            .unwrap();
        assert!(matches!(left.as_ref(), DataflowNode::ReadSqlSource(r) if r.data_source == "listings_latest"));
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].join_on_identifier.qualified_name(), "listing__user");
        let cost = DefaultCostFunction::new().calculate_cost(plan.sink_node().unwrap());
        assert_eq!(cost.num_joins, 1);
    }

    #[test]
    fn test_order_by_limit_and_output_table() {
        let model = simple_model();
        let request = QueryRequest::new(["bookings"], ["metric_time__day"])
            .with_order_by(["-bookings"])
            .with_limit(3)
            .with_output_table("analytics.bookings_daily");
        let plan = plan_for(&model, request, true).unwrap();
        let sink = plan.sink_node().unwrap();
        assert_eq!(sink.node_type(), "WriteToResultTableNode");
        assert_eq!(sink.parents()[0].node_type(), "OrderByLimitNode");
    }

    #[test]
    fn test_multi_hop_join_requires_multi_hop() {
        let model = load_model_file("tests/test_data/multi_hop_model.yaml").unwrap();
        let request = QueryRequest::new(["txn_count"], ["account_id__customer_id__customer_name"]);
        let plan = plan_for(&model, request.clone(), true).unwrap();
        let cost = DefaultCostFunction::new().calculate_cost(plan.sink_node().unwrap());
        assert_eq!(cost.num_joins, 2);

        let query = QueryParser::new(&model, true).parse(&request).unwrap();
        let resolver = DunderColumnAssociationResolver;
        let err = DataflowPlanBuilder::new(&model, &resolver, false)
            .build_plan(&query, &mut IdAllocator::new(0))
            .unwrap_err();
        assert!(err.to_string().contains("account_id__customer_id__customer_name"));
    }

    #[test]
    fn test_cheaper_join_path_wins() {
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
        expr: txn_count
    dimensions:
      - name: ds
        type: time
        type_params:
          is_primary: true
          time_granularity: day
  - name: bridge_table
    sql_table: bridge_table
    identifiers:
      - name: account_id
        type: primary
      - name: customer_id
        type: foreign
  - name: customer_table
    sql_table: customer_table
    identifiers:
      - name: customer_id
        type: primary
    dimensions:
      - name: customer_name
        type: categorical
  - name: customer_accounts
    sql_table: customer_accounts
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
        let model = load_model_str(yaml).unwrap();
        let request = QueryRequest::new(["txn_count"], ["account_id__customer_id__customer_name"]);
        let plan = plan_for(&model, request, true).unwrap();
        let cost = DefaultCostFunction::new().calculate_cost(plan.sink_node().unwrap());
        assert_eq!(cost.num_joins, 1);
    }
}
