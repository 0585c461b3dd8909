//! Dataflow plan → SQL query plan
//!
//! Every dataflow node becomes one SELECT over its parents' SELECTs, aliased `subq_N`.
//! The converter also tracks the instance set each node produces, which is how the
//! planner learns what columns a candidate node offers.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::dataflow::{
    AggregateMeasuresNode, CombineMetricsNode, ComputeMetricsNode, ConstrainTimeRangeNode, DataflowNode,
    DataflowNodeRef, DataflowPlan, FilterElementsNode, JoinAggregatedMeasuresByGroupByColumnsNode,
    JoinOverTimeRangeNode, JoinToBaseOutputNode, MetricTimeDimensionTransformNode, OrderByLimitNode,
    ReadSqlSourceNode, SemiAdditiveJoinNode, WhereConstraintNode, WriteToResultTableNode,
};
use crate::config::TimeSpineSource;
use crate::error::{Error, Result};
use crate::ids::{IdAllocator, NodeId};
use crate::instances::{AggregationState, ElementReference, Instance, InstanceSet, MeasureInstance};
use crate::resolver::{local_linkable_specs, NodeDataSetResolver};
use crate::semantic_model::{
    AggregationType, DataSource, DataSourceOrigin, Measure, Metric, MetricType, SemanticModel, TimeGranularity,
    METRIC_TIME,
};
use crate::specs::{
    ColumnAssociationResolver, IdentifierSpec, InstanceSpec, LinkableSpec, MeasureSpec, MetricSpec, OrderByItem,
    OrderBySpec, TimeDimensionSpec,
};
use crate::sql::{
    replace_identifiers, sql_identifiers, SqlArithmeticOperator, SqlComparison, SqlCreateTableAs, SqlExpr,
    SqlExprRef, SqlFunction, SqlJoinDescription, SqlJoinType, SqlLogicalOperator, SqlOrderBy, SqlQueryPlanNode,
    SqlQueryPlanNodeRef, SqlSelectColumn, SqlSelectQuery, SqlSelectStatement, SqlStringExpression, SqlTable,
};
use super::error::EmitError;

/// The SQL for a node together with the instances its columns hold
#[derive(Debug, Clone)]
pub struct SqlDataSet {
    pub instance_set: InstanceSet,
    pub sql_node: SqlQueryPlanNodeRef,
}

/// A SQL plan ready for optimization and rendering
#[derive(Debug, Clone)]
pub struct SqlQueryPlan {
    pub render_node: SqlQueryPlanNodeRef,
}

/// Column name → expression, emitted in instance-set order
type ColumnExprs = HashMap<String, SqlExprRef>;

pub struct DataflowToSqlQueryPlanConverter<'a> {
    model: &'a SemanticModel,
    column_resolver: &'a dyn ColumnAssociationResolver,
    ids: IdAllocator,
    time_spine: TimeSpineSource,
    cache: HashMap<NodeId, SqlDataSet>,
}

impl<'a> DataflowToSqlQueryPlanConverter<'a> {
    pub fn new(model: &'a SemanticModel, column_resolver: &'a dyn ColumnAssociationResolver, ids: IdAllocator) -> Self {
        DataflowToSqlQueryPlanConverter {
            model,
            column_resolver,
            ids,
            time_spine: TimeSpineSource::default(),
            cache: HashMap::new(),
        }
    }

    pub fn with_time_spine(mut self, time_spine: TimeSpineSource) -> Self {
        self.time_spine = time_spine;
        self
    }

    /// Lower the plan's single sink
    pub fn convert_plan(&mut self, plan: &DataflowPlan) -> Result<SqlQueryPlan> {
        let sink = plan.sink_node()?;
        let data_set = self.convert_node(sink)?;
        debug!(sink = %sink.id(), "Converted dataflow plan to SQL");
        Ok(SqlQueryPlan {
            render_node: data_set.sql_node,
        })
    }

    /// Hand the id allocator back so later stages keep drawing from the same sequence
    pub fn into_id_allocator(self) -> IdAllocator {
        self.ids
    }

    /// Lower one node. Results are memoized per node id, so shared parents become the same
    /// SQL subtree.
    pub fn convert_node(&mut self, node: &DataflowNodeRef) -> Result<SqlDataSet> {
        if let Some(cached) = self.cache.get(node.id()) {
            return Ok(cached.clone());
        }
        trace!(node = %node.id(), node_type = node.node_type(), "Converting dataflow node");
        let data_set = match node.as_ref() {
            DataflowNode::ReadSqlSource(n) => self.convert_read_sql_source(n, node.description())?,
            DataflowNode::MetricTimeDimensionTransform(n) => self.convert_metric_time_transform(n)?,
            DataflowNode::JoinToBaseOutput(n) => self.convert_join_to_base_output(n)?,
            DataflowNode::FilterElements(n) => self.convert_filter_elements(n, node.description())?,
            DataflowNode::WhereConstraint(n) => self.convert_where_constraint(n)?,
            DataflowNode::ConstrainTimeRange(n) => self.convert_constrain_time_range(n)?,
            DataflowNode::JoinOverTimeRange(n) => self.convert_join_over_time_range(n)?,
            DataflowNode::SemiAdditiveJoin(n) => self.convert_semi_additive_join(n)?,
            DataflowNode::AggregateMeasures(n) => self.convert_aggregate_measures(n)?,
            DataflowNode::ComputeMetrics(n) => self.convert_compute_metrics(n)?,
            DataflowNode::JoinAggregatedMeasuresByGroupByColumns(n) => self.convert_join_aggregated_measures(n)?,
            DataflowNode::CombineMetrics(n) => self.convert_combine_metrics(n)?,
            DataflowNode::OrderByLimit(n) => self.convert_order_by_limit(n)?,
            DataflowNode::WriteToResultDataframe(n) => self.convert_node(&n.parent)?,
            DataflowNode::WriteToResultTable(n) => self.convert_write_to_result_table(n)?,
        };
        self.cache.insert(node.id().clone(), data_set.clone());
        Ok(data_set)
    }

    fn next_alias(&mut self) -> String {
        self.ids.next_id("subq").to_string()
    }

    fn column_name(&self, spec: InstanceSpec) -> String {
        self.column_resolver.column_name(&spec)
    }

    fn data_source(&self, node: &NodeId, name: &str) -> Result<&'a DataSource> {
        self.model.data_source(name).ok_or_else(|| {
            EmitError::UnknownElement {
                node: node.to_string(),
                kind: "data source",
                name: name.to_string(),
            }
            .into()
        })
    }

    fn measure(&self, node: &NodeId, name: &str) -> Result<&'a Measure> {
        self.model.measure(name).ok_or_else(|| {
            EmitError::UnknownElement {
                node: node.to_string(),
                kind: "measure",
                name: name.to_string(),
            }
            .into()
        })
    }

    fn metric(&self, node: &NodeId, name: &str) -> Result<&'a Metric> {
        self.model.metric(name).ok_or_else(|| {
            EmitError::UnknownElement {
                node: node.to_string(),
                kind: "metric",
                name: name.to_string(),
            }
            .into()
        })
    }

    fn convert_read_sql_source(&mut self, node: &ReadSqlSourceNode, description: String) -> Result<SqlDataSet> {
        let ds = self.data_source(&node.id, &node.data_source)?;
        let from_source = match ds.from_source() {
            Some(DataSourceOrigin::Table(table)) => Arc::new(SqlQueryPlanNode::Table(SqlTable {
                table_name: table.to_string(),
            })),
            Some(DataSourceOrigin::Query(query)) => Arc::new(SqlQueryPlanNode::SelectQuery(SqlSelectQuery {
                select_query: query.to_string(),
            })),
            None => {
                return Err(EmitError::InvalidPlan(format!("data source '{}' has no table or query", ds.name)).into())
            }
        };
        let from_alias = format!("{}_src_{}", ds.name, self.ids.next_id("src").index);

        let mut instance_set = InstanceSet::default();
        let mut exprs = ColumnExprs::new();
        let defined_from = |element_name: &str| {
            vec![ElementReference {
                data_source: ds.name.clone(),
                element_name: element_name.to_string(),
            }]
        };

        for measure in &ds.measures {
            let spec = MeasureSpec::new(measure.name.clone());
            let column_name = self.column_name(InstanceSpec::Measure(spec.clone()));
            exprs.insert(column_name.clone(), source_expr(&from_alias, measure.expr()));
            instance_set.measures.push(MeasureInstance {
                spec,
                column_name,
                defined_from: defined_from(&measure.name),
                aggregation_state: AggregationState::NonAggregated,
            });
        }

        for spec in local_linkable_specs(ds) {
            let column_name = self.column_name(InstanceSpec::Linkable(spec.clone()));
            let element_name = spec.element_name().to_string();
            let expr = match &spec {
                LinkableSpec::Dimension(_) | LinkableSpec::TimeDimension(_) => {
                    let dimension = ds.get_dimension(&element_name).ok_or_else(|| EmitError::UnknownElement {
                        node: node.id.to_string(),
                        kind: "dimension",
                        name: element_name.clone(),
                    })?;
                    let base = source_expr(&from_alias, dimension.expr());
                    match &spec {
                        LinkableSpec::TimeDimension(td) => Arc::new(SqlExpr::DateTrunc {
                            granularity: td.time_granularity,
                            arg: base,
                        }),
                        _ => base,
                    }
                }
                LinkableSpec::Identifier(_) => {
                    let identifier = ds.get_identifier(&element_name).ok_or_else(|| EmitError::UnknownElement {
                        node: node.id.to_string(),
                        kind: "identifier",
                        name: element_name.clone(),
                    })?;
                    source_expr(&from_alias, identifier.expr())
                }
            };
            exprs.insert(column_name.clone(), expr);
            let from = defined_from(&element_name);
            match spec {
                LinkableSpec::Dimension(spec) => instance_set.dimensions.push(Instance {
                    spec,
                    column_name,
                    defined_from: from,
                }),
                LinkableSpec::TimeDimension(spec) => instance_set.time_dimensions.push(Instance {
                    spec,
                    column_name,
                    defined_from: from,
                }),
                LinkableSpec::Identifier(spec) => instance_set.identifiers.push(Instance {
                    spec,
                    column_name,
                    defined_from: from,
                }),
            }
        }

        let select_columns = ordered_columns(&node.id, &instance_set, &exprs)?;
        let statement = SqlSelectStatement::new(description, select_columns, from_source, from_alias);
        Ok(SqlDataSet {
            instance_set,
            sql_node: statement.into_node(),
        })
    }

    fn convert_metric_time_transform(&mut self, node: &MetricTimeDimensionTransformNode) -> Result<SqlDataSet> {
        let parent = self.convert_node(&node.parent)?;
        let alias = self.next_alias();

        let mut instance_set = parent.instance_set.clone();
        let mut kept_measures = Vec::new();
        for instance in &parent.instance_set.measures {
            let Some(origin) = instance.defined_from.first() else {
                continue;
            };
            let ds = self.data_source(&node.id, &origin.data_source)?;
            let measure = self.measure(&node.id, &instance.spec.element_name)?;
            if ds.agg_time_dimension(measure).map(|d| d.name.as_str()) == Some(node.aggregation_time_dimension.as_str())
            {
                kept_measures.push(instance.clone());
            }
        }
        instance_set.measures = kept_measures;

        let mut exprs = pass_through_exprs(&alias, &instance_set);
        for instance in &parent.instance_set.time_dimensions {
            if !instance.spec.identifier_links.is_empty()
                || instance.spec.element_name != node.aggregation_time_dimension
            {
                continue;
            }
            let spec = TimeDimensionSpec::metric_time(instance.spec.time_granularity);
            let column_name = self.column_name(InstanceSpec::Linkable(spec.clone().into()));
            exprs.insert(column_name.clone(), SqlExpr::column(alias.clone(), instance.column_name.clone()));
            instance_set.time_dimensions.push(Instance {
                spec,
                column_name,
                defined_from: instance.defined_from.clone(),
            });
        }

        let select_columns = ordered_columns(&node.id, &instance_set, &exprs)?;
        let statement = SqlSelectStatement::new(
            format!("Metric Time Dimension '{}'", node.aggregation_time_dimension),
            select_columns,
            parent.sql_node,
            alias,
        );
        Ok(SqlDataSet {
            instance_set,
            sql_node: statement.into_node(),
        })
    }

    fn convert_join_to_base_output(&mut self, node: &JoinToBaseOutputNode) -> Result<SqlDataSet> {
        let left = self.convert_node(&node.left)?;
        let left_alias = self.next_alias();

        let mut sources: HashMap<String, (String, String)> = left
            .instance_set
            .column_names()
            .into_iter()
            .map(|c| (c.to_string(), (left_alias.clone(), c.to_string())))
            .collect();
        let mut sets = vec![left.instance_set.clone()];
        let mut joins = Vec::new();

        for target in &node.join_targets {
            let right = self.convert_node(&target.join_node)?;
            let right_alias = self.next_alias();
            // A linked identifier (`listing__user`) is reached through an identifier the left rows own
            let left_identifier: LinkableSpec = target.join_on_identifier.clone().into();
            let right_identifier: LinkableSpec =
                IdentifierSpec::new(target.join_on_identifier.element_name.clone(), Vec::new()).into();
            let mut links = target.join_on_identifier.identifier_links.clone();
            links.push(target.join_on_identifier.element_name.clone());

            let mut conditions = vec![SqlExpr::comparison(
                SqlExpr::column(
                    left_alias.clone(),
                    linkable_column(&node.id, &left.instance_set, &left_identifier)?,
                ),
                SqlComparison::Equals,
                SqlExpr::column(
                    right_alias.clone(),
                    linkable_column(&node.id, &right.instance_set, &right_identifier)?,
                ),
            )];
            for partition in &target.join_on_partitions {
                conditions.push(SqlExpr::comparison(
                    SqlExpr::column(
                        left_alias.clone(),
                        linkable_column(&node.id, &left.instance_set, &partition.start_node_spec)?,
                    ),
                    SqlComparison::Equals,
                    SqlExpr::column(
                        right_alias.clone(),
                        linkable_column(&node.id, &right.instance_set, &partition.node_to_join_spec)?,
                    ),
                ));
            }
            if let Some(window) = &target.validity_window {
                let left_time = SqlExpr::column(
                    left_alias.clone(),
                    linkable_column(&node.id, &left.instance_set, &window.left_time_dimension.clone().into())?,
                );
                let start = SqlExpr::column(
                    right_alias.clone(),
                    linkable_column(&node.id, &right.instance_set, &window.window_start_dimension.clone().into())?,
                );
                let end = SqlExpr::column(
                    right_alias.clone(),
                    linkable_column(&node.id, &right.instance_set, &window.window_end_dimension.clone().into())?,
                );
                conditions.push(SqlExpr::comparison(left_time.clone(), SqlComparison::GreaterThanOrEquals, start));
                conditions.push(Arc::new(SqlExpr::Logical {
                    operator: SqlLogicalOperator::Or,
                    args: vec![
                        SqlExpr::comparison(left_time, SqlComparison::LessThan, end.clone()),
                        Arc::new(SqlExpr::IsNull(end)),
                    ],
                }));
            }

            let (linked, columns) = right.instance_set.with_prefix_links(&links, self.column_resolver);
            for (from_column, to_column) in columns {
                sources.entry(to_column).or_insert_with(|| (right_alias.clone(), from_column));
            }
            sets.push(linked);
            joins.push(SqlJoinDescription {
                right_source: right.sql_node,
                right_source_alias: right_alias,
                on_condition: SqlExpr::and(conditions),
                join_type: SqlJoinType::LeftOuter,
            });
        }

        let instance_set = InstanceSet::merge(&sets);
        let exprs: ColumnExprs = sources
            .into_iter()
            .map(|(column, (alias, from_column))| (column, SqlExpr::column(alias, from_column)))
            .collect();
        let select_columns = ordered_columns(&node.id, &instance_set, &exprs)?;
        let statement = SqlSelectStatement::new("Join Standard Outputs", select_columns, left.sql_node, left_alias)
            .with_joins(joins);
        Ok(SqlDataSet {
            instance_set,
            sql_node: statement.into_node(),
        })
    }

    fn convert_filter_elements(&mut self, node: &FilterElementsNode, description: String) -> Result<SqlDataSet> {
        let parent = self.convert_node(&node.parent)?;
        let alias = self.next_alias();

        for spec in node.include_specs.linkable_specs() {
            linkable_column(&node.id, &parent.instance_set, &spec)?;
        }
        for spec in &node.include_specs.measures {
            if parent.instance_set.column_for_measure(spec).is_none() {
                return Err(column_not_found(&node.id, &spec.element_name));
            }
        }
        for spec in &node.include_specs.metrics {
            if parent.instance_set.column_for_metric(spec).is_none() {
                return Err(column_not_found(&node.id, &spec.element_name));
            }
        }

        let instance_set = parent.instance_set.filter(&node.include_specs);
        let select_columns = pass_through_columns(&alias, &instance_set);
        let statement =
            SqlSelectStatement::new(description, select_columns, parent.sql_node, alias).with_distinct(node.distinct);
        Ok(SqlDataSet {
            instance_set,
            sql_node: statement.into_node(),
        })
    }

    fn convert_where_constraint(&mut self, node: &WhereConstraintNode) -> Result<SqlDataSet> {
        let parent = self.convert_node(&node.parent)?;
        let alias = self.next_alias();

        let mut used_columns = Vec::new();
        for spec in &node.where_filter.linkable_specs {
            used_columns.push(linkable_column(&node.id, &parent.instance_set, spec)?);
        }
        let where_clause = Arc::new(SqlExpr::String(SqlStringExpression {
            sql: node.where_filter.where_sql.clone(),
            bind_parameters: node.where_filter.bind_parameters.clone(),
            used_columns: Some(used_columns),
            requires_parenthesis: true,
        }));

        let instance_set = parent.instance_set;
        let select_columns = pass_through_columns(&alias, &instance_set);
        let statement = SqlSelectStatement::new("Constrain Output with WHERE", select_columns, parent.sql_node, alias)
            .with_where(Some(where_clause));
        Ok(SqlDataSet {
            instance_set,
            sql_node: statement.into_node(),
        })
    }

    fn convert_constrain_time_range(&mut self, node: &ConstrainTimeRangeNode) -> Result<SqlDataSet> {
        let parent = self.convert_node(&node.parent)?;
        let alias = self.next_alias();

        let column = linkable_column(&node.id, &parent.instance_set, &node.metric_time_spec.clone().into())?;
        let where_clause = Arc::new(SqlExpr::Between {
            arg: SqlExpr::column(alias.clone(), column),
            start: Arc::new(SqlExpr::TimestampLiteral(node.time_range.start)),
            end: Arc::new(SqlExpr::TimestampLiteral(node.time_range.end)),
        });

        let instance_set = parent.instance_set;
        let select_columns = pass_through_columns(&alias, &instance_set);
        let statement = SqlSelectStatement::new(
            format!("Constrain Time Range to {}", node.time_range),
            select_columns,
            parent.sql_node,
            alias,
        )
        .with_where(Some(where_clause));
        Ok(SqlDataSet {
            instance_set,
            sql_node: statement.into_node(),
        })
    }

    /// The time spine on the left, every parent row on the right whose `metric_time` falls
    /// in the window ending at the spine date.
    fn convert_join_over_time_range(&mut self, node: &JoinOverTimeRangeNode) -> Result<SqlDataSet> {
        let parent = self.convert_node(&node.parent)?;
        let metric_time_column = linkable_column(&node.id, &parent.instance_set, &node.metric_time_spec.clone().into())?;
        let spine = self.time_spine_node(node, &parent, &metric_time_column);

        let spine_alias = self.next_alias();
        let parent_alias = self.next_alias();
        let spine_time = SqlExpr::column(spine_alias.clone(), metric_time_column.clone());
        let parent_time = SqlExpr::column(parent_alias.clone(), metric_time_column.clone());

        let mut conditions = vec![SqlExpr::comparison(
            parent_time.clone(),
            SqlComparison::LessThanOrEquals,
            spine_time.clone(),
        )];
        if let Some(window) = &node.window {
            conditions.push(SqlExpr::comparison(
                parent_time,
                SqlComparison::GreaterThan,
                Arc::new(SqlExpr::SubtractTimeInterval {
                    arg: spine_time,
                    count: window.count,
                    granularity: window.granularity,
                }),
            ));
        } else if let Some(granularity) = node.grain_to_date {
            conditions.push(SqlExpr::comparison(
                parent_time,
                SqlComparison::GreaterThanOrEquals,
                Arc::new(SqlExpr::DateTrunc {
                    granularity,
                    arg: spine_time,
                }),
            ));
        }

        let instance_set = parent.instance_set.clone();
        let mut exprs = pass_through_exprs(&parent_alias, &instance_set);
        for instance in instance_set.time_dimensions.iter().filter(|i| i.spec.is_metric_time()) {
            let spine_column = SqlExpr::column(spine_alias.clone(), metric_time_column.clone());
            let expr = if instance.spec.time_granularity == node.metric_time_spec.time_granularity {
                spine_column
            } else {
                Arc::new(SqlExpr::DateTrunc {
                    granularity: instance.spec.time_granularity,
                    arg: spine_column,
                })
            };
            exprs.insert(instance.column_name.clone(), expr);
        }

        let select_columns = ordered_columns(&node.id, &instance_set, &exprs)?;
        let statement = SqlSelectStatement::new("Join Over Time Range", select_columns, spine, spine_alias)
            .with_joins(vec![SqlJoinDescription {
                right_source: parent.sql_node,
                right_source_alias: parent_alias,
                on_condition: SqlExpr::and(conditions),
                join_type: SqlJoinType::Inner,
            }]);
        Ok(SqlDataSet {
            instance_set,
            sql_node: statement.into_node(),
        })
    }

    /// One row per date a window ends at, read from the time spine so dates without parent
    /// rows still get one. Dates are bounded by the query's time range, or else by the parent's
    /// first and last `metric_time`. When the query groups by a coarser period than the
    /// measure, only the last date of each period is kept.
    fn time_spine_node(
        &mut self,
        node: &JoinOverTimeRangeNode,
        parent: &SqlDataSet,
        metric_time_column: &str,
    ) -> SqlQueryPlanNodeRef {
        let spine_granularity = node.metric_time_spec.time_granularity;
        let table_alias = self.next_alias();
        let spine_date = SqlExpr::column(table_alias.clone(), self.time_spine.column_name.clone());
        let base = if spine_granularity == TimeGranularity::Day {
            spine_date.clone()
        } else {
            Arc::new(SqlExpr::DateTrunc {
                granularity: spine_granularity,
                arg: spine_date.clone(),
            })
        };

        let mut joins = Vec::new();
        let bounds = match &node.time_range {
            Some(range) => Arc::new(SqlExpr::Between {
                arg: base.clone(),
                start: Arc::new(SqlExpr::TimestampLiteral(range.start)),
                end: Arc::new(SqlExpr::TimestampLiteral(range.end)),
            }),
            None => {
                let parent_alias = self.next_alias();
                let bounds_alias = self.next_alias();
                let parent_time = SqlExpr::column(parent_alias.clone(), metric_time_column);
                let (start_column, end_column) =
                    (format!("{}__start", metric_time_column), format!("{}__end", metric_time_column));
                let parent_bounds = SqlSelectStatement::new(
                    "Bound Time Spine by Input",
                    vec![
                        SqlSelectColumn::new(
                            SqlExpr::function(SqlFunction::Min, vec![parent_time.clone()]),
                            start_column.clone(),
                        ),
                        SqlSelectColumn::new(
                            SqlExpr::function(SqlFunction::Max, vec![parent_time]),
                            end_column.clone(),
                        ),
                    ],
                    parent.sql_node.clone(),
                    parent_alias,
                )
                .into_node();
                joins.push(SqlJoinDescription {
                    right_source: parent_bounds,
                    right_source_alias: bounds_alias.clone(),
                    on_condition: None,
                    join_type: SqlJoinType::Cross,
                });
                Arc::new(SqlExpr::Between {
                    arg: base.clone(),
                    start: SqlExpr::column(bounds_alias.clone(), start_column),
                    end: SqlExpr::column(bounds_alias, end_column),
                })
            }
        };

        let table = Arc::new(SqlQueryPlanNode::Table(SqlTable {
            table_name: self.time_spine.table_name.clone(),
        }));
        let statement = match node.output_granularity {
            Some(granularity) if granularity <= spine_granularity => SqlSelectStatement::new(
                "Time Spine",
                vec![SqlSelectColumn::new(base, metric_time_column)],
                table,
                table_alias,
            )
            .with_distinct(true),
            output_granularity => {
                let group_bys = output_granularity
                    .map(|granularity| {
                        SqlSelectColumn::new(
                            Arc::new(SqlExpr::DateTrunc {
                                granularity,
                                arg: spine_date,
                            }),
                            format!("{}__{}", METRIC_TIME, granularity.as_str()),
                        )
                    })
                    .into_iter()
                    .collect();
                SqlSelectStatement::new(
                    "Time Spine at Period End",
                    vec![SqlSelectColumn::new(
                        SqlExpr::function(SqlFunction::Max, vec![base]),
                        metric_time_column,
                    )],
                    table,
                    table_alias,
                )
                .with_group_bys(group_bys)
            }
        };
        statement.with_joins(joins).with_where(Some(bounds)).into_node()
    }

    /// Rows of the parent at the MIN or MAX of a time dimension within each entity group
    fn convert_semi_additive_join(&mut self, node: &SemiAdditiveJoinNode) -> Result<SqlDataSet> {
        let parent = self.convert_node(&node.parent)?;
        let time_column = linkable_column(&node.id, &parent.instance_set, &node.time_dimension_spec.clone().into())?;

        let mut group_columns = Vec::new();
        for entity in &node.entity_specs {
            group_columns.push(linkable_column(&node.id, &parent.instance_set, &entity.clone().into())?);
        }
        if let Some(queried) = &node.queried_time_dimension_spec {
            let column = linkable_column(&node.id, &parent.instance_set, &queried.clone().into())?;
            if column != time_column && !group_columns.contains(&column) {
                group_columns.push(column);
            }
        }

        let function = match node.agg_by_function {
            AggregationType::Min => SqlFunction::Min,
            AggregationType::Max => SqlFunction::Max,
            other => {
                return Err(EmitError::InvalidPlan(format!(
                    "{}: window choice must be min or max, got {}",
                    node.id,
                    other.as_str()
                ))
                .into())
            }
        };

        let inner_alias = self.next_alias();
        let complete_column = format!("{}__complete", time_column);
        let mut inner_columns: Vec<SqlSelectColumn> = group_columns
            .iter()
            .map(|c| SqlSelectColumn::new(SqlExpr::column(inner_alias.clone(), c.clone()), c.clone()))
            .collect();
        let group_bys = inner_columns.clone();
        inner_columns.push(SqlSelectColumn::new(
            SqlExpr::function(function, vec![SqlExpr::column(inner_alias.clone(), time_column.clone())]),
            complete_column.clone(),
        ));
        let window_query = SqlSelectStatement::new(
            "Filter row on MIN or MAX of a time dimension",
            inner_columns,
            parent.sql_node.clone(),
            inner_alias,
        )
        .with_group_bys(group_bys)
        .into_node();

        let parent_alias = self.next_alias();
        let window_alias = self.next_alias();
        let mut conditions = vec![SqlExpr::comparison(
            SqlExpr::column(parent_alias.clone(), time_column),
            SqlComparison::Equals,
            SqlExpr::column(window_alias.clone(), complete_column),
        )];
        for column in &group_columns {
            conditions.push(SqlExpr::comparison(
                SqlExpr::column(parent_alias.clone(), column.clone()),
                SqlComparison::Equals,
                SqlExpr::column(window_alias.clone(), column.clone()),
            ));
        }

        let instance_set = parent.instance_set;
        let select_columns = pass_through_columns(&parent_alias, &instance_set);
        let description = format!(
            "Join on {} and {} grouping by entities",
            node.agg_by_function.as_str().to_uppercase(),
            node.time_dimension_spec.qualified_name()
        );
        let statement = SqlSelectStatement::new(description, select_columns, parent.sql_node, parent_alias).with_joins(
            vec![SqlJoinDescription {
                right_source: window_query,
                right_source_alias: window_alias,
                on_condition: SqlExpr::and(conditions),
                join_type: SqlJoinType::Inner,
            }],
        );
        Ok(SqlDataSet {
            instance_set,
            sql_node: statement.into_node(),
        })
    }

    fn convert_aggregate_measures(&mut self, node: &AggregateMeasuresNode) -> Result<SqlDataSet> {
        let parent = self.convert_node(&node.parent)?;
        let alias = self.next_alias();

        let mut instance_set = parent.instance_set.linkable_only();
        let mut exprs = pass_through_exprs(&alias, &instance_set);
        for spec in &node.measure_specs {
            let instance = parent
                .instance_set
                .measures
                .iter()
                .find(|i| &i.spec == spec)
                .ok_or_else(|| column_not_found(&node.id, &spec.element_name))?;
            let measure = self.measure(&node.id, &spec.element_name)?;
            let arg = SqlExpr::column(alias.clone(), instance.column_name.clone());
            let expr = match SqlFunction::for_aggregation(measure.agg) {
                Some(function) => SqlExpr::function(function, vec![arg]),
                None => {
                    let percentile = measure.percentile().ok_or_else(|| {
                        EmitError::InvalidPlan(format!("measure '{}' has no percentile", measure.name))
                    })?;
                    Arc::new(SqlExpr::Percentile {
                        arg,
                        percentile,
                        discrete: measure.use_discrete_percentile(),
                    })
                }
            };
            exprs.insert(instance.column_name.clone(), expr);
            instance_set.measures.push(MeasureInstance {
                aggregation_state: AggregationState::Complete,
                ..instance.clone()
            });
        }

        let group_bys = pass_through_columns(&alias, &instance_set.linkable_only());
        let select_columns = ordered_columns(&node.id, &instance_set, &exprs)?;
        let statement = SqlSelectStatement::new("Aggregate Measures", select_columns, parent.sql_node, alias)
            .with_group_bys(group_bys);
        Ok(SqlDataSet {
            instance_set,
            sql_node: statement.into_node(),
        })
    }

    fn convert_compute_metrics(&mut self, node: &ComputeMetricsNode) -> Result<SqlDataSet> {
        let parent = self.convert_node(&node.parent)?;
        let alias = self.next_alias();

        let mut instance_set = parent.instance_set.linkable_only();
        let mut exprs = pass_through_exprs(&alias, &instance_set);
        for spec in &node.metric_specs {
            let metric = self.metric(&node.id, &spec.element_name)?;
            let expr = self.metric_expr(&node.id, &alias, &parent.instance_set, metric)?;
            let column_name = self.column_name(InstanceSpec::Metric(spec.clone()));
            exprs.insert(column_name.clone(), expr);
            instance_set.metrics.push(Instance {
                spec: spec.clone(),
                column_name,
                defined_from: Vec::new(),
            });
        }

        let select_columns = ordered_columns(&node.id, &instance_set, &exprs)?;
        let names: Vec<&str> = node.metric_specs.iter().map(|m| m.element_name.as_str()).collect();
        let statement = SqlSelectStatement::new(
            format!("Compute Metrics via Expressions: [{}]", names.join(", ")),
            select_columns,
            parent.sql_node,
            alias,
        );
        Ok(SqlDataSet {
            instance_set,
            sql_node: statement.into_node(),
        })
    }

    fn metric_expr(&self, node: &NodeId, alias: &str, input: &InstanceSet, metric: &Metric) -> Result<SqlExprRef> {
        let measure_column = |name: &str| -> Result<String> {
            input
                .column_for_measure(&MeasureSpec::new(name))
                .map(str::to_string)
                .ok_or_else(|| column_not_found(node, name))
        };
        let measures = metric.input_measures();

        match metric.metric_type {
            MetricType::MeasureProxy | MetricType::Cumulative => {
                let name: &str = measures
                    .first()
                    .copied()
                    .ok_or_else(|| EmitError::InvalidPlan(format!("metric '{}' has no measure", metric.name)))?;
                Ok(SqlExpr::column(alias, measure_column(name)?))
            }
            MetricType::Ratio => {
                let (Some(numerator), Some(denominator)) =
                    (&metric.type_params.numerator, &metric.type_params.denominator)
                else {
                    return Err(EmitError::InvalidPlan(format!("ratio metric '{}' is incomplete", metric.name)).into());
                };
                let numerator = SqlExpr::column(alias, measure_column(numerator)?);
                let denominator = SqlExpr::column(alias, measure_column(denominator)?);
                Ok(Arc::new(SqlExpr::Arithmetic {
                    left: Arc::new(SqlExpr::CastToDouble(numerator)),
                    operator: SqlArithmeticOperator::Divide,
                    right: Arc::new(SqlExpr::CastToDouble(SqlExpr::function(
                        SqlFunction::NullIf,
                        vec![denominator, SqlExpr::constant("0")],
                    ))),
                }))
            }
            MetricType::Expr => {
                let sql = metric.type_params.expr.clone().unwrap_or_else(|| metric.name.clone());
                let used_columns = sql_identifiers(&sql)
                    .into_iter()
                    .filter_map(|word| input.column_for_measure(&MeasureSpec::new(word)).map(str::to_string))
                    .collect();
                Ok(Arc::new(SqlExpr::String(SqlStringExpression {
                    sql,
                    bind_parameters: Default::default(),
                    used_columns: Some(used_columns),
                    requires_parenthesis: true,
                })))
            }
            MetricType::Derived => {
                let expr = metric
                    .type_params
                    .expr
                    .as_deref()
                    .ok_or_else(|| EmitError::InvalidPlan(format!("derived metric '{}' has no expr", metric.name)))?;
                let mut used_columns = Vec::new();
                for input_metric in metric.input_metrics() {
                    let column = input
                        .column_for_metric(&MetricSpec::new(input_metric.name.clone()))
                        .ok_or_else(|| column_not_found(node, &input_metric.name))?;
                    used_columns.push(column.to_string());
                }
                let sql = replace_identifiers(expr, |word| {
                    metric
                        .input_metrics()
                        .iter()
                        .position(|m| m.expr_name() == word)
                        .map(|i| used_columns[i].clone())
                });
                Ok(Arc::new(SqlExpr::String(SqlStringExpression {
                    sql,
                    bind_parameters: Default::default(),
                    used_columns: Some(used_columns),
                    requires_parenthesis: true,
                })))
            }
        }
    }

    fn convert_join_aggregated_measures(
        &mut self,
        node: &JoinAggregatedMeasuresByGroupByColumnsNode,
    ) -> Result<SqlDataSet> {
        let (first, rest) = node
            .parents
            .split_first()
            .ok_or_else(|| EmitError::InvalidPlan(format!("{} has no parents", node.id)))?;
        let base = self.convert_node(first)?;
        let base_alias = self.next_alias();

        let mut sources: HashMap<String, SqlExprRef> = pass_through_exprs(&base_alias, &base.instance_set);
        let mut sets = vec![base.instance_set.clone()];
        let mut joins = Vec::new();
        for parent_node in rest {
            let parent = self.convert_node(parent_node)?;
            let alias = self.next_alias();
            let mut conditions = Vec::new();
            for spec in parent.instance_set.spec_set().linkable_specs() {
                let (Some(left), Some(right)) = (
                    base.instance_set.column_for_linkable(&spec),
                    parent.instance_set.column_for_linkable(&spec),
                ) else {
                    continue;
                };
                conditions.push(SqlExpr::comparison(
                    SqlExpr::column(base_alias.clone(), left),
                    SqlComparison::Equals,
                    SqlExpr::column(alias.clone(), right),
                ));
            }
            for column in parent.instance_set.column_names() {
                sources
                    .entry(column.to_string())
                    .or_insert_with(|| SqlExpr::column(alias.clone(), column));
            }
            let on_condition = SqlExpr::and(conditions);
            joins.push(SqlJoinDescription {
                join_type: if on_condition.is_some() { SqlJoinType::Inner } else { SqlJoinType::Cross },
                right_source: parent.sql_node,
                right_source_alias: alias,
                on_condition,
            });
            sets.push(parent.instance_set);
        }

        let instance_set = InstanceSet::merge(&sets);
        let select_columns = ordered_columns(&node.id, &instance_set, &sources)?;
        let statement = SqlSelectStatement::new(
            "Join Aggregated Measures with Standard Outputs",
            select_columns,
            base.sql_node,
            base_alias,
        )
        .with_joins(joins);
        Ok(SqlDataSet {
            instance_set,
            sql_node: statement.into_node(),
        })
    }

    /// FULL OUTER JOIN of metric branches. Group-by columns are coalesced across the
    /// branches seen so far, so later branches match rows only present on the right.
    fn convert_combine_metrics(&mut self, node: &CombineMetricsNode) -> Result<SqlDataSet> {
        let (first, rest) = node
            .parents
            .split_first()
            .ok_or_else(|| EmitError::InvalidPlan(format!("{} has no parents", node.id)))?;
        let base = self.convert_node(first)?;
        let base_alias = self.next_alias();

        // column name -> every (alias, column) holding it
        let mut linkable_sources: HashMap<String, Vec<SqlExprRef>> = HashMap::new();
        for column in base.instance_set.linkable_column_names() {
            linkable_sources
                .entry(column.to_string())
                .or_default()
                .push(SqlExpr::column(base_alias.clone(), column));
        }
        let mut metric_sources = pass_through_exprs(&base_alias, &base.instance_set);
        let mut sets = vec![base.instance_set.clone()];
        let mut joins = Vec::new();

        for parent_node in rest {
            let parent = self.convert_node(parent_node)?;
            let alias = self.next_alias();
            let mut conditions = Vec::new();
            for column in parent.instance_set.linkable_column_names() {
                let right = SqlExpr::column(alias.clone(), column);
                let entry = linkable_sources.entry(column.to_string()).or_default();
                if !entry.is_empty() {
                    conditions.push(SqlExpr::comparison(coalesce(entry), SqlComparison::Equals, right.clone()));
                }
                entry.push(right);
            }
            for column in parent.instance_set.column_names() {
                metric_sources
                    .entry(column.to_string())
                    .or_insert_with(|| SqlExpr::column(alias.clone(), column));
            }
            let on_condition = SqlExpr::and(conditions);
            joins.push(SqlJoinDescription {
                join_type: if on_condition.is_some() { SqlJoinType::FullOuter } else { SqlJoinType::Cross },
                right_source: parent.sql_node,
                right_source_alias: alias,
                on_condition,
            });
            sets.push(parent.instance_set);
        }

        let instance_set = InstanceSet::merge(&sets);
        let mut exprs = metric_sources;
        for (column, sources) in &linkable_sources {
            exprs.insert(column.clone(), coalesce(sources));
        }
        let select_columns = ordered_columns(&node.id, &instance_set, &exprs)?;
        let statement =
            SqlSelectStatement::new("Combine Metrics", select_columns, base.sql_node, base_alias).with_joins(joins);
        Ok(SqlDataSet {
            instance_set,
            sql_node: statement.into_node(),
        })
    }

    fn convert_order_by_limit(&mut self, node: &OrderByLimitNode) -> Result<SqlDataSet> {
        let parent = self.convert_node(&node.parent)?;
        let alias = self.next_alias();

        let mut order_bys = Vec::new();
        for spec in &node.order_by_specs {
            let column = match &spec.item {
                OrderByItem::Metric(metric) => parent
                    .instance_set
                    .column_for_metric(metric)
                    .map(str::to_string)
                    .ok_or_else(|| column_not_found(&node.id, &metric.element_name))?,
                OrderByItem::Linkable(linkable) => linkable_column(&node.id, &parent.instance_set, linkable)?,
            };
            order_bys.push(SqlOrderBy {
                expr: SqlExpr::column(alias.clone(), column),
                descending: spec.descending,
            });
        }

        let instance_set = parent.instance_set;
        let select_columns = pass_through_columns(&alias, &instance_set);
        let description = match node.limit {
            Some(limit) => format!("Order By {} Limit {}", order_by_names(&node.order_by_specs), limit),
            None => format!("Order By {}", order_by_names(&node.order_by_specs)),
        };
        let statement = SqlSelectStatement::new(description, select_columns, parent.sql_node, alias)
            .with_order_bys(order_bys)
            .with_limit(node.limit);
        Ok(SqlDataSet {
            instance_set,
            sql_node: statement.into_node(),
        })
    }

    fn convert_write_to_result_table(&mut self, node: &WriteToResultTableNode) -> Result<SqlDataSet> {
        let parent = self.convert_node(&node.parent)?;
        Ok(SqlDataSet {
            instance_set: parent.instance_set,
            sql_node: Arc::new(SqlQueryPlanNode::CreateTableAs(SqlCreateTableAs {
                output_table: node.output_table.clone(),
                parent: parent.sql_node,
            })),
        })
    }
}

impl NodeDataSetResolver for DataflowToSqlQueryPlanConverter<'_> {
    fn resolve_instance_set(&mut self, node: &DataflowNodeRef) -> Result<InstanceSet> {
        Ok(self.convert_node(node)?.instance_set)
    }
}

fn column_not_found(node: &NodeId, spec: &str) -> Error {
    EmitError::ColumnNotFound {
        node: node.to_string(),
        spec: spec.to_string(),
    }
    .into()
}

fn linkable_column(node: &NodeId, set: &InstanceSet, spec: &LinkableSpec) -> Result<String> {
    set.column_for_linkable(spec)
        .map(str::to_string)
        .ok_or_else(|| column_not_found(node, &spec.qualified_name()))
}

/// A column reference when `expr` is a bare column name, the raw text otherwise
fn source_expr(from_alias: &str, expr: &str) -> SqlExprRef {
    let mut chars = expr.chars();
    let is_identifier = chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if is_identifier {
        SqlExpr::column(from_alias, expr)
    } else {
        SqlExpr::string(expr)
    }
}

fn pass_through_exprs(alias: &str, set: &InstanceSet) -> ColumnExprs {
    set.column_names()
        .into_iter()
        .map(|c| (c.to_string(), SqlExpr::column(alias, c)))
        .collect()
}

fn pass_through_columns(alias: &str, set: &InstanceSet) -> Vec<SqlSelectColumn> {
    set.column_names()
        .into_iter()
        .map(|c| SqlSelectColumn::new(SqlExpr::column(alias, c), c))
        .collect()
}

fn ordered_columns(node: &NodeId, set: &InstanceSet, exprs: &ColumnExprs) -> Result<Vec<SqlSelectColumn>> {
    set.column_names()
        .into_iter()
        .map(|c| {
            exprs
                .get(c)
                .map(|e| SqlSelectColumn::new(e.clone(), c))
                .ok_or_else(|| column_not_found(node, c))
        })
        .collect()
}

fn coalesce(sources: &[SqlExprRef]) -> SqlExprRef {
    match sources {
        [single] => single.clone(),
        _ => SqlExpr::function(SqlFunction::Coalesce, sources.to_vec()),
    }
}

fn order_by_names(specs: &[OrderBySpec]) -> String {
    let names: Vec<String> = specs
        .iter()
        .map(|s| if s.descending { format!("-{}", s.qualified_name()) } else { s.qualified_name() })
        .collect();
    format!("[{}]", names.join(", "))
}
