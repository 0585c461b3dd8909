//! Query engine: the whole pipeline behind three entry points
//!
//! `explain` compiles a request down to SQL and an execution plan without touching a
//! warehouse; `query` also runs it; `dry_run` asks the warehouse to validate it.

use tracing::info;

use crate::config::CompilerConfig;
use crate::dataflow::DataflowPlan;
use crate::emitter::{render_sql, DataflowToSqlQueryPlanConverter};
use crate::error::{Error, Result};
use crate::execution::{ExecutionPlan, ExecutionTask, RowSet, SequentialPlanExecutor, SqlClient, TaskOutput};
use crate::ids::IdAllocator;
use crate::optimizer::optimize_plan;
use crate::planner::DataflowPlanBuilder;
use crate::query::{QueryParser, QueryRequest, QuerySpec};
use crate::semantic_model::SemanticModel;
use crate::specs::DunderColumnAssociationResolver;
use crate::sql::{SqlBindParameters, SqlQueryPlanNodeRef};

/// Everything compiled for one request
#[derive(Debug, Clone)]
pub struct ExplainResult {
    pub query_spec: QuerySpec,
    pub dataflow_plan: DataflowPlan,
    /// SQL plan after the configured optimizer passes
    pub sql_plan: SqlQueryPlanNodeRef,
    pub sql: String,
    pub bind_parameters: SqlBindParameters,
    pub execution_plan: ExecutionPlan,
}

/// Rows, or the table they were written to
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutput {
    Rows(RowSet),
    Table(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub sql: String,
    pub output: QueryOutput,
}

impl QueryResult {
    pub fn rows(&self) -> Option<&RowSet> {
        match &self.output {
            QueryOutput::Rows(rows) => Some(rows),
            QueryOutput::Table(_) => None,
        }
    }
}

pub struct Engine {
    model: SemanticModel,
    config: CompilerConfig,
    column_resolver: DunderColumnAssociationResolver,
}

impl Engine {
    pub fn new(model: SemanticModel, config: CompilerConfig) -> Self {
        Engine {
            model,
            config,
            column_resolver: DunderColumnAssociationResolver,
        }
    }

    pub fn model(&self) -> &SemanticModel {
        &self.model
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Compile `request`. Ids restart from the configured start value on every call, so the
    /// same request always yields the same SQL.
    pub fn explain(&self, request: &QueryRequest) -> Result<ExplainResult> {
        let multi_hop = self.config.enable_multi_hop_joins;
        let query_spec = QueryParser::new(&self.model, multi_hop).parse(request)?;

        let mut ids = IdAllocator::new(self.config.id_start);
        let dataflow_plan =
            DataflowPlanBuilder::new(&self.model, &self.column_resolver, multi_hop).build_plan(&query_spec, &mut ids)?;

        let mut converter = DataflowToSqlQueryPlanConverter::new(&self.model, &self.column_resolver, ids)
            .with_time_spine(self.config.time_spine.clone());
        let sql_plan = converter.convert_plan(&dataflow_plan)?;
        let mut ids = converter.into_id_allocator();

        let optimized = optimize_plan(&sql_plan.render_node, self.config.optimization_level);
        let rendered = render_sql(&optimized)?;

        let task = match &query_spec.output_table {
            Some(table) => {
                ExecutionTask::to_table(&mut ids, rendered.sql.clone(), rendered.bind_parameters.clone(), table.clone())
            }
            None => ExecutionTask::to_data_frame(&mut ids, rendered.sql.clone(), rendered.bind_parameters.clone()),
        };

        info!(
            metrics = ?request.metrics,
            group_by = ?request.group_by,
            level = ?self.config.optimization_level,
            sql_bytes = rendered.sql.len(),
            "Compiled query"
        );
        Ok(ExplainResult {
            query_spec,
            dataflow_plan,
            sql_plan: optimized,
            sql: rendered.sql,
            bind_parameters: rendered.bind_parameters,
            execution_plan: ExecutionPlan::single(task),
        })
    }

    /// Compile and run `request`
    pub fn query(&self, request: &QueryRequest, client: &dyn SqlClient) -> Result<QueryResult> {
        let explained = self.explain(request)?;
        let mut results = SequentialPlanExecutor::new(client).execute(&explained.execution_plan)?;
        let last = results
            .pop()
            .ok_or_else(|| Error::internal("execution produced no task results"))?;
        let output = match last.output {
            TaskOutput::Rows(rows) => QueryOutput::Rows(rows),
            TaskOutput::Table(table) => QueryOutput::Table(table),
        };
        Ok(QueryResult {
            sql: explained.sql,
            output,
        })
    }

    /// Compile `request` and have the warehouse validate it without running it
    pub fn dry_run(&self, request: &QueryRequest, client: &dyn SqlClient) -> Result<ExplainResult> {
        let explained = self.explain(request)?;
        SequentialPlanExecutor::new(client).dry_run(&explained.execution_plan)?;
        Ok(explained)
    }
}
