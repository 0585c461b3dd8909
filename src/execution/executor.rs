//! Sequential plan executor

use std::time::Instant;

use tracing::{debug, info, warn};

use super::client::{RowSet, SqlClient};
use super::error::{ExecutionError, SqlClientError};
use super::plan::{ExecutionPlan, ExecutionTask};
use crate::ids::NodeId;

/// What one task produced
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutput {
    Rows(RowSet),
    Table(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskResult {
    pub task_id: NodeId,
    pub output: TaskOutput,
}

/// Runs tasks one after another against a client. The first failure stops the plan; nothing
/// is retried.
pub struct SequentialPlanExecutor<'c> {
    client: &'c dyn SqlClient,
}

impl<'c> SequentialPlanExecutor<'c> {
    pub fn new(client: &'c dyn SqlClient) -> Self {
        SequentialPlanExecutor { client }
    }

    pub fn execute(&self, plan: &ExecutionPlan) -> Result<Vec<TaskResult>, ExecutionError> {
        if plan.tasks.is_empty() {
            return Err(ExecutionError::EmptyPlan);
        }
        let mut results = Vec::with_capacity(plan.tasks.len());
        for task in &plan.tasks {
            let started = Instant::now();
            let output = self.execute_task(task)?;
            info!(
                task = %task.task_id(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Finished execution task"
            );
            results.push(TaskResult {
                task_id: task.task_id().clone(),
                output,
            });
        }
        Ok(results)
    }

    /// Validate every task's statement without running it
    pub fn dry_run(&self, plan: &ExecutionPlan) -> Result<(), ExecutionError> {
        for task in &plan.tasks {
            self.client
                .dry_run(task.sql(), task.bind_parameters())
                .map_err(|e| task_failed(task, e))?;
            debug!(task = %task.task_id(), "Dry run passed");
        }
        Ok(())
    }

    fn execute_task(&self, task: &ExecutionTask) -> Result<TaskOutput, ExecutionError> {
        match task {
            ExecutionTask::SelectSqlQueryToDataFrame {
                sql, bind_parameters, ..
            } => {
                let rows = self
                    .client
                    .query(sql, bind_parameters)
                    .map_err(|e| task_failed(task, e))?;
                debug!(task = %task.task_id(), rows = rows.len(), "Query returned rows");
                Ok(TaskOutput::Rows(rows))
            }
            ExecutionTask::SelectSqlQueryToTable {
                sql,
                bind_parameters,
                output_table,
                ..
            } => {
                let replace_error = |source| ExecutionError::ReplaceTable {
                    table: output_table.clone(),
                    source,
                };
                if self.client.table_exists(output_table).map_err(replace_error)? {
                    warn!(table = %output_table, "Dropping existing output table");
                    self.client.drop_table(output_table).map_err(replace_error)?;
                }
                self.client
                    .execute(sql, bind_parameters)
                    .map_err(|e| task_failed(task, e))?;
                Ok(TaskOutput::Table(output_table.clone()))
            }
        }
    }
}

fn task_failed(task: &ExecutionTask, source: SqlClientError) -> ExecutionError {
    warn!(task = %task.task_id(), error = %source, "Execution task failed");
    ExecutionError::TaskFailed {
        task_id: task.task_id().to_string(),
        sql: task.sql().to_string(),
        source,
    }
}
