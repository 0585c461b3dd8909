//! Execution plans: rendered SQL wrapped in tasks

use std::fmt;

use crate::ids::{IdAllocator, NodeId};
use crate::sql::SqlBindParameters;

/// One statement to run against the warehouse
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionTask {
    /// Run a SELECT and hand the rows back
    SelectSqlQueryToDataFrame {
        task_id: NodeId,
        sql: String,
        bind_parameters: SqlBindParameters,
    },
    /// Run a `CREATE TABLE ... AS`, replacing `output_table` if it exists
    SelectSqlQueryToTable {
        task_id: NodeId,
        sql: String,
        bind_parameters: SqlBindParameters,
        output_table: String,
    },
}

impl ExecutionTask {
    pub fn to_data_frame(ids: &mut IdAllocator, sql: String, bind_parameters: SqlBindParameters) -> Self {
        ExecutionTask::SelectSqlQueryToDataFrame {
            task_id: ids.next_id("rsq"),
            sql,
            bind_parameters,
        }
    }

    pub fn to_table(
        ids: &mut IdAllocator,
        sql: String,
        bind_parameters: SqlBindParameters,
        output_table: impl Into<String>,
    ) -> Self {
        ExecutionTask::SelectSqlQueryToTable {
            task_id: ids.next_id("ctas"),
            sql,
            bind_parameters,
            output_table: output_table.into(),
        }
    }

    pub fn task_id(&self) -> &NodeId {
        match self {
            ExecutionTask::SelectSqlQueryToDataFrame { task_id, .. } => task_id,
            ExecutionTask::SelectSqlQueryToTable { task_id, .. } => task_id,
        }
    }

    pub fn sql(&self) -> &str {
        match self {
            ExecutionTask::SelectSqlQueryToDataFrame { sql, .. } => sql,
            ExecutionTask::SelectSqlQueryToTable { sql, .. } => sql,
        }
    }

    pub fn bind_parameters(&self) -> &SqlBindParameters {
        match self {
            ExecutionTask::SelectSqlQueryToDataFrame { bind_parameters, .. } => bind_parameters,
            ExecutionTask::SelectSqlQueryToTable { bind_parameters, .. } => bind_parameters,
        }
    }
}

/// Tasks in the order they run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionPlan {
    pub tasks: Vec<ExecutionTask>,
}

impl ExecutionPlan {
    pub fn new(tasks: Vec<ExecutionTask>) -> Self {
        ExecutionPlan { tasks }
    }

    pub fn single(task: ExecutionTask) -> Self {
        ExecutionPlan { tasks: vec![task] }
    }
}

impl fmt::Display for ExecutionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for task in &self.tasks {
            match task {
                ExecutionTask::SelectSqlQueryToDataFrame { task_id, .. } => {
                    writeln!(f, "{}: SELECT into data frame", task_id)?
                }
                ExecutionTask::SelectSqlQueryToTable {
                    task_id, output_table, ..
                } => writeln!(f, "{}: CREATE TABLE {}", task_id, output_table)?,
            }
            for line in task.sql().lines() {
                writeln!(f, "  {}", line)?;
            }
        }
        Ok(())
    }
}
