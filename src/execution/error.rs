//! Execution errors

use thiserror::Error;

/// Failure reported by a `SqlClient`
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{message}")]
pub struct SqlClientError {
    pub message: String,
}

impl SqlClientError {
    pub fn new(message: impl Into<String>) -> Self {
        SqlClientError { message: message.into() }
    }
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The warehouse rejected a task's statement
    #[error("task {task_id} failed: {source}\n-- sql:\n{sql}")]
    TaskFailed {
        task_id: String,
        sql: String,
        #[source]
        source: SqlClientError,
    },

    #[error("could not replace table '{table}': {source}")]
    ReplaceTable {
        table: String,
        #[source]
        source: SqlClientError,
    },

    #[error("execution plan has no tasks")]
    EmptyPlan,
}

impl ExecutionError {
    /// SQL of the statement that failed, when a statement failed
    pub fn sql(&self) -> Option<&str> {
        match self {
            ExecutionError::TaskFailed { sql, .. } => Some(sql),
            _ => None,
        }
    }
}
