//! Execution (verb module)
//!
//! - `plan`: rendered SQL wrapped in tasks
//! - `client`: the `SqlClient` boundary to a warehouse
//! - `executor`: runs a plan's tasks in order

mod client;
mod error;
mod executor;
mod plan;

pub use client::{RowSet, SqlClient};
pub use error::{ExecutionError, SqlClientError};
pub use executor::{SequentialPlanExecutor, TaskOutput, TaskResult};
pub use plan::{ExecutionPlan, ExecutionTask};
