//! Crate-level error taxonomy
//!
//! Each verb module owns its own error enum; `Error` wraps them all.
//!
//! - [`Error::Model`]: the semantic model breaks an invariant (raised once, when it is built)
//! - [`Error::Query`]: the query names something unknown or ambiguous, or is malformed
//! - [`Error::Plan`]: a valid query could not be turned into a dataflow plan
//! - [`Error::Emit`]: SQL lowering or rendering failed
//! - [`Error::Execution`]: the warehouse rejected a statement
//! - [`Error::Internal`]: a compiler invariant was violated

use thiserror::Error;

use crate::emitter::EmitError;
use crate::execution::ExecutionError;
use crate::parser::ParseError;
use crate::planner::PlanError;
use crate::query::QueryError;
use crate::semantic_model::ModelError;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("invalid semantic model: {0}")]
    Model(#[from] ModelError),

    #[error("invalid query: {0}")]
    Query(#[from] QueryError),

    #[error("planning error: {0}")]
    Plan(#[from] PlanError),

    #[error("sql error: {0}")]
    Emit(#[from] EmitError),

    #[error("execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("invalid configuration: {0}")]
    Config(String),

    /// A compiler invariant was violated: a bug, not a user error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
