//! Emitter errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmitError {
    /// A node asked for a column its parent data set does not have
    #[error("{node}: column for '{spec}' not found in parent data set")]
    ColumnNotFound { node: String, spec: String },

    /// A node referenced a model element that does not exist
    #[error("{node}: unknown {kind} '{name}'")]
    UnknownElement {
        node: String,
        kind: &'static str,
        name: String,
    },

    /// The same bind parameter key was given two values
    #[error("bind parameter '{key}' is bound to conflicting values")]
    ConflictingBindParameter { key: String },

    /// Plan shape the converter cannot lower
    #[error("invalid plan: {0}")]
    InvalidPlan(String),
}
