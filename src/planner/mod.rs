//! Dataflow plan builder (verb module)
//!
//! Transforms a `QuerySpec` into a `DataflowPlan`.

mod build;
mod error;

pub use build::DataflowPlanBuilder;
pub use error::PlanError;
