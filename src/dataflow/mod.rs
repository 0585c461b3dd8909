//! Dataflow plan types (nouns): the graph IR between a query and its SQL

mod cost;
mod explain;
mod node;
mod plan;

pub use cost::{DataflowPlanNodeCost, DefaultCostFunction};
pub use explain::explain_plan;
pub use node::*;
pub use plan::DataflowPlan;
