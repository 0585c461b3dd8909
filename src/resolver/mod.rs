//! Join resolution (verb module)
//!
//! - `join`: which data sources may be joined, and along what path
//! - `linkable`: which linkable specs each data source can reach
//! - `node`: how a start node obtains the linkable specs a query needs

mod join;
mod linkable;
mod node;

pub use join::{is_valid_join, is_valid_join_to_validity_window, JoinEvaluator, JoinHop, JoinPath, MAX_JOIN_HOPS};
pub use linkable::{local_linkable_specs, LinkableSpecResolver};
pub use node::{
    owns_identifier, JoinCandidate, JoinLinkableInstancesRecipe, LinkableInstanceSatisfiability, NodeDataSetResolver,
    NodeEvaluator,
};
