//! Resolved where filters

use super::{InstanceSpecSet, LinkableSpec};
use crate::sql::SqlBindParameters;

/// A SQL predicate over linkable names, with the specs those names resolved to
#[derive(Debug, Clone, PartialEq)]
pub struct WhereFilterSpec {
    pub where_sql: String,
    pub bind_parameters: SqlBindParameters,
    pub linkable_specs: Vec<LinkableSpec>,
}

impl WhereFilterSpec {
    pub fn spec_set(&self) -> InstanceSpecSet {
        InstanceSpecSet::from_linkable(&self.linkable_specs)
    }

    /// Whether every spec the filter uses is available without a join
    pub fn is_local_to(&self, available: &InstanceSpecSet) -> bool {
        self.linkable_specs.iter().all(|s| available.contains_linkable(s))
    }
}
