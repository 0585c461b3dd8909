//! SQL plan optimizer (verb module)
//!
//! Rewrite passes over the SQL query plan, selected by optimization level. Each pass is a
//! pure function from plan to plan.
//!
//! - `column_pruner`: drops sub-query columns nothing above reads
//! - `sub_query_reducer`: merges a SELECT into its FROM sub-query when that keeps semantics
//! - `table_alias_simplifier`: drops table qualifiers where only one source is in scope

mod column_pruner;
mod sub_query_reducer;
mod table_alias_simplifier;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::sql::SqlQueryPlanNodeRef;

pub use column_pruner::SqlColumnPrunerOptimizer;
pub use sub_query_reducer::SqlSubQueryReducer;
pub use table_alias_simplifier::SqlTableAliasSimplifier;

/// Which passes run, from none (`O0`) to all (`O4`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OptimizationLevel {
    O0,
    O1,
    O2,
    O3,
    #[default]
    O4,
}

/// A rewrite pass over a SQL query plan
pub trait SqlQueryPlanOptimizer: Send + Sync {
    /// Stable pass name, used in logs
    fn name(&self) -> &str;

    /// Return the rewritten plan. Must not change the rows the plan produces.
    fn optimize(&self, node: &SqlQueryPlanNodeRef) -> SqlQueryPlanNodeRef;
}

/// Passes for a level, in the order they run
pub fn optimizers_for_level(level: OptimizationLevel) -> Vec<Box<dyn SqlQueryPlanOptimizer>> {
    match level {
        OptimizationLevel::O0 => vec![],
        OptimizationLevel::O1 => vec![Box::new(SqlTableAliasSimplifier)],
        OptimizationLevel::O2 => vec![Box::new(SqlColumnPrunerOptimizer), Box::new(SqlTableAliasSimplifier)],
        OptimizationLevel::O3 => vec![
            Box::new(SqlColumnPrunerOptimizer),
            Box::new(SqlSubQueryReducer::simple()),
            Box::new(SqlTableAliasSimplifier),
        ],
        OptimizationLevel::O4 => vec![
            Box::new(SqlColumnPrunerOptimizer),
            Box::new(SqlSubQueryReducer::rewriting()),
            Box::new(SqlColumnPrunerOptimizer),
            Box::new(SqlTableAliasSimplifier),
        ],
    }
}

/// Run every pass of `level` once, in order
pub fn optimize_plan(node: &SqlQueryPlanNodeRef, level: OptimizationLevel) -> SqlQueryPlanNodeRef {
    let mut current = node.clone();
    for pass in optimizers_for_level(level) {
        current = pass.optimize(&current);
        debug!(pass = pass.name(), level = ?level, "Applied SQL optimizer pass");
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_pass_lists() {
        let names = |level| -> Vec<String> {
            optimizers_for_level(level).iter().map(|p| p.name().to_string()).collect()
        };
        assert!(names(OptimizationLevel::O0).is_empty());
        assert_eq!(names(OptimizationLevel::O1), vec!["SqlTableAliasSimplifier"]);
        assert_eq!(
            names(OptimizationLevel::O4),
            vec![
                "SqlColumnPrunerOptimizer",
                "SqlRewritingSubQueryReducer",
                "SqlColumnPrunerOptimizer",
                "SqlTableAliasSimplifier"
            ]
        );
    }

    #[test]
    fn test_level_serde() {
        let level: OptimizationLevel = serde_yaml::from_str("O2").unwrap();
        assert_eq!(level, OptimizationLevel::O2);
        assert!(serde_yaml::from_str::<OptimizationLevel>("O9").is_err());
    }
}
