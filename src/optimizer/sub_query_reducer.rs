//! Merges a SELECT into the sub-query it reads from
//!
//! `SELECT f(s.x) FROM (SELECT g(a.y) AS x FROM t a) s` becomes `SELECT f(g(a.y)) FROM t a`
//! when the merge keeps the rows the statement produces. The simple reducer only merges
//! non-aggregating sub-queries into non-aggregating statements; the rewriting reducer also
//! pulls aggregations up.

use std::sync::Arc;

use crate::sql::{
    SqlColumnReference, SqlColumnReplacements, SqlCreateTableAs, SqlExpr, SqlExprRef, SqlJoinDescription,
    SqlOrderBy, SqlQueryPlanNode, SqlQueryPlanNodeRef, SqlSelectColumn, SqlSelectStatement,
};
use super::SqlQueryPlanOptimizer;

#[derive(Debug, Clone, Copy)]
pub struct SqlSubQueryReducer {
    allow_aggregates: bool,
}

impl SqlSubQueryReducer {
    pub fn simple() -> Self {
        SqlSubQueryReducer { allow_aggregates: false }
    }

    pub fn rewriting() -> Self {
        SqlSubQueryReducer { allow_aggregates: true }
    }

    fn reduce(&self, node: &SqlQueryPlanNodeRef) -> SqlQueryPlanNodeRef {
        match node.as_ref() {
            SqlQueryPlanNode::Select(select) => {
                let mut current = SqlSelectStatement {
                    from_source: self.reduce(&select.from_source),
                    joins: select
                        .joins
                        .iter()
                        .map(|j| SqlJoinDescription {
                            right_source: self.reduce(&j.right_source),
                            ..j.clone()
                        })
                        .collect(),
                    ..select.clone()
                };
                while let Some(merged) = self.try_merge(&current) {
                    current = merged;
                }
                Arc::new(SqlQueryPlanNode::Select(current))
            }
            SqlQueryPlanNode::CreateTableAs(create) => Arc::new(SqlQueryPlanNode::CreateTableAs(SqlCreateTableAs {
                output_table: create.output_table.clone(),
                parent: self.reduce(&create.parent),
            })),
            SqlQueryPlanNode::Table(_) | SqlQueryPlanNode::SelectQuery(_) => node.clone(),
        }
    }

    /// `parent` merged into its FROM sub-query, or `None` when that could change the result
    fn try_merge(&self, parent: &SqlSelectStatement) -> Option<SqlSelectStatement> {
        let child = parent.from_source.as_select()?;
        if !parent.joins.is_empty() || parent.contains_opaque_string() || child.distinct {
            return None;
        }
        if !string_columns_pass_through(parent, child) {
            return None;
        }

        let parent_is_projection = parent.where_clause.is_none()
            && parent.group_bys.is_empty()
            && parent.order_bys.is_empty()
            && parent.limit.is_none()
            && !parent.distinct
            && !parent.is_aggregate();
        if (!child.order_bys.is_empty() || child.limit.is_some()) && !parent_is_projection {
            return None;
        }

        let parent_aggregates = parent.is_aggregate();
        if child.is_aggregate() {
            if !self.allow_aggregates
                || parent.where_clause.is_some()
                || parent_aggregates
                || parent.distinct
            {
                return None;
            }
        } else if parent_aggregates && !self.allow_aggregates {
            return None;
        }

        let mut replacements = SqlColumnReplacements::new();
        for column in &child.select_columns {
            replacements.insert(
                SqlColumnReference::new(parent.from_source_alias.clone(), column.column_alias.clone()),
                column.expr.clone(),
            );
            replacements.insert(SqlColumnReference::new("", column.column_alias.clone()), column.expr.clone());
        }
        let references_resolve = parent
            .expressions()
            .flat_map(|e| e.column_references())
            .all(|r| replacements.contains_key(r));
        if !references_resolve {
            return None;
        }

        let rewrite = |e: &SqlExprRef| e.rewrite(&replacements, None);
        let rewrite_columns = |columns: &[SqlSelectColumn]| -> Vec<SqlSelectColumn> {
            columns
                .iter()
                .map(|c| SqlSelectColumn::new(rewrite(&c.expr), c.column_alias.clone()))
                .collect()
        };

        let where_clause = match (&child.where_clause, parent.where_clause.as_ref().map(rewrite)) {
            (Some(c), Some(p)) => SqlExpr::and(vec![c.clone(), p]),
            (Some(c), None) => Some(c.clone()),
            (None, p) => p,
        };
        let group_bys = if parent.group_bys.is_empty() {
            child.group_bys.clone()
        } else {
            rewrite_columns(&parent.group_bys)
        };
        let order_bys = if parent.order_bys.is_empty() {
            child.order_bys.clone()
        } else {
            parent
                .order_bys
                .iter()
                .map(|o| SqlOrderBy {
                    expr: rewrite(&o.expr),
                    descending: o.descending,
                })
                .collect()
        };

        Some(SqlSelectStatement {
            description: parent.description.clone(),
            select_columns: rewrite_columns(&parent.select_columns),
            from_source: child.from_source.clone(),
            from_source_alias: child.from_source_alias.clone(),
            joins: child.joins.clone(),
            where_clause,
            group_bys,
            order_bys,
            limit: parent.limit.or(child.limit),
            distinct: parent.distinct,
        })
    }
}

impl SqlQueryPlanOptimizer for SqlSubQueryReducer {
    fn name(&self) -> &str {
        if self.allow_aggregates {
            "SqlRewritingSubQueryReducer"
        } else {
            "SqlSubQueryReducer"
        }
    }

    fn optimize(&self, node: &SqlQueryPlanNodeRef) -> SqlQueryPlanNodeRef {
        self.reduce(node)
    }
}

/// String expressions name their columns unqualified. They survive a merge only when each
/// such column is a plain pass-through of the same column of a single-source child.
fn string_columns_pass_through(parent: &SqlSelectStatement, child: &SqlSelectStatement) -> bool {
    let used: Vec<&str> = parent.expressions().flat_map(|e| e.string_used_columns()).collect();
    if used.is_empty() {
        return true;
    }
    if !child.joins.is_empty() {
        return false;
    }
    used.iter().all(|name| match child.column(name).map(|c| c.expr.as_ref()) {
        Some(SqlExpr::Column(reference)) => {
            reference.column_name == *name
                && (reference.table_alias.is_empty() || reference.table_alias == child.from_source_alias)
        }
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::{SqlFunction, SqlStringExpression, SqlTable};

    fn table(name: &str) -> SqlQueryPlanNodeRef {
        Arc::new(SqlQueryPlanNode::Table(SqlTable { table_name: name.into() }))
    }

    fn read() -> SqlQueryPlanNodeRef {
        SqlSelectStatement::new(
            "read",
            vec![
                SqlSelectColumn::new(SqlExpr::string("1"), "bookings"),
                SqlSelectColumn::new(SqlExpr::column("src", "ds"), "ds"),
            ],
            table("fct_bookings"),
            "src",
        )
        .into_node()
    }

    fn aggregate(from: SqlQueryPlanNodeRef) -> SqlQueryPlanNodeRef {
        SqlSelectStatement::new(
            "aggregate",
            vec![
                SqlSelectColumn::new(SqlExpr::column("s", "ds"), "ds"),
                SqlSelectColumn::new(SqlExpr::function(SqlFunction::Sum, vec![SqlExpr::column("s", "bookings")]), "bookings"),
            ],
            from,
            "s",
        )
        .with_group_bys(vec![SqlSelectColumn::new(SqlExpr::column("s", "ds"), "ds")])
        .into_node()
    }

    #[test]
    fn test_rewriting_reducer_pulls_aggregation_up() {
        let plan = aggregate(read());
        let reduced = SqlSubQueryReducer::rewriting().optimize(&plan);
        let select = reduced.as_select().unwrap();
        assert!(matches!(select.from_source.as_ref(), SqlQueryPlanNode::Table(_)));
        assert_eq!(select.from_source_alias, "src");
        assert!(select.select_columns[1].expr.matches(&SqlExpr::Function {
            function: SqlFunction::Sum,
            args: vec![SqlExpr::string("1")],
        }));
        assert!(select.group_bys[0].expr.matches(&SqlExpr::Column(SqlColumnReference::new("src", "ds"))));
    }

    #[test]
    fn test_simple_reducer_keeps_aggregation_separate() {
        let plan = aggregate(read());
        let reduced = SqlSubQueryReducer::simple().optimize(&plan);
        assert_eq!(reduced, plan);
    }

    #[test]
    fn test_where_over_aggregate_is_not_merged() {
        let filtered = SqlSelectStatement::new(
            "where",
            vec![SqlSelectColumn::new(SqlExpr::column("a", "bookings"), "bookings")],
            aggregate(read()),
            "a",
        )
        .with_where(Some(Arc::new(SqlExpr::String(SqlStringExpression {
            sql: "bookings > 10".into(),
            bind_parameters: Default::default(),
            used_columns: Some(vec!["bookings".into()]),
            requires_parenthesis: true,
        }))))
        .into_node();
        let reduced = SqlSubQueryReducer::rewriting().optimize(&filtered);
        let outer = reduced.as_select().unwrap();
        assert!(outer.where_clause.is_some());
        assert!(outer.from_source.as_select().is_some());
    }

    #[test]
    fn test_reducer_is_idempotent() {
        let plan = aggregate(read());
        let once = SqlSubQueryReducer::rewriting().optimize(&plan);
        let twice = SqlSubQueryReducer::rewriting().optimize(&once);
        assert_eq!(once, twice);
    }
}
