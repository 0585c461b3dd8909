//! Removes sub-query columns that no enclosing statement reads
//!
//! Walks top-down. The outermost statement keeps every column; each statement then tells
//! its sources which of their columns it references. DISTINCT statements keep all columns
//! because dropping one changes the row count, and an opaque string expression makes every
//! source column potentially used.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::sql::{
    SqlCreateTableAs, SqlJoinDescription, SqlQueryPlanNode, SqlQueryPlanNodeRef, SqlSelectColumn, SqlSelectStatement,
};
use super::SqlQueryPlanOptimizer;

#[derive(Debug, Clone, Copy, Default)]
pub struct SqlColumnPrunerOptimizer;

impl SqlQueryPlanOptimizer for SqlColumnPrunerOptimizer {
    fn name(&self) -> &str {
        "SqlColumnPrunerOptimizer"
    }

    fn optimize(&self, node: &SqlQueryPlanNodeRef) -> SqlQueryPlanNodeRef {
        prune(node, None)
    }
}

/// `None` keeps every column
type RequiredColumns = Option<BTreeSet<String>>;

fn prune(node: &SqlQueryPlanNodeRef, required: RequiredColumns) -> SqlQueryPlanNodeRef {
    match node.as_ref() {
        SqlQueryPlanNode::Select(select) => Arc::new(SqlQueryPlanNode::Select(prune_select(select, required))),
        SqlQueryPlanNode::CreateTableAs(create) => Arc::new(SqlQueryPlanNode::CreateTableAs(SqlCreateTableAs {
            output_table: create.output_table.clone(),
            parent: prune(&create.parent, None),
        })),
        SqlQueryPlanNode::Table(_) | SqlQueryPlanNode::SelectQuery(_) => node.clone(),
    }
}

fn prune_select(select: &SqlSelectStatement, required: RequiredColumns) -> SqlSelectStatement {
    let select_columns = match required {
        Some(required) if !select.distinct => {
            let group_by_exprs: Vec<_> = select.group_bys.iter().map(|g| &g.expr).collect();
            let kept: Vec<SqlSelectColumn> = select
                .select_columns
                .iter()
                .filter(|c| required.contains(&c.column_alias) || group_by_exprs.iter().any(|g| g.matches(&c.expr)))
                .cloned()
                .collect();
            if kept.is_empty() {
                select.select_columns.iter().take(1).cloned().collect()
            } else {
                kept
            }
        }
        _ => select.select_columns.clone(),
    };

    let pruned = SqlSelectStatement {
        select_columns,
        ..select.clone()
    };
    let source_requirements = source_requirements(&pruned);

    let from_source = prune(&select.from_source, source_requirements.get(&select.from_source_alias).cloned().flatten());
    let joins = select
        .joins
        .iter()
        .map(|j| SqlJoinDescription {
            right_source: prune(&j.right_source, source_requirements.get(&j.right_source_alias).cloned().flatten()),
            ..j.clone()
        })
        .collect();

    SqlSelectStatement {
        from_source,
        joins,
        ..pruned
    }
}

/// Columns each source alias must keep for `select`'s remaining expressions
fn source_requirements(select: &SqlSelectStatement) -> HashMap<String, RequiredColumns> {
    let aliases: Vec<&str> = std::iter::once(select.from_source_alias.as_str())
        .chain(select.joins.iter().map(|j| j.right_source_alias.as_str()))
        .collect();

    if select.contains_opaque_string() {
        return aliases.into_iter().map(|a| (a.to_string(), None)).collect();
    }

    let mut out: HashMap<String, BTreeSet<String>> =
        aliases.iter().map(|a| (a.to_string(), BTreeSet::new())).collect();
    for expr in select.expressions() {
        for reference in expr.column_references() {
            let alias = if reference.table_alias.is_empty() && select.joins.is_empty() {
                select.from_source_alias.as_str()
            } else {
                reference.table_alias.as_str()
            };
            if let Some(columns) = out.get_mut(alias) {
                columns.insert(reference.column_name.clone());
            }
        }
        for column in expr.string_used_columns() {
            for columns in out.values_mut() {
                columns.insert(column.to_string());
            }
        }
    }
    out.into_iter().map(|(alias, columns)| (alias, Some(columns))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::{SqlExpr, SqlFunction, SqlTable};

    fn table(name: &str) -> SqlQueryPlanNodeRef {
        Arc::new(SqlQueryPlanNode::Table(SqlTable { table_name: name.into() }))
    }

    fn inner() -> SqlQueryPlanNodeRef {
        SqlSelectStatement::new(
            "inner",
            vec![
                SqlSelectColumn::new(SqlExpr::column("a", "bookings"), "bookings"),
                SqlSelectColumn::new(SqlExpr::column("a", "ds"), "ds"),
                SqlSelectColumn::new(SqlExpr::column("a", "is_instant"), "is_instant"),
            ],
            table("fct_bookings"),
            "a",
        )
        .into_node()
    }

    #[test]
    fn test_prunes_unused_columns() {
        let outer = SqlSelectStatement::new(
            "outer",
            vec![
                SqlSelectColumn::new(SqlExpr::function(SqlFunction::Sum, vec![SqlExpr::column("s", "bookings")]), "bookings"),
                SqlSelectColumn::new(SqlExpr::column("s", "ds"), "ds"),
            ],
            inner(),
            "s",
        )
        .with_group_bys(vec![SqlSelectColumn::new(SqlExpr::column("s", "ds"), "ds")])
        .into_node();

        let pruned = SqlColumnPrunerOptimizer.optimize(&outer);
        let outer_select = pruned.as_select().unwrap();
        assert_eq!(outer_select.select_columns.len(), 2);
        let inner_select = outer_select.from_source.as_select().unwrap();
        let aliases: Vec<&str> = inner_select.select_columns.iter().map(|c| c.column_alias.as_str()).collect();
        assert_eq!(aliases, vec!["bookings", "ds"]);

        assert_eq!(SqlColumnPrunerOptimizer.optimize(&pruned), pruned);
    }

    #[test]
    fn test_opaque_string_keeps_everything() {
        let outer = SqlSelectStatement::new(
            "outer",
            vec![SqlSelectColumn::new(SqlExpr::string("bookings * 2"), "doubled")],
            inner(),
            "s",
        )
        .into_node();
        let pruned = SqlColumnPrunerOptimizer.optimize(&outer);
        let inner_select = pruned.as_select().unwrap().from_source.as_select().unwrap();
        assert_eq!(inner_select.select_columns.len(), 3);
    }

    #[test]
    fn test_distinct_keeps_everything() {
        let distinct = SqlSelectStatement::new(
            "distinct",
            vec![
                SqlSelectColumn::new(SqlExpr::column("s", "ds"), "ds"),
                SqlSelectColumn::new(SqlExpr::column("s", "is_instant"), "is_instant"),
            ],
            inner(),
            "s",
        )
        .with_distinct(true)
        .into_node();
        let outer = SqlSelectStatement::new(
            "outer",
            vec![SqlSelectColumn::new(SqlExpr::column("d", "ds"), "ds")],
            distinct,
            "d",
        )
        .into_node();
        let pruned = SqlColumnPrunerOptimizer.optimize(&outer);
        let distinct_select = pruned.as_select().unwrap().from_source.as_select().unwrap();
        assert_eq!(distinct_select.select_columns.len(), 2);
    }
}
