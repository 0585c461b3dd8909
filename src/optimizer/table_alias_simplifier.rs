//! Drops table qualifiers from column references in statements that read a single source

use std::sync::Arc;

use crate::sql::{
    SqlColumnReplacements, SqlCreateTableAs, SqlExprRef, SqlJoinDescription, SqlOrderBy, SqlQueryPlanNode,
    SqlQueryPlanNodeRef, SqlSelectColumn, SqlSelectStatement,
};
use super::SqlQueryPlanOptimizer;

#[derive(Debug, Clone, Copy, Default)]
pub struct SqlTableAliasSimplifier;

impl SqlQueryPlanOptimizer for SqlTableAliasSimplifier {
    fn name(&self) -> &str {
        "SqlTableAliasSimplifier"
    }

    fn optimize(&self, node: &SqlQueryPlanNodeRef) -> SqlQueryPlanNodeRef {
        simplify(node)
    }
}

fn simplify(node: &SqlQueryPlanNodeRef) -> SqlQueryPlanNodeRef {
    match node.as_ref() {
        SqlQueryPlanNode::Select(select) => Arc::new(SqlQueryPlanNode::Select(simplify_select(select))),
        SqlQueryPlanNode::CreateTableAs(create) => Arc::new(SqlQueryPlanNode::CreateTableAs(SqlCreateTableAs {
            output_table: create.output_table.clone(),
            parent: simplify(&create.parent),
        })),
        SqlQueryPlanNode::Table(_) | SqlQueryPlanNode::SelectQuery(_) => node.clone(),
    }
}

fn simplify_select(select: &SqlSelectStatement) -> SqlSelectStatement {
    let from_source = simplify(&select.from_source);
    let joins: Vec<SqlJoinDescription> = select
        .joins
        .iter()
        .map(|j| SqlJoinDescription {
            right_source: simplify(&j.right_source),
            ..j.clone()
        })
        .collect();

    if !joins.is_empty() {
        return SqlSelectStatement {
            from_source,
            joins,
            ..select.clone()
        };
    }

    let none = SqlColumnReplacements::new();
    let strip = |e: &SqlExprRef| e.rewrite(&none, Some(""));
    SqlSelectStatement {
        select_columns: select
            .select_columns
            .iter()
            .map(|c| SqlSelectColumn::new(strip(&c.expr), c.column_alias.clone()))
            .collect(),
        from_source,
        where_clause: select.where_clause.as_ref().map(strip),
        group_bys: select
            .group_bys
            .iter()
            .map(|c| SqlSelectColumn::new(strip(&c.expr), c.column_alias.clone()))
            .collect(),
        order_bys: select
            .order_bys
            .iter()
            .map(|o| SqlOrderBy {
                expr: strip(&o.expr),
                descending: o.descending,
            })
            .collect(),
        ..select.clone()
    }
}
