//! SQL query plan nodes: select statements and their sources

use std::sync::Arc;

use super::expr::{SqlExpr, SqlExprRef};

pub type SqlQueryPlanNodeRef = Arc<SqlQueryPlanNode>;

#[derive(Debug, Clone, PartialEq)]
pub enum SqlQueryPlanNode {
    Select(SqlSelectStatement),
    /// A warehouse table
    Table(SqlTable),
    /// A data source's own SELECT, used verbatim
    SelectQuery(SqlSelectQuery),
    CreateTableAs(SqlCreateTableAs),
}

impl SqlQueryPlanNode {
    pub fn as_select(&self) -> Option<&SqlSelectStatement> {
        match self {
            SqlQueryPlanNode::Select(s) => Some(s),
            _ => None,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            SqlQueryPlanNode::Select(s) => &s.description,
            SqlQueryPlanNode::Table(_) => "Read from table",
            SqlQueryPlanNode::SelectQuery(_) => "Read from query",
            SqlQueryPlanNode::CreateTableAs(_) => "Create table",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SqlTable {
    pub table_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SqlSelectQuery {
    pub select_query: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SqlCreateTableAs {
    pub output_table: String,
    pub parent: SqlQueryPlanNodeRef,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SqlSelectColumn {
    pub expr: SqlExprRef,
    pub column_alias: String,
}

impl SqlSelectColumn {
    pub fn new(expr: SqlExprRef, column_alias: impl Into<String>) -> Self {
        SqlSelectColumn {
            expr,
            column_alias: column_alias.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlJoinType {
    LeftOuter,
    FullOuter,
    Inner,
    Cross,
}

impl SqlJoinType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SqlJoinType::LeftOuter => "LEFT OUTER JOIN",
            SqlJoinType::FullOuter => "FULL OUTER JOIN",
            SqlJoinType::Inner => "INNER JOIN",
            SqlJoinType::Cross => "CROSS JOIN",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SqlJoinDescription {
    pub right_source: SqlQueryPlanNodeRef,
    pub right_source_alias: String,
    pub on_condition: Option<SqlExprRef>,
    pub join_type: SqlJoinType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SqlOrderBy {
    pub expr: SqlExprRef,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SqlSelectStatement {
    /// Rendered as a comment above the statement
    pub description: String,
    pub select_columns: Vec<SqlSelectColumn>,
    pub from_source: SqlQueryPlanNodeRef,
    pub from_source_alias: String,
    pub joins: Vec<SqlJoinDescription>,
    pub where_clause: Option<SqlExprRef>,
    pub group_bys: Vec<SqlSelectColumn>,
    pub order_bys: Vec<SqlOrderBy>,
    pub limit: Option<u64>,
    pub distinct: bool,
}

impl SqlSelectStatement {
    pub fn new(
        description: impl Into<String>,
        select_columns: Vec<SqlSelectColumn>,
        from_source: SqlQueryPlanNodeRef,
        from_source_alias: impl Into<String>,
    ) -> Self {
        SqlSelectStatement {
            description: description.into(),
            select_columns,
            from_source,
            from_source_alias: from_source_alias.into(),
            joins: Vec::new(),
            where_clause: None,
            group_bys: Vec::new(),
            order_bys: Vec::new(),
            limit: None,
            distinct: false,
        }
    }

    pub fn with_joins(mut self, joins: Vec<SqlJoinDescription>) -> Self {
        self.joins = joins;
        self
    }

    pub fn with_where(mut self, where_clause: Option<SqlExprRef>) -> Self {
        self.where_clause = where_clause;
        self
    }

    pub fn with_group_bys(mut self, group_bys: Vec<SqlSelectColumn>) -> Self {
        self.group_bys = group_bys;
        self
    }

    pub fn with_order_bys(mut self, order_bys: Vec<SqlOrderBy>) -> Self {
        self.order_bys = order_bys;
        self
    }

    pub fn with_limit(mut self, limit: Option<u64>) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_distinct(mut self, distinct: bool) -> Self {
        self.distinct = distinct;
        self
    }

    pub fn into_node(self) -> SqlQueryPlanNodeRef {
        Arc::new(SqlQueryPlanNode::Select(self))
    }

    /// Every expression of the statement outside its sources
    pub fn expressions(&self) -> impl Iterator<Item = &SqlExprRef> {
        self.select_columns
            .iter()
            .map(|c| &c.expr)
            .chain(self.joins.iter().filter_map(|j| j.on_condition.as_ref()))
            .chain(self.where_clause.iter())
            .chain(self.group_bys.iter().map(|c| &c.expr))
            .chain(self.order_bys.iter().map(|o| &o.expr))
    }

    pub fn is_aggregate(&self) -> bool {
        !self.group_bys.is_empty() || self.select_columns.iter().any(|c| c.expr.contains_aggregate())
    }

    pub fn contains_opaque_string(&self) -> bool {
        self.expressions().any(|e| e.contains_opaque_string())
    }

    pub fn column(&self, alias: &str) -> Option<&SqlSelectColumn> {
        self.select_columns.iter().find(|c| c.column_alias == alias)
    }

    /// The expression a select column is computed from, as seen through the from source
    pub fn column_expr(&self, alias: &str) -> Option<&SqlExpr> {
        self.column(alias).map(|c| c.expr.as_ref())
    }
}
