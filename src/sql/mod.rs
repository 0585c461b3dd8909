//! SQL plan types (nouns): expression AST and select-statement tree

mod bind;
mod expr;
mod node;
mod text;

pub use bind::{SqlBindParameter, SqlBindParameters};
pub use expr::{
    SqlArithmeticOperator, SqlColumnReference, SqlColumnReplacements, SqlComparison, SqlExpr, SqlExprRef,
    SqlFunction, SqlLogicalOperator, SqlStringExpression,
};
pub use node::{
    SqlCreateTableAs, SqlJoinDescription, SqlJoinType, SqlOrderBy, SqlQueryPlanNode, SqlQueryPlanNodeRef,
    SqlSelectColumn, SqlSelectQuery, SqlSelectStatement, SqlTable,
};
pub use text::{replace_identifiers, sql_identifiers};
