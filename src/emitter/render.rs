//! SQL rendering
//!
//! Turns a SQL query plan into ANSI-flavoured SQL text. Every select statement is preceded
//! by a `-- description` comment naming the dataflow node it came from; sub-queries are
//! indented two spaces per level.

use crate::sql::{
    SqlBindParameters, SqlCreateTableAs, SqlExpr, SqlFunction, SqlJoinDescription, SqlLogicalOperator,
    SqlQueryPlanNode, SqlSelectStatement,
};
use super::error::EmitError;

/// Rendered SQL and the bind parameters it needs
#[derive(Debug, Clone, PartialEq)]
pub struct SqlPlanRenderResult {
    pub sql: String,
    pub bind_parameters: SqlBindParameters,
}

/// Render a plan node. Bind parameters of every string expression in the tree are merged;
/// one key bound to two values is an error.
pub fn render_sql(node: &SqlQueryPlanNode) -> Result<SqlPlanRenderResult, EmitError> {
    let mut bind_parameters = SqlBindParameters::new();
    collect_bind_parameters(node, &mut bind_parameters)?;
    Ok(SqlPlanRenderResult {
        sql: render_node(node, 0),
        bind_parameters,
    })
}

fn pad(indent: usize) -> String {
    "  ".repeat(indent)
}

fn collect_bind_parameters(node: &SqlQueryPlanNode, out: &mut SqlBindParameters) -> Result<(), EmitError> {
    match node {
        SqlQueryPlanNode::Select(select) => {
            collect_bind_parameters(&select.from_source, out)?;
            for join in &select.joins {
                collect_bind_parameters(&join.right_source, out)?;
            }
            for expr in select.expressions() {
                for params in expr.bind_parameters() {
                    *out = out.combine(params)?;
                }
            }
            Ok(())
        }
        SqlQueryPlanNode::CreateTableAs(create) => collect_bind_parameters(&create.parent, out),
        SqlQueryPlanNode::Table(_) | SqlQueryPlanNode::SelectQuery(_) => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Plan nodes
// ---------------------------------------------------------------------------

fn render_node(node: &SqlQueryPlanNode, indent: usize) -> String {
    match node {
        SqlQueryPlanNode::Select(select) => render_select(select, indent),
        SqlQueryPlanNode::Table(table) => format!("{}{}", pad(indent), table.table_name),
        SqlQueryPlanNode::SelectQuery(query) => {
            let p = pad(indent);
            query
                .select_query
                .trim()
                .lines()
                .map(|line| format!("{p}{}", line.trim_end()))
                .collect::<Vec<_>>()
                .join("\n")
        }
        SqlQueryPlanNode::CreateTableAs(create) => render_create_table_as(create, indent),
    }
}

fn render_create_table_as(create: &SqlCreateTableAs, indent: usize) -> String {
    let p = pad(indent);
    let inner = render_node(&create.parent, indent + 1);
    format!("{p}CREATE TABLE {} AS (\n{inner}\n{p})", create.output_table)
}

/// A FROM or JOIN source: tables inline, everything else as a parenthesised sub-query
fn render_source(source: &SqlQueryPlanNode, alias: &str, indent: usize) -> String {
    let p = pad(indent);
    match source {
        SqlQueryPlanNode::Table(table) => format!("{} {alias}", table.table_name),
        _ => {
            let inner = render_node(source, indent + 1);
            format!("(\n{inner}\n{p}) {alias}")
        }
    }
}

fn render_select(select: &SqlSelectStatement, indent: usize) -> String {
    let p = pad(indent);
    let mut lines = Vec::new();
    lines.push(format!("{p}-- {}", select.description));

    let keyword = if select.distinct { "SELECT DISTINCT" } else { "SELECT" };
    lines.push(format!("{p}{keyword}"));
    for (i, column) in select.select_columns.iter().enumerate() {
        let sep = if i == 0 { "" } else { ", " };
        lines.push(format!("{p}  {sep}{} AS {}", render_expr(&column.expr), column.column_alias));
    }

    lines.push(format!(
        "{p}FROM {}",
        render_source(&select.from_source, &select.from_source_alias, indent)
    ));
    for join in &select.joins {
        lines.push(render_join(join, indent));
    }

    if let Some(where_clause) = &select.where_clause {
        lines.push(format!("{p}WHERE {}", render_expr(where_clause)));
    }
    if !select.group_bys.is_empty() {
        lines.push(format!("{p}GROUP BY"));
        for (i, column) in select.group_bys.iter().enumerate() {
            let sep = if i == 0 { "" } else { ", " };
            lines.push(format!("{p}  {sep}{}", render_expr(&column.expr)));
        }
    }
    if !select.order_bys.is_empty() {
        let items: Vec<String> = select
            .order_bys
            .iter()
            .map(|o| {
                if o.descending {
                    format!("{} DESC", render_expr(&o.expr))
                } else {
                    render_expr(&o.expr)
                }
            })
            .collect();
        lines.push(format!("{p}ORDER BY {}", items.join(", ")));
    }
    if let Some(limit) = select.limit {
        lines.push(format!("{p}LIMIT {limit}"));
    }
    lines.join("\n")
}

fn render_join(join: &SqlJoinDescription, indent: usize) -> String {
    let p = pad(indent);
    let source = render_source(&join.right_source, &join.right_source_alias, indent);
    match &join.on_condition {
        Some(on) => format!("{p}{} {source}\n{p}ON\n{p}  {}", join.join_type.as_str(), render_expr(on)),
        None => format!("{p}{} {source}", join.join_type.as_str()),
    }
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

/// Render as an operand of another operator
fn render_operand(expr: &SqlExpr) -> String {
    if expr.requires_parenthesis() {
        format!("({})", render_expr(expr))
    } else {
        render_expr(expr)
    }
}

pub(crate) fn render_expr(expr: &SqlExpr) -> String {
    match expr {
        SqlExpr::String(s) => s.sql.clone(),
        SqlExpr::StringLiteral(s) => format!("'{}'", s.replace('\'', "''")),
        SqlExpr::Column(c) if c.table_alias.is_empty() => c.column_name.clone(),
        SqlExpr::Column(c) => format!("{}.{}", c.table_alias, c.column_name),
        SqlExpr::Null => "NULL".to_string(),
        SqlExpr::TimestampLiteral(t) => format!("'{}'", t.format("%Y-%m-%dT%H:%M:%S")),
        SqlExpr::Comparison { left, comparison, right } => {
            format!("{} {} {}", render_operand(left), comparison.as_str(), render_operand(right))
        }
        SqlExpr::Arithmetic { left, operator, right } => {
            format!("{} {} {}", render_operand(left), operator.as_str(), render_operand(right))
        }
        SqlExpr::Logical { operator, args } => {
            let sep = match operator {
                SqlLogicalOperator::And => " AND ",
                SqlLogicalOperator::Or => " OR ",
            };
            args.iter().map(|a| render_operand(a)).collect::<Vec<_>>().join(sep)
        }
        SqlExpr::Function { function, args } => {
            let rendered: Vec<String> = args.iter().map(|a| render_expr(a)).collect();
            match function {
                SqlFunction::CountDistinct => format!("COUNT(DISTINCT {})", rendered.join(", ")),
                _ => format!("{}({})", function_name(*function), rendered.join(", ")),
            }
        }
        SqlExpr::Percentile { arg, percentile, discrete } => {
            let function = if *discrete { "PERCENTILE_DISC" } else { "PERCENTILE_CONT" };
            format!("{function}({percentile}) WITHIN GROUP (ORDER BY {})", render_expr(arg))
        }
        SqlExpr::CastToDouble(arg) => format!("CAST({} AS DOUBLE)", render_expr(arg)),
        SqlExpr::IsNull(arg) => format!("{} IS NULL", render_operand(arg)),
        SqlExpr::DateTrunc { granularity, arg } => {
            format!("DATE_TRUNC('{}', {})", granularity.as_str(), render_expr(arg))
        }
        SqlExpr::SubtractTimeInterval { arg, count, granularity } => {
            format!("DATEADD({}, -{}, {})", granularity.as_str(), count, render_expr(arg))
        }
        SqlExpr::Between { arg, start, end } => format!(
            "{} BETWEEN {} AND {}",
            render_operand(arg),
            render_operand(start),
            render_operand(end)
        ),
    }
}

fn function_name(function: SqlFunction) -> &'static str {
    match function {
        SqlFunction::Sum => "SUM",
        SqlFunction::Min => "MIN",
        SqlFunction::Max => "MAX",
        SqlFunction::Count => "COUNT",
        SqlFunction::CountDistinct => "COUNT",
        SqlFunction::Average => "AVG",
        SqlFunction::Coalesce => "COALESCE",
        SqlFunction::NullIf => "NULLIF",
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;
    use serde_json::json;

    use super::*;
    use crate::semantic_model::TimeGranularity;
    use crate::sql::{
        SqlComparison, SqlJoinType, SqlSelectColumn, SqlStringExpression, SqlTable,
    };

    fn table(name: &str) -> Arc<SqlQueryPlanNode> {
        Arc::new(SqlQueryPlanNode::Table(SqlTable { table_name: name.into() }))
    }

    #[test]
    fn test_render_simple_select() {
        let select = SqlSelectStatement::new(
            "Read Elements From Data Source 'bookings_source'",
            vec![
                SqlSelectColumn::new(SqlExpr::string("1"), "bookings"),
                SqlSelectColumn::new(
                    Arc::new(SqlExpr::DateTrunc {
                        granularity: TimeGranularity::Day,
                        arg: SqlExpr::column("bookings_source_src_0", "ds"),
                    }),
                    "ds__day",
                ),
            ],
            table("fct_bookings"),
            "bookings_source_src_0",
        );
        let rendered = render_sql(&SqlQueryPlanNode::Select(select)).unwrap();
        assert_eq!(
            rendered.sql,
            "-- Read Elements From Data Source 'bookings_source'\n\
             SELECT\n  1 AS bookings\n  , DATE_TRUNC('day', bookings_source_src_0.ds) AS ds__day\n\
             FROM fct_bookings bookings_source_src_0"
        );
        assert!(rendered.bind_parameters.is_empty());
    }

    #[test]
    fn test_render_omits_empty_clauses() {
        let inner = SqlSelectStatement::new(
            "inner",
            vec![SqlSelectColumn::new(SqlExpr::column("a", "x"), "x")],
            table("t"),
            "a",
        )
        .into_node();
        let outer = SqlSelectStatement::new(
            "outer",
            vec![SqlSelectColumn::new(SqlExpr::column("subq_1", "x"), "x")],
            inner,
            "subq_1",
        );
        let sql = render_sql(&SqlQueryPlanNode::Select(outer)).unwrap().sql;
        assert!(!sql.contains("WHERE"));
        assert!(!sql.contains("GROUP BY"));
        assert!(sql.contains("FROM (\n  -- inner\n"));
        assert!(sql.ends_with(") subq_1"));
    }

    #[test]
    fn test_render_join_and_where() {
        let where_clause = Arc::new(SqlExpr::String(SqlStringExpression {
            sql: "country = :country".into(),
            bind_parameters: SqlBindParameters::from_pairs([("country", json!("us"))]),
            used_columns: Some(vec!["country".into()]),
            requires_parenthesis: true,
        }));
        let select = SqlSelectStatement::new(
            "join",
            vec![SqlSelectColumn::new(SqlExpr::column("l", "x"), "x")],
            table("left_t"),
            "l",
        )
        .with_joins(vec![SqlJoinDescription {
            right_source: table("right_t"),
            right_source_alias: "r".into(),
            on_condition: Some(SqlExpr::comparison(
                SqlExpr::column("l", "id"),
                SqlComparison::Equals,
                SqlExpr::column("r", "id"),
            )),
            join_type: SqlJoinType::LeftOuter,
        }])
        .with_where(Some(where_clause))
        .with_limit(Some(5));
        let rendered = render_sql(&SqlQueryPlanNode::Select(select)).unwrap();
        assert!(rendered.sql.contains("LEFT OUTER JOIN right_t r\nON\n  l.id = r.id"));
        assert!(rendered.sql.contains("WHERE country = :country"));
        assert!(rendered.sql.ends_with("LIMIT 5"));
        assert_eq!(rendered.bind_parameters.get("country"), Some(&json!("us")));
    }

    #[test]
    fn test_render_expressions() {
        let ratio = SqlExpr::Arithmetic {
            left: Arc::new(SqlExpr::CastToDouble(SqlExpr::column("s", "bookings"))),
            operator: crate::sql::SqlArithmeticOperator::Divide,
            right: Arc::new(SqlExpr::CastToDouble(SqlExpr::function(
                SqlFunction::NullIf,
                vec![SqlExpr::column("s", "views"), SqlExpr::string("0")],
            ))),
        };
        assert_eq!(
            render_expr(&ratio),
            "CAST(s.bookings AS DOUBLE) / CAST(NULLIF(s.views, 0) AS DOUBLE)"
        );

        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let end = NaiveDate::from_ymd_opt(2020, 1, 31).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let between = SqlExpr::Between {
            arg: SqlExpr::column("", "metric_time__day"),
            start: Arc::new(SqlExpr::TimestampLiteral(start)),
            end: Arc::new(SqlExpr::TimestampLiteral(end)),
        };
        assert_eq!(
            render_expr(&between),
            "metric_time__day BETWEEN '2020-01-01T00:00:00' AND '2020-01-31T00:00:00'"
        );

        let distinct = SqlExpr::function(SqlFunction::CountDistinct, vec![SqlExpr::column("", "guest_id")]);
        assert_eq!(render_expr(&distinct), "COUNT(DISTINCT guest_id)");

        let median = SqlExpr::Percentile {
            arg: SqlExpr::column("", "price"),
            percentile: 0.5,
            discrete: false,
        };
        assert_eq!(render_expr(&median), "PERCENTILE_CONT(0.5) WITHIN GROUP (ORDER BY price)");

        let shifted = SqlExpr::SubtractTimeInterval {
            arg: SqlExpr::column("a", "metric_time__day"),
            count: 7,
            granularity: TimeGranularity::Day,
        };
        assert_eq!(render_expr(&shifted), "DATEADD(day, -7, a.metric_time__day)");
    }

    #[test]
    fn test_create_table_as() {
        let select = SqlSelectStatement::new(
            "inner",
            vec![SqlSelectColumn::new(SqlExpr::column("a", "x"), "x")],
            table("t"),
            "a",
        )
        .into_node();
        let node = SqlQueryPlanNode::CreateTableAs(SqlCreateTableAs {
            output_table: "analytics.out".into(),
            parent: select,
        });
        let sql = render_sql(&node).unwrap().sql;
        assert!(sql.starts_with("CREATE TABLE analytics.out AS (\n  -- inner"));
        assert!(sql.ends_with("\n)"));
    }
}
