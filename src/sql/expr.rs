//! SQL expression AST
//!
//! Expressions are immutable and shared through `Arc`; rewrites build new trees that reuse
//! untouched subtrees.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDateTime;

use crate::semantic_model::{AggregationType, TimeGranularity};
use super::bind::SqlBindParameters;

pub type SqlExprRef = Arc<SqlExpr>;

/// Replacement expressions keyed by the column reference they stand in for
pub type SqlColumnReplacements = HashMap<SqlColumnReference, SqlExprRef>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SqlColumnReference {
    /// Empty when the reference is unqualified
    pub table_alias: String,
    pub column_name: String,
}

impl SqlColumnReference {
    pub fn new(table_alias: impl Into<String>, column_name: impl Into<String>) -> Self {
        SqlColumnReference {
            table_alias: table_alias.into(),
            column_name: column_name.into(),
        }
    }
}

/// Raw SQL text. With `used_columns` set, the text only references those (unqualified)
/// columns of the enclosing FROM; without it the text is opaque.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStringExpression {
    pub sql: String,
    pub bind_parameters: SqlBindParameters,
    pub used_columns: Option<Vec<String>>,
    pub requires_parenthesis: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlComparison {
    Equals,
    NotEquals,
    LessThan,
    LessThanOrEquals,
    GreaterThan,
    GreaterThanOrEquals,
}

impl SqlComparison {
    pub fn as_str(&self) -> &'static str {
        match self {
            SqlComparison::Equals => "=",
            SqlComparison::NotEquals => "!=",
            SqlComparison::LessThan => "<",
            SqlComparison::LessThanOrEquals => "<=",
            SqlComparison::GreaterThan => ">",
            SqlComparison::GreaterThanOrEquals => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlArithmeticOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl SqlArithmeticOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            SqlArithmeticOperator::Add => "+",
            SqlArithmeticOperator::Subtract => "-",
            SqlArithmeticOperator::Multiply => "*",
            SqlArithmeticOperator::Divide => "/",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlLogicalOperator {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlFunction {
    Sum,
    Min,
    Max,
    Count,
    CountDistinct,
    Average,
    Coalesce,
    NullIf,
}

impl SqlFunction {
    pub fn is_aggregate(&self) -> bool {
        match self {
            SqlFunction::Sum
            | SqlFunction::Min
            | SqlFunction::Max
            | SqlFunction::Count
            | SqlFunction::CountDistinct
            | SqlFunction::Average => true,
            SqlFunction::Coalesce | SqlFunction::NullIf => false,
        }
    }

    /// Aggregate function for a measure's aggregation, if it maps to a plain function
    pub fn for_aggregation(agg: AggregationType) -> Option<SqlFunction> {
        match agg {
            AggregationType::Sum | AggregationType::SumBoolean => Some(SqlFunction::Sum),
            AggregationType::Min => Some(SqlFunction::Min),
            AggregationType::Max => Some(SqlFunction::Max),
            AggregationType::Count => Some(SqlFunction::Count),
            AggregationType::CountDistinct => Some(SqlFunction::CountDistinct),
            AggregationType::Average => Some(SqlFunction::Average),
            AggregationType::Percentile | AggregationType::Median => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SqlExpr {
    String(SqlStringExpression),
    StringLiteral(String),
    Column(SqlColumnReference),
    Null,
    TimestampLiteral(NaiveDateTime),
    Comparison {
        left: SqlExprRef,
        comparison: SqlComparison,
        right: SqlExprRef,
    },
    Arithmetic {
        left: SqlExprRef,
        operator: SqlArithmeticOperator,
        right: SqlExprRef,
    },
    Logical {
        operator: SqlLogicalOperator,
        args: Vec<SqlExprRef>,
    },
    Function {
        function: SqlFunction,
        args: Vec<SqlExprRef>,
    },
    Percentile {
        arg: SqlExprRef,
        percentile: f64,
        discrete: bool,
    },
    CastToDouble(SqlExprRef),
    IsNull(SqlExprRef),
    DateTrunc {
        granularity: TimeGranularity,
        arg: SqlExprRef,
    },
    /// `arg` shifted back by `count` periods
    SubtractTimeInterval {
        arg: SqlExprRef,
        count: u32,
        granularity: TimeGranularity,
    },
    Between {
        arg: SqlExprRef,
        start: SqlExprRef,
        end: SqlExprRef,
    },
}

impl SqlExpr {
    pub fn column(table_alias: impl Into<String>, column_name: impl Into<String>) -> SqlExprRef {
        Arc::new(SqlExpr::Column(SqlColumnReference::new(table_alias, column_name)))
    }

    pub fn string(sql: impl Into<String>) -> SqlExprRef {
        Arc::new(SqlExpr::String(SqlStringExpression {
            sql: sql.into(),
            bind_parameters: SqlBindParameters::default(),
            used_columns: None,
            requires_parenthesis: false,
        }))
    }

    /// Raw SQL text that references no columns, e.g. a numeric literal
    pub fn constant(sql: impl Into<String>) -> SqlExprRef {
        Arc::new(SqlExpr::String(SqlStringExpression {
            sql: sql.into(),
            bind_parameters: SqlBindParameters::default(),
            used_columns: Some(Vec::new()),
            requires_parenthesis: false,
        }))
    }

    pub fn comparison(left: SqlExprRef, comparison: SqlComparison, right: SqlExprRef) -> SqlExprRef {
        Arc::new(SqlExpr::Comparison { left, comparison, right })
    }

    pub fn function(function: SqlFunction, args: Vec<SqlExprRef>) -> SqlExprRef {
        Arc::new(SqlExpr::Function { function, args })
    }

    /// Conjunction of `args`; a single argument is returned as is
    pub fn and(mut args: Vec<SqlExprRef>) -> Option<SqlExprRef> {
        match args.len() {
            0 => None,
            1 => args.pop(),
            _ => Some(Arc::new(SqlExpr::Logical {
                operator: SqlLogicalOperator::And,
                args,
            })),
        }
    }

    /// Whether the expression needs parentheses when nested inside another operator
    pub fn requires_parenthesis(&self) -> bool {
        match self {
            SqlExpr::String(s) => s.requires_parenthesis,
            SqlExpr::Comparison { .. }
            | SqlExpr::Arithmetic { .. }
            | SqlExpr::Logical { .. }
            | SqlExpr::Between { .. } => true,
            SqlExpr::StringLiteral(_)
            | SqlExpr::Column(_)
            | SqlExpr::Null
            | SqlExpr::TimestampLiteral(_)
            | SqlExpr::Function { .. }
            | SqlExpr::Percentile { .. }
            | SqlExpr::CastToDouble(_)
            | SqlExpr::IsNull(_)
            | SqlExpr::DateTrunc { .. }
            | SqlExpr::SubtractTimeInterval { .. } => false,
        }
    }

    /// Direct children, left to right
    pub fn children(&self) -> Vec<&SqlExprRef> {
        match self {
            SqlExpr::String(_)
            | SqlExpr::StringLiteral(_)
            | SqlExpr::Column(_)
            | SqlExpr::Null
            | SqlExpr::TimestampLiteral(_) => Vec::new(),
            SqlExpr::Comparison { left, right, .. } | SqlExpr::Arithmetic { left, right, .. } => vec![left, right],
            SqlExpr::Logical { args, .. } | SqlExpr::Function { args, .. } => args.iter().collect(),
            SqlExpr::Percentile { arg, .. }
            | SqlExpr::CastToDouble(arg)
            | SqlExpr::IsNull(arg)
            | SqlExpr::DateTrunc { arg, .. }
            | SqlExpr::SubtractTimeInterval { arg, .. } => vec![arg],
            SqlExpr::Between { arg, start, end } => vec![arg, start, end],
        }
    }

    /// This expression and every descendant, parents before children
    pub fn lineage(&self) -> Vec<&SqlExpr> {
        let mut out = vec![self];
        let mut i = 0;
        while i < out.len() {
            let node = out[i];
            out.extend(node.children().into_iter().map(|c| c.as_ref()));
            i += 1;
        }
        out
    }

    pub fn column_references(&self) -> Vec<&SqlColumnReference> {
        self.lineage()
            .into_iter()
            .filter_map(|e| match e {
                SqlExpr::Column(c) => Some(c),
                _ => None,
            })
            .collect()
    }

    pub fn contains_aggregate(&self) -> bool {
        self.lineage().into_iter().any(|e| match e {
            SqlExpr::Function { function, .. } => function.is_aggregate(),
            SqlExpr::Percentile { .. } => true,
            _ => false,
        })
    }

    /// Whether a string expression of unknown column usage appears anywhere below
    pub fn contains_opaque_string(&self) -> bool {
        self.lineage()
            .into_iter()
            .any(|e| matches!(e, SqlExpr::String(s) if s.used_columns.is_none()))
    }

    /// Unqualified columns used by string expressions below
    pub fn string_used_columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        for e in self.lineage() {
            if let SqlExpr::String(SqlStringExpression { used_columns: Some(cols), .. }) = e {
                out.extend(cols.iter().map(String::as_str));
            }
        }
        out
    }

    /// Bind parameters of string expressions below, in first-use order
    pub fn bind_parameters(&self) -> Vec<&SqlBindParameters> {
        self.lineage()
            .into_iter()
            .filter_map(|e| match e {
                SqlExpr::String(s) if !s.bind_parameters.is_empty() => Some(&s.bind_parameters),
                _ => None,
            })
            .collect()
    }

    /// Structural equality
    pub fn matches(&self, other: &SqlExpr) -> bool {
        self == other
    }

    /// Replace column references found in `column_replacements`, then point every remaining
    /// column reference at `table_alias_override` when given.
    pub fn rewrite(
        self: &Arc<Self>,
        column_replacements: &SqlColumnReplacements,
        table_alias_override: Option<&str>,
    ) -> SqlExprRef {
        if column_replacements.is_empty() && table_alias_override.is_none() {
            return Arc::clone(self);
        }
        let r = |e: &SqlExprRef| e.rewrite(column_replacements, table_alias_override);
        let rewritten = match self.as_ref() {
            SqlExpr::Column(c) => {
                if let Some(replacement) = column_replacements.get(c) {
                    return Arc::clone(replacement);
                }
                match table_alias_override {
                    Some(alias) if alias != c.table_alias => {
                        SqlExpr::Column(SqlColumnReference::new(alias, c.column_name.clone()))
                    }
                    _ => return Arc::clone(self),
                }
            }
            SqlExpr::String(_) | SqlExpr::StringLiteral(_) | SqlExpr::Null | SqlExpr::TimestampLiteral(_) => {
                return Arc::clone(self)
            }
            SqlExpr::Comparison { left, comparison, right } => SqlExpr::Comparison {
                left: r(left),
                comparison: *comparison,
                right: r(right),
            },
            SqlExpr::Arithmetic { left, operator, right } => SqlExpr::Arithmetic {
                left: r(left),
                operator: *operator,
                right: r(right),
            },
            SqlExpr::Logical { operator, args } => SqlExpr::Logical {
                operator: *operator,
                args: args.iter().map(r).collect(),
            },
            SqlExpr::Function { function, args } => SqlExpr::Function {
                function: *function,
                args: args.iter().map(r).collect(),
            },
            SqlExpr::Percentile { arg, percentile, discrete } => SqlExpr::Percentile {
                arg: r(arg),
                percentile: *percentile,
                discrete: *discrete,
            },
            SqlExpr::CastToDouble(arg) => SqlExpr::CastToDouble(r(arg)),
            SqlExpr::IsNull(arg) => SqlExpr::IsNull(r(arg)),
            SqlExpr::DateTrunc { granularity, arg } => SqlExpr::DateTrunc {
                granularity: *granularity,
                arg: r(arg),
            },
            SqlExpr::SubtractTimeInterval { arg, count, granularity } => SqlExpr::SubtractTimeInterval {
                arg: r(arg),
                count: *count,
                granularity: *granularity,
            },
            SqlExpr::Between { arg, start, end } => SqlExpr::Between {
                arg: r(arg),
                start: r(start),
                end: r(end),
            },
        };
        Arc::new(rewritten)
    }
}
