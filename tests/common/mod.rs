//! Shared test utilities for integration tests

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Mutex;

use semquel::sql::{SqlBindParameters, SqlJoinType, SqlQueryPlanNode, SqlSelectStatement};
use semquel::{
    parser, CompilerConfig, Engine, ExplainResult, OptimizationLevel, QueryRequest, RowSet, SemanticModel, SqlClient,
    SqlClientError,
};

/// Load a semantic model from the tests/test_data directory
pub fn load_fixture(name: &str) -> SemanticModel {
    let path = format!("tests/test_data/{}", name);
    parser::load_model_file(&path).unwrap_or_else(|e| panic!("Failed to load test data {}: {}", name, e))
}

pub fn engine(fixture: &str, level: OptimizationLevel) -> Engine {
    let config = CompilerConfig {
        optimization_level: level,
        ..Default::default()
    };
    Engine::new(load_fixture(fixture), config)
}

/// Run the full pipeline: model + request → compiled SQL
pub fn run_pipeline(engine: &Engine, request: &QueryRequest) -> Result<ExplainResult, String> {
    engine.explain(request).map_err(|e| format!("Compilation failed: {}", e))
}

// =============================================================================
// SQL Plan Inspection Utilities
// =============================================================================

/// Warehouse tables read anywhere in the plan
pub fn count_table_scans(node: &SqlQueryPlanNode) -> usize {
    match node {
        SqlQueryPlanNode::Table(_) | SqlQueryPlanNode::SelectQuery(_) => 1,
        SqlQueryPlanNode::CreateTableAs(create) => count_table_scans(&create.parent),
        SqlQueryPlanNode::Select(select) => {
            count_table_scans(&select.from_source)
                + select.joins.iter().map(|j| count_table_scans(&j.right_source)).sum::<usize>()
        }
    }
}

/// JOIN clauses of the given type anywhere in the plan; `None` counts every join
pub fn count_joins(node: &SqlQueryPlanNode, join_type: Option<SqlJoinType>) -> usize {
    match node {
        SqlQueryPlanNode::Table(_) | SqlQueryPlanNode::SelectQuery(_) => 0,
        SqlQueryPlanNode::CreateTableAs(create) => count_joins(&create.parent, join_type),
        SqlQueryPlanNode::Select(select) => {
            let here = select
                .joins
                .iter()
                .filter(|j| join_type.map_or(true, |t| j.join_type == t))
                .count();
            here + count_joins(&select.from_source, join_type)
                + select
                    .joins
                    .iter()
                    .map(|j| count_joins(&j.right_source, join_type))
                    .sum::<usize>()
        }
    }
}

/// Warehouse tables read in the plan, FROM sources before joined ones
pub fn table_names(node: &SqlQueryPlanNode) -> Vec<String> {
    match node {
        SqlQueryPlanNode::Table(table) => vec![table.table_name.clone()],
        SqlQueryPlanNode::SelectQuery(_) => Vec::new(),
        SqlQueryPlanNode::CreateTableAs(create) => table_names(&create.parent),
        SqlQueryPlanNode::Select(select) => {
            let mut out = table_names(&select.from_source);
            for join in &select.joins {
                out.extend(table_names(&join.right_source));
            }
            out
        }
    }
}

/// The outermost select statement with the given description
pub fn find_statement<'a>(node: &'a SqlQueryPlanNode, description: &str) -> Option<&'a SqlSelectStatement> {
    match node {
        SqlQueryPlanNode::Select(select) if select.description == description => Some(select),
        SqlQueryPlanNode::Select(select) => find_statement(&select.from_source, description).or_else(|| {
            select
                .joins
                .iter()
                .find_map(|j| find_statement(&j.right_source, description))
        }),
        SqlQueryPlanNode::CreateTableAs(create) => find_statement(&create.parent, description),
        SqlQueryPlanNode::Table(_) | SqlQueryPlanNode::SelectQuery(_) => None,
    }
}

/// Descriptions of every select statement, outermost first
pub fn statement_descriptions(node: &SqlQueryPlanNode) -> Vec<String> {
    let mut out = Vec::new();
    collect_descriptions(node, &mut out);
    out
}

fn collect_descriptions(node: &SqlQueryPlanNode, out: &mut Vec<String>) {
    match node {
        SqlQueryPlanNode::Select(select) => {
            out.push(select.description.clone());
            collect_descriptions(&select.from_source, out);
            for join in &select.joins {
                collect_descriptions(&join.right_source, out);
            }
        }
        SqlQueryPlanNode::CreateTableAs(create) => collect_descriptions(&create.parent, out),
        SqlQueryPlanNode::Table(_) | SqlQueryPlanNode::SelectQuery(_) => {}
    }
}

// =============================================================================
// Fake SQL client
// =============================================================================

/// One call made against the fake client
#[derive(Debug, Clone, PartialEq)]
pub enum ClientCall {
    Query(String),
    Execute(String),
    DryRun(String),
    TableExists(String),
    DropTable(String),
    CreateTableFromRows(String),
}

/// In-memory `SqlClient`: records calls, returns canned rows, and fails any statement that
/// contains `fail_on`
#[derive(Debug, Default)]
pub struct FakeSqlClient {
    pub rows: RowSet,
    pub fail_on: Option<String>,
    tables: Mutex<HashSet<String>>,
    calls: Mutex<Vec<ClientCall>>,
}

impl FakeSqlClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: RowSet) -> Self {
        FakeSqlClient {
            rows,
            ..Default::default()
        }
    }

    pub fn failing_on(pattern: &str) -> Self {
        FakeSqlClient {
            fail_on: Some(pattern.to_string()),
            ..Default::default()
        }
    }

    pub fn with_table(self, table: &str) -> Self {
        self.tables.lock().unwrap().insert(table.to_string());
        self
    }

    pub fn calls(&self) -> Vec<ClientCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.tables.lock().unwrap().contains(table)
    }

    fn record(&self, call: ClientCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn check(&self, sql: &str) -> Result<(), SqlClientError> {
        match &self.fail_on {
            Some(pattern) if sql.contains(pattern.as_str()) => {
                Err(SqlClientError::new(format!("syntax error near '{}'", pattern)))
            }
            _ => Ok(()),
        }
    }
}

impl SqlClient for FakeSqlClient {
    fn query(&self, sql: &str, _bind_parameters: &SqlBindParameters) -> Result<RowSet, SqlClientError> {
        self.record(ClientCall::Query(sql.to_string()));
        self.check(sql)?;
        Ok(self.rows.clone())
    }

    fn execute(&self, sql: &str, _bind_parameters: &SqlBindParameters) -> Result<(), SqlClientError> {
        self.record(ClientCall::Execute(sql.to_string()));
        self.check(sql)?;
        if let Some(rest) = sql.split("CREATE TABLE ").nth(1) {
            if let Some(table) = rest.split_whitespace().next() {
                self.tables.lock().unwrap().insert(table.to_string());
            }
        }
        Ok(())
    }

    fn dry_run(&self, sql: &str, _bind_parameters: &SqlBindParameters) -> Result<(), SqlClientError> {
        self.record(ClientCall::DryRun(sql.to_string()));
        self.check(sql)
    }

    fn table_exists(&self, table: &str) -> Result<bool, SqlClientError> {
        self.record(ClientCall::TableExists(table.to_string()));
        Ok(self.has_table(table))
    }

    fn drop_table(&self, table: &str) -> Result<(), SqlClientError> {
        self.record(ClientCall::DropTable(table.to_string()));
        self.tables.lock().unwrap().remove(table);
        Ok(())
    }

    fn create_table_from_rows(&self, table: &str, _rows: &RowSet) -> Result<(), SqlClientError> {
        self.record(ClientCall::CreateTableFromRows(table.to_string()));
        self.tables.lock().unwrap().insert(table.to_string());
        Ok(())
    }
}
