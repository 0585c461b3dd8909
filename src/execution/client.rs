//! Warehouse boundary

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::SqlClientError;
use crate::sql::SqlBindParameters;

/// Rows returned by a query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowSet {
    pub column_names: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl RowSet {
    pub fn new(column_names: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        RowSet { column_names, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of one column, by name
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let index = self.column_names.iter().position(|c| c == name)?;
        Some(self.rows.iter().filter_map(|row| row.get(index)).collect())
    }
}

/// Connection to a SQL warehouse. Implementations handle dialect quirks and retries are
/// not expected: each call is made once.
pub trait SqlClient: Send + Sync {
    /// Run a SELECT and return its rows
    fn query(&self, sql: &str, bind_parameters: &SqlBindParameters) -> Result<RowSet, SqlClientError>;

    /// Run a statement that returns no rows
    fn execute(&self, sql: &str, bind_parameters: &SqlBindParameters) -> Result<(), SqlClientError>;

    /// Validate a statement without running it
    fn dry_run(&self, sql: &str, bind_parameters: &SqlBindParameters) -> Result<(), SqlClientError>;

    fn table_exists(&self, table: &str) -> Result<bool, SqlClientError>;

    fn drop_table(&self, table: &str) -> Result<(), SqlClientError>;

    fn create_table_from_rows(&self, table: &str, rows: &RowSet) -> Result<(), SqlClientError>;
}
