pub mod schema;
pub mod sqlite;

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

pub use schema::SCHEMA_DDL;
pub use sqlite::SqliteDatabase;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("{0}")]
    Query(#[from] sqlx::Error),

    #[error("unexpected schema: {0}")]
    Schema(String),
}

/// Trait defining the interface for database operations
#[async_trait]
pub trait Database: Send + Sync + std::fmt::Debug {
    /// Execute a query and return its rows.
    /// Rows keep the column order of the statement's result set.
    async fn get_results(&self, query: &str) -> Result<DatabaseResult, DbError>;

    /// Execute an sql statement and return the number of affected rows
    async fn execute(&self, query: &str) -> Result<u64, DbError>;

    /// Get the live schema: every table with its columns, and every foreign key
    /// reference keyed by the referenced `table.column`.
    async fn get_schema(&self) -> Result<SchemaInfo, DbError>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatabaseResult {
    /// `(column_name, column_type)` in result-set order.
    pub headers: Vec<(String, String)>,
    pub rows: Vec<Vec<Value>>,
}

impl DatabaseResult {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Iterates rows as ordered `(column, value)` records.
    pub fn records(&self) -> impl Iterator<Item = Vec<(&str, &Value)>> + '_ {
        self.rows.iter().map(|row| {
            self.headers
                .iter()
                .map(|(name, _)| name.as_str())
                .zip(row.iter())
                .collect()
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaInfo {
    /// Table name to `(column_name, declared_type)` in declaration order.
    pub tables: BTreeMap<String, Vec<(String, String)>>,
    /// `table.column` to every `table.column` referencing it.
    pub references: BTreeMap<String, Vec<String>>,
}

impl SchemaInfo {
    #[must_use]
    pub fn columns(&self, table: &str) -> Option<&[(String, String)]> {
        self.tables.get(table).map(Vec::as_slice)
    }
}
