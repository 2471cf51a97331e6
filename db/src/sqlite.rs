use std::str::FromStr;

use async_trait::async_trait;
use serde_json::{Value, json};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};
use tracing::{debug, info, warn};

use crate::schema::{DEMO_DATA, SCHEMA_DDL, TABLES, declared_columns};
use crate::{Database, DatabaseResult, DbError, SchemaInfo};

#[derive(Debug, Clone)]
pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    /// Opens (or creates) the database at `url`, e.g. `sqlite://sqlchat.db`.
    pub async fn connect(url: &str) -> Result<Self, DbError> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    /// A private in-memory database backed by one long-lived connection.
    pub async fn in_memory() -> Result<Self, DbError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    /// Creates the `products` and `sales` tables when neither exists.
    ///
    /// Returns `true` when the tables were created by this call.
    pub async fn bootstrap(&self, seed_demo_data: bool) -> Result<bool, DbError> {
        let existing: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN (?1, ?2)",
        )
        .bind(TABLES[0])
        .bind(TABLES[1])
        .fetch_one(&self.pool)
        .await?;

        match existing {
            0 => {
                sqlx::raw_sql(SCHEMA_DDL).execute(&self.pool).await?;
                info!("created products and sales tables");
                if seed_demo_data {
                    sqlx::raw_sql(DEMO_DATA).execute(&self.pool).await?;
                    info!("inserted demo data");
                }
                Ok(true)
            }
            2 => Ok(false),
            _ => Err(DbError::Schema(
                "only one of the products/sales tables exists".to_string(),
            )),
        }
    }

    /// Lists every difference between the live tables and [`SCHEMA_DDL`].
    pub async fn verify_schema(&self) -> Result<Vec<String>, DbError> {
        let live = self.get_schema().await?;
        let mut problems = Vec::new();

        for (table, declared) in declared_columns(SCHEMA_DDL) {
            let Some(columns) = live.columns(&table) else {
                problems.push(format!("table {table} is missing"));
                continue;
            };
            let live_names: Vec<&str> = columns.iter().map(|(name, _)| name.as_str()).collect();
            let declared_names: Vec<&str> = declared.iter().map(|(name, _)| name.as_str()).collect();
            if live_names != declared_names {
                problems.push(format!(
                    "table {table} has columns {live_names:?}, expected {declared_names:?}"
                ));
            }
        }

        if !live
            .references
            .get("products.id")
            .is_some_and(|refs| refs.iter().any(|r| r == "sales.product_id"))
        {
            problems.push("sales.product_id does not reference products.id".to_string());
        }

        Ok(problems)
    }
}

fn column_value(row: &SqliteRow, i: usize) -> Value {
    let Ok(raw) = row.try_get_raw(i) else {
        return Value::Null;
    };
    if raw.is_null() {
        return Value::Null;
    }
    let type_info = raw.type_info();

    match type_info.name() {
        "INTEGER" | "INT8" | "BOOLEAN" => row
            .try_get::<i64, _>(i)
            .map(|v| json!(v))
            .unwrap_or(Value::Null),

        "REAL" | "NUMERIC" => row
            .try_get::<f64, _>(i)
            .map(|v| json!(v))
            .unwrap_or(Value::Null),

        "BLOB" => row
            .try_get::<Vec<u8>, _>(i)
            .map(|bytes| json!(String::from_utf8_lossy(&bytes)))
            .unwrap_or(Value::Null),

        _ => row
            .try_get::<String, _>(i)
            .map(|v| json!(v))
            .unwrap_or(Value::Null),
    }
}

#[async_trait]
impl Database for SqliteDatabase {
    async fn get_results(&self, query: &str) -> Result<DatabaseResult, DbError> {
        debug!(%query, "running query");
        let rows = sqlx::query(query).fetch_all(&self.pool).await?;

        let mut results = DatabaseResult::default();

        if let Some(first) = rows.first() {
            for col in first.columns() {
                results
                    .headers
                    .push((col.name().to_string(), col.type_info().name().to_string()));
            }
        } else {
            return Ok(results);
        }

        for row in &rows {
            let row_data = (0..row.columns().len())
                .map(|i| column_value(row, i))
                .collect();
            results.rows.push(row_data);
        }

        Ok(results)
    }

    async fn execute(&self, query: &str) -> Result<u64, DbError> {
        let result = sqlx::query(query).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn get_schema(&self) -> Result<SchemaInfo, DbError> {
        let columns = sqlx::query(
            r"SELECT
                m.name AS table_name,
                p.name AS column_name,
                p.type AS column_type
            FROM sqlite_master m
            JOIN pragma_table_info(m.name) p
            WHERE m.type = 'table' AND m.name NOT LIKE 'sqlite_%'
            ORDER BY m.name, p.cid",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut schema = SchemaInfo::default();

        for row in &columns {
            let table_name: String = row.try_get("table_name")?;
            let column_name: String = row.try_get("column_name")?;
            let column_type: String = row.try_get("column_type")?;
            schema
                .tables
                .entry(table_name)
                .or_default()
                .push((column_name, column_type));
        }

        let fk_rows = sqlx::query(
            r#"SELECT
                m.name AS referencing_table,
                f."from" AS referencing_column,
                f."table" AS referenced_table,
                f."to" AS referenced_column
            FROM sqlite_master m
            JOIN pragma_foreign_key_list(m.name) f
            WHERE m.type = 'table'"#,
        )
        .fetch_all(&self.pool)
        .await?;

        for row in &fk_rows {
            let referencing_table: String = row.try_get("referencing_table")?;
            let referencing_column: String = row.try_get("referencing_column")?;
            let referenced_table: String = row.try_get("referenced_table")?;
            let referenced_column: Option<String> = row.try_get("referenced_column")?;

            // SQLite leaves `to` empty when the reference targets the primary key.
            let referenced_column = referenced_column.unwrap_or_else(|| "id".to_string());
            let referenced_key = format!("{referenced_table}.{referenced_column}");
            let referencing_key = format!("{referencing_table}.{referencing_column}");

            schema
                .references
                .entry(referenced_key)
                .or_default()
                .push(referencing_key);
        }

        if schema.tables.is_empty() {
            warn!("database has no tables");
        }

        Ok(schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> SqliteDatabase {
        let db = SqliteDatabase::in_memory().await.unwrap();
        assert!(db.bootstrap(true).await.unwrap());
        db
    }

    #[tokio::test]
    async fn bootstrap_is_idempotent() {
        let db = seeded().await;
        assert!(!db.bootstrap(true).await.unwrap());

        let count = db.get_results("SELECT COUNT(*) AS n FROM products").await.unwrap();
        assert_eq!(count.rows, vec![vec![json!(6)]]);
    }

    #[tokio::test]
    async fn half_created_schema_is_rejected() {
        let db = SqliteDatabase::in_memory().await.unwrap();
        db.execute("CREATE TABLE products (id integer PRIMARY KEY)").await.unwrap();

        assert!(matches!(db.bootstrap(false).await, Err(DbError::Schema(_))));
    }

    #[tokio::test]
    async fn values_follow_storage_class() {
        let db = seeded().await;
        let result = db
            .get_results(
                "SELECT id, name, price, stock, NULL AS missing FROM products WHERE id = 2",
            )
            .await
            .unwrap();

        let headers: Vec<_> = result.headers.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(headers, ["id", "name", "price", "stock", "missing"]);
        assert_eq!(
            result.rows[0],
            vec![json!(2), json!("Mechanical Keyboard"), json!(89.5), json!(80), Value::Null]
        );
    }

    #[tokio::test]
    async fn empty_result_has_no_rows() {
        let db = seeded().await;
        let result = db
            .get_results("SELECT * FROM products WHERE category = 'Garden'")
            .await
            .unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn bad_sql_is_an_error_with_message() {
        let db = seeded().await;
        let err = db.get_results("SELECT * FROM nope").await.unwrap_err();
        assert!(err.to_string().contains("no such table"));
    }

    #[tokio::test]
    async fn live_schema_matches_schema_ddl() {
        let db = seeded().await;
        assert!(db.verify_schema().await.unwrap().is_empty());

        let schema = db.get_schema().await.unwrap();
        assert_eq!(
            schema.references.get("products.id"),
            Some(&vec!["sales.product_id".to_string()])
        );
    }

    #[tokio::test]
    async fn verify_schema_reports_drift() {
        let db = SqliteDatabase::in_memory().await.unwrap();
        db.execute("CREATE TABLE products (id integer PRIMARY KEY, name text)")
            .await
            .unwrap();

        let problems = db.verify_schema().await.unwrap();
        assert!(problems.iter().any(|p| p.contains("table products has columns")));
        assert!(problems.iter().any(|p| p == "table sales is missing"));
    }
}
