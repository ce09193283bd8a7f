use std::str::FromStr;

use async_trait::async_trait;
use serde_json::{json, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row as _, TypeInfo, ValueRef};
use tracing::{debug, info};

use crate::connector::{Row, SqlConnector};
use crate::engine::DatabaseEngine;
use crate::error::ConnectorError;

/// SQLite connector. In-memory databases are pinned to a single connection
/// so every query sees the same database.
pub struct SqliteSqlConnector {
    pool: SqlitePool,
}

impl SqliteSqlConnector {
    pub async fn connect(connection_string: &str) -> Result<Self, ConnectorError> {
        let options = SqliteConnectOptions::from_str(connection_string)
            .map_err(|e| ConnectorError::Connection(e.to_string()))?;

        let in_memory = connection_string.contains(":memory:");
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 8 })
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        info!(in_memory, "SQLite connected");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl SqlConnector for SqliteSqlConnector {
    fn engine(&self) -> DatabaseEngine {
        DatabaseEngine::Sqlite
    }

    async fn query_execution(&self, sql: &str) -> Result<Vec<Row>, ConnectorError> {
        debug!(sql, "executing sqlite query");
        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(sqlite_row_to_json).collect())
    }

    fn excluded_engine_specific_fields(&self) -> Vec<&'static str> {
        vec!["Warehouse", "Catalog", "Database"]
    }
}

fn sqlite_row_to_json(row: &SqliteRow) -> Row {
    let mut out = Row::new();
    for column in row.columns() {
        let idx = column.ordinal();
        out.insert(column.name().to_string(), sqlite_value(row, idx));
    }
    out
}

fn sqlite_value(row: &SqliteRow, idx: usize) -> Value {
    let Ok(raw) = row.try_get_raw(idx) else {
        return Value::Null;
    };
    if raw.is_null() {
        return Value::Null;
    }
    let type_name = raw.type_info().name().to_ascii_uppercase();

    // SQLite is dynamically typed; decode by storage class.
    let value = match type_name.as_str() {
        "BOOLEAN" => row.try_get_unchecked::<bool, _>(idx).map(Value::from),
        "INTEGER" | "INT" | "BIGINT" | "INT8" => {
            row.try_get_unchecked::<i64, _>(idx).map(Value::from)
        }
        "REAL" | "FLOAT" | "DOUBLE" | "NUMERIC" => {
            row.try_get_unchecked::<f64, _>(idx).map(|v| json!(v))
        }
        "BLOB" => row
            .try_get_unchecked::<Vec<u8>, _>(idx)
            .map(|v| Value::from(String::from_utf8_lossy(&v).into_owned())),
        _ => row.try_get_unchecked::<String, _>(idx).map(Value::from),
    };

    value.unwrap_or_else(|e| {
        debug!(column = idx, type_name, error = %e, "unsupported sqlite value, using null");
        Value::Null
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> SqliteSqlConnector {
        let conn = SqliteSqlConnector::connect("sqlite::memory:").await.unwrap();
        sqlx::query(
            "CREATE TABLE products (id INTEGER PRIMARY KEY, name TEXT, price REAL, note TEXT)",
        )
        .execute(conn.pool())
        .await
        .unwrap();
        sqlx::query("INSERT INTO products VALUES (1, 'Widget', 9.5, NULL), (2, 'Gadget', 12.0, 'new')")
            .execute(conn.pool())
            .await
            .unwrap();
        conn
    }

    #[tokio::test]
    async fn rows_map_to_typed_json() {
        let conn = seeded().await;
        let rows = conn
            .query_execution("SELECT id, name, price, note FROM products ORDER BY id")
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["id"], json!(1));
        assert_eq!(rows[0]["name"], json!("Widget"));
        assert_eq!(rows[0]["price"], json!(9.5));
        assert_eq!(rows[0]["note"], Value::Null);
        assert_eq!(rows[1]["note"], json!("new"));
    }

    #[tokio::test]
    async fn column_order_follows_select_list() {
        let conn = seeded().await;
        let rows = conn
            .query_execution("SELECT price, id FROM products WHERE id = 2")
            .await
            .unwrap();
        let keys: Vec<&String> = rows[0].keys().collect();
        assert_eq!(keys, vec!["price", "id"]);
    }

    #[tokio::test]
    async fn syntax_error_is_a_query_error() {
        let conn = seeded().await;
        let err = conn.query_execution("SELEC id FROM products").await.unwrap_err();
        assert!(matches!(err, ConnectorError::Query(_)));
    }

    #[tokio::test]
    async fn sqlite_excludes_all_identifier_fields() {
        let pool = SqlitePoolOptions::new().connect_lazy("sqlite::memory:").unwrap();
        let conn = SqliteSqlConnector::from_pool(pool);
        assert_eq!(
            conn.excluded_engine_specific_fields(),
            vec!["Warehouse", "Catalog", "Database"]
        );
        assert_eq!(conn.database(), None);
    }
}
