use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{json, Number, Value};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Row as _, TypeInfo, ValueRef};
use tracing::{debug, info};

use crate::connector::{Row, SqlConnector};
use crate::engine::DatabaseEngine;
use crate::error::ConnectorError;

const MAX_CONNECTIONS: u32 = 20;

/// PostgreSQL connector backed by an sqlx pool.
pub struct PostgresSqlConnector {
    pool: PgPool,
    database: Option<String>,
}

impl PostgresSqlConnector {
    pub async fn connect(connection_string: &str) -> Result<Self, ConnectorError> {
        let options: PgConnectOptions = connection_string
            .parse()
            .map_err(|e: sqlx::Error| ConnectorError::Connection(e.to_string()))?;
        let database = options.get_database().map(str::to_string);

        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await?;

        info!(database = ?database, "PostgreSQL connected");
        Ok(Self { pool, database })
    }

    pub fn from_pool(pool: PgPool, database: Option<String>) -> Self {
        Self { pool, database }
    }
}

#[async_trait]
impl SqlConnector for PostgresSqlConnector {
    fn engine(&self) -> DatabaseEngine {
        DatabaseEngine::Postgres
    }

    async fn query_execution(&self, sql: &str) -> Result<Vec<Row>, ConnectorError> {
        debug!(sql, "executing postgres query");
        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(pg_row_to_json).collect())
    }

    fn excluded_engine_specific_fields(&self) -> Vec<&'static str> {
        vec!["Warehouse", "Catalog"]
    }

    fn database(&self) -> Option<String> {
        self.database.clone()
    }
}

fn pg_row_to_json(row: &PgRow) -> Row {
    let mut out = Row::new();
    for column in row.columns() {
        let idx = column.ordinal();
        out.insert(column.name().to_string(), pg_value(row, idx));
    }
    out
}

fn pg_value(row: &PgRow, idx: usize) -> Value {
    let Ok(raw) = row.try_get_raw(idx) else {
        return Value::Null;
    };
    if raw.is_null() {
        return Value::Null;
    }
    let type_name = raw.type_info().name().to_string();

    let value = match type_name.as_str() {
        "BOOL" => row.try_get::<bool, _>(idx).map(Value::from),
        "INT2" => row.try_get::<i16, _>(idx).map(Value::from),
        "INT4" => row.try_get::<i32, _>(idx).map(Value::from),
        "INT8" => row.try_get::<i64, _>(idx).map(Value::from),
        "FLOAT4" => row.try_get::<f32, _>(idx).map(|v| json!(v)),
        "FLOAT8" => row.try_get::<f64, _>(idx).map(|v| json!(v)),
        "NUMERIC" => row.try_get::<Decimal, _>(idx).map(numeric_to_json),
        "DATE" => row
            .try_get::<chrono::NaiveDate, _>(idx)
            .map(|v| Value::from(v.to_string())),
        "TIMESTAMP" => row
            .try_get::<chrono::NaiveDateTime, _>(idx)
            .map(|v| Value::from(v.to_string())),
        "TIMESTAMPTZ" => row
            .try_get::<chrono::DateTime<chrono::Utc>, _>(idx)
            .map(|v| Value::from(v.to_rfc3339())),
        "UUID" => row
            .try_get::<uuid::Uuid, _>(idx)
            .map(|v| Value::from(v.to_string())),
        "JSON" | "JSONB" => row.try_get::<Value, _>(idx),
        _ => row.try_get::<String, _>(idx).map(Value::from),
    };

    value.unwrap_or_else(|e| {
        debug!(column = idx, type_name, error = %e, "unsupported postgres value, using null");
        Value::Null
    })
}

/// Integral values stay exact; fractional ones become floats. Anything a
/// JSON number cannot hold is kept as its decimal string.
fn numeric_to_json(value: Decimal) -> Value {
    if value.fract().is_zero() {
        if let Some(n) = value.to_i64() {
            return Value::from(n);
        }
    }
    value
        .to_f64()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::from(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn numeric_becomes_a_json_number() {
        let price = Decimal::from_str("19.99").unwrap();
        assert_eq!(numeric_to_json(price), json!(19.99));

        let total = Decimal::from_str("1250.00").unwrap();
        assert_eq!(numeric_to_json(total), json!(1250));

        let negative = Decimal::from_str("-3.5").unwrap();
        assert_eq!(numeric_to_json(negative), json!(-3.5));
    }

    #[test]
    fn numeric_beyond_i64_stays_numeric() {
        let big = Decimal::from_str("12345678901234567890123").unwrap();
        let value = numeric_to_json(big);
        assert!(value.is_number());
        assert!(value.as_f64().unwrap() > 1.2e22);
    }
}
