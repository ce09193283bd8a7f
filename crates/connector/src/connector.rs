use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::engine::DatabaseEngine;
use crate::error::ConnectorError;

/// A result row: column name to JSON value, in select-list order.
pub type Row = Map<String, Value>;

/// A read path into a SQL database.
#[async_trait]
pub trait SqlConnector: Send + Sync {
    fn engine(&self) -> DatabaseEngine;

    /// Run a statement and return every row.
    async fn query_execution(&self, sql: &str) -> Result<Vec<Row>, ConnectorError>;

    /// Identifier fields (`Warehouse`, `Catalog`, `Database`) that carry no
    /// meaning for this engine and are dropped from data dictionary output.
    fn excluded_engine_specific_fields(&self) -> Vec<&'static str>;

    /// Logical database name used when building fully-qualified names.
    fn database(&self) -> Option<String> {
        None
    }

    fn warehouse(&self) -> Option<String> {
        None
    }

    fn catalog(&self) -> Option<String> {
        None
    }
}

/// Truncate a result set to at most `limit` rows.
pub fn apply_row_limit(mut rows: Vec<Row>, limit: usize) -> Vec<Row> {
    rows.truncate(limit);
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn row_limit_truncates() {
        let rows: Vec<Row> = (0..5)
            .map(|i| {
                let mut r = Row::new();
                r.insert("n".into(), json!(i));
                r
            })
            .collect();
        let limited = apply_row_limit(rows, 3);
        assert_eq!(limited.len(), 3);
        assert_eq!(limited[2]["n"], json!(2));
    }

    #[test]
    fn row_limit_larger_than_rows() {
        let limited = apply_row_limit(vec![Row::new()], 10);
        assert_eq!(limited.len(), 1);
    }
}
