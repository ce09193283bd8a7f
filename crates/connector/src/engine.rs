use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::connector::SqlConnector;
use crate::error::ConnectorError;
use crate::postgres::PostgresSqlConnector;
use crate::sqlite::SqliteSqlConnector;

/// Database engines recognised by `Text2Sql__DatabaseEngine`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DatabaseEngine {
    Postgres,
    Sqlite,
    Tsql,
    Databricks,
    Snowflake,
}

impl FromStr for DatabaseEngine {
    type Err = ConnectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "POSTGRES" | "POSTGRESQL" => Ok(DatabaseEngine::Postgres),
            "SQLITE" => Ok(DatabaseEngine::Sqlite),
            "TSQL" => Ok(DatabaseEngine::Tsql),
            "DATABRICKS" => Ok(DatabaseEngine::Databricks),
            "SNOWFLAKE" => Ok(DatabaseEngine::Snowflake),
            _ => Err(ConnectorError::UnknownEngine(s.to_string())),
        }
    }
}

impl fmt::Display for DatabaseEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseEngine::Postgres => write!(f, "POSTGRES"),
            DatabaseEngine::Sqlite => write!(f, "SQLITE"),
            DatabaseEngine::Tsql => write!(f, "TSQL"),
            DatabaseEngine::Databricks => write!(f, "DATABRICKS"),
            DatabaseEngine::Snowflake => write!(f, "SNOWFLAKE"),
        }
    }
}

/// Create the connector for an engine name and connection string.
pub async fn create_connector(
    engine: &str,
    connection_string: &str,
) -> Result<Arc<dyn SqlConnector>, ConnectorError> {
    match engine.parse::<DatabaseEngine>()? {
        DatabaseEngine::Postgres => Ok(Arc::new(
            PostgresSqlConnector::connect(connection_string).await?,
        )),
        DatabaseEngine::Sqlite => Ok(Arc::new(
            SqliteSqlConnector::connect(connection_string).await?,
        )),
        other => Err(ConnectorError::EngineUnavailable(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_names_are_case_insensitive() {
        assert_eq!("postgres".parse::<DatabaseEngine>().unwrap(), DatabaseEngine::Postgres);
        assert_eq!("SQLite".parse::<DatabaseEngine>().unwrap(), DatabaseEngine::Sqlite);
        assert_eq!(" tsql ".parse::<DatabaseEngine>().unwrap(), DatabaseEngine::Tsql);
    }

    #[test]
    fn unknown_engine_is_rejected() {
        let err = "oracle".parse::<DatabaseEngine>().unwrap_err();
        assert!(matches!(err, ConnectorError::UnknownEngine(name) if name == "oracle"));
    }

    #[tokio::test]
    async fn unsupported_engine_reports_unavailable() {
        let err = create_connector("SNOWFLAKE", "ignored").await.err().unwrap();
        assert!(matches!(err, ConnectorError::EngineUnavailable(ref e) if e == "SNOWFLAKE"));
    }

    #[tokio::test]
    async fn sqlite_factory_connects_in_memory() {
        let conn = create_connector("sqlite", "sqlite::memory:").await.unwrap();
        assert_eq!(conn.engine(), DatabaseEngine::Sqlite);
        let rows = conn.query_execution("SELECT 1 AS one").await.unwrap();
        assert_eq!(rows[0]["one"], serde_json::json!(1));
    }
}
