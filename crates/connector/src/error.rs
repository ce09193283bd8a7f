use thiserror::Error;

/// Errors produced while connecting to or querying a database.
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("unknown database engine '{0}'")]
    UnknownEngine(String),

    #[error("database engine {0} is not available in this build; use POSTGRES or SQLITE")]
    EngineUnavailable(String),

    #[error("could not connect to the database: {0}. Check the connection string and network access")]
    Connection(String),

    #[error("permission denied: {0}. Check the database user's grants")]
    Permission(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("only read-only SELECT statements may be executed: {0}")]
    NotReadOnly(String),
}

impl From<sqlx::Error> for ConnectorError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) => {
                // 42501 insufficient_privilege (Postgres); SQLITE_AUTH / SQLITE_PERM
                match db.code().as_deref() {
                    Some("42501") | Some("23") | Some("3") => {
                        ConnectorError::Permission(db.message().to_string())
                    }
                    _ => ConnectorError::Query(db.message().to_string()),
                }
            }
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Configuration(_) => ConnectorError::Connection(err.to_string()),
            _ => ConnectorError::Query(err.to_string()),
        }
    }
}
