use nl2sql_connector::ConnectorError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DictionaryError {
    #[error("cannot pass both entities and excluded_entities; pass only one")]
    ConflictingFilters,

    #[error("row is missing column '{0}'")]
    MissingColumn(&'static str),

    #[error("no data dictionary dialect for engine {0}")]
    UnsupportedEngine(String),

    #[error(transparent)]
    Connector(#[from] ConnectorError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
