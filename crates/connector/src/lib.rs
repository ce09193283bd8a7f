//! SQL connectors used by the data dictionary creator and the text-to-SQL pipeline.

pub mod connector;
pub mod engine;
pub mod error;
pub mod guard;
pub mod postgres;
pub mod sqlite;

pub use connector::{apply_row_limit, Row, SqlConnector};
pub use engine::{create_connector, DatabaseEngine};
pub use error::ConnectorError;
pub use guard::validate_read_only;
pub use postgres::PostgresSqlConnector;
pub use sqlite::SqliteSqlConnector;
