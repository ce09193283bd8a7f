pub mod creator;
pub mod dialect;
pub mod error;
pub mod model;
pub mod relationships;
pub mod writer;

pub use creator::{CreatorOptions, DataDictionaryCreator, RetryPolicy};
pub use dialect::{dialect_for, Dialect, PostgresDialect, SqliteDialect};
pub use error::DictionaryError;
pub use model::{ColumnItem, EntityItem, EntityRelationship, ForeignKeyRelationship};
pub use relationships::{RelationshipGraph, RelationshipIndex};
pub use writer::DictionaryWriter;
