//! Engine-specific extraction SQL.
//!
//! Every query returns the column names documented on the trait method so
//! the creator can read rows without knowing the engine.

use nl2sql_connector::DatabaseEngine;

use crate::error::DictionaryError;
use crate::model::{ColumnItem, EntityItem};

/// Escape a value for inclusion inside a single-quoted SQL literal.
fn literal(value: &str) -> String {
    value.replace('\'', "''")
}

/// Double-quote an identifier.
fn ident(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

pub trait Dialect: Send + Sync {
    /// Columns: `Entity, EntitySchema, Definition`.
    fn extract_table_entities_sql_query(&self) -> String;

    /// Columns: `Entity, EntitySchema, Definition`.
    fn extract_view_entities_sql_query(&self) -> String;

    /// Columns: `Name, DataType, Definition`.
    fn extract_columns_sql_query(&self, entity: &EntityItem) -> String;

    /// Columns: `EntitySchema, Entity, ForeignEntitySchema, ForeignEntity, Column, ForeignColumn`.
    fn extract_entity_relationships_sql_query(&self) -> String;

    /// One column named after `column.name`, newest/highest values first.
    fn extract_distinct_values_sql_query(&self, entity: &EntityItem, column: &ColumnItem) -> String {
        format!(
            "SELECT DISTINCT {col} FROM {schema}.{entity} WHERE {col} IS NOT NULL ORDER BY {col} DESC;",
            col = column.name,
            schema = entity.entity_schema,
            entity = entity.entity,
        )
    }
}

/// Pick the dialect for an engine.
pub fn dialect_for(engine: DatabaseEngine) -> Result<Box<dyn Dialect>, DictionaryError> {
    match engine {
        DatabaseEngine::Postgres => Ok(Box::new(PostgresDialect)),
        DatabaseEngine::Sqlite => Ok(Box::new(SqliteDialect)),
        other => Err(DictionaryError::UnsupportedEngine(other.to_string())),
    }
}

// ── PostgreSQL ────────────────────────────────────────────────

pub struct PostgresDialect;

impl PostgresDialect {
    fn entities_of_type(table_type: &str) -> String {
        format!(
            r#"SELECT t.table_name::text AS "Entity",
       t.table_schema::text AS "EntitySchema",
       obj_description(format('%I.%I', t.table_schema, t.table_name)::regclass, 'pg_class') AS "Definition"
FROM information_schema.tables t
WHERE t.table_type = '{table_type}'
  AND t.table_schema NOT IN ('pg_catalog', 'information_schema')
ORDER BY t.table_schema, t.table_name;"#
        )
    }
}

impl Dialect for PostgresDialect {
    fn extract_table_entities_sql_query(&self) -> String {
        Self::entities_of_type("BASE TABLE")
    }

    fn extract_view_entities_sql_query(&self) -> String {
        Self::entities_of_type("VIEW")
    }

    fn extract_columns_sql_query(&self, entity: &EntityItem) -> String {
        format!(
            r#"SELECT c.column_name::text AS "Name",
       c.data_type::text AS "DataType",
       col_description(format('%I.%I', c.table_schema, c.table_name)::regclass, c.ordinal_position::int) AS "Definition"
FROM information_schema.columns c
WHERE c.table_schema = '{schema}' AND c.table_name = '{entity}'
ORDER BY c.ordinal_position;"#,
            schema = literal(&entity.entity_schema),
            entity = literal(&entity.entity),
        )
    }

    fn extract_entity_relationships_sql_query(&self) -> String {
        // conkey and confkey are parallel arrays; unnesting them together keeps
        // composite keys paired by position.
        r#"SELECT ns.nspname::text AS "EntitySchema",
       cl.relname::text AS "Entity",
       fns.nspname::text AS "ForeignEntitySchema",
       fcl.relname::text AS "ForeignEntity",
       a.attname::text AS "Column",
       fa.attname::text AS "ForeignColumn"
FROM pg_constraint con
CROSS JOIN LATERAL unnest(con.conkey, con.confkey) WITH ORDINALITY AS k(attnum, foreign_attnum, ord)
JOIN pg_class cl ON cl.oid = con.conrelid
JOIN pg_namespace ns ON ns.oid = cl.relnamespace
JOIN pg_class fcl ON fcl.oid = con.confrelid
JOIN pg_namespace fns ON fns.oid = fcl.relnamespace
JOIN pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = k.attnum
JOIN pg_attribute fa ON fa.attrelid = con.confrelid AND fa.attnum = k.foreign_attnum
WHERE con.contype = 'f'
ORDER BY ns.nspname, cl.relname, con.conname, k.ord;"#
            .to_string()
    }

    fn extract_distinct_values_sql_query(&self, entity: &EntityItem, column: &ColumnItem) -> String {
        let col = ident(&column.name);
        format!(
            "SELECT DISTINCT {col} FROM {schema}.{entity} WHERE {col} IS NOT NULL ORDER BY {col} DESC;",
            schema = ident(&entity.entity_schema),
            entity = ident(&entity.entity),
        )
    }
}

// ── SQLite ────────────────────────────────────────────────────

/// SQLite has a single schema, reported as `main`.
pub struct SqliteDialect;

impl SqliteDialect {
    fn entities_of_type(kind: &str) -> String {
        format!(
            "SELECT name AS Entity, 'main' AS EntitySchema, NULL AS Definition \
             FROM sqlite_master WHERE type = '{kind}' AND name NOT LIKE 'sqlite_%' ORDER BY name;"
        )
    }
}

impl Dialect for SqliteDialect {
    fn extract_table_entities_sql_query(&self) -> String {
        Self::entities_of_type("table")
    }

    fn extract_view_entities_sql_query(&self) -> String {
        Self::entities_of_type("view")
    }

    fn extract_columns_sql_query(&self, entity: &EntityItem) -> String {
        format!(
            "SELECT name AS Name, type AS DataType, NULL AS Definition \
             FROM pragma_table_info('{}') ORDER BY cid;",
            literal(&entity.entity)
        )
    }

    fn extract_entity_relationships_sql_query(&self) -> String {
        // A foreign key declared without a column list targets the primary key,
        // matched column by column on key position.
        r#"SELECT 'main' AS EntitySchema,
       m.name AS Entity,
       'main' AS ForeignEntitySchema,
       p."table" AS ForeignEntity,
       p."from" AS "Column",
       COALESCE(p."to", (SELECT ti.name FROM pragma_table_info(p."table") ti WHERE ti.pk = p.seq + 1)) AS ForeignColumn
FROM sqlite_master m
JOIN pragma_foreign_key_list(m.name) p
WHERE m.type = 'table'
ORDER BY m.name, p.id, p.seq;"#
            .to_string()
    }

    fn extract_distinct_values_sql_query(&self, entity: &EntityItem, column: &ColumnItem) -> String {
        let col = ident(&column.name);
        format!(
            "SELECT DISTINCT {col} FROM {entity} WHERE {col} IS NOT NULL ORDER BY {col} DESC;",
            entity = ident(&entity.entity),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_distinct_query_matches_documented_shape() {
        struct Plain;
        impl Dialect for Plain {
            fn extract_table_entities_sql_query(&self) -> String {
                String::new()
            }
            fn extract_view_entities_sql_query(&self) -> String {
                String::new()
            }
            fn extract_columns_sql_query(&self, _: &EntityItem) -> String {
                String::new()
            }
            fn extract_entity_relationships_sql_query(&self) -> String {
                String::new()
            }
        }

        let entity = EntityItem::new("dbo", "Orders");
        let column = ColumnItem::new("Status", "nvarchar");
        assert_eq!(
            Plain.extract_distinct_values_sql_query(&entity, &column),
            "SELECT DISTINCT Status FROM dbo.Orders WHERE Status IS NOT NULL ORDER BY Status DESC;"
        );
    }

    #[test]
    fn postgres_quotes_identifiers_and_literals() {
        let entity = EntityItem::new("sales", "o'rders");
        let sql = PostgresDialect.extract_columns_sql_query(&entity);
        assert!(sql.contains("c.table_name = 'o''rders'"));

        let column = ColumnItem::new("Order Status", "text");
        let sql = PostgresDialect.extract_distinct_values_sql_query(&entity, &column);
        assert!(sql.starts_with("SELECT DISTINCT \"Order Status\" FROM \"sales\".\"o'rders\""));
    }

    #[test]
    fn sqlite_distinct_query_has_no_schema_prefix() {
        let entity = EntityItem::new("main", "products");
        let column = ColumnItem::new("name", "TEXT");
        let sql = SqliteDialect.extract_distinct_values_sql_query(&entity, &column);
        assert_eq!(
            sql,
            "SELECT DISTINCT \"name\" FROM \"products\" WHERE \"name\" IS NOT NULL ORDER BY \"name\" DESC;"
        );
    }

    #[test]
    fn postgres_relationships_pair_composite_keys_by_position() {
        let sql = PostgresDialect.extract_entity_relationships_sql_query();
        assert!(sql.contains("unnest(con.conkey, con.confkey) WITH ORDINALITY"));
        assert!(sql.contains("a.attnum = k.attnum"));
        assert!(sql.contains("fa.attnum = k.foreign_attnum"));
        assert!(!sql.contains("constraint_column_usage"));
        for column in ["EntitySchema", "Entity", "ForeignEntitySchema", "ForeignEntity", "Column", "ForeignColumn"] {
            assert!(sql.contains(&format!("AS \"{column}\"")), "{column}");
        }
    }

    #[tokio::test]
    async fn sqlite_composite_key_without_column_list_follows_primary_key_order() {
        use nl2sql_connector::{SqlConnector, SqliteSqlConnector};

        let conn = SqliteSqlConnector::connect("sqlite::memory:").await.unwrap();
        for stmt in [
            "CREATE TABLE parent (a INTEGER, b INTEGER, PRIMARY KEY (a, b))",
            "CREATE TABLE child (x INTEGER, y INTEGER, FOREIGN KEY (x, y) REFERENCES parent)",
        ] {
            conn.query_execution(stmt).await.unwrap();
        }

        let rows = conn
            .query_execution(&SqliteDialect.extract_entity_relationships_sql_query())
            .await
            .unwrap();
        let pairs: Vec<(&str, &str)> = rows
            .iter()
            .map(|r| (r["Column"].as_str().unwrap(), r["ForeignColumn"].as_str().unwrap()))
            .collect();
        assert_eq!(pairs, vec![("x", "a"), ("y", "b")]);
        assert!(rows.iter().all(|r| r["Entity"] == "child" && r["ForeignEntity"] == "parent"));
    }

    #[test]
    fn dialect_lookup() {
        assert!(dialect_for(DatabaseEngine::Postgres).is_ok());
        assert!(dialect_for(DatabaseEngine::Sqlite).is_ok());
        assert!(matches!(
            dialect_for(DatabaseEngine::Snowflake),
            Err(DictionaryError::UnsupportedEngine(_))
        ));
    }
}
