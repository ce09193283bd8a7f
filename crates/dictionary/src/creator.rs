//! Builds a data dictionary by querying a live database.
//!
//! The creator reads tables and views, their columns, foreign-key
//! relationships and distinct column values, then writes the schema store
//! and column value store files that the search indexers pick up.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use rand::seq::SliceRandom;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use nl2sql_connector::{Row, SqlConnector};

use crate::dialect::{dialect_for, Dialect};
use crate::error::DictionaryError;
use crate::model::{ColumnItem, EntityItem, EntityRelationship};
use crate::relationships::{RelationshipGraph, RelationshipIndex};
use crate::writer::DictionaryWriter;

/// Maximum number of in-flight database queries.
const DATABASE_CONCURRENCY: usize = 20;

/// Number of sample values kept per column.
const SAMPLE_SIZE: usize = 5;

#[derive(Debug, Clone, Default)]
pub struct CreatorOptions {
    /// Only these entities (exact names). `None` means all.
    pub entities: Option<Vec<String>>,
    pub excluded_entities: Vec<String>,
    pub excluded_schemas: Vec<String>,
    /// Write one `entities.json` instead of one file per entity.
    pub single_file: bool,
    pub output_directory: Option<PathBuf>,
}

/// Exponential backoff for database queries.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay after the `attempt`-th failure (1-based): 1s, 2s, 4s, ... capped.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.min_delay
            .saturating_mul(factor)
            .clamp(self.min_delay, self.max_delay)
    }
}

pub struct DataDictionaryCreator {
    connector: Arc<dyn SqlConnector>,
    dialect: Box<dyn Dialect>,
    entities: Option<Vec<String>>,
    excluded_entities: Vec<String>,
    excluded_schemas: Vec<String>,
    single_file: bool,
    writer: DictionaryWriter,

    warehouse: Option<String>,
    database: Option<String>,
    catalog: Option<String>,

    relationships: RelationshipIndex,
    graph: RelationshipGraph,

    database_semaphore: Semaphore,
    retry: RetryPolicy,
}

impl DataDictionaryCreator {
    /// Create a creator for the connector's engine.
    pub fn new(
        connector: Arc<dyn SqlConnector>,
        options: CreatorOptions,
    ) -> Result<Self, DictionaryError> {
        let dialect = dialect_for(connector.engine())?;
        Self::with_dialect(connector, dialect, options)
    }

    pub fn with_dialect(
        connector: Arc<dyn SqlConnector>,
        dialect: Box<dyn Dialect>,
        options: CreatorOptions,
    ) -> Result<Self, DictionaryError> {
        if options.entities.is_some() && !options.excluded_entities.is_empty() {
            return Err(DictionaryError::ConflictingFilters);
        }

        let lower = |v: Vec<String>| v.into_iter().map(|x| x.to_lowercase()).collect();

        Ok(Self {
            warehouse: connector.warehouse(),
            database: connector.database(),
            catalog: connector.catalog(),
            connector,
            dialect,
            entities: options.entities,
            excluded_entities: lower(options.excluded_entities),
            excluded_schemas: lower(options.excluded_schemas),
            single_file: options.single_file,
            writer: DictionaryWriter::new(
                options.output_directory.unwrap_or_else(|| PathBuf::from(".")),
            ),
            relationships: RelationshipIndex::new(),
            graph: RelationshipGraph::new(),
            database_semaphore: Semaphore::new(DATABASE_CONCURRENCY),
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn relationships(&self) -> &RelationshipIndex {
        &self.relationships
    }

    pub fn graph(&self) -> &RelationshipGraph {
        &self.graph
    }

    /// Run a query under the concurrency limit, retrying with backoff.
    async fn query_entities(&self, sql: &str) -> Result<Vec<Row>, DictionaryError> {
        let mut attempt = 1;
        loop {
            let result = {
                let _permit = self.database_semaphore.acquire().await.ok();
                self.connector.query_execution(sql).await
            };

            match result {
                Ok(rows) => return Ok(rows),
                Err(e) if attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_after(attempt);
                    warn!(attempt, error = %e, ?delay, "query failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Tables and views after applying the entity filters.
    pub async fn extract_entities_with_definitions(
        &self,
    ) -> Result<Vec<EntityItem>, DictionaryError> {
        let mut rows = self
            .query_entities(&self.dialect.extract_table_entities_sql_query())
            .await?;
        rows.extend(
            self.query_entities(&self.dialect.extract_view_entities_sql_query())
                .await?,
        );

        let mut entities = rows
            .iter()
            .map(EntityItem::from_row)
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(wanted) = &self.entities {
            entities.retain(|e| wanted.contains(&e.entity));
        }

        if !self.excluded_entities.is_empty() || !self.excluded_schemas.is_empty() {
            entities.retain(|e| {
                !self.excluded_entities.contains(&e.name.to_lowercase())
                    && !self.excluded_schemas.contains(&e.entity_schema.to_lowercase())
            });
        }

        for entity in &mut entities {
            entity.warehouse = self.warehouse.clone();
            entity.database = self.database.clone();
            entity.catalog = self.catalog.clone();
        }

        info!("Extracted {} entities", entities.len());
        Ok(entities)
    }

    /// Load foreign keys and index them in both directions.
    pub async fn extract_entity_relationships(&mut self) -> Result<(), DictionaryError> {
        let rows = self
            .query_entities(&self.dialect.extract_entity_relationships_sql_query())
            .await?;

        let mut relationships = rows
            .iter()
            .map(EntityRelationship::from_row)
            .collect::<Result<Vec<_>, _>>()?;

        info!("Extracted {} relationships", relationships.len());

        for relationship in &mut relationships {
            relationship.warehouse = self.warehouse.clone();
            relationship.database = self.database.clone();
            relationship.catalog = self.catalog.clone();
            relationship.foreign_warehouse = self.warehouse.clone();
            relationship.foreign_database = self.database.clone();
            relationship.foreign_catalog = self.catalog.clone();
        }

        self.relationships.ingest(relationships);
        Ok(())
    }

    pub fn build_entity_relationship_graph(&mut self) {
        self.graph = RelationshipGraph::from_index(&self.relationships);
        info!(
            nodes = self.graph.node_count(),
            edges = self.graph.edge_count(),
            "Relationship graph built"
        );
    }

    /// Join paths from `fqn` through the relationship graph.
    pub fn get_entity_relationships_from_graph(&self, fqn: &str) -> Vec<String> {
        self.graph.paths_from(fqn)
    }

    /// Fill `distinct_values` and `sample_values`; string columns also get a
    /// column value store file. Query failures are logged, not propagated.
    pub async fn extract_column_distinct_values(
        &self,
        entity: &EntityItem,
        column: &mut ColumnItem,
    ) -> Result<(), DictionaryError> {
        let sql = self.dialect.extract_distinct_values_sql_query(entity, column);
        match self.query_entities(&sql).await {
            Ok(rows) => {
                let values = rows
                    .into_iter()
                    .filter_map(|mut row| row.remove(&column.name))
                    .filter(|v| !v.is_null())
                    .map(|v| match v {
                        Value::String(s) => Value::String(strip_control_whitespace(&s)),
                        other => other,
                    })
                    .collect();
                column.distinct_values = Some(values);
            }
            Err(e) => {
                error!(column = %column.name, error = %e, "Error extracting values");
            }
        }

        column.sample_values = column.distinct_values.as_ref().map(|values| {
            if values.len() > SAMPLE_SIZE {
                let mut rng = rand::thread_rng();
                values.choose_multiple(&mut rng, SAMPLE_SIZE).cloned().collect()
            } else {
                values.clone()
            }
        });

        if column.is_string_type() {
            self.write_columns_to_file(entity, column)?;
        }
        Ok(())
    }

    fn write_columns_to_file(
        &self,
        entity: &EntityItem,
        column: &ColumnItem,
    ) -> Result<(), DictionaryError> {
        info!("Saving column values for {}", column.name);
        let excluded = self.connector.excluded_engine_specific_fields();
        let entries: Vec<_> = column
            .distinct_values
            .iter()
            .flatten()
            .map(|value| column.value_store_entry(entity, value, &excluded))
            .collect();
        let key = format!("{}.{}", entity.fqn(), column.name);
        self.writer.write_column_values(&key, &entries)?;
        Ok(())
    }

    /// Columns for an entity, with distinct values gathered concurrently.
    pub async fn extract_columns_with_definitions(
        &self,
        entity: &EntityItem,
    ) -> Result<Vec<ColumnItem>, DictionaryError> {
        let rows = self
            .query_entities(&self.dialect.extract_columns_sql_query(entity))
            .await?;
        let mut columns = rows
            .iter()
            .map(ColumnItem::from_row)
            .collect::<Result<Vec<_>, _>>()?;

        let tasks = columns
            .iter_mut()
            .map(|column| self.extract_column_distinct_values(entity, column));
        for result in join_all(tasks).await {
            result?;
        }

        Ok(columns)
    }

    /// Populate columns, relationships and join paths for one entity.
    pub async fn build_entity_entry(
        &self,
        mut entity: EntityItem,
    ) -> Result<EntityItem, DictionaryError> {
        info!("Building entity entry for {}", entity.entity);

        entity.columns = self.extract_columns_with_definitions(&entity).await?;

        let fqn = entity.fqn();
        entity.entity_relationships = self.relationships.for_entity(&fqn);
        entity.complete_entity_relationships_graph = self.get_entity_relationships_from_graph(&fqn);

        if !self.single_file {
            info!("Saving data dictionary for {}", entity.entity);
            self.writer
                .write_entity(&fqn, &self.apply_exclusions_to_entity(&entity)?)?;
        }

        Ok(entity)
    }

    /// Serialize an entity without the identifier fields the engine does not use.
    pub fn apply_exclusions_to_entity(&self, entity: &EntityItem) -> Result<Value, DictionaryError> {
        let excluded = self.connector.excluded_engine_specific_fields();
        let mut dumped = serde_json::to_value(entity)?;

        if let Value::Object(map) = &mut dumped {
            for field in &excluded {
                map.remove(*field);
            }
            if let Some(Value::Array(items)) = map.get_mut("EntityRelationships") {
                for item in items.iter_mut().filter_map(Value::as_object_mut) {
                    for field in &excluded {
                        item.remove(*field);
                        item.remove(&format!("Foreign{field}"));
                    }
                }
            }
        }

        Ok(dumped)
    }

    /// Extract everything and write the dictionary files.
    pub async fn create_data_dictionary(&mut self) -> Result<Vec<EntityItem>, DictionaryError> {
        let entities = self.extract_entities_with_definitions().await?;

        self.extract_entity_relationships().await?;
        self.build_entity_relationship_graph();

        let this = &*self;
        let built = join_all(entities.into_iter().map(|e| this.build_entity_entry(e)))
            .await
            .into_iter()
            .collect::<Result<Vec<_>, _>>()?;

        if self.single_file {
            info!("Saving data dictionary to entities.json");
            let dumped = built
                .iter()
                .map(|e| self.apply_exclusions_to_entity(e))
                .collect::<Result<Vec<_>, _>>()?;
            self.writer.write_entities(&dumped)?;
        }

        Ok(built)
    }
}

/// Remove tab, newline, carriage return, form feed and vertical tab characters.
fn strip_control_whitespace(value: &str) -> String {
    value
        .chars()
        .filter(|c| !matches!(c, '\t' | '\n' | '\r' | '\x0c' | '\x0b'))
        .collect()
}
