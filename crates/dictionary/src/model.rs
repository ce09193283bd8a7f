//! Data dictionary records.
//!
//! Field names serialize in PascalCase because the search indexes and any
//! hand-edited dictionary files use that shape.

use serde::ser::{SerializeStruct, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use nl2sql_connector::Row;

use crate::error::DictionaryError;

/// Join the non-null identifier parts of a fully-qualified name with `.`.
fn join_fqn(parts: [Option<&str>; 5]) -> String {
    parts.into_iter().flatten().collect::<Vec<_>>().join(".")
}

fn required_str(row: &Row, column: &'static str) -> Result<String, DictionaryError> {
    match row.get(column) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Null) | None => Err(DictionaryError::MissingColumn(column)),
        Some(other) => Ok(other.to_string()),
    }
}

fn optional_str(row: &Row, column: &str) -> Option<String> {
    match row.get(column) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Null) | None => None,
        Some(other) => Some(other.to_string()),
    }
}

// ── Foreign keys ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyRelationship {
    #[serde(rename = "Column")]
    pub column: String,
    #[serde(rename = "ForeignColumn")]
    pub foreign_column: String,
}

impl ForeignKeyRelationship {
    pub fn new(column: impl Into<String>, foreign_column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            foreign_column: foreign_column.into(),
        }
    }

    fn reversed(&self) -> Self {
        Self::new(self.foreign_column.clone(), self.column.clone())
    }
}

// ── Entity relationships ──────────────────────────────────────

/// A directed join path from one entity to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRelationship {
    pub entity: String,
    pub entity_schema: String,
    pub foreign_entity: String,
    pub foreign_entity_schema: String,
    pub foreign_keys: Vec<ForeignKeyRelationship>,

    pub warehouse: Option<String>,
    pub database: Option<String>,
    pub catalog: Option<String>,

    pub foreign_warehouse: Option<String>,
    pub foreign_database: Option<String>,
    pub foreign_catalog: Option<String>,
}

impl EntityRelationship {
    pub fn new(
        entity_schema: impl Into<String>,
        entity: impl Into<String>,
        foreign_entity_schema: impl Into<String>,
        foreign_entity: impl Into<String>,
        foreign_keys: Vec<ForeignKeyRelationship>,
    ) -> Self {
        Self {
            entity: entity.into(),
            entity_schema: entity_schema.into(),
            foreign_entity: foreign_entity.into(),
            foreign_entity_schema: foreign_entity_schema.into(),
            foreign_keys,
            warehouse: None,
            database: None,
            catalog: None,
            foreign_warehouse: None,
            foreign_database: None,
            foreign_catalog: None,
        }
    }

    /// Build from a relationship query row
    /// (`EntitySchema, Entity, ForeignEntitySchema, ForeignEntity, Column, ForeignColumn`).
    pub fn from_row(row: &Row) -> Result<Self, DictionaryError> {
        Ok(Self::new(
            required_str(row, "EntitySchema")?,
            required_str(row, "Entity")?,
            required_str(row, "ForeignEntitySchema")?,
            required_str(row, "ForeignEntity")?,
            vec![ForeignKeyRelationship::new(
                required_str(row, "Column")?,
                required_str(row, "ForeignColumn")?,
            )],
        ))
    }

    /// The same relationship seen from the foreign entity's side.
    pub fn pivot(&self) -> Self {
        Self {
            entity: self.foreign_entity.clone(),
            entity_schema: self.foreign_entity_schema.clone(),
            foreign_entity: self.entity.clone(),
            foreign_entity_schema: self.entity_schema.clone(),
            foreign_keys: self.foreign_keys.iter().map(|fk| fk.reversed()).collect(),
            warehouse: self.foreign_warehouse.clone(),
            database: self.foreign_database.clone(),
            catalog: self.foreign_catalog.clone(),
            foreign_warehouse: self.warehouse.clone(),
            foreign_database: self.database.clone(),
            foreign_catalog: self.catalog.clone(),
        }
    }

    /// Append a key pair unless the identical pair is already present.
    pub fn add_foreign_key(&mut self, foreign_key: ForeignKeyRelationship) {
        if !self.foreign_keys.contains(&foreign_key) {
            self.foreign_keys.push(foreign_key);
        }
    }

    pub fn fqn(&self) -> String {
        join_fqn([
            self.warehouse.as_deref(),
            self.catalog.as_deref(),
            self.database.as_deref(),
            Some(self.entity_schema.as_str()),
            Some(self.entity.as_str()),
        ])
    }

    pub fn foreign_fqn(&self) -> String {
        join_fqn([
            self.foreign_warehouse.as_deref(),
            self.foreign_catalog.as_deref(),
            self.foreign_database.as_deref(),
            Some(self.foreign_entity_schema.as_str()),
            Some(self.foreign_entity.as_str()),
        ])
    }
}

// The owning side (entity, schema, warehouse, ...) is implied by the
// enclosing EntityItem and is not written.
impl Serialize for EntityRelationship {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("EntityRelationship", 8)?;
        s.serialize_field("ForeignEntity", &self.foreign_entity)?;
        s.serialize_field("ForeignSchema", &self.foreign_entity_schema)?;
        s.serialize_field("ForeignKeys", &self.foreign_keys)?;
        s.serialize_field("ForeignWarehouse", &self.foreign_warehouse)?;
        s.serialize_field("ForeignDatabase", &self.foreign_database)?;
        s.serialize_field("ForeignCatalog", &self.foreign_catalog)?;
        s.serialize_field("FQN", &self.fqn())?;
        s.serialize_field("ForeignFQN", &self.foreign_fqn())?;
        s.end()
    }
}

// ── Columns ───────────────────────────────────────────────────

const STRING_TYPE_MARKERS: &[&str] = &["string", "nchar", "text", "varchar"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnItem {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "DataType")]
    pub data_type: String,
    #[serde(rename = "Definition")]
    pub definition: Option<String>,
    #[serde(skip)]
    pub distinct_values: Option<Vec<Value>>,
    #[serde(rename = "SampleValues")]
    pub sample_values: Option<Vec<Value>>,
}

impl ColumnItem {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            definition: None,
            distinct_values: None,
            sample_values: None,
        }
    }

    /// Build from a column query row (`Name, DataType, Definition`).
    pub fn from_row(row: &Row) -> Result<Self, DictionaryError> {
        Ok(Self {
            name: required_str(row, "Name")?,
            data_type: optional_str(row, "DataType").unwrap_or_default(),
            definition: optional_str(row, "Definition"),
            distinct_values: None,
            sample_values: None,
        })
    }

    /// Columns whose values are worth indexing in the column value store.
    pub fn is_string_type(&self) -> bool {
        let data_type = self.data_type.to_lowercase();
        STRING_TYPE_MARKERS.iter().any(|m| data_type.contains(m))
    }

    /// One column value store document for `distinct_value`.
    pub fn value_store_entry(
        &self,
        entity: &EntityItem,
        distinct_value: &Value,
        excluded_fields: &[&str],
    ) -> Map<String, Value> {
        let mut entry = entity.value_store_entry(excluded_fields);
        entry.insert(
            "FQN".into(),
            Value::String(format!("{}.{}", entity.fqn(), self.name)),
        );
        entry.insert("Column".into(), Value::String(self.name.clone()));
        entry.insert("Value".into(), distinct_value.clone());
        entry.insert("Synonyms".into(), Value::Array(Vec::new()));
        entry
    }
}

// ── Entities ──────────────────────────────────────────────────

/// A table or view with its columns and relationships.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityItem {
    pub entity: String,
    pub definition: Option<String>,
    pub name: String,
    pub entity_schema: String,
    pub entity_name: Option<String>,
    pub database: Option<String>,
    pub warehouse: Option<String>,
    pub catalog: Option<String>,
    pub entity_relationships: Vec<EntityRelationship>,
    pub complete_entity_relationships_graph: Vec<String>,
    pub columns: Vec<ColumnItem>,
}

impl EntityItem {
    pub fn new(entity_schema: impl Into<String>, entity: impl Into<String>) -> Self {
        let entity = entity.into();
        Self {
            name: entity.clone(),
            entity,
            definition: None,
            entity_schema: entity_schema.into(),
            entity_name: None,
            database: None,
            warehouse: None,
            catalog: None,
            entity_relationships: Vec::new(),
            complete_entity_relationships_graph: Vec::new(),
            columns: Vec::new(),
        }
    }

    /// Build from a table/view query row (`Entity, EntitySchema, Definition`).
    pub fn from_row(row: &Row) -> Result<Self, DictionaryError> {
        let mut item = Self::new(
            required_str(row, "EntitySchema")?,
            required_str(row, "Entity")?,
        );
        item.definition = optional_str(row, "Definition");
        Ok(item)
    }

    pub fn fqn(&self) -> String {
        join_fqn([
            self.warehouse.as_deref(),
            self.catalog.as_deref(),
            self.database.as_deref(),
            Some(self.entity_schema.as_str()),
            Some(self.entity.as_str()),
        ])
    }

    /// Identifier fields shared by every column value store document of this entity.
    pub fn value_store_entry(&self, excluded_fields: &[&str]) -> Map<String, Value> {
        let candidates = [
            ("Entity", Some(self.entity.clone())),
            ("Schema", Some(self.entity_schema.clone())),
            ("Database", self.database.clone()),
            ("Warehouse", self.warehouse.clone()),
            ("Catalog", self.catalog.clone()),
            ("FQN", Some(self.fqn())),
        ];

        candidates
            .into_iter()
            .filter(|(key, _)| !excluded_fields.contains(key))
            .filter_map(|(key, value)| value.map(|v| (key.to_string(), Value::String(v))))
            .collect()
    }
}

impl Serialize for EntityItem {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("EntityItem", 11)?;
        s.serialize_field("Entity", &self.entity)?;
        s.serialize_field("Definition", &self.definition)?;
        s.serialize_field("Schema", &self.entity_schema)?;
        s.serialize_field("EntityName", &self.entity_name)?;
        s.serialize_field("Database", &self.database)?;
        s.serialize_field("Warehouse", &self.warehouse)?;
        s.serialize_field("Catalog", &self.catalog)?;
        s.serialize_field("EntityRelationships", &self.entity_relationships)?;
        s.serialize_field(
            "CompleteEntityRelationshipsGraph",
            &self.complete_entity_relationships_graph,
        )?;
        s.serialize_field("Columns", &self.columns)?;
        s.serialize_field("FQN", &self.fqn())?;
        s.end()
    }
}
