use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};

use crate::error::DictionaryError;

pub const SCHEMA_STORE_DIR: &str = "schema_store";
pub const COLUMN_VALUE_STORE_DIR: &str = "column_value_store";
pub const QUERY_CACHE_DIR: &str = "query_cache";

/// Filesystem output for a generated data dictionary.
///
/// ```text
/// {output}/
///   schema_store/
///     {fqn}.json                 <- one entity per file
///     entities.json              <- all entities (single-file mode)
///   column_value_store/
///     {fqn}.{column}.jsonl       <- one value store entry per line
/// ```
pub struct DictionaryWriter {
    base_dir: PathBuf,
}

impl DictionaryWriter {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn ensure_dir(&self, name: &str) -> Result<PathBuf, DictionaryError> {
        let dir = self.base_dir.join(name);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Write `schema_store/{fqn}.json`.
    pub fn write_entity(&self, fqn: &str, entity: &Value) -> Result<PathBuf, DictionaryError> {
        let path = self.ensure_dir(SCHEMA_STORE_DIR)?.join(format!("{fqn}.json"));
        fs::write(&path, to_pretty_json(entity)?)?;
        Ok(path)
    }

    /// Write every entity to `schema_store/entities.json`.
    pub fn write_entities(&self, entities: &[Value]) -> Result<PathBuf, DictionaryError> {
        let path = self.ensure_dir(SCHEMA_STORE_DIR)?.join("entities.json");
        fs::write(&path, to_pretty_json(&entities)?)?;
        Ok(path)
    }

    /// Write `column_value_store/{key}.jsonl`. An empty entry list still
    /// produces the (empty) file.
    pub fn write_column_values(
        &self,
        key: &str,
        entries: &[Map<String, Value>],
    ) -> Result<PathBuf, DictionaryError> {
        let path = self
            .ensure_dir(COLUMN_VALUE_STORE_DIR)?
            .join(format!("{key}.jsonl"));
        let mut file = fs::File::create(&path)?;
        for entry in entries {
            serde_json::to_writer(&mut file, entry)?;
            file.write_all(b"\n")?;
        }
        Ok(path)
    }
}

/// Four-space indented JSON.
fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, DictionaryError> {
    let mut buf = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn entity_files_are_indented_json() {
        let dir = tempfile::tempdir().unwrap();
        let writer = DictionaryWriter::new(dir.path());
        let path = writer
            .write_entity("main.products", &json!({ "Entity": "products" }))
            .unwrap();

        assert_eq!(path, dir.path().join("schema_store/main.products.json"));
        let text = fs::read_to_string(path).unwrap();
        assert_eq!(text, "{\n    \"Entity\": \"products\"\n}");
    }

    #[test]
    fn column_values_are_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let writer = DictionaryWriter::new(dir.path());
        let entries: Vec<Map<String, Value>> = vec![
            serde_json::from_value(json!({ "Value": "a" })).unwrap(),
            serde_json::from_value(json!({ "Value": "b" })).unwrap(),
        ];
        let path = writer.write_column_values("main.products.name", &entries).unwrap();

        let text = fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec![r#"{"Value":"a"}"#, r#"{"Value":"b"}"#]);
    }

    #[test]
    fn empty_value_list_still_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let writer = DictionaryWriter::new(dir.path());
        let path = writer.write_column_values("main.t.c", &[]).unwrap();
        assert!(path.exists());
        assert_eq!(fs::read_to_string(path).unwrap(), "");
    }
}
