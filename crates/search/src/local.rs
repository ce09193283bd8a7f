//! File-backed stand-in for AI Search, reading a generated data dictionary.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::client::{CachedQuery, Document, SearchClient};
use crate::error::SearchError;
use crate::index::IndexType;

/// Score reported for an exact (normalised) cache match.
const EXACT_MATCH_SCORE: f64 = 3.0;

pub struct LocalSearchClient {
    entities: Vec<Document>,
    column_values: Vec<Document>,
    cache: RwLock<Vec<CachedQuery>>,
}

impl LocalSearchClient {
    pub fn new(entities: Vec<Document>, column_values: Vec<Document>) -> Self {
        Self {
            entities,
            column_values,
            cache: RwLock::new(Vec::new()),
        }
    }

    /// Load `schema_store/` and `column_value_store/` under `dir`.
    pub fn load(dir: &Path) -> Result<Self, SearchError> {
        let mut entities = Vec::new();
        let schema_dir = dir.join(IndexType::SchemaStore.folder());
        for path in sorted_files(&schema_dir, "json")? {
            match serde_json::from_str::<Value>(&fs::read_to_string(&path)?) {
                Ok(Value::Object(doc)) => entities.push(doc),
                Ok(Value::Array(items)) => entities.extend(items.into_iter().filter_map(into_document)),
                Ok(_) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable entity file"),
            }
        }

        let mut column_values = Vec::new();
        let values_dir = dir.join(IndexType::ColumnValueStore.folder());
        for path in sorted_files(&values_dir, "jsonl")? {
            for line in fs::read_to_string(&path)?.lines().filter(|l| !l.trim().is_empty()) {
                if let Some(doc) = serde_json::from_str(line).ok().and_then(into_document) {
                    column_values.push(doc);
                }
            }
        }

        info!(
            entities = entities.len(),
            column_values = column_values.len(),
            "Loaded local data dictionary from {}",
            dir.display()
        );
        Ok(Self::new(entities, column_values))
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }
}

fn into_document(value: Value) -> Option<Document> {
    match value {
        Value::Object(doc) => Some(doc),
        _ => None,
    }
}

fn sorted_files(dir: &Path, extension: &str) -> Result<Vec<std::path::PathBuf>, SearchError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files: Vec<_> = fs::read_dir(dir)?
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|e| e == extension))
        .collect();
    files.sort();
    Ok(files)
}

fn tokens(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 1)
        .map(str::to_lowercase)
        .collect()
}

/// Words in order, lowercased. Unlike [`tokens`], single characters are kept.
fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn contains_run(haystack: &[String], run: &[String]) -> bool {
    !run.is_empty() && run.len() <= haystack.len() && haystack.windows(run.len()).any(|w| w == run)
}

/// Whole-word match in either direction. A single-character value must
/// appear as a word with the same case.
fn value_matches(text: &str, needle: &[String], value: &str) -> bool {
    if value.chars().filter(|c| c.is_alphanumeric()).count() == 1 {
        return text
            .split(|c: char| !c.is_alphanumeric())
            .any(|w| w == value.trim());
    }
    let candidate = words(value);
    contains_run(needle, &candidate) || contains_run(&candidate, needle)
}

/// Words describing an entity: names, definition and column names.
fn entity_text(doc: &Document) -> String {
    let mut text = String::new();
    for key in ["Entity", "EntityName", "Definition"] {
        if let Some(v) = doc.get(key).and_then(Value::as_str) {
            text.push_str(v);
            text.push(' ');
        }
    }
    for column in doc.get("Columns").and_then(Value::as_array).into_iter().flatten() {
        for key in ["Name", "Definition"] {
            if let Some(v) = column.get(key).and_then(Value::as_str) {
                text.push_str(v);
                text.push(' ');
            }
        }
    }
    text
}

fn normalise_question(question: &str) -> String {
    question
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches(['?', '.', '!'])
        .to_lowercase()
}

#[async_trait]
impl SearchClient for LocalSearchClient {
    async fn get_column_values(&self, text: &str) -> Result<IndexMap<String, Vec<Value>>, SearchError> {
        let needle = words(text);
        let mut grouped: IndexMap<String, Vec<Value>> = IndexMap::new();
        if needle.is_empty() {
            return Ok(grouped);
        }

        for doc in &self.column_values {
            let (Some(fqn), Some(value)) = (
                doc.get("FQN").and_then(Value::as_str),
                doc.get("Value"),
            ) else {
                continue;
            };
            let candidate = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            if !value_matches(text, &needle, &candidate) {
                continue;
            }
            let values = grouped.entry(fqn.to_string()).or_default();
            if !values.contains(value) {
                values.push(value.clone());
            }
        }
        Ok(grouped)
    }

    async fn get_entity_schemas(
        &self,
        text: &str,
        excluded_entities: &[String],
        top: usize,
    ) -> Result<Vec<Document>, SearchError> {
        let query = tokens(text);
        let excluded = |doc: &Document| {
            ["FQN", "Entity"].iter().any(|key| {
                doc.get(*key)
                    .and_then(Value::as_str)
                    .is_some_and(|v| excluded_entities.iter().any(|e| e.eq_ignore_ascii_case(v)))
            })
        };

        let mut scored: Vec<(usize, &Document)> = self
            .entities
            .iter()
            .filter(|doc| !excluded(doc))
            .map(|doc| (tokens(&entity_text(doc)).intersection(&query).count(), doc))
            .collect();
        // stable: ties keep dictionary order
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        let matched: Vec<Document> = scored
            .iter()
            .filter(|(score, _)| *score > 0)
            .take(top)
            .map(|(_, doc)| (*doc).clone())
            .collect();

        if matched.is_empty() {
            debug!("No keyword match; returning first {} entities", top);
            return Ok(scored.into_iter().take(top).map(|(_, d)| d.clone()).collect());
        }
        Ok(matched)
    }

    async fn fetch_queries_from_cache(
        &self,
        question: &str,
        threshold: f64,
    ) -> Result<Option<CachedQuery>, SearchError> {
        if EXACT_MATCH_SCORE < threshold {
            return Ok(None);
        }
        let wanted = normalise_question(question);
        let cache = self.cache.read().await;
        Ok(cache
            .iter()
            .find(|entry| normalise_question(&entry.question) == wanted)
            .map(|entry| CachedQuery {
                score: EXACT_MATCH_SCORE,
                ..entry.clone()
            }))
    }

    async fn add_entry_to_index(
        &self,
        document: Document,
        index: &str,
        _vector_fields: &[(&str, &str)],
    ) -> Result<(), SearchError> {
        let Ok(entry) = serde_json::from_value::<CachedQuery>(Value::Object(document)) else {
            debug!(index, "Local search only stores query cache entries");
            return Ok(());
        };

        let mut cache = self.cache.write().await;
        let key = normalise_question(&entry.question);
        cache.retain(|e| normalise_question(&e.question) != key);
        cache.push(entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        serde_json::from_value(value).unwrap()
    }

    fn client() -> LocalSearchClient {
        LocalSearchClient::new(
            vec![
                doc(json!({ "FQN": "main.customers", "Entity": "customers", "Definition": "People who buy",
                            "Columns": [{ "Name": "country" }] })),
                doc(json!({ "FQN": "main.orders", "Entity": "orders", "Definition": null,
                            "Columns": [{ "Name": "status" }, { "Name": "total" }] })),
            ],
            vec![
                doc(json!({ "FQN": "main.customers.country", "Value": "Denmark" })),
                doc(json!({ "FQN": "main.customers.country", "Value": "USA" })),
                doc(json!({ "FQN": "main.orders.status", "Value": "open" })),
            ],
        )
    }

    #[tokio::test]
    async fn entities_ranked_by_overlap() {
        let found = client()
            .get_entity_schemas("total of open orders by status", &[], 1)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["Entity"], "orders");
    }

    #[tokio::test]
    async fn excluded_and_fallback() {
        let c = client();
        let found = c
            .get_entity_schemas("orders", &["main.orders".into()], 5)
            .await
            .unwrap();
        // nothing matches after exclusion, so the remaining entities come back
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["Entity"], "customers");
    }

    #[tokio::test]
    async fn column_values_by_containment() {
        let values = client().get_column_values("customers in denmark").await.unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(values["main.customers.country"], vec![json!("Denmark")]);
    }

    #[tokio::test]
    async fn column_values_match_whole_words() {
        let c = LocalSearchClient::new(
            Vec::new(),
            ["US", "A", "Samsung", "Samsung Electronics", "Business"]
                .into_iter()
                .map(|v| doc(json!({ "FQN": "main.customers.segment", "Value": v })))
                .collect(),
        );

        let values = c.get_column_values("Samsung business customers").await.unwrap();
        assert_eq!(
            values["main.customers.segment"],
            vec![json!("Samsung"), json!("Business")]
        );

        let values = c.get_column_values("samsung").await.unwrap();
        assert_eq!(
            values["main.customers.segment"],
            vec![json!("Samsung"), json!("Samsung Electronics")]
        );

        let values = c.get_column_values("show me a customer in the US").await.unwrap();
        assert_eq!(values["main.customers.segment"], vec![json!("US")]);

        let values = c.get_column_values("grade A customers").await.unwrap();
        assert_eq!(values["main.customers.segment"], vec![json!("A")]);

        assert!(c.get_column_values("sams").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cache_round_trip() {
        let c = client();
        assert!(c.fetch_queries_from_cache("How many orders?", 2.0).await.unwrap().is_none());

        c.add_entry_to_index(
            doc(json!({
                "Question": "How many orders?",
                "SqlQueryDecomposition": [{ "SqlQuery": "SELECT COUNT(*) FROM orders", "Schemas": [] }],
            })),
            "text-2-sql-query-cache-index",
            &[],
        )
        .await
        .unwrap();

        let hit = c
            .fetch_queries_from_cache("how  many orders", 2.0)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.sql_query_decomposition[0].sql_query, "SELECT COUNT(*) FROM orders");
        assert!(c.fetch_queries_from_cache("how many orders", 5.0).await.unwrap().is_none());
    }

    #[test]
    fn loads_dictionary_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("schema_store")).unwrap();
        fs::create_dir_all(dir.path().join("column_value_store")).unwrap();
        fs::write(
            dir.path().join("schema_store/entities.json"),
            r#"[{"FQN": "main.a", "Entity": "a"}, {"FQN": "main.b", "Entity": "b"}]"#,
        )
        .unwrap();
        fs::write(dir.path().join("schema_store/main.c.json"), r#"{"FQN": "main.c", "Entity": "c"}"#).unwrap();
        fs::write(
            dir.path().join("column_value_store/main.a.x.jsonl"),
            "{\"FQN\": \"main.a.x\", \"Value\": \"v1\"}\n\n{\"FQN\": \"main.a.x\", \"Value\": \"v2\"}\n",
        )
        .unwrap();

        let client = LocalSearchClient::load(dir.path()).unwrap();
        assert_eq!(client.entity_count(), 3);
        assert_eq!(client.column_values.len(), 2);
    }
}
