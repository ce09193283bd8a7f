//! Runtime lookups against the schema store, column value store and query cache.

use async_trait::async_trait;
use chrono::Utc;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use nl2sql_core::config::{OpenAiConfig, SearchConfig};

use crate::error::SearchError;
use crate::service::SearchService;

/// Default reranker score a cached question must reach to be reused.
pub const DEFAULT_CACHE_THRESHOLD: f64 = 2.0;

pub type Document = Map<String, Value>;

/// One step of a cached answer: a SQL statement and the entities it reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SqlQueryDecomposition {
    pub sql_query: String,
    #[serde(default)]
    pub schemas: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CachedQuery {
    pub question: String,
    #[serde(default)]
    pub sql_query_decomposition: Vec<SqlQueryDecomposition>,
    #[serde(skip)]
    pub score: f64,
}

/// Parameters for a hybrid search request.
#[derive(Debug, Clone)]
pub struct SearchQuery<'a> {
    pub index: &'a str,
    pub text: &'a str,
    /// Vector fields queried with server-side vectorisation of `text`.
    pub vector_fields: &'a [&'a str],
    pub retrieve: &'a [&'a str],
    pub top: usize,
    pub semantic_config: Option<&'a str>,
    pub minimum_score: Option<f64>,
}

/// Search lookups used by the text-to-SQL pipeline.
#[async_trait]
pub trait SearchClient: Send + Sync {
    /// Column value matches grouped by column FQN.
    async fn get_column_values(&self, text: &str) -> Result<IndexMap<String, Vec<Value>>, SearchError>;

    /// Entity documents relevant to `text`, skipping `excluded_entities`
    /// (matched against `FQN` or `Entity`).
    async fn get_entity_schemas(
        &self,
        text: &str,
        excluded_entities: &[String],
        top: usize,
    ) -> Result<Vec<Document>, SearchError>;

    /// Best cached question scoring at least `threshold`.
    async fn fetch_queries_from_cache(
        &self,
        question: &str,
        threshold: f64,
    ) -> Result<Option<CachedQuery>, SearchError>;

    /// Upsert a document. `vector_fields` maps source text fields to the
    /// embedding fields filled from them.
    async fn add_entry_to_index(
        &self,
        document: Document,
        index: &str,
        vector_fields: &[(&str, &str)],
    ) -> Result<(), SearchError>;
}

pub struct AiSearchConnector {
    service: SearchService,
    http: reqwest::Client,
    openai: OpenAiConfig,
    schema_store_index: String,
    column_value_store_index: String,
    query_cache_index: String,
    semantic_config: String,
}

impl AiSearchConnector {
    pub fn new(service: SearchService, search: &SearchConfig, openai: OpenAiConfig) -> Self {
        Self {
            service,
            http: reqwest::Client::new(),
            openai,
            schema_store_index: search.schema_store_index.clone(),
            column_value_store_index: search.column_value_store_index.clone(),
            query_cache_index: search.query_cache_index.clone(),
            semantic_config: search.semantic_config.clone(),
        }
    }

    pub fn from_config(search: &SearchConfig, openai: &OpenAiConfig) -> Result<Self, SearchError> {
        Ok(Self::new(SearchService::from_config(search)?, search, openai.clone()))
    }

    /// Hybrid text + vector search. Results below `minimum_score` are
    /// dropped and `@search.*` annotations stripped.
    pub async fn run_ai_search_query(&self, query: &SearchQuery<'_>) -> Result<Vec<Document>, SearchError> {
        let body = search_body(query);
        debug!(index = query.index, "Running search query");
        let response = self
            .service
            .post(&format!("indexes/{}/docs/search", query.index), &body)
            .await?;
        Ok(filter_results(&response, query.minimum_score))
    }

    /// Embed `text` with the configured Azure OpenAI embedding deployment.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, SearchError> {
        let endpoint = self
            .openai
            .endpoint
            .as_deref()
            .ok_or(SearchError::NotConfigured("OpenAI__Endpoint"))?;
        let url = format!(
            "{}/openai/deployments/{}/embeddings?api-version={}",
            endpoint.trim_end_matches('/'),
            self.openai.embedding_deployment,
            self.openai.api_version
        );

        let mut request = self.http.post(&url).json(&json!({ "input": text }));
        if let Some(key) = &self.openai.api_key {
            request = request.header("api-key", key);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::from_status(status.as_u16(), body));
        }

        let body: Value = response.json().await?;
        body["data"][0]["embedding"]
            .as_array()
            .map(|v| v.iter().filter_map(Value::as_f64).map(|f| f as f32).collect())
            .ok_or(SearchError::MissingEmbedding)
    }
}

#[async_trait]
impl SearchClient for AiSearchConnector {
    async fn get_column_values(&self, text: &str) -> Result<IndexMap<String, Vec<Value>>, SearchError> {
        let documents = self
            .run_ai_search_query(&SearchQuery {
                index: &self.column_value_store_index,
                text,
                vector_fields: &[],
                retrieve: &["FQN", "Column", "Value"],
                top: 10,
                semantic_config: None,
                minimum_score: Some(5.0),
            })
            .await?;
        Ok(group_column_values(documents))
    }

    async fn get_entity_schemas(
        &self,
        text: &str,
        excluded_entities: &[String],
        top: usize,
    ) -> Result<Vec<Document>, SearchError> {
        let documents = self
            .run_ai_search_query(&SearchQuery {
                index: &self.schema_store_index,
                text,
                vector_fields: &["DefinitionEmbedding"],
                retrieve: &[
                    "FQN",
                    "Entity",
                    "EntityName",
                    "Schema",
                    "Database",
                    "Warehouse",
                    "Catalog",
                    "Definition",
                    "Columns",
                    "EntityRelationships",
                    "CompleteEntityRelationshipsGraph",
                ],
                top: top + excluded_entities.len(),
                semantic_config: Some(&self.semantic_config),
                minimum_score: Some(1.0),
            })
            .await?;

        let documents = exclude_entities(documents, excluded_entities, top);
        info!("Schema store returned {} entities", documents.len());
        Ok(documents)
    }

    async fn fetch_queries_from_cache(
        &self,
        question: &str,
        threshold: f64,
    ) -> Result<Option<CachedQuery>, SearchError> {
        let documents = self
            .run_ai_search_query(&SearchQuery {
                index: &self.query_cache_index,
                text: question,
                vector_fields: &["QuestionEmbedding"],
                retrieve: &["Question", "SqlQueryDecomposition"],
                top: 1,
                semantic_config: Some(&self.semantic_config),
                minimum_score: Some(threshold),
            })
            .await?;
        Ok(documents.into_iter().next().and_then(|doc| {
            let score = doc.get(SCORE_KEY).and_then(Value::as_f64).unwrap_or_default();
            let mut cached: CachedQuery = serde_json::from_value(Value::Object(doc)).ok()?;
            cached.score = score;
            Some(cached)
        }))
    }

    async fn add_entry_to_index(
        &self,
        mut document: Document,
        index: &str,
        vector_fields: &[(&str, &str)],
    ) -> Result<(), SearchError> {
        for (source, target) in vector_fields {
            if let Some(text) = document.get(*source).and_then(Value::as_str) {
                let embedding = self.embed(text).await?;
                document.insert(target.to_string(), json!(embedding));
            }
        }

        stamp_document(&mut document);
        self.service
            .post(
                &format!("indexes/{index}/docs/index"),
                &json!({ "value": [document] }),
            )
            .await?;
        info!(index, "Document added to index");
        Ok(())
    }
}

/// Score kept on filtered results so callers can rank cache hits.
pub const SCORE_KEY: &str = "Score";

fn search_body(query: &SearchQuery<'_>) -> Value {
    let mut body = json!({
        "search": query.text,
        "top": query.top,
        "count": false,
    });
    if !query.retrieve.is_empty() {
        body["select"] = json!(query.retrieve.join(","));
    }
    if !query.vector_fields.is_empty() {
        body["vectorQueries"] = json!([{
            "kind": "text",
            "text": query.text,
            "fields": query.vector_fields.join(","),
            "k": query.top,
        }]);
    }
    if let Some(config) = query.semantic_config {
        body["queryType"] = json!("semantic");
        body["semanticConfiguration"] = json!(config);
    }
    body
}

/// Drop low scores and search annotations. The reranker score wins over
/// the plain score when present and is kept as `Score`.
fn filter_results(response: &Value, minimum_score: Option<f64>) -> Vec<Document> {
    response["value"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
        .filter_map(|doc| {
            let score = doc
                .get("@search.rerankerScore")
                .and_then(Value::as_f64)
                .or_else(|| doc.get("@search.score").and_then(Value::as_f64))
                .unwrap_or_default();
            if minimum_score.is_some_and(|min| score < min) {
                return None;
            }
            let mut cleaned: Document = doc
                .iter()
                .filter(|(k, _)| !k.starts_with("@search."))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            cleaned.insert(SCORE_KEY.into(), json!(score));
            Some(cleaned)
        })
        .collect()
}

fn group_column_values(documents: Vec<Document>) -> IndexMap<String, Vec<Value>> {
    let mut grouped: IndexMap<String, Vec<Value>> = IndexMap::new();
    for mut doc in documents {
        let Some(Value::String(fqn)) = doc.remove("FQN") else {
            continue;
        };
        let value = doc.remove("Value").unwrap_or(Value::Null);
        let values = grouped.entry(fqn).or_default();
        if !values.contains(&value) {
            values.push(value);
        }
    }
    grouped
}

fn exclude_entities(documents: Vec<Document>, excluded: &[String], top: usize) -> Vec<Document> {
    let is_excluded = |doc: &Document, key: &str| {
        doc.get(key)
            .and_then(Value::as_str)
            .is_some_and(|v| excluded.iter().any(|e| e.eq_ignore_ascii_case(v)))
    };
    documents
        .into_iter()
        .filter(|doc| !is_excluded(doc, "FQN") && !is_excluded(doc, "Entity"))
        .take(top)
        .collect()
}

/// Set `Id` from the FQN or question and stamp the modification time.
fn stamp_document(document: &mut Document) {
    let key = document
        .get("FQN")
        .or_else(|| document.get("Question"))
        .and_then(Value::as_str)
        .map(|k| hex::encode(k.as_bytes()));
    if let Some(id) = key {
        document.insert("Id".into(), json!(id));
    }
    document.insert("DateLastModified".into(), json!(Utc::now().to_rfc3339()));
    document.insert("@search.action".into(), json!("mergeOrUpload"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn doc(value: Value) -> Document {
        serde_json::from_value(value).unwrap()
    }

    fn configs(search_endpoint: &str, openai_endpoint: &str) -> (SearchConfig, OpenAiConfig) {
        let search = SearchConfig {
            endpoint: Some(search_endpoint.into()),
            key: Some("key".into()),
            api_version: "2024-07-01".into(),
            schema_store_index: "text-2-sql-schema-store-index".into(),
            column_value_store_index: "text-2-sql-column-value-store-index".into(),
            query_cache_index: "text-2-sql-query-cache-index".into(),
            semantic_config: "semantic-config".into(),
        };
        let openai = OpenAiConfig {
            endpoint: Some(openai_endpoint.into()),
            api_key: Some("oai".into()),
            api_version: "2024-08-01-preview".into(),
            completion_deployment: "gpt-4o".into(),
            mini_completion_deployment: "gpt-4o-mini".into(),
            embedding_model: "text-embedding-ada-002".into(),
            embedding_deployment: "embed".into(),
            embedding_dimensions: 3,
            temperature: 0.0,
            max_tokens: 256,
        };
        (search, openai)
    }

    #[test]
    fn body_includes_vector_and_semantic_parts() {
        let body = search_body(&SearchQuery {
            index: "i",
            text: "sales by region",
            vector_fields: &["DefinitionEmbedding"],
            retrieve: &["FQN", "Entity"],
            top: 3,
            semantic_config: Some("semantic-config"),
            minimum_score: None,
        });
        assert_eq!(body["select"], "FQN,Entity");
        assert_eq!(body["vectorQueries"][0]["fields"], "DefinitionEmbedding");
        assert_eq!(body["vectorQueries"][0]["k"], 3);
        assert_eq!(body["queryType"], "semantic");
    }

    #[test]
    fn plain_body_has_no_vectors() {
        let body = search_body(&SearchQuery {
            index: "i",
            text: "x",
            vector_fields: &[],
            retrieve: &[],
            top: 1,
            semantic_config: None,
            minimum_score: None,
        });
        assert!(body.get("vectorQueries").is_none());
        assert!(body.get("select").is_none());
        assert!(body.get("queryType").is_none());
    }

    #[test]
    fn results_filtered_by_reranker_score() {
        let response = json!({ "value": [
            { "@search.score": 0.9, "@search.rerankerScore": 2.5, "FQN": "a" },
            { "@search.score": 0.8, "@search.rerankerScore": 1.2, "FQN": "b" },
            { "@search.score": 3.0, "FQN": "c" },
        ]});
        let docs = filter_results(&response, Some(2.0));
        let fqns: Vec<&str> = docs.iter().map(|d| d["FQN"].as_str().unwrap()).collect();
        assert_eq!(fqns, vec!["a", "c"]);
        assert!(docs[0].keys().all(|k| !k.starts_with("@search.")));
        assert_eq!(docs[0][SCORE_KEY], 2.5);
    }

    #[test]
    fn column_values_grouped_by_fqn() {
        let grouped = group_column_values(vec![
            doc(json!({ "FQN": "s.t.country", "Value": "UK" })),
            doc(json!({ "FQN": "s.t.city", "Value": "London" })),
            doc(json!({ "FQN": "s.t.country", "Value": "USA" })),
            doc(json!({ "FQN": "s.t.country", "Value": "UK" })),
        ]);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped["s.t.country"], vec![json!("UK"), json!("USA")]);
    }

    #[test]
    fn excluded_entities_match_fqn_or_name() {
        let docs = vec![
            doc(json!({ "FQN": "s.orders", "Entity": "orders" })),
            doc(json!({ "FQN": "s.customers", "Entity": "customers" })),
            doc(json!({ "FQN": "s.lines", "Entity": "lines" })),
        ];
        let kept = exclude_entities(docs, &["S.ORDERS".into(), "lines".into()], 5);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0]["Entity"], "customers");
    }

    #[test]
    fn stamped_document_uses_hex_id() {
        let mut d = doc(json!({ "Question": "how many?" }));
        stamp_document(&mut d);
        assert_eq!(d["Id"], hex::encode("how many?"));
        assert_eq!(d["@search.action"], "mergeOrUpload");
        assert!(d.contains_key("DateLastModified"));
    }

    #[tokio::test]
    async fn cache_lookup_returns_best_hit() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/indexes/text-2-sql-query-cache-index/docs/search")
                    .query_param("api-version", "2024-07-01");
                then.status(200).json_body(json!({ "value": [{
                    "@search.score": 0.5,
                    "@search.rerankerScore": 3.1,
                    "Question": "How many orders?",
                    "SqlQueryDecomposition": [{ "SqlQuery": "SELECT COUNT(*) FROM orders", "Schemas": ["s.orders"] }],
                }]}));
            })
            .await;

        let (search, openai) = configs(&server.base_url(), "http://unused");
        let connector = AiSearchConnector::from_config(&search, &openai).unwrap();
        let hit = connector
            .fetch_queries_from_cache("how many orders", DEFAULT_CACHE_THRESHOLD)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.question, "How many orders?");
        assert_eq!(hit.sql_query_decomposition[0].sql_query, "SELECT COUNT(*) FROM orders");
        assert!((hit.score - 3.1).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn cache_miss_below_threshold() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(200).json_body(json!({ "value": [{
                    "@search.rerankerScore": 1.1,
                    "Question": "Something else",
                }]}));
            })
            .await;

        let (search, openai) = configs(&server.base_url(), "http://unused");
        let connector = AiSearchConnector::from_config(&search, &openai).unwrap();
        let hit = connector.fetch_queries_from_cache("q", 2.0).await.unwrap();
        assert!(hit.is_none());
    }

    #[tokio::test]
    async fn add_entry_embeds_and_uploads() {
        let openai_server = MockServer::start_async().await;
        let embed = openai_server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/openai/deployments/embed/embeddings")
                    .header("api-key", "oai");
                then.status(200)
                    .json_body(json!({ "data": [{ "embedding": [0.1, 0.2, 0.3] }] }));
            })
            .await;

        let search_server = MockServer::start_async().await;
        let upload = search_server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/indexes/text-2-sql-query-cache-index/docs/index")
                    .body_contains("QuestionEmbedding")
                    .body_contains("mergeOrUpload");
                then.status(200).json_body(json!({ "value": [{ "status": true }] }));
            })
            .await;

        let (search, openai) = configs(&search_server.base_url(), &openai_server.base_url());
        let connector = AiSearchConnector::from_config(&search, &openai).unwrap();
        connector
            .add_entry_to_index(
                doc(json!({ "Question": "How many orders?", "SqlQueryDecomposition": [] })),
                "text-2-sql-query-cache-index",
                &[("Question", "QuestionEmbedding")],
            )
            .await
            .unwrap();

        embed.assert_async().await;
        upload.assert_async().await;
    }
}
