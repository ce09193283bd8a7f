//! JSON bodies for search indexes, data sources, skillsets and indexers.

use serde_json::{json, Value};

use nl2sql_core::Config;

use crate::error::SearchError;
use crate::index::IndexType;

const HNSW_ALGORITHM: &str = "hnsw-algorithm";
const VECTOR_PROFILE: &str = "hnsw-profile";
const VECTORIZER: &str = "openai-vectorizer";

/// Everything the definitions need from the environment.
#[derive(Debug, Clone)]
pub struct DefinitionSettings {
    pub suffix: Option<String>,
    pub semantic_config: String,
    pub openai_endpoint: Option<String>,
    pub openai_key: Option<String>,
    pub embedding_deployment: String,
    pub embedding_model: String,
    pub embedding_dimensions: u32,
    pub storage_connection_string: Option<String>,
    pub container: String,
}

impl DefinitionSettings {
    pub fn from_config(config: &Config, suffix: Option<String>) -> Self {
        Self {
            suffix,
            semantic_config: config.search.semantic_config.clone(),
            openai_endpoint: config.openai.endpoint.clone(),
            openai_key: config.openai.api_key.clone(),
            embedding_deployment: config.openai.embedding_deployment.clone(),
            embedding_model: config.openai.embedding_model.clone(),
            embedding_dimensions: config.openai.embedding_dimensions,
            storage_connection_string: config.storage.connection_string.clone(),
            container: config.storage.container.clone(),
        }
    }

    fn suffix(&self) -> Option<&str> {
        self.suffix.as_deref()
    }

    fn openai_endpoint(&self) -> Result<&str, SearchError> {
        self.openai_endpoint
            .as_deref()
            .ok_or(SearchError::NotConfigured("OpenAI__Endpoint"))
    }

    /// Parameters shared by the vectorizer and the embedding skill.
    fn openai_parameters(&self) -> Result<Value, SearchError> {
        let mut params = json!({
            "resourceUri": self.openai_endpoint()?,
            "deploymentId": self.embedding_deployment,
            "modelName": self.embedding_model,
        });
        if let Some(key) = &self.openai_key {
            params["apiKey"] = json!(key);
        }
        Ok(params)
    }
}

// ── Fields ────────────────────────────────────────────────────

fn key_field() -> Value {
    json!({ "name": "Id", "type": "Edm.String", "key": true, "filterable": true })
}

fn simple(name: &str) -> Value {
    json!({ "name": name, "type": "Edm.String", "filterable": true })
}

fn searchable(name: &str) -> Value {
    json!({ "name": name, "type": "Edm.String", "searchable": true, "retrievable": true })
}

fn string_collection(name: &str) -> Value {
    json!({ "name": name, "type": "Collection(Edm.String)", "searchable": true })
}

fn complex_collection(name: &str, fields: Vec<Value>) -> Value {
    json!({ "name": name, "type": "Collection(Edm.ComplexType)", "fields": fields })
}

fn vector(name: &str, dimensions: u32) -> Value {
    json!({
        "name": name,
        "type": "Collection(Edm.Single)",
        "searchable": true,
        "dimensions": dimensions,
        "vectorSearchProfile": VECTOR_PROFILE,
    })
}

fn last_modified() -> Value {
    json!({ "name": "DateLastModified", "type": "Edm.DateTimeOffset", "filterable": true })
}

fn schema_store_fields(dimensions: u32) -> Vec<Value> {
    vec![
        key_field(),
        searchable("EntityName"),
        searchable("Entity"),
        simple("Database"),
        simple("Warehouse"),
        simple("Catalog"),
        simple("Schema"),
        simple("FQN"),
        searchable("Definition"),
        vector("DefinitionEmbedding", dimensions),
        complex_collection(
            "Columns",
            vec![
                searchable("Name"),
                simple("DataType"),
                searchable("Definition"),
                string_collection("SampleValues"),
            ],
        ),
        complex_collection(
            "EntityRelationships",
            vec![
                simple("FQN"),
                simple("ForeignFQN"),
                simple("ForeignEntity"),
                simple("ForeignSchema"),
                complex_collection(
                    "ForeignKeys",
                    vec![simple("Column"), simple("ForeignColumn")],
                ),
            ],
        ),
        string_collection("CompleteEntityRelationshipsGraph"),
        last_modified(),
    ]
}

fn column_value_store_fields() -> Vec<Value> {
    vec![
        key_field(),
        simple("Entity"),
        simple("Schema"),
        simple("Database"),
        simple("Warehouse"),
        simple("Catalog"),
        simple("FQN"),
        simple("Column"),
        searchable("Value"),
        string_collection("Synonyms"),
    ]
}

fn query_cache_fields(dimensions: u32) -> Vec<Value> {
    vec![
        key_field(),
        searchable("Question"),
        vector("QuestionEmbedding", dimensions),
        complex_collection(
            "SqlQueryDecomposition",
            vec![searchable("SqlQuery"), string_collection("Schemas")],
        ),
        last_modified(),
    ]
}

// ── Index ─────────────────────────────────────────────────────

fn semantic_configuration(index_type: IndexType, name: &str) -> Value {
    let (title, content, keywords) = match index_type {
        IndexType::SchemaStore => ("EntityName", "Definition", vec!["Entity", "Columns/Name"]),
        IndexType::ColumnValueStore => ("Column", "Value", vec!["Synonyms"]),
        IndexType::QueryCache => ("Question", "Question", vec![]),
    };
    let keywords: Vec<Value> = keywords
        .into_iter()
        .map(|f| json!({ "fieldName": f }))
        .collect();

    json!({
        "configurations": [{
            "name": name,
            "prioritizedFields": {
                "titleField": { "fieldName": title },
                "prioritizedContentFields": [{ "fieldName": content }],
                "prioritizedKeywordsFields": keywords,
            },
        }],
    })
}

/// Full index definition for `PUT /indexes/{name}`.
pub fn index_definition(
    index_type: IndexType,
    settings: &DefinitionSettings,
) -> Result<Value, SearchError> {
    let dimensions = settings.embedding_dimensions;
    let fields = match index_type {
        IndexType::SchemaStore => schema_store_fields(dimensions),
        IndexType::ColumnValueStore => column_value_store_fields(),
        IndexType::QueryCache => query_cache_fields(dimensions),
    };

    let mut index = json!({
        "name": index_type.index_name(settings.suffix()),
        "fields": fields,
        "semantic": semantic_configuration(index_type, &settings.semantic_config),
    });

    if index_type.vector_field().is_some() {
        index["vectorSearch"] = json!({
            "algorithms": [{
                "name": HNSW_ALGORITHM,
                "kind": "hnsw",
                "hnswParameters": { "m": 4, "efConstruction": 400, "efSearch": 500, "metric": "cosine" },
            }],
            "profiles": [{
                "name": VECTOR_PROFILE,
                "algorithm": HNSW_ALGORITHM,
                "vectorizer": VECTORIZER,
            }],
            "vectorizers": [{
                "name": VECTORIZER,
                "kind": "azureOpenAI",
                "azureOpenAIParameters": settings.openai_parameters()?,
            }],
        });
    }

    Ok(index)
}

/// Blob data source scoped to the index's folder.
pub fn data_source_definition(
    index_type: IndexType,
    settings: &DefinitionSettings,
) -> Result<Value, SearchError> {
    let connection_string = settings
        .storage_connection_string
        .as_deref()
        .ok_or(SearchError::NotConfigured("StorageAccount__ConnectionString"))?;

    Ok(json!({
        "name": index_type.data_source_name(settings.suffix()),
        "type": "azureblob",
        "credentials": { "connectionString": connection_string },
        "container": { "name": settings.container, "query": index_type.folder() },
        "dataDeletionDetectionPolicy": {
            "@odata.type": "#Microsoft.Azure.Search.NativeBlobSoftDeleteDeletionDetectionPolicy",
        },
    }))
}

/// Embedding skillset. `None` for indexes without a vector field.
pub fn skillset_definition(
    index_type: IndexType,
    settings: &DefinitionSettings,
) -> Result<Option<Value>, SearchError> {
    let Some((source, target)) = index_type.vector_field() else {
        return Ok(None);
    };

    let mut skill = settings.openai_parameters()?;
    let fields = json!({
        "@odata.type": "#Microsoft.Skills.Text.AzureOpenAIEmbeddingSkill",
        "name": format!("{source}-embedding"),
        "context": "/document",
        "dimensions": settings.embedding_dimensions,
        "inputs": [{ "name": "text", "source": format!("/document/{source}") }],
        "outputs": [{ "name": "embedding", "targetName": target }],
    });
    if let (Some(skill), Value::Object(fields)) = (skill.as_object_mut(), fields) {
        skill.extend(fields);
    }

    Ok(Some(json!({
        "name": index_type.skillset_name(settings.suffix()),
        "description": format!("Embeds {source} for {}", index_type.as_str()),
        "skills": [skill],
    })))
}

/// Blob parsing mode for the index's source files.
pub fn parsing_mode(index_type: IndexType, single_file: bool) -> &'static str {
    match index_type {
        IndexType::ColumnValueStore => "jsonLines",
        _ if single_file => "jsonArray",
        _ => "json",
    }
}

/// Daily indexer from the data source into the index.
pub fn indexer_definition(
    index_type: IndexType,
    settings: &DefinitionSettings,
    single_file: bool,
) -> Value {
    let suffix = settings.suffix();

    // One line of a jsonLines blob is one document; FQN repeats per column.
    let key_source = match index_type {
        IndexType::SchemaStore => "FQN",
        IndexType::ColumnValueStore => "AzureSearch_DocumentKey",
        IndexType::QueryCache => "Question",
    };

    let mut indexer = json!({
        "name": index_type.indexer_name(suffix),
        "dataSourceName": index_type.data_source_name(suffix),
        "targetIndexName": index_type.index_name(suffix),
        "schedule": { "interval": "P1D" },
        "parameters": {
            "configuration": {
                "dataToExtract": "contentAndMetadata",
                "parsingMode": parsing_mode(index_type, single_file),
            },
        },
        "fieldMappings": [{
            "sourceFieldName": key_source,
            "targetFieldName": "Id",
            "mappingFunction": { "name": "base64Encode" },
        }],
    });

    if let Some((_, target)) = index_type.vector_field() {
        indexer["skillsetName"] = json!(index_type.skillset_name(suffix));
        indexer["outputFieldMappings"] = json!([{
            "sourceFieldName": format!("/document/{target}"),
            "targetFieldName": target,
        }]);
        if let Some(mappings) = indexer["fieldMappings"].as_array_mut() {
            mappings.push(json!({
                "sourceFieldName": "metadata_storage_last_modified",
                "targetFieldName": "DateLastModified",
            }));
        }
    }

    indexer
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> DefinitionSettings {
        DefinitionSettings {
            suffix: Some("test".into()),
            semantic_config: "semantic-config".into(),
            openai_endpoint: Some("https://oai.example.com".into()),
            openai_key: Some("secret".into()),
            embedding_deployment: "embed".into(),
            embedding_model: "text-embedding-ada-002".into(),
            embedding_dimensions: 1536,
            storage_connection_string: Some("DefaultEndpointsProtocol=https;AccountName=x".into()),
            container: "text2sql".into(),
        }
    }

    fn field_names(index: &Value) -> Vec<&str> {
        index["fields"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["name"].as_str().unwrap())
            .collect()
    }

    #[test]
    fn schema_store_index_has_vector_and_complex_fields() {
        let index = index_definition(IndexType::SchemaStore, &settings()).unwrap();
        assert_eq!(index["name"], "text-2-sql-schema-store-index-test");
        let names = field_names(&index);
        for expected in ["Id", "Definition", "DefinitionEmbedding", "Columns", "EntityRelationships", "CompleteEntityRelationshipsGraph"] {
            assert!(names.contains(&expected), "missing {expected}");
        }

        let embedding = &index["fields"][9];
        assert_eq!(embedding["name"], "DefinitionEmbedding");
        assert_eq!(embedding["dimensions"], 1536);
        assert_eq!(
            index["vectorSearch"]["vectorizers"][0]["azureOpenAIParameters"]["deploymentId"],
            "embed"
        );
        assert_eq!(index["semantic"]["configurations"][0]["name"], "semantic-config");
    }

    #[test]
    fn column_value_store_has_no_vectors() {
        let mut s = settings();
        s.openai_endpoint = None;
        let index = index_definition(IndexType::ColumnValueStore, &s).unwrap();
        assert!(index.get("vectorSearch").is_none());
        assert!(field_names(&index).contains(&"Value"));
        assert!(skillset_definition(IndexType::ColumnValueStore, &s).unwrap().is_none());
    }

    #[test]
    fn vector_index_requires_openai_endpoint() {
        let mut s = settings();
        s.openai_endpoint = None;
        assert!(matches!(
            index_definition(IndexType::QueryCache, &s),
            Err(SearchError::NotConfigured("OpenAI__Endpoint"))
        ));
    }

    #[test]
    fn skillset_embeds_question_for_query_cache() {
        let skillset = skillset_definition(IndexType::QueryCache, &settings())
            .unwrap()
            .unwrap();
        let skill = &skillset["skills"][0];
        assert_eq!(skill["inputs"][0]["source"], "/document/Question");
        assert_eq!(skill["outputs"][0]["targetName"], "QuestionEmbedding");
        assert_eq!(skill["resourceUri"], "https://oai.example.com");
    }

    #[test]
    fn parsing_modes() {
        assert_eq!(parsing_mode(IndexType::SchemaStore, false), "json");
        assert_eq!(parsing_mode(IndexType::SchemaStore, true), "jsonArray");
        assert_eq!(parsing_mode(IndexType::QueryCache, true), "jsonArray");
        assert_eq!(parsing_mode(IndexType::ColumnValueStore, true), "jsonLines");
    }

    #[test]
    fn indexer_maps_encoded_key() {
        let indexer = indexer_definition(IndexType::SchemaStore, &settings(), false);
        assert_eq!(indexer["targetIndexName"], "text-2-sql-schema-store-index-test");
        assert_eq!(indexer["skillsetName"], "text-2-sql-schema-store-skillset-test");
        assert_eq!(indexer["fieldMappings"][0]["sourceFieldName"], "FQN");
        assert_eq!(indexer["fieldMappings"][0]["mappingFunction"]["name"], "base64Encode");

        let indexer = indexer_definition(IndexType::ColumnValueStore, &settings(), false);
        assert!(indexer.get("skillsetName").is_none());
        assert_eq!(indexer["parameters"]["configuration"]["parsingMode"], "jsonLines");
    }

    #[test]
    fn data_source_points_at_folder() {
        let ds = data_source_definition(IndexType::QueryCache, &settings()).unwrap();
        assert_eq!(ds["container"]["name"], "text2sql");
        assert_eq!(ds["container"]["query"], "query_cache");

        let mut s = settings();
        s.storage_connection_string = None;
        assert!(data_source_definition(IndexType::QueryCache, &s).is_err());
    }
}
