use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u16(profile: &str, key: &str, default: u16) -> u16 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Booleans in `.env` files are written Python-style (`True`/`False`).
fn profiled_env_bool(profile: &str, key: &str, default: bool) -> bool {
    match profiled_env_opt(profile, key) {
        Some(v) => matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes"),
        None => default,
    }
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    /// Raw `LOGGING_LEVEL` value.
    pub logging_level: String,
    pub server: ServerConfig,
    pub text2sql: Text2SqlConfig,
    pub search: SearchConfig,
    pub openai: OpenAiConfig,
    pub storage: StorageConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `NL2SQL_PROFILE`. When set (e.g. `TEST`), every
    /// key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("NL2SQL_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            logging_level: profiled_env_or(p, "LOGGING_LEVEL", "INFO"),
            server: ServerConfig::from_env_profiled(p),
            text2sql: Text2SqlConfig::from_env_profiled(p),
            search: SearchConfig::from_env_profiled(p),
            openai: OpenAiConfig::from_env_profiled(p),
            storage: StorageConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  server:   {}:{}", self.server.host, self.server.port);
        tracing::info!(
            "  text2sql: engine={}, ai_search={}, query_cache={}, row_limit={}",
            self.text2sql.database_engine.as_deref().unwrap_or("(none)"),
            self.text2sql.use_ai_search,
            self.text2sql.use_query_cache,
            self.text2sql.row_limit
        );
        tracing::info!(
            "  search:   endpoint={}",
            self.search.endpoint.as_deref().unwrap_or("(none)")
        );
        tracing::info!(
            "  openai:   endpoint={}, deployment={}",
            self.openai.endpoint.as_deref().unwrap_or("(none)"),
            self.openai.completion_deployment
        );
        tracing::info!("  storage:  container={}", self.storage.container);
    }

    /// Return a redacted view safe for API responses (no secrets).
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "logging_level": self.logging_level,
            "server": { "host": self.server.host, "port": self.server.port },
            "text2sql": {
                "database_engine": self.text2sql.database_engine,
                "use_ai_search": self.text2sql.use_ai_search,
                "use_query_cache": self.text2sql.use_query_cache,
                "pre_run_query_cache": self.text2sql.pre_run_query_cache,
                "row_limit": self.text2sql.row_limit,
                "configured": self.text2sql.connection_string.is_some(),
            },
            "search": {
                "endpoint": self.search.endpoint,
                "schema_store_index": self.search.schema_store_index,
                "column_value_store_index": self.search.column_value_store_index,
                "query_cache_index": self.search.query_cache_index,
                "configured": self.search.is_configured(),
            },
            "openai": {
                "endpoint": self.openai.endpoint,
                "completion_deployment": self.openai.completion_deployment,
                "embedding_deployment": self.openai.embedding_deployment,
                "configured": self.openai.is_configured(),
            },
            "storage": {
                "container": self.storage.container,
                "configured": self.storage.container_sas_url.is_some(),
            },
        })
    }
}

// ── Server ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origin: String,
}

impl ServerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "HOST", "0.0.0.0"),
            port: profiled_env_u16(p, "PORT", 7071),
            cors_origin: profiled_env_or(p, "CORS_ORIGIN", "*"),
        }
    }
}

// ── Text2Sql ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Text2SqlConfig {
    /// "POSTGRES", "SQLITE", "TSQL", "DATABRICKS", "SNOWFLAKE"
    pub database_engine: Option<String>,
    pub connection_string: Option<String>,
    pub use_ai_search: bool,
    pub use_query_cache: bool,
    pub pre_run_query_cache: bool,
    pub row_limit: u32,
    pub use_case: String,
    /// Optional directory of `.md` agent prompt overrides.
    pub agents_dir: Option<PathBuf>,
    /// Generated data dictionary used when AI Search is disabled.
    pub data_dictionary_dir: PathBuf,
}

impl Text2SqlConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            database_engine: profiled_env_opt(p, "Text2Sql__DatabaseEngine"),
            connection_string: profiled_env_opt(p, "Text2Sql__DatabaseConnectionString"),
            use_ai_search: profiled_env_bool(p, "Text2Sql__UseAISearch", true),
            use_query_cache: profiled_env_bool(p, "Text2Sql__UseQueryCache", false),
            pre_run_query_cache: profiled_env_bool(p, "Text2Sql__PreRunQueryCache", false),
            row_limit: profiled_env_u32(p, "Text2Sql__RowLimit", 100),
            use_case: profiled_env_or(p, "Text2Sql__UseCase", "query the connected database"),
            agents_dir: profiled_env_opt(p, "NL2SQL_AGENTS_DIR").map(PathBuf::from),
            data_dictionary_dir: PathBuf::from(profiled_env_or(
                p,
                "Text2Sql__DataDictionaryDir",
                "data_dictionary",
            )),
        }
    }

    pub fn require_engine(&self) -> Result<&str, ConfigError> {
        self.database_engine
            .as_deref()
            .ok_or(ConfigError::Missing("Text2Sql__DatabaseEngine"))
    }

    pub fn require_connection_string(&self) -> Result<&str, ConfigError> {
        self.connection_string
            .as_deref()
            .ok_or(ConfigError::Missing("Text2Sql__DatabaseConnectionString"))
    }
}

// ── Azure AI Search ───────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub endpoint: Option<String>,
    pub key: Option<String>,
    pub api_version: String,
    pub schema_store_index: String,
    pub column_value_store_index: String,
    pub query_cache_index: String,
    pub semantic_config: String,
}

impl SearchConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            endpoint: profiled_env_opt(p, "AIService__AzureSearchOptions__Endpoint"),
            key: profiled_env_opt(p, "AIService__AzureSearchOptions__Key"),
            api_version: profiled_env_or(p, "AIService__AzureSearchOptions__ApiVersion", "2024-07-01"),
            schema_store_index: profiled_env_or(
                p,
                "AIService__AzureSearchOptions__Text2SqlSchemaStore__Index",
                "text-2-sql-schema-store-index",
            ),
            column_value_store_index: profiled_env_or(
                p,
                "AIService__AzureSearchOptions__Text2SqlColumnValueStore__Index",
                "text-2-sql-column-value-store-index",
            ),
            query_cache_index: profiled_env_or(
                p,
                "AIService__AzureSearchOptions__Text2SqlQueryCache__Index",
                "text-2-sql-query-cache-index",
            ),
            semantic_config: profiled_env_or(
                p,
                "AIService__AzureSearchOptions__SemanticConfig",
                "semantic-config",
            ),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.endpoint.is_some() && self.key.is_some()
    }
}

// ── Azure OpenAI ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub api_version: String,
    pub completion_deployment: String,
    pub mini_completion_deployment: String,
    pub embedding_model: String,
    pub embedding_deployment: String,
    pub embedding_dimensions: u32,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl OpenAiConfig {
    fn from_env_profiled(p: &str) -> Self {
        let completion_deployment = profiled_env_or(p, "OpenAI__CompletionDeployment", "gpt-4o");
        Self {
            endpoint: profiled_env_opt(p, "OpenAI__Endpoint"),
            api_key: profiled_env_opt(p, "OpenAI__ApiKey"),
            api_version: profiled_env_or(p, "OpenAI__ApiVersion", "2024-08-01-preview"),
            mini_completion_deployment: profiled_env_or(
                p,
                "OpenAI__MiniCompletionDeployment",
                &completion_deployment,
            ),
            completion_deployment,
            embedding_model: profiled_env_or(p, "OpenAI__EmbeddingModel", "text-embedding-ada-002"),
            embedding_deployment: profiled_env_or(
                p,
                "OpenAI__EmbeddingDeployment",
                "text-embedding-ada-002",
            ),
            embedding_dimensions: profiled_env_u32(p, "OpenAI__EmbeddingDimensions", 1536),
            temperature: profiled_env_or(p, "OpenAI__Temperature", "0.0")
                .parse()
                .unwrap_or(0.0),
            max_tokens: profiled_env_u32(p, "OpenAI__MaxTokens", 2048),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.endpoint.is_some() && self.api_key.is_some()
    }
}

// ── Blob storage ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Connection string handed to search data sources.
    pub connection_string: Option<String>,
    pub container: String,
    /// Container URL with SAS token, used for direct uploads.
    pub container_sas_url: Option<String>,
}

impl StorageConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            connection_string: profiled_env_opt(p, "StorageAccount__ConnectionString"),
            container: profiled_env_or(p, "StorageAccount__Container", "text2sql"),
            container_sas_url: profiled_env_opt(p, "StorageAccount__ContainerSasUrl"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_prefix_wins_over_plain_key() {
        env::set_var("NL2SQLCFGTEST_Text2Sql__RowLimit", "7");
        env::set_var("Text2Sql__RowLimit", "50");
        let cfg = Config::for_profile("nl2sqlcfgtest");
        assert_eq!(cfg.text2sql.row_limit, 7);
        assert_eq!(cfg.profile_label(), "NL2SQLCFGTEST");
        env::remove_var("NL2SQLCFGTEST_Text2Sql__RowLimit");
        env::remove_var("Text2Sql__RowLimit");
    }

    #[test]
    fn python_style_booleans() {
        env::set_var("BOOLTEST_Text2Sql__UseQueryCache", "True");
        env::set_var("BOOLTEST_Text2Sql__UseAISearch", "False");
        let cfg = Config::for_profile("BOOLTEST");
        assert!(cfg.text2sql.use_query_cache);
        assert!(!cfg.text2sql.use_ai_search);
        env::remove_var("BOOLTEST_Text2Sql__UseQueryCache");
        env::remove_var("BOOLTEST_Text2Sql__UseAISearch");
    }

    #[test]
    fn redacted_summary_has_no_secrets() {
        env::set_var("REDACT_OpenAI__ApiKey", "super-secret");
        env::set_var("REDACT_OpenAI__Endpoint", "https://example.openai.azure.com");
        let cfg = Config::for_profile("REDACT");
        let summary = cfg.redacted_summary().to_string();
        assert!(!summary.contains("super-secret"));
        assert!(summary.contains("example.openai.azure.com"));
        env::remove_var("REDACT_OpenAI__ApiKey");
        env::remove_var("REDACT_OpenAI__Endpoint");
    }

    #[test]
    fn missing_engine_is_reported_by_key() {
        let cfg = Config::for_profile("NOENGINEPROFILE");
        if cfg.text2sql.database_engine.is_none() {
            let err = cfg.text2sql.require_engine().unwrap_err();
            assert!(err.to_string().contains("Text2Sql__DatabaseEngine"));
        }
    }
}
