use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use nl2sql_connector::{create_connector, ConnectorError};
use nl2sql_core::{Config, ConfigError};
use nl2sql_llm::{create_provider, LlmError, LlmProvider};
use nl2sql_search::{AiSearchConnector, LocalSearchClient, SearchClient, SearchError};

use crate::config::{load_agents, AgentConfigError, PromptParameters};
use crate::executor::AgentExecutor;
use crate::payloads::{InteractionPayload, PayloadBody, UserMessagePayload};
use crate::pipeline::{PipelineError, PipelineOptions, Text2SqlPipeline};
use crate::state_store::{InMemoryStateStore, StateStore};

/// A processing update as reported to HTTP callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateSummary {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: String,
}

/// Every query and row behind an answer, flattened across sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlResults {
    pub queries: Vec<String>,
    pub rows: Vec<Value>,
    pub total_rows: usize,
    pub queries_executed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub thread_id: String,
    pub updates: Vec<UpdateSummary>,
    #[serde(rename = "final")]
    pub final_payload: Option<InteractionPayload>,
    pub sql_results: Option<SqlResults>,
}

impl RunOutcome {
    /// Human-readable reply: the answer text, or the first clarifying
    /// question when the pipeline asked for disambiguation.
    pub fn answer_text(&self) -> String {
        match self.final_payload.as_ref().map(|p| &p.body) {
            Some(PayloadBody::AnswerWithSources(answer)) => answer.answer.clone(),
            Some(PayloadBody::DisambiguationRequests(d)) => d
                .requests
                .first()
                .map(|r| r.agent_question.clone())
                .unwrap_or_default(),
            _ => String::new(),
        }
    }

    /// Rows and queries both present.
    pub fn success(&self) -> bool {
        self.sql_results
            .as_ref()
            .is_some_and(|r| !r.rows.is_empty() && !r.queries.is_empty())
    }
}

/// `None` unless the payload is an answer with at least one source.
pub fn extract_sql_results(payload: &InteractionPayload) -> Option<SqlResults> {
    let PayloadBody::AnswerWithSources(answer) = &payload.body else {
        return None;
    };
    if answer.sources.is_empty() {
        return None;
    }

    let mut queries = Vec::new();
    let mut rows = Vec::new();
    for source in &answer.sources {
        if source.sql_query.is_empty() {
            continue;
        }
        queries.push(source.sql_query.clone());
        rows.extend(source.sql_rows.iter().cloned().map(Value::Object));
    }

    Some(SqlResults {
        total_rows: rows.len(),
        queries_executed: queries.len(),
        queries,
        rows,
    })
}

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database: {0}")]
    Connector(#[from] ConnectorError),
    #[error("llm: {0}")]
    Llm(#[from] LlmError),
    #[error("agents: {0}")]
    Agents(#[from] AgentConfigError),
    #[error("search: {0}")]
    Search(#[from] SearchError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Process-wide entry point: one pipeline shared by every thread.
pub struct Text2SqlRunner {
    pipeline: Text2SqlPipeline,
}

impl Text2SqlRunner {
    pub fn new(pipeline: Text2SqlPipeline) -> Self {
        Self { pipeline }
    }

    /// Connect the database, LLM deployments and search backend described
    /// by `config`.
    pub async fn from_config(config: &Config) -> Result<Self, RunnerError> {
        let engine = config.text2sql.require_engine()?;
        let connector =
            create_connector(engine, config.text2sql.require_connection_string()?).await?;

        let provider: Arc<dyn LlmProvider> = Arc::from(create_provider(&config.openai, false)?);
        let mini_provider: Arc<dyn LlmProvider> = Arc::from(create_provider(&config.openai, true)?);

        let search: Arc<dyn SearchClient> = if config.text2sql.use_ai_search {
            Arc::new(AiSearchConnector::from_config(&config.search, &config.openai)?)
        } else {
            info!(
                dir = %config.text2sql.data_dictionary_dir.display(),
                "AI Search disabled; using local data dictionary"
            );
            Arc::new(LocalSearchClient::load(&config.text2sql.data_dictionary_dir)?)
        };

        let options = PipelineOptions::from_config(config);
        let agents = load_agents(config.text2sql.agents_dir.as_deref())?;
        let executor = AgentExecutor::new(
            agents,
            provider,
            mini_provider,
            PromptParameters::new(&config.text2sql.use_case, engine, options.row_limit),
            config.openai.temperature,
            config.openai.max_tokens,
        );

        let state_store: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::new());
        Ok(Self::new(Text2SqlPipeline::new(
            executor,
            connector,
            search,
            state_store,
            options,
        )))
    }

    pub async fn run(&self, thread_id: &str, message: &str) -> Result<RunOutcome, RunnerError> {
        let payloads = self
            .pipeline
            .process_user_message(thread_id, UserMessagePayload::new(message))
            .await?;

        let mut updates = Vec::new();
        let mut final_payload = None;
        for payload in payloads {
            if let PayloadBody::ProcessingUpdate(update) = &payload.body {
                updates.push(UpdateSummary {
                    kind: "processing_update".into(),
                    title: update.title.clone(),
                    message: update.message.clone(),
                });
                continue;
            }
            final_payload = Some(payload);
            break;
        }

        let sql_results = final_payload.as_ref().and_then(extract_sql_results);
        match &final_payload {
            Some(p) => info!(thread_id, payload_type = p.payload_type(), "Run complete"),
            None => warn!(thread_id, "Pipeline produced no final payload"),
        }

        Ok(RunOutcome {
            thread_id: thread_id.to_string(),
            updates,
            final_payload,
            sql_results,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payloads::{AnswerWithSourcesPayload, DisambiguationRequest, Source};
    use crate::pipeline::tests::{pipeline, products_search, ScriptedLlm};
    use nl2sql_connector::Row;
    use serde_json::json;

    fn row(n: i64) -> Row {
        let mut row = Row::new();
        row.insert("n".into(), json!(n));
        row
    }

    #[test]
    fn sql_results_flatten_sources() {
        let payload = InteractionPayload::answer(
            "t",
            AnswerWithSourcesPayload {
                answer: "two queries".into(),
                sources: vec![
                    Source { sql_query: "SELECT 1 AS n".into(), sql_rows: vec![row(1)] },
                    Source { sql_query: "SELECT 2 AS n".into(), sql_rows: vec![row(2), row(3)] },
                ],
                follow_up_suggestions: Vec::new(),
            },
        );

        let results = extract_sql_results(&payload).unwrap();
        assert_eq!(results.queries_executed, 2);
        assert_eq!(results.total_rows, 3);
        assert_eq!(results.rows[2]["n"], 3);
    }

    #[test]
    fn no_sources_means_no_results() {
        let payload = InteractionPayload::answer(
            "t",
            AnswerWithSourcesPayload {
                answer: "hello".into(),
                sources: Vec::new(),
                follow_up_suggestions: Vec::new(),
            },
        );
        assert!(extract_sql_results(&payload).is_none());

        let question = InteractionPayload::disambiguation(
            "t",
            vec![DisambiguationRequest {
                agent_question: "Which year?".into(),
                user_choices: Vec::new(),
            }],
        );
        assert!(extract_sql_results(&question).is_none());

        let outcome = RunOutcome {
            thread_id: "t".into(),
            updates: Vec::new(),
            final_payload: Some(question),
            sql_results: None,
        };
        assert_eq!(outcome.answer_text(), "Which year?");
        assert!(!outcome.success());
    }

    #[tokio::test]
    async fn run_collects_updates_and_results() {
        let llm = ScriptedLlm::new(&[
            r#"{"rewritten_message": "How many Samsung products are there?"}"#,
            r#"{"entities": ["products"], "filter_conditions": []}"#,
            "SELECT COUNT(*) AS n FROM products WHERE brand = 'Samsung'",
            r#"{"answer": "2"}"#,
        ]);
        let runner = Text2SqlRunner::new(
            pipeline(llm, products_search(), PipelineOptions::default()).await,
        );

        let outcome = runner.run("thread-9", "how many samsung").await.unwrap();
        assert_eq!(outcome.thread_id, "thread-9");
        assert_eq!(outcome.updates.len(), 4);
        assert!(outcome.updates.iter().all(|u| u.kind == "processing_update"));
        assert_eq!(outcome.answer_text(), "2");
        assert!(outcome.success());

        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["final"]["payloadType"], "answer_with_sources");
        assert_eq!(value["sql_results"]["total_rows"], 1);
        assert_eq!(value["updates"][0]["type"], "processing_update");
    }

    #[tokio::test]
    async fn missing_engine_is_a_config_error() {
        let mut config = Config::for_profile("RUNNER_TEST_UNSET");
        config.text2sql.database_engine = None;
        let err = Text2SqlRunner::from_config(&config).await.err().unwrap();
        assert!(matches!(err, RunnerError::Config(ConfigError::Missing(_))));
    }
}
