//! Question to answer: rewrite, cache lookup, schema selection, SQL
//! generation with one correction round, execution, answer, caching.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use nl2sql_connector::{apply_row_limit, validate_read_only, Row, SqlConnector};
use nl2sql_core::Config;
use nl2sql_llm::{extract_json, extract_sql};
use nl2sql_search::{CachedQuery, Document, SearchClient, SearchError, DEFAULT_CACHE_THRESHOLD};

use crate::config::{ANSWER, SQL_QUERY_GENERATION, SQL_SCHEMA_SELECTION, USER_MESSAGE_REWRITE};
use crate::executor::{AgentExecutionError, AgentExecutor};
use crate::payloads::{
    AnswerWithSourcesPayload, DisambiguationRequest, InteractionPayload, Source,
    UserMessagePayload,
};
use crate::state_store::{ConversationTurn, StateStore, ThreadState};

/// Correction attempts after the first generated query fails.
const MAX_CORRECTIONS: usize = 1;

/// Rows shown to the answer agent per source.
const ANSWER_CONTEXT_ROWS: usize = 50;

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub use_query_cache: bool,
    pub pre_run_query_cache: bool,
    pub row_limit: usize,
    pub cache_threshold: f64,
    pub schema_top: usize,
    pub query_cache_index: String,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            use_query_cache: false,
            pre_run_query_cache: false,
            row_limit: 100,
            cache_threshold: DEFAULT_CACHE_THRESHOLD,
            schema_top: 4,
            query_cache_index: "text-2-sql-query-cache-index".into(),
        }
    }
}

impl PipelineOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            use_query_cache: config.text2sql.use_query_cache,
            pre_run_query_cache: config.text2sql.pre_run_query_cache,
            row_limit: config.text2sql.row_limit as usize,
            query_cache_index: config.search.query_cache_index.clone(),
            ..Self::default()
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Agent(#[from] AgentExecutionError),
    #[error("search failed: {0}")]
    Search(#[from] SearchError),
}

// ── Agent outputs ─────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct RewriteOutput {
    rewritten_message: Option<String>,
    #[serde(default)]
    all_non_database_query: bool,
}

#[derive(Debug, Default, Deserialize)]
struct SchemaSelectionOutput {
    #[serde(default)]
    entities: Vec<String>,
    #[serde(default)]
    filter_conditions: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct DisambiguationOutput {
    disambiguation: Vec<DisambiguationRequest>,
}

#[derive(Debug, Deserialize)]
struct AnswerOutput {
    answer: String,
    #[serde(default)]
    follow_up_suggestions: Vec<String>,
}

fn parse_output<T: DeserializeOwned>(output: &str) -> Option<T> {
    serde_json::from_str(extract_json(output)).ok()
}

/// Entities and column values handed to SQL generation.
#[derive(Debug, Default, Serialize)]
struct SchemaContext {
    schemas: Vec<Document>,
    column_values: IndexMap<String, Vec<Value>>,
}

impl SchemaContext {
    fn fqns(&self) -> Vec<String> {
        self.schemas
            .iter()
            .filter_map(|s| s.get("FQN").and_then(Value::as_str))
            .map(str::to_string)
            .collect()
    }
}

enum Generation {
    Rows(Source),
    Disambiguation(Vec<DisambiguationRequest>),
    Failed(String),
}

pub struct Text2SqlPipeline {
    executor: AgentExecutor,
    connector: Arc<dyn SqlConnector>,
    search: Arc<dyn SearchClient>,
    state_store: Arc<dyn StateStore>,
    options: PipelineOptions,
}

impl Text2SqlPipeline {
    pub fn new(
        executor: AgentExecutor,
        connector: Arc<dyn SqlConnector>,
        search: Arc<dyn SearchClient>,
        state_store: Arc<dyn StateStore>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            executor,
            connector,
            search,
            state_store,
            options,
        }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Run one user message through every step. The last payload is the
    /// final answer or disambiguation request; everything before it is a
    /// processing update.
    pub async fn process_user_message(
        &self,
        thread_id: &str,
        payload: UserMessagePayload,
    ) -> Result<Vec<InteractionPayload>, PipelineError> {
        let mut out = Vec::new();
        let mut state = self.state_store.get_state(thread_id).await.unwrap_or_default();

        out.push(InteractionPayload::processing_update(
            thread_id,
            "Understanding your question",
            "Rewriting the question with the conversation so far",
        ));
        let (question, non_database) = self.rewrite(&payload, &state).await?;
        info!(thread_id, question = %question, "Rewritten question");

        if non_database {
            out.push(InteractionPayload::processing_update(
                thread_id,
                "Answering",
                "No database lookup needed",
            ));
            let answer = self.answer(&question, Vec::new()).await?;
            self.finish(thread_id, &mut state, &payload, &question, &answer).await;
            out.push(InteractionPayload::answer(thread_id, answer));
            return Ok(out);
        }

        let mut cached_sources = None;
        if self.options.use_query_cache && self.options.pre_run_query_cache {
            out.push(InteractionPayload::processing_update(
                thread_id,
                "Checking query cache",
                "Looking for a previously answered question",
            ));
            if let Some(hit) = self
                .search
                .fetch_queries_from_cache(&question, self.options.cache_threshold)
                .await?
            {
                info!(score = hit.score, cached = %hit.question, "Query cache hit");
                cached_sources = self.run_cached(&hit).await;
            }
        }
        let from_cache = cached_sources.is_some();

        let (sources, schema_fqns) = match cached_sources {
            Some(sources) => (sources, Vec::new()),
            None => {
                out.push(InteractionPayload::processing_update(
                    thread_id,
                    "Selecting schemas",
                    "Finding the tables and values the question refers to",
                ));
                let context = self.select_schemas(&question).await?;

                out.push(InteractionPayload::processing_update(
                    thread_id,
                    "Generating SQL",
                    format!("Writing a query over {} entities", context.schemas.len()),
                ));
                match self.generate_and_run(thread_id, &question, &context, &mut out).await? {
                    Generation::Rows(source) => (vec![source], context.fqns()),
                    Generation::Disambiguation(requests) => {
                        let questions: Vec<&str> =
                            requests.iter().map(|r| r.agent_question.as_str()).collect();
                        state.record(ConversationTurn {
                            user_message: payload.user_message.clone(),
                            rewritten_message: question.clone(),
                            answer: questions.join(" "),
                            sql_queries: Vec::new(),
                        });
                        self.state_store.save_state(thread_id, state).await;
                        out.push(InteractionPayload::disambiguation(thread_id, requests));
                        return Ok(out);
                    }
                    Generation::Failed(error) => {
                        let answer = AnswerWithSourcesPayload {
                            answer: format!(
                                "I could not produce a working query for this question. Last error: {error}"
                            ),
                            sources: Vec::new(),
                            follow_up_suggestions: Vec::new(),
                        };
                        self.finish(thread_id, &mut state, &payload, &question, &answer).await;
                        out.push(InteractionPayload::answer(thread_id, answer));
                        return Ok(out);
                    }
                }
            }
        };

        out.push(InteractionPayload::processing_update(
            thread_id,
            "Generating answer",
            format!(
                "Summarising {} rows",
                sources.iter().map(|s| s.sql_rows.len()).sum::<usize>()
            ),
        ));
        let answer = self.answer(&question, sources).await?;

        if self.options.use_query_cache && !from_cache {
            out.push(InteractionPayload::processing_update(
                thread_id,
                "Updating query cache",
                "Saving the query for similar questions",
            ));
            self.add_to_cache(&question, &answer.sources, &schema_fqns).await;
        }

        self.finish(thread_id, &mut state, &payload, &question, &answer).await;
        out.push(InteractionPayload::answer(thread_id, answer));
        Ok(out)
    }

    async fn rewrite(
        &self,
        payload: &UserMessagePayload,
        state: &ThreadState,
    ) -> Result<(String, bool), PipelineError> {
        let context = json!({
            "previous_turns": state.turns,
            "injected_parameters": payload.injected_parameters,
        });
        let response = self
            .executor
            .execute(USER_MESSAGE_REWRITE, &payload.user_message, Some(&context))
            .await?;

        let parsed: RewriteOutput = parse_output(&response.output).unwrap_or_default();
        let question = parsed
            .rewritten_message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| payload.user_message.clone());
        Ok((question, parsed.all_non_database_query))
    }

    /// Run every cached query. `None` if any of them no longer works.
    async fn run_cached(&self, hit: &CachedQuery) -> Option<Vec<Source>> {
        if hit.sql_query_decomposition.is_empty() {
            return None;
        }
        let mut sources = Vec::new();
        for step in &hit.sql_query_decomposition {
            match self.execute_sql(&step.sql_query).await {
                Ok(rows) => sources.push(Source {
                    sql_query: step.sql_query.clone(),
                    sql_rows: rows,
                }),
                Err(error) => {
                    warn!(error = %error, "Cached query failed; generating a new one");
                    return None;
                }
            }
        }
        Some(sources)
    }

    async fn select_schemas(&self, question: &str) -> Result<SchemaContext, PipelineError> {
        let response = self
            .executor
            .execute(SQL_SCHEMA_SELECTION, question, None)
            .await?;
        let selection: SchemaSelectionOutput = parse_output(&response.output).unwrap_or_default();

        let search_text = if selection.entities.is_empty() {
            question.to_string()
        } else {
            format!("{question} {}", selection.entities.join(" "))
        };
        let schemas = self
            .search
            .get_entity_schemas(&search_text, &[], self.options.schema_top)
            .await?;

        let mut column_values: IndexMap<String, Vec<Value>> = IndexMap::new();
        for term in &selection.filter_conditions {
            for (fqn, values) in self.search.get_column_values(term).await? {
                let merged = column_values.entry(fqn).or_default();
                for value in values {
                    if !merged.contains(&value) {
                        merged.push(value);
                    }
                }
            }
        }

        info!(
            schemas = schemas.len(),
            column_values = column_values.len(),
            "Schema selection complete"
        );
        Ok(SchemaContext {
            schemas,
            column_values,
        })
    }

    async fn generate_and_run(
        &self,
        thread_id: &str,
        question: &str,
        context: &SchemaContext,
        out: &mut Vec<InteractionPayload>,
    ) -> Result<Generation, PipelineError> {
        let mut context_value = serde_json::to_value(context).unwrap_or(Value::Null);
        let mut attempt = 0;

        loop {
            let response = self
                .executor
                .execute(SQL_QUERY_GENERATION, question, Some(&context_value))
                .await?;

            if let Some(d) = parse_output::<DisambiguationOutput>(&response.output) {
                if !d.disambiguation.is_empty() {
                    return Ok(Generation::Disambiguation(d.disambiguation));
                }
            }

            let sql = extract_sql(&response.output);
            let error = match self.execute_sql(&sql).await {
                Ok(rows) => {
                    info!(rows = rows.len(), "Query executed");
                    return Ok(Generation::Rows(Source {
                        sql_query: sql,
                        sql_rows: rows,
                    }));
                }
                Err(error) => error,
            };

            warn!(attempt, error = %error, "Generated query failed");
            if attempt >= MAX_CORRECTIONS {
                return Ok(Generation::Failed(error));
            }
            attempt += 1;

            out.push(InteractionPayload::processing_update(
                thread_id,
                "Correcting SQL",
                format!("The query failed: {error}"),
            ));
            context_value["previous_query"] = json!(sql);
            context_value["previous_error"] = json!(error);
        }
    }

    /// Guard, execute and truncate. Errors come back as text for the
    /// correction prompt.
    async fn execute_sql(&self, sql: &str) -> Result<Vec<Row>, String> {
        validate_read_only(sql).map_err(|e| e.to_string())?;
        self.connector
            .query_execution(sql)
            .await
            .map(|rows| apply_row_limit(rows, self.options.row_limit))
            .map_err(|e| e.to_string())
    }

    async fn answer(
        &self,
        question: &str,
        sources: Vec<Source>,
    ) -> Result<AnswerWithSourcesPayload, PipelineError> {
        let shown: Vec<Value> = sources
            .iter()
            .map(|s| {
                json!({
                    "sql_query": s.sql_query,
                    "row_count": s.sql_rows.len(),
                    "rows": s.sql_rows.iter().take(ANSWER_CONTEXT_ROWS).collect::<Vec<_>>(),
                })
            })
            .collect();
        let context = json!({ "sql_results": shown });

        let response = self.executor.execute(ANSWER, question, Some(&context)).await?;
        let (answer, follow_up_suggestions) = match parse_output::<AnswerOutput>(&response.output) {
            Some(parsed) => (parsed.answer, parsed.follow_up_suggestions),
            None => (response.output.trim().to_string(), Vec::new()),
        };

        Ok(AnswerWithSourcesPayload {
            answer,
            sources,
            follow_up_suggestions,
        })
    }

    async fn add_to_cache(&self, question: &str, sources: &[Source], schemas: &[String]) {
        if sources.is_empty() {
            return;
        }
        let decomposition: Vec<Value> = sources
            .iter()
            .map(|s| json!({ "SqlQuery": s.sql_query, "Schemas": schemas }))
            .collect();
        let document = match json!({
            "Question": question,
            "SqlQueryDecomposition": decomposition,
        }) {
            Value::Object(map) => map,
            _ => return,
        };

        if let Err(e) = self
            .search
            .add_entry_to_index(
                document,
                &self.options.query_cache_index,
                &[("Question", "QuestionEmbedding")],
            )
            .await
        {
            warn!(error = %e, "Could not add query to cache");
        }
    }

    async fn finish(
        &self,
        thread_id: &str,
        state: &mut ThreadState,
        payload: &UserMessagePayload,
        question: &str,
        answer: &AnswerWithSourcesPayload,
    ) {
        state.record(ConversationTurn {
            user_message: payload.user_message.clone(),
            rewritten_message: question.to_string(),
            answer: answer.answer.clone(),
            sql_queries: answer.sources.iter().map(|s| s.sql_query.clone()).collect(),
        });
        self.state_store.save_state(thread_id, state.clone()).await;
    }
}
