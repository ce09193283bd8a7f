use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use nl2sql_llm::{LlmError, LlmProvider, Message};

use crate::config::{AgentConfig, ModelTier, PromptParameters};

/// Output of one agent call.
#[derive(Debug, Clone)]
pub struct AgentResponse {
    pub agent_name: String,
    pub output: String,
    pub execution_time_ms: u64,
}

/// Executes individual agents using an LLM provider.
pub struct AgentExecutor {
    agents: HashMap<String, AgentConfig>,
    provider: Arc<dyn LlmProvider>,
    mini_provider: Arc<dyn LlmProvider>,
    parameters: PromptParameters,
    temperature: f32,
    max_tokens: u32,
}

impl AgentExecutor {
    pub fn new(
        agents: HashMap<String, AgentConfig>,
        provider: Arc<dyn LlmProvider>,
        mini_provider: Arc<dyn LlmProvider>,
        parameters: PromptParameters,
        temperature: f32,
        max_tokens: u32,
    ) -> Self {
        Self {
            agents,
            provider,
            mini_provider,
            parameters,
            temperature,
            max_tokens,
        }
    }

    /// Execute a single agent with a task.
    pub async fn execute(
        &self,
        agent_name: &str,
        task: &str,
        context: Option<&serde_json::Value>,
    ) -> Result<AgentResponse, AgentExecutionError> {
        let start = Instant::now();

        let config = self
            .agents
            .get(agent_name)
            .ok_or_else(|| AgentExecutionError::AgentNotFound(agent_name.to_string()))?;

        let provider = match config.model {
            ModelTier::Full => &self.provider,
            ModelTier::Mini => &self.mini_provider,
        };

        info!(agent = agent_name, model = provider.model(), "executing agent task");

        let mut system_content = self.parameters.render(&config.system_prompt);
        if let Some(ctx) = context {
            if !ctx.is_null() {
                system_content.push_str("\n\n## Context\n");
                system_content.push_str(&serde_json::to_string_pretty(ctx).unwrap_or_default());
            }
        }

        let messages = vec![Message::system(system_content), Message::user(task)];

        let output = provider
            .complete(messages, self.temperature, self.max_tokens)
            .await
            .map_err(AgentExecutionError::LlmError)?;

        let elapsed_ms = start.elapsed().as_millis() as u64;
        info!(agent = agent_name, elapsed_ms, "agent execution complete");
        debug!(agent = agent_name, output = %output, "agent output");

        Ok(AgentResponse {
            agent_name: agent_name.to_string(),
            output,
            execution_time_ms: elapsed_ms,
        })
    }

    /// List available agent names.
    pub fn agent_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.agents.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if an agent exists.
    pub fn has_agent(&self, name: &str) -> bool {
        self.agents.contains_key(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AgentExecutionError {
    #[error("agent not found: {0}")]
    AgentNotFound(String),
    #[error("LLM error: {0}")]
    LlmError(LlmError),
}
