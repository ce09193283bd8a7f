//! Messages exchanged between callers and the text-to-SQL pipeline.
//!
//! JSON shape:
//!
//! ```text
//! {
//!   "payloadId": "...",
//!   "threadId": "...",
//!   "payloadSource": "assistant",
//!   "timestamp": "...",
//!   "payloadType": "answer_with_sources",
//!   "body": { "answer": "...", "sources": [{ "sqlQuery": "...", "sqlRows": [...] }], ... }
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use nl2sql_connector::Row;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadSource {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserMessagePayload {
    pub user_message: String,
    #[serde(default)]
    pub injected_parameters: Map<String, Value>,
}

impl UserMessagePayload {
    pub fn new(user_message: impl Into<String>) -> Self {
        Self {
            user_message: user_message.into(),
            injected_parameters: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingUpdatePayload {
    pub title: String,
    pub message: String,
}

/// A query that contributed to an answer, with the rows it returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub sql_query: String,
    #[serde(default)]
    pub sql_rows: Vec<Row>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerWithSourcesPayload {
    pub answer: String,
    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(default)]
    pub follow_up_suggestions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisambiguationRequest {
    #[serde(alias = "agent_question")]
    pub agent_question: String,
    #[serde(default, alias = "user_choices")]
    pub user_choices: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisambiguationRequestsPayload {
    pub requests: Vec<DisambiguationRequest>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "payloadType", content = "body", rename_all = "snake_case")]
pub enum PayloadBody {
    UserMessage(UserMessagePayload),
    ProcessingUpdate(ProcessingUpdatePayload),
    AnswerWithSources(AnswerWithSourcesPayload),
    DisambiguationRequests(DisambiguationRequestsPayload),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionPayload {
    pub payload_id: String,
    pub thread_id: String,
    pub payload_source: PayloadSource,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub body: PayloadBody,
}

impl InteractionPayload {
    pub fn new(thread_id: &str, payload_source: PayloadSource, body: PayloadBody) -> Self {
        Self {
            payload_id: uuid::Uuid::new_v4().to_string(),
            thread_id: thread_id.to_string(),
            payload_source,
            timestamp: Utc::now(),
            body,
        }
    }

    pub fn processing_update(thread_id: &str, title: &str, message: impl Into<String>) -> Self {
        Self::new(
            thread_id,
            PayloadSource::Assistant,
            PayloadBody::ProcessingUpdate(ProcessingUpdatePayload {
                title: title.to_string(),
                message: message.into(),
            }),
        )
    }

    pub fn answer(thread_id: &str, answer: AnswerWithSourcesPayload) -> Self {
        Self::new(thread_id, PayloadSource::Assistant, PayloadBody::AnswerWithSources(answer))
    }

    pub fn disambiguation(thread_id: &str, requests: Vec<DisambiguationRequest>) -> Self {
        Self::new(
            thread_id,
            PayloadSource::Assistant,
            PayloadBody::DisambiguationRequests(DisambiguationRequestsPayload { requests }),
        )
    }

    pub fn payload_type(&self) -> &'static str {
        match self.body {
            PayloadBody::UserMessage(_) => "user_message",
            PayloadBody::ProcessingUpdate(_) => "processing_update",
            PayloadBody::AnswerWithSources(_) => "answer_with_sources",
            PayloadBody::DisambiguationRequests(_) => "disambiguation_requests",
        }
    }

    pub fn is_processing_update(&self) -> bool {
        matches!(self.body, PayloadBody::ProcessingUpdate(_))
    }
}
