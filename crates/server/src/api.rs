//! HTTP handlers for the question endpoint and health check.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, info};

use nl2sql_agent::{RunOutcome, SqlResults};

use crate::state::AppState;

const DEFAULT_THREAD_ID: &str = "default";

/// Pretty-printed JSON with an explicit charset.
fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response {
    let text = serde_json::to_string_pretty(body).unwrap_or_else(|_| "{}".to_string());
    (
        status,
        [(header::CONTENT_TYPE, "application/json; charset=utf-8")],
        text,
    )
        .into_response()
}

fn error_response(status: StatusCode, message: &str) -> Response {
    json_response(status, &json!({ "error": message }))
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health() -> Response {
    json_response(
        StatusCode::OK,
        &HealthResponse {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
        },
    )
}

#[derive(Debug, Serialize)]
pub struct Nl2SqlResponse {
    pub thread_id: String,
    pub message: String,
    pub answer: String,
    pub sql_results: Option<SqlResults>,
    pub success: bool,
}

impl Nl2SqlResponse {
    fn from_outcome(outcome: &RunOutcome, message: &str) -> Self {
        Self {
            thread_id: outcome.thread_id.clone(),
            message: message.to_string(),
            answer: outcome.answer_text(),
            sql_results: outcome.sql_results.clone(),
            success: outcome.success(),
        }
    }
}

/// Missing or null falls back to the default thread; other non-strings are
/// used as their JSON text.
fn thread_id_of(body: &Value) -> String {
    match body.get("thread_id") {
        None | Some(Value::Null) => DEFAULT_THREAD_ID.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

pub async fn process_user_message(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let body: Value = match serde_json::from_slice(&body) {
        Ok(value @ Value::Object(_)) => value,
        _ => return error_response(StatusCode::BAD_REQUEST, "Invalid JSON"),
    };

    let message = match body.get("message").and_then(Value::as_str) {
        Some(m) if !m.is_empty() => m.to_string(),
        _ => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "'message' must be a non-empty string",
            )
        }
    };
    let thread_id = thread_id_of(&body);
    info!(thread_id = %thread_id, message = %message, "Received request");

    let outcome = match state.runner.run(&thread_id, &message).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(error = %e, "Unhandled error in NL2SQL pipeline");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string());
        }
    };

    if outcome.final_payload.is_none() {
        return json_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            &json!({ "error": "No final payload produced", "updates": outcome.updates }),
        );
    }

    json_response(StatusCode::OK, &Nl2SqlResponse::from_outcome(&outcome, &message))
}
