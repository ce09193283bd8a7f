use async_trait::async_trait;

use nl2sql_agent::{RunOutcome, RunnerError, Text2SqlRunner};

/// Whatever turns a user message into a run outcome.
#[async_trait]
pub trait MessageRunner: Send + Sync {
    async fn run(&self, thread_id: &str, message: &str) -> Result<RunOutcome, RunnerError>;
}

#[async_trait]
impl MessageRunner for Text2SqlRunner {
    async fn run(&self, thread_id: &str, message: &str) -> Result<RunOutcome, RunnerError> {
        Text2SqlRunner::run(self, thread_id, message).await
    }
}

pub struct AppState {
    pub runner: Box<dyn MessageRunner>,
}
