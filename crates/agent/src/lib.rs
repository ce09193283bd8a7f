pub mod config;
pub mod executor;
pub mod payloads;
pub mod pipeline;
pub mod runner;
pub mod state_store;

pub use config::{load_agents, AgentConfig, PromptParameters};
pub use executor::AgentExecutor;
pub use payloads::*;
pub use pipeline::{PipelineError, PipelineOptions, Text2SqlPipeline};
pub use runner::{RunOutcome, RunnerError, SqlResults, Text2SqlRunner, UpdateSummary};
pub use state_store::{InMemoryStateStore, StateStore, ThreadState};
