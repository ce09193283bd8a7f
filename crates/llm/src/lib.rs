pub mod extract;
pub mod provider;
pub mod providers;

pub use extract::{extract_json, extract_sql};
pub use provider::{LlmError, LlmProvider, Message, Role};
pub use providers::create_provider;
