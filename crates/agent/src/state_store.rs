use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Turns kept per thread for rewriting follow-up questions.
const MAX_TURNS: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub user_message: String,
    pub rewritten_message: String,
    pub answer: String,
    #[serde(default)]
    pub sql_queries: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreadState {
    pub turns: Vec<ConversationTurn>,
}

impl ThreadState {
    /// Append a turn, dropping the oldest beyond the history limit.
    pub fn record(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
        if self.turns.len() > MAX_TURNS {
            let excess = self.turns.len() - MAX_TURNS;
            self.turns.drain(..excess);
        }
    }
}

/// Conversation state keyed by thread id.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get_state(&self, thread_id: &str) -> Option<ThreadState>;
    async fn save_state(&self, thread_id: &str, state: ThreadState);
}

#[derive(Default)]
pub struct InMemoryStateStore {
    states: RwLock<HashMap<String, ThreadState>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn get_state(&self, thread_id: &str) -> Option<ThreadState> {
        self.states.read().await.get(thread_id).cloned()
    }

    async fn save_state(&self, thread_id: &str, state: ThreadState) {
        self.states.write().await.insert(thread_id.to_string(), state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(i: usize) -> ConversationTurn {
        ConversationTurn {
            user_message: format!("q{i}"),
            ..Default::default()
        }
    }

    #[test]
    fn history_is_capped() {
        let mut state = ThreadState::default();
        for i in 0..8 {
            state.record(turn(i));
        }
        assert_eq!(state.turns.len(), MAX_TURNS);
        assert_eq!(state.turns[0].user_message, "q3");
        assert_eq!(state.turns[4].user_message, "q7");
    }

    #[tokio::test]
    async fn threads_are_isolated() {
        let store = InMemoryStateStore::new();
        assert!(store.get_state("a").await.is_none());

        let mut state = ThreadState::default();
        state.record(turn(1));
        store.save_state("a", state.clone()).await;

        assert_eq!(store.get_state("a").await, Some(state));
        assert!(store.get_state("b").await.is_none());
    }
}
