// Per-thread conversation persistence

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::agents::state::ConversationState;
use crate::redis_client::RedisClient;

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn load(&self, thread_id: &str) -> Result<Option<ConversationState>>;
    async fn save(&self, thread_id: &str, state: &ConversationState) -> Result<()>;
    async fn delete(&self, thread_id: &str) -> Result<()>;
}

/// Process-lifetime store; state is lost on restart.
#[derive(Default)]
pub struct InMemoryConversationStore {
    threads: RwLock<HashMap<String, ConversationState>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn load(&self, thread_id: &str) -> Result<Option<ConversationState>> {
        let guard = self.threads.read().map_err(|_| anyhow!("conversation store lock poisoned"))?;
        Ok(guard.get(thread_id).cloned())
    }

    async fn save(&self, thread_id: &str, state: &ConversationState) -> Result<()> {
        let mut guard = self.threads.write().map_err(|_| anyhow!("conversation store lock poisoned"))?;
        guard.insert(thread_id.to_string(), state.clone());
        Ok(())
    }

    async fn delete(&self, thread_id: &str) -> Result<()> {
        let mut guard = self.threads.write().map_err(|_| anyhow!("conversation store lock poisoned"))?;
        guard.remove(thread_id);
        Ok(())
    }
}

/// Redis-backed store: one JSON value per thread, TTL refreshed on each save
/// when one is configured.
pub struct RedisConversationStore {
    client: RedisClient,
    ttl_secs: Option<u64>,
}

impl RedisConversationStore {
    pub const NAMESPACE: &'static str = "careconnect:thread";

    pub fn new(client: RedisClient, ttl_secs: Option<u64>) -> Self {
        Self { client, ttl_secs }
    }
}

#[async_trait]
impl ConversationStore for RedisConversationStore {
    async fn load(&self, thread_id: &str) -> Result<Option<ConversationState>> {
        self.client.get_json(thread_id).await
    }

    async fn save(&self, thread_id: &str, state: &ConversationState) -> Result<()> {
        self.client.put_json(thread_id, state, self.ttl_secs).await
    }

    async fn delete(&self, thread_id: &str) -> Result<()> {
        if !self.client.remove(thread_id).await? {
            tracing::debug!("No stored state for thread {}", thread_id);
        }
        Ok(())
    }
}
