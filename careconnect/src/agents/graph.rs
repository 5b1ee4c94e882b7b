// Turn orchestration: router -> dispatcher -> agent ... -> synthesizer

use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, error, info};

use crate::agents::dispatcher::dispatch;
use crate::agents::medical_desert::MedicalDesertAgent;
use crate::agents::recommendation::RecommendationAgent;
use crate::agents::router::Router;
use crate::agents::state::{AgentKind, ConversationState, CurrentAgent};
use crate::agents::synthesizer::Synthesizer;
use crate::agents::trust_scoring::TrustScoringAgent;
use crate::agents::Agent;
use crate::conversation::ConversationStore;
use crate::llm::TextGenerator;
use crate::metrics;
use crate::search::SemanticSearch;
use crate::store::FacilityStore;

/// Optional UI filters that ride along with a query and persist on the thread.
#[derive(Debug, Clone, Default)]
pub struct TurnHints {
    pub region: Option<String>,
    pub facility: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub response: String,
    pub agents_run: Vec<AgentKind>,
}

type ThreadLocks = Mutex<HashMap<String, Arc<AsyncMutex<()>>>>;

/// Exclusive hold on one thread. Dropping it releases the lock and forgets the
/// table entry once nobody else holds or waits on it.
struct ThreadLease<'a> {
    locks: &'a ThreadLocks,
    thread_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ThreadLease<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let Ok(mut locks) = self.locks.lock() else {
            return;
        };
        if locks
            .get(&self.thread_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.thread_id);
        }
    }
}

pub struct AgentGraph {
    router: Router,
    medical_desert: MedicalDesertAgent,
    trust_scoring: TrustScoringAgent,
    recommendation: RecommendationAgent,
    synthesizer: Synthesizer,
    conversations: Arc<dyn ConversationStore>,
    thread_locks: ThreadLocks,
}

impl AgentGraph {
    pub fn new(
        llm: Arc<dyn TextGenerator>,
        store: Arc<dyn FacilityStore>,
        search: Arc<dyn SemanticSearch>,
        conversations: Arc<dyn ConversationStore>,
    ) -> Self {
        Self {
            router: Router::new(llm.clone()),
            medical_desert: MedicalDesertAgent::new(store.clone(), llm.clone()),
            trust_scoring: TrustScoringAgent::new(store, llm.clone()),
            recommendation: RecommendationAgent::new(search, llm.clone()),
            synthesizer: Synthesizer::new(llm),
            conversations,
            thread_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_thread(&self, thread_id: &str) -> Result<ThreadLease<'_>> {
        let lock = {
            let mut locks = self
                .thread_locks
                .lock()
                .map_err(|_| anyhow!("thread lock table poisoned"))?;
            locks
                .entry(thread_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        let guard = lock.lock_owned().await;
        Ok(ThreadLease {
            locks: &self.thread_locks,
            thread_id: thread_id.to_string(),
            guard: Some(guard),
        })
    }

    fn agent(&self, kind: AgentKind) -> &dyn Agent {
        match kind {
            AgentKind::MedicalDesert => &self.medical_desert,
            AgentKind::TrustScoring => &self.trust_scoring,
            AgentKind::Recommendation => &self.recommendation,
        }
    }

    /// Runs one user turn on `thread_id`. Turns on the same thread are
    /// serialised; state is persisted only when the turn completes.
    pub async fn invoke(&self, thread_id: &str, query: &str, hints: TurnHints) -> Result<TurnOutcome> {
        let _lease = self.lock_thread(thread_id).await?;

        let mut state = self
            .conversations
            .load(thread_id)
            .await
            .context("Failed to load conversation")?
            .unwrap_or_default();

        match self.run_turn(&mut state, query, hints).await {
            Ok(outcome) => {
                self.conversations
                    .save(thread_id, &state)
                    .await
                    .context("Failed to save conversation")?;
                metrics::TURNS.with_label_values(&["completed"]).inc();
                info!(
                    "Thread {}: turn complete via {:?} ({} messages)",
                    thread_id,
                    outcome.agents_run,
                    state.messages.len()
                );
                Ok(outcome)
            }
            Err(err) => {
                metrics::TURNS.with_label_values(&["failed"]).inc();
                error!("Thread {}: turn failed: {:#}", thread_id, err);
                Err(err)
            }
        }
    }

    async fn run_turn(&self, state: &mut ConversationState, query: &str, hints: TurnHints) -> Result<TurnOutcome> {
        if let Some(region) = hints.region.filter(|r| !r.trim().is_empty()) {
            state.region_filter = Some(region);
        }
        if let Some(facility) = hints.facility.filter(|f| !f.trim().is_empty()) {
            state.facility_filter = Some(facility);
        }
        state.push_user(query);

        let routed = self.router.route(state).await;
        state.apply(routed);

        let mut agents_run = Vec::new();
        loop {
            let next = dispatch(state);
            state.apply(next);
            let kind = match state.current_agent {
                Some(CurrentAgent::Agent(kind)) => kind,
                Some(CurrentAgent::Done) | None => break,
            };

            let agent = self.agent(kind);
            let update = agent
                .run(state)
                .await
                .with_context(|| format!("{} agent failed", kind))?;
            metrics::AGENT_RUNS.with_label_values(&[kind.as_str()]).inc();
            state.apply(update);
            agents_run.push(kind);
        }

        let synthesized = self.synthesizer.synthesize(state).await;
        if !synthesized.is_empty() {
            debug!("Synthesized reply replaces the last agent's reply");
        }
        state.apply(synthesized);

        let response = state
            .pending_reply
            .take()
            .ok_or_else(|| anyhow!("turn finished without a reply"))?;
        state.push_assistant(response.clone());

        Ok(TurnOutcome { response, agents_run })
    }

    /// Forgets everything stored for `thread_id`.
    pub async fn reset(&self, thread_id: &str) -> Result<()> {
        let _lease = self.lock_thread(thread_id).await?;
        self.conversations.delete(thread_id).await?;
        info!("Thread {}: conversation reset", thread_id);
        Ok(())
    }

    pub async fn history(&self, thread_id: &str) -> Result<Option<ConversationState>> {
        self.conversations.load(thread_id).await
    }
}
