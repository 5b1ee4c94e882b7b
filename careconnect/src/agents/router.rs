// Router: classifies the latest user message into an ordered agent queue

use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{info, warn};

use crate::agents::state::{AgentKind, ConversationState, StateUpdate};
use crate::llm::{ChatMessage, TextGenerator};
use crate::metrics;

const ROUTER_PROMPT: &str = "You are the CareConnect AI router. Analyze the user's query and determine which agent(s) should handle it.

Available agents:
1. medical_desert - Analyzes regional healthcare distribution, identifies underserved areas, compares regions, medical deserts
2. trust_scoring - Calculates trust/reliability scores for specific healthcare facilities, verifies data quality
3. recommendation - Searches and recommends healthcare facilities based on user needs using semantic search

Rules:
- If the query is about regional coverage, gaps, underserved areas, or distribution -> medical_desert
- If the query is about verifying, trusting, or scoring a specific facility -> trust_scoring
- If the query is about finding, recommending, or searching for facilities -> recommendation
- If the query needs multiple agents, list them in execution order separated by commas
  Example: \"Find a trustworthy hospital\" -> recommendation,trust_scoring
  Example: \"Which underserved regions need more hospitals?\" -> medical_desert,recommendation
- For simple greetings or unclear queries -> recommendation

Return ONLY a comma-separated list of agent names. No explanations.";

const DESERT_KEYWORDS: &[&str] = &[
    "desert",
    "underserved",
    "region",
    "distribution",
    "coverage",
    "gap",
    "which regions",
];

const TRUST_KEYWORDS: &[&str] = &[
    "trust",
    "verify",
    "reliable",
    "suspicious",
    "score",
    "trustworthy",
    "quality",
];

const CONTEXT_TURNS: usize = 3;
const CONTEXT_CHARS: usize = 200;

pub struct Router {
    llm: Arc<dyn TextGenerator>,
}

impl Router {
    pub fn new(llm: Arc<dyn TextGenerator>) -> Self {
        Self { llm }
    }

    /// Produces the turn's agent queue and resets the per-turn scratch state.
    pub async fn route(&self, state: &ConversationState) -> StateUpdate {
        let query = state.current_query();

        let agents = match self.classify(state).await {
            Ok(agents) => agents,
            Err(err) => {
                warn!("Router generation failed, using keyword routing: {}", err);
                metrics::record_fallback("router");
                keyword_route(query)
            }
        };

        info!("Router: '{}' -> {:?}", query, agents);

        StateUpdate {
            reset_turn: true,
            user_intent: agents.front().copied(),
            agents_to_run: Some(agents),
            ..Default::default()
        }
    }

    async fn classify(&self, state: &ConversationState) -> Result<VecDeque<AgentKind>, crate::llm::LlmError> {
        let prior = state.prior_messages(CONTEXT_TURNS);
        let mut system_prompt = ROUTER_PROMPT.to_string();
        if !prior.is_empty() {
            system_prompt.push_str("\n\nRecent conversation:\n");
            let lines: Vec<String> = prior
                .iter()
                .map(|m| format!("{}: {}", m.speaker(), truncate(&m.content, CONTEXT_CHARS)))
                .collect();
            system_prompt.push_str(&lines.join("\n"));
        }

        let reply = self
            .llm
            .generate(
                &system_prompt,
                &[ChatMessage::user(format!("User query: {}", state.current_query()))],
            )
            .await?;

        Ok(parse_agent_list(&reply))
    }
}

/// Parses "a, b, c" into known agents, dropping unknown tokens and repeats.
/// Falls back to `[recommendation]` when nothing valid remains.
pub fn parse_agent_list(reply: &str) -> VecDeque<AgentKind> {
    let mut agents = VecDeque::new();
    for token in reply.trim().split(',') {
        if let Some(kind) = AgentKind::parse(token.trim()) {
            if !agents.contains(&kind) {
                agents.push_back(kind);
            }
        }
    }
    if agents.is_empty() {
        agents.push_back(AgentKind::Recommendation);
    }
    agents
}

/// Deterministic routing over the lowercased message.
pub fn keyword_route(message: &str) -> VecDeque<AgentKind> {
    let lower = message.to_lowercase();
    let kind = if DESERT_KEYWORDS.iter().any(|k| lower.contains(k)) {
        AgentKind::MedicalDesert
    } else if TRUST_KEYWORDS.iter().any(|k| lower.contains(k)) {
        AgentKind::TrustScoring
    } else {
        AgentKind::Recommendation
    };
    VecDeque::from([kind])
}

/// Char-boundary-safe prefix of at most `max` characters.
pub fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FailingGenerator, ScriptedGenerator};

    fn state_with(messages: &[&str]) -> ConversationState {
        let mut state = ConversationState::default();
        for (i, m) in messages.iter().enumerate() {
            if i % 2 == 0 {
                state.push_user(*m);
            } else {
                state.push_assistant(*m);
            }
        }
        state
    }

    #[test]
    fn keyword_routing_prefers_desert_then_trust() {
        assert_eq!(
            keyword_route("Which REGIONS are medical deserts?"),
            VecDeque::from([AgentKind::MedicalDesert])
        );
        assert_eq!(
            keyword_route("Can I trust this clinic's score?"),
            VecDeque::from([AgentKind::TrustScoring])
        );
        assert_eq!(
            keyword_route("coverage and trust"),
            VecDeque::from([AgentKind::MedicalDesert])
        );
        assert_eq!(
            keyword_route("Find a pediatric hospital in Accra"),
            VecDeque::from([AgentKind::Recommendation])
        );
    }

    #[test]
    fn agent_list_parsing_filters_and_dedupes() {
        assert_eq!(
            parse_agent_list(" recommendation, trust_scoring ,bogus,recommendation\n"),
            VecDeque::from([AgentKind::Recommendation, AgentKind::TrustScoring])
        );
        assert_eq!(parse_agent_list("I think medical deserts"), VecDeque::from([AgentKind::Recommendation]));
        assert_eq!(parse_agent_list(""), VecDeque::from([AgentKind::Recommendation]));
    }

    #[tokio::test]
    async fn generation_failure_falls_back_to_keywords() {
        let router = Router::new(Arc::new(FailingGenerator));
        let update = router.route(&state_with(&["Show me the medical desert regions"])).await;

        assert!(update.reset_turn);
        assert_eq!(update.agents_to_run, Some(VecDeque::from([AgentKind::MedicalDesert])));
        assert_eq!(update.user_intent, Some(AgentKind::MedicalDesert));
    }

    #[tokio::test]
    async fn model_reply_decides_the_queue() {
        let llm = Arc::new(ScriptedGenerator::new(["recommendation,trust_scoring"]));
        let router = Router::new(llm.clone());
        let update = router.route(&state_with(&["Find a trustworthy eye hospital"])).await;

        assert_eq!(
            update.agents_to_run,
            Some(VecDeque::from([AgentKind::Recommendation, AgentKind::TrustScoring]))
        );
        let calls = llm.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].messages[0].content.contains("Find a trustworthy eye hospital"));
    }

    #[tokio::test]
    async fn recent_turns_are_quoted_in_the_prompt() {
        let llm = Arc::new(ScriptedGenerator::new(["trust_scoring"]));
        let router = Router::new(llm.clone());
        let long_answer = "x".repeat(500);
        router
            .route(&state_with(&["old question", "old answer", "next", &long_answer, "is it reliable?"]))
            .await;

        let prompt = &llm.calls()[0].system_prompt;
        assert!(prompt.contains("Recent conversation:"));
        assert!(!prompt.contains("old question"));
        assert!(prompt.contains("Assistant: old answer"));
        assert!(prompt.contains(&format!("Assistant: {}", "x".repeat(200))));
        assert!(!prompt.contains(&"x".repeat(201)));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("abc", 10), "abc");
    }
}
