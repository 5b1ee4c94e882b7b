// Recommendation Agent: retrieval over the facility index plus generation

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use crate::agents::router::truncate;
use crate::agents::state::{AgentKind, ConversationState, StateUpdate};
use crate::agents::Agent;
use crate::llm::{ChatMessage, TextGenerator};
use crate::metrics;
use crate::models::{EntityType, SearchFilters, SearchResult};
use crate::search::SemanticSearch;

const TOP_K: usize = 5;
const HISTORY_TURNS: usize = 5;
const EXCERPT_CHARS: usize = 500;

pub const NO_RESULTS_MESSAGE: &str = "No facilities found matching your query.";

const RECOMMENDER_PROMPT: &str = "You are the CareConnect AI, an expert on healthcare facilities in Ghana.
Your goal is to recommend facilities based on the user's needs using the provided search results.

GUIDELINES:
- ALWAYS answer based on the \"Search Results\" provided below.
- If cross-agent data is available (medical desert analysis, trust scores), incorporate those insights into your recommendations.
- If the user asks a follow-up question, use conversation context to maintain continuity.
- Be helpful, professional, and concise.
- If no facilities match, say so clearly and suggest broadening the search.
- Highlight key info: Name, Location, Specialties, and Contact Info.
- If trust scores are available from the trust agent, mention them.
- If medical desert data is available, factor regional access into recommendations.
- Use markdown formatting for readability.";

/// Numbered, human-readable listing of facility hits.
pub fn format_results(results: &[SearchResult]) -> String {
    let facilities: Vec<String> = results
        .iter()
        .filter_map(|hit| hit.facility().map(|facility| (hit.similarity_score, facility)))
        .enumerate()
        .map(|(i, (similarity, facility))| {
            let mut lines = vec![
                format!(
                    "{}. {} ({})",
                    i + 1,
                    facility.display_name(),
                    facility.facility_type_id.as_deref().unwrap_or("facility")
                ),
                format!(
                    "   Location: {}, {}",
                    facility.address_city.as_deref().unwrap_or("Unknown"),
                    facility.address_state_or_region.as_deref().unwrap_or("Unknown")
                ),
                format!("   Relevance: {:.3}", similarity),
            ];
            let specialties = facility.specialties();
            if !specialties.is_empty() {
                let top: Vec<&str> = specialties.iter().take(3).map(String::as_str).collect();
                lines.push(format!("   Specialties: {}", top.join(", ")));
            }
            let phones = facility.phone_numbers();
            if !phones.is_empty() {
                let first: Vec<&str> = phones.iter().take(2).map(String::as_str).collect();
                lines.push(format!("   Phone: {}", first.join(", ")));
            }
            if let Some(capacity) = facility.capacity.filter(|c| *c > 0) {
                lines.push(format!("   Capacity: {} beds", capacity));
            }
            lines.join("\n")
        })
        .collect();

    if facilities.is_empty() {
        NO_RESULTS_MESSAGE.to_string()
    } else {
        facilities.join("\n\n")
    }
}

/// Excerpts of earlier agents' output this turn.
fn cross_agent_context(state: &ConversationState) -> String {
    let mut context = String::new();
    if let Some(text) = state.agent_outputs.get(AgentKind::MedicalDesert) {
        context.push_str(&format!(
            "\n\n=== MEDICAL DESERT ANALYSIS (from specialist agent) ===\n{}\n",
            truncate(text, EXCERPT_CHARS)
        ));
    }
    if let Some(text) = state.agent_outputs.get(AgentKind::TrustScoring) {
        context.push_str(&format!(
            "\n\n=== TRUST SCORING (from specialist agent) ===\n{}\n",
            truncate(text, EXCERPT_CHARS)
        ));
    }
    context
}

fn fallback_answer(listing: &str, has_results: bool) -> String {
    if has_results {
        format!("Here are the facilities that best match your request:\n\n{}", listing)
    } else {
        format!(
            "{} Try broadening your search, for example by removing a location or specialty.",
            NO_RESULTS_MESSAGE
        )
    }
}

pub struct RecommendationAgent {
    search: Arc<dyn SemanticSearch>,
    llm: Arc<dyn TextGenerator>,
}

impl RecommendationAgent {
    pub fn new(search: Arc<dyn SemanticSearch>, llm: Arc<dyn TextGenerator>) -> Self {
        Self { search, llm }
    }
}

#[async_trait]
impl Agent for RecommendationAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Recommendation
    }

    async fn run(&self, state: &ConversationState) -> anyhow::Result<StateUpdate> {
        let query = state.current_query();
        let filters = SearchFilters {
            region: state.region_filter.clone(),
            ..Default::default()
        };

        let results = self
            .search
            .semantic_search(query, TOP_K, EntityType::Facility, &filters, 0.0)
            .await?;
        info!("Recommendation: {} facilities retrieved for '{}'", results.len(), query);

        let listing = format_results(&results);
        let mut context = format!(
            "\n\n=== RELEVANT SEARCH RESULTS ===\n{}\n===============================",
            listing
        );
        let cross_agent = cross_agent_context(state);
        if !cross_agent.is_empty() {
            context.push('\n');
            context.push_str(&cross_agent);
        }

        let mut conversation: Vec<ChatMessage> = state
            .prior_messages(HISTORY_TURNS)
            .iter()
            .map(|m| m.to_chat())
            .collect();
        conversation.push(ChatMessage::user(format!(
            "User Query: {}\n{}\n\nPlease provide a helpful answer based on these results.",
            query, context
        )));

        let text = match self.llm.generate(RECOMMENDER_PROMPT, &conversation).await {
            Ok(text) => text,
            Err(err) => {
                warn!("Recommendation generation failed, listing results: {}", err);
                metrics::record_fallback("recommendation");
                fallback_answer(&listing, !results.is_empty())
            }
        };

        Ok(StateUpdate {
            facility_results: Some(results),
            ..StateUpdate::agent_reply(AgentKind::Recommendation, text)
        })
    }
}
