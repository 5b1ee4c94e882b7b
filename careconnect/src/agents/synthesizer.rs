// Synthesizer: merges the turn's agent outputs into one answer

use std::sync::Arc;
use tracing::{info, warn};

use crate::agents::state::{ConversationState, StateUpdate};
use crate::llm::{ChatMessage, TextGenerator};
use crate::metrics;

const SYNTHESIS_PROMPT: &str = "You are the CareConnect AI synthesizer. Multiple specialist agents have analyzed the user's query.
Your job is to combine their findings into a single, coherent, and helpful response.

Guidelines:
- Integrate insights from all agents naturally into one unified answer
- Highlight connections between findings (e.g., a region is a medical desert AND its facilities have low trust scores)
- Don't just concatenate results; weave them together meaningfully
- Be concise but comprehensive
- Use markdown formatting for readability
- Address the user's question directly";

/// Each output under a "=== Title Agent Results ===" header, in run order.
pub fn combined_context(state: &ConversationState) -> String {
    state
        .agent_outputs
        .iter()
        .map(|output| format!("=== {} Agent Results ===\n{}", output.agent.title(), output.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub struct Synthesizer {
    llm: Arc<dyn TextGenerator>,
}

impl Synthesizer {
    pub fn new(llm: Arc<dyn TextGenerator>) -> Self {
        Self { llm }
    }

    /// No-op unless two or more agents produced output this turn.
    pub async fn synthesize(&self, state: &ConversationState) -> StateUpdate {
        if state.agent_outputs.len() <= 1 {
            return StateUpdate::default();
        }

        let combined = combined_context(state);
        let prompt = format!(
            "User's Query: {}\n\n{}\n\nPlease provide a unified, coherent response that combines all these findings.",
            state.current_query(),
            combined
        );

        let text = match self
            .llm
            .generate(SYNTHESIS_PROMPT, &[ChatMessage::user(prompt)])
            .await
        {
            Ok(text) => text,
            Err(err) => {
                warn!("Synthesis generation failed, concatenating outputs: {}", err);
                metrics::record_fallback("synthesizer");
                combined
            }
        };

        info!("Synthesizer: merged {} agent outputs", state.agent_outputs.len());

        StateUpdate {
            reply: Some(text),
            ..Default::default()
        }
    }
}
