pub mod dispatcher;
pub mod graph;
pub mod medical_desert;
pub mod recommendation;
pub mod router;
pub mod state;
pub mod synthesizer;
pub mod trust_scoring;

use async_trait::async_trait;

use self::state::{AgentKind, ConversationState, StateUpdate};

/// A specialist step. Reads the shared state and returns a partial update;
/// it never touches the message log directly.
#[async_trait]
pub trait Agent: Send + Sync {
    fn kind(&self) -> AgentKind;

    async fn run(&self, state: &ConversationState) -> anyhow::Result<StateUpdate>;
}
