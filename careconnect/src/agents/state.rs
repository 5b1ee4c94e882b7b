// Conversation state threaded through every graph step

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

use crate::agents::medical_desert::RegionalAnalysis;
use crate::agents::trust_scoring::TrustAssessment;
use crate::llm::{ChatMessage, Role};
use crate::models::SearchResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    MedicalDesert,
    TrustScoring,
    Recommendation,
}

impl AgentKind {
    pub const ALL: [AgentKind; 3] = [
        AgentKind::MedicalDesert,
        AgentKind::TrustScoring,
        AgentKind::Recommendation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::MedicalDesert => "medical_desert",
            AgentKind::TrustScoring => "trust_scoring",
            AgentKind::Recommendation => "recommendation",
        }
    }

    /// "medical_desert" -> "Medical Desert"
    pub fn title(&self) -> &'static str {
        match self {
            AgentKind::MedicalDesert => "Medical Desert",
            AgentKind::TrustScoring => "Trust Scoring",
            AgentKind::Recommendation => "Recommendation",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        AgentKind::ALL.into_iter().find(|kind| kind.as_str() == raw)
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The step the dispatcher selected: an agent to run, or the terminal `done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum CurrentAgent {
    Agent(AgentKind),
    Done,
}

impl From<CurrentAgent> for String {
    fn from(current: CurrentAgent) -> Self {
        match current {
            CurrentAgent::Agent(kind) => kind.as_str().to_string(),
            CurrentAgent::Done => "done".to_string(),
        }
    }
}

impl TryFrom<String> for CurrentAgent {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        if raw == "done" {
            return Ok(CurrentAgent::Done);
        }
        AgentKind::parse(&raw)
            .map(CurrentAgent::Agent)
            .ok_or_else(|| format!("unknown agent '{}'", raw))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn to_chat(&self) -> ChatMessage {
        ChatMessage { role: self.role, content: self.content.clone() }
    }

    /// "User"/"Assistant" label used when quoting history inside a prompt.
    pub fn speaker(&self) -> &'static str {
        match self.role {
            Role::User => "User",
            Role::Assistant => "Assistant",
            Role::System => "System",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentOutput {
    pub agent: AgentKind,
    pub text: String,
}

/// Text produced by each agent this turn, in the order the agents ran.
/// At most one entry per agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentOutputs(Vec<AgentOutput>);

impl AgentOutputs {
    pub fn insert(&mut self, agent: AgentKind, text: String) {
        match self.0.iter_mut().find(|entry| entry.agent == agent) {
            Some(entry) => entry.text = text,
            None => self.0.push(AgentOutput { agent, text }),
        }
    }

    pub fn get(&self, agent: AgentKind) -> Option<&str> {
        self.0
            .iter()
            .find(|entry| entry.agent == agent)
            .map(|entry| entry.text.as_str())
    }

    pub fn contains(&self, agent: AgentKind) -> bool {
        self.get(agent).is_some()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AgentOutput> {
        self.0.iter()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    /// Append-only log; only the graph appends, once per user message and
    /// once per completed turn.
    pub messages: Vec<Message>,
    pub agents_to_run: VecDeque<AgentKind>,
    pub current_agent: Option<CurrentAgent>,
    pub user_intent: Option<AgentKind>,
    pub agent_outputs: AgentOutputs,
    pub medical_desert_data: Option<RegionalAnalysis>,
    pub trust_scores: Option<TrustAssessment>,
    pub facility_results: Option<Vec<SearchResult>>,
    pub region_filter: Option<String>,
    pub facility_filter: Option<String>,
    /// Reply staged by the most recent step of this turn.
    pub pending_reply: Option<String>,
}

impl ConversationState {
    pub fn push_user(&mut self, content: impl Into<String>) {
        self.push(Role::User, content.into());
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.push(Role::Assistant, content.into());
    }

    fn push(&mut self, role: Role, content: String) {
        self.messages.push(Message { role, content, created_at: Utc::now() });
    }

    /// Text of the newest message, which is the query being answered.
    pub fn current_query(&self) -> &str {
        self.messages.last().map(|m| m.content.as_str()).unwrap_or_default()
    }

    /// Up to `n` messages immediately before the newest one.
    pub fn prior_messages(&self, n: usize) -> &[Message] {
        let end = self.messages.len().saturating_sub(1);
        let start = end.saturating_sub(n);
        &self.messages[start..end]
    }

    /// Merges a step's partial update into the running state.
    pub fn apply(&mut self, update: StateUpdate) {
        if update.reset_turn {
            self.agent_outputs.clear();
            self.medical_desert_data = None;
            self.trust_scores = None;
            self.facility_results = None;
            self.pending_reply = None;
            self.current_agent = None;
        }
        if let Some(intent) = update.user_intent {
            self.user_intent = Some(intent);
        }
        if let Some(queue) = update.agents_to_run {
            self.agents_to_run = queue;
        }
        if let Some(current) = update.current_agent {
            self.current_agent = Some(current);
        }
        if let Some((agent, text)) = update.output {
            self.agent_outputs.insert(agent, text);
        }
        if let Some(reply) = update.reply {
            self.pending_reply = Some(reply);
        }
        if let Some(data) = update.medical_desert_data {
            self.medical_desert_data = Some(data);
        }
        if let Some(scores) = update.trust_scores {
            self.trust_scores = Some(scores);
        }
        if let Some(results) = update.facility_results {
            self.facility_results = Some(results);
        }
        if let Some(facility) = update.facility_filter {
            self.facility_filter = Some(facility);
        }
    }
}

/// Partial state returned by a step; `None` fields leave the state untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    pub reset_turn: bool,
    pub user_intent: Option<AgentKind>,
    pub agents_to_run: Option<VecDeque<AgentKind>>,
    pub current_agent: Option<CurrentAgent>,
    pub output: Option<(AgentKind, String)>,
    pub reply: Option<String>,
    pub medical_desert_data: Option<RegionalAnalysis>,
    pub trust_scores: Option<TrustAssessment>,
    pub facility_results: Option<Vec<SearchResult>>,
    pub facility_filter: Option<String>,
}

impl StateUpdate {
    /// An agent's reply: recorded under its output key and staged as the
    /// turn's answer.
    pub fn agent_reply(agent: AgentKind, text: impl Into<String>) -> Self {
        let text = text.into();
        StateUpdate {
            current_agent: Some(CurrentAgent::Agent(agent)),
            output: Some((agent, text.clone())),
            reply: Some(text),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == StateUpdate::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_kind_parses_only_known_names() {
        assert_eq!(AgentKind::parse("trust_scoring"), Some(AgentKind::TrustScoring));
        assert_eq!(AgentKind::parse("Trust_Scoring"), None);
        assert_eq!(AgentKind::parse("done"), None);
    }

    #[test]
    fn current_agent_serializes_as_plain_names() {
        let json = serde_json::to_string(&CurrentAgent::Agent(AgentKind::MedicalDesert)).unwrap();
        assert_eq!(json, "\"medical_desert\"");
        let done: CurrentAgent = serde_json::from_str("\"done\"").unwrap();
        assert_eq!(done, CurrentAgent::Done);
        assert!(serde_json::from_str::<CurrentAgent>("\"billing\"").is_err());
    }

    #[test]
    fn outputs_keep_one_entry_per_agent_in_run_order() {
        let mut outputs = AgentOutputs::default();
        outputs.insert(AgentKind::Recommendation, "first".into());
        outputs.insert(AgentKind::TrustScoring, "second".into());
        outputs.insert(AgentKind::Recommendation, "replaced".into());

        assert_eq!(outputs.len(), 2);
        let order: Vec<_> = outputs.iter().map(|o| o.agent).collect();
        assert_eq!(order, vec![AgentKind::Recommendation, AgentKind::TrustScoring]);
        assert_eq!(outputs.get(AgentKind::Recommendation), Some("replaced"));
    }

    #[test]
    fn prior_messages_excludes_the_current_query() {
        let mut state = ConversationState::default();
        assert!(state.prior_messages(3).is_empty());

        state.push_user("one");
        state.push_assistant("two");
        state.push_user("three");
        state.push_assistant("four");
        state.push_user("five");

        let prior: Vec<_> = state.prior_messages(3).iter().map(|m| m.content.as_str()).collect();
        assert_eq!(prior, vec!["two", "three", "four"]);
        assert_eq!(state.current_query(), "five");
        assert_eq!(state.prior_messages(10).len(), 4);
    }

    #[test]
    fn reset_clears_turn_scratch_but_keeps_filters_and_log() {
        let mut state = ConversationState::default();
        state.push_user("hi");
        state.facility_filter = Some("Korle Bu".into());
        state.apply(StateUpdate::agent_reply(AgentKind::Recommendation, "answer"));
        assert_eq!(state.pending_reply.as_deref(), Some("answer"));

        state.apply(StateUpdate {
            reset_turn: true,
            agents_to_run: Some(VecDeque::from([AgentKind::TrustScoring])),
            ..Default::default()
        });

        assert!(state.agent_outputs.is_empty());
        assert!(state.pending_reply.is_none());
        assert!(state.current_agent.is_none());
        assert_eq!(state.facility_filter.as_deref(), Some("Korle Bu"));
        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.agents_to_run, VecDeque::from([AgentKind::TrustScoring]));
    }

    #[test]
    fn empty_update_changes_nothing() {
        let mut state = ConversationState::default();
        state.push_user("hi");
        let before = state.clone();
        let update = StateUpdate::default();
        assert!(update.is_empty());
        state.apply(update);
        assert_eq!(state, before);
    }
}
