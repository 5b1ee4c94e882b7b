// Trust Scoring Agent: deterministic data-quality score for one facility

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::agents::router::truncate;
use crate::agents::state::{AgentKind, ConversationState, StateUpdate};
use crate::agents::Agent;
use crate::llm::{ChatMessage, TextGenerator};
use crate::metrics;
use crate::models::Facility;
use crate::store::FacilityStore;

pub const SUB_SCORE_MAX: u32 = 25;
const MIN_PLAUSIBLE_YEAR: i32 = 1900;
const MAX_PLAUSIBLE_YEAR: i32 = 2025;
const SUSPICIOUS_NAME_MARKERS: &[&str] = &["test", "placeholder", "example"];

const NO_FACILITY: &str = "NONE";

const EXTRACTION_SYSTEM_PROMPT: &str =
    "You are a precise entity extraction assistant. Extract exactly the facility name requested.";

const ANALYST_SYSTEM_PROMPT: &str =
    "You are a healthcare data quality analyst providing trust assessments.";

pub const CLARIFY_AFTER_RECOMMENDATION: &str = "I'd be happy to score a facility's trustworthiness. \
     Could you specify which facility you'd like me to verify? \
     You can name one from the recommendations above.";

pub const CLARIFY_WITHOUT_CONTEXT: &str = "Please specify which facility you'd like me to verify. \
     For example: 'What's the trust score for Korle Bu Teaching Hospital?'";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub completeness: u32,
    pub consistency: u32,
    pub validation: u32,
    pub anomaly_check: u32,
}

impl ScoreBreakdown {
    pub fn total(&self) -> u32 {
        self.completeness + self.consistency + self.validation + self.anomaly_check
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrustLabel {
    #[serde(rename = "Highly Trustworthy")]
    HighlyTrustworthy,
    #[serde(rename = "Trustworthy")]
    Trustworthy,
    #[serde(rename = "Moderate")]
    Moderate,
    #[serde(rename = "Low Trust")]
    LowTrust,
}

impl TrustLabel {
    pub fn for_score(score: u32) -> Self {
        match score {
            80.. => TrustLabel::HighlyTrustworthy,
            60..=79 => TrustLabel::Trustworthy,
            40..=59 => TrustLabel::Moderate,
            _ => TrustLabel::LowTrust,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TrustLabel::HighlyTrustworthy => "Highly Trustworthy",
            TrustLabel::Trustworthy => "Trustworthy",
            TrustLabel::Moderate => "Moderate",
            TrustLabel::LowTrust => "Low Trust",
        }
    }

    pub fn summary(&self) -> &'static str {
        match self {
            TrustLabel::HighlyTrustworthy => "Excellent data quality",
            TrustLabel::Trustworthy => "Good data quality",
            TrustLabel::Moderate => "Some data quality concerns",
            TrustLabel::LowTrust => "Significant data quality issues",
        }
    }
}

impl fmt::Display for TrustLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.as_str(), self.summary())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustAssessment {
    pub facility_id: Uuid,
    pub facility_name: Option<String>,
    pub score: u32,
    pub breakdown: ScoreBreakdown,
    pub flags: Vec<String>,
    pub recommendation: TrustLabel,
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

/// Scores a facility record from 0 to 100 as four sub-scores of at most 25:
/// completeness, consistency, external validation and anomaly checks.
/// Pure: no I/O, same record in, same assessment out.
pub fn calculate_trust_score(facility: &Facility) -> TrustAssessment {
    let mut flags = Vec::new();

    let mut completeness = 0;
    if !facility.phone_numbers().is_empty() {
        completeness += 8;
    }
    if present(&facility.email) {
        completeness += 5;
    }
    if present(&facility.address_line1) && present(&facility.address_city) {
        completeness += 7;
    }
    if present(&facility.description) {
        completeness += 5;
    }

    let mut consistency: i32 = SUB_SCORE_MAX as i32;
    let facility_type = facility
        .facility_type_id
        .as_deref()
        .unwrap_or_default()
        .to_lowercase();
    if let Some(capacity) = facility.capacity.filter(|c| *c != 0) {
        if facility_type.contains("hospital") && capacity < 10 {
            consistency -= 5;
            flags.push("Low capacity for hospital".to_string());
        } else if facility_type.contains("clinic") && capacity > 100 {
            consistency -= 3;
            flags.push("High capacity for clinic".to_string());
        }
    }
    if facility.specialties().len() > 15 {
        consistency -= 5;
        flags.push("Unusually high number of specialties".to_string());
    }

    let mut validation = 0;
    if present(&facility.official_website) {
        validation += 10;
    }
    if present(&facility.facebook_link) || present(&facility.twitter_link) {
        validation += 5;
    }
    if let Some(year) = facility.year_established {
        if (MIN_PLAUSIBLE_YEAR..=MAX_PLAUSIBLE_YEAR).contains(&year) {
            validation += 10;
        } else {
            flags.push(format!("Suspicious establishment year: {}", year));
        }
    }

    let mut anomaly: i32 = SUB_SCORE_MAX as i32;
    if !present(&facility.name) {
        anomaly -= 10;
        flags.push("Missing facility name".to_string());
    }
    if !present(&facility.address_city) && !present(&facility.address_state_or_region) {
        anomaly -= 8;
        flags.push("Missing location information".to_string());
    }
    let name = facility.name.as_deref().unwrap_or_default().to_lowercase();
    if SUSPICIOUS_NAME_MARKERS.iter().any(|marker| name.contains(marker)) {
        anomaly -= 15;
        flags.push("Suspicious facility name".to_string());
    }

    let breakdown = ScoreBreakdown {
        completeness,
        consistency: consistency.max(0) as u32,
        validation,
        anomaly_check: anomaly.max(0) as u32,
    };
    let score = breakdown.total();

    TrustAssessment {
        facility_id: facility.id,
        facility_name: facility.name.clone(),
        score,
        breakdown,
        flags,
        recommendation: TrustLabel::for_score(score),
    }
}

/// Report used when generation is unavailable: sub-scores and flags verbatim.
pub fn fallback_report(assessment: &TrustAssessment) -> String {
    let name = assessment.facility_name.as_deref().unwrap_or("Unnamed facility");
    let b = &assessment.breakdown;
    let mut parts = vec![
        format!("**Trust Score Analysis for {}**\n", name),
        format!("Overall Trust Score: **{}/100**", assessment.score),
        format!("Assessment: {}\n", assessment.recommendation),
        "\n**Score Breakdown:**".to_string(),
        format!("- Data Completeness: {}/{}", b.completeness, SUB_SCORE_MAX),
        format!("- Claim Consistency: {}/{}", b.consistency, SUB_SCORE_MAX),
        format!("- External Validation: {}/{}", b.validation, SUB_SCORE_MAX),
        format!("- Anomaly Check: {}/{}", b.anomaly_check, SUB_SCORE_MAX),
    ];

    if assessment.flags.is_empty() {
        parts.push("\nNo data quality issues detected.".to_string());
    } else {
        parts.push("\n**Flags:**".to_string());
        parts.extend(assessment.flags.iter().map(|flag| format!("- {}", flag)));
    }

    parts.join("\n")
}

/// Normalises the extractor's reply; `None` when no facility was named.
fn clean_extraction(reply: &str) -> Option<String> {
    let name = reply
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '.' || c == '`')
        .trim();
    if name.is_empty() || name.eq_ignore_ascii_case(NO_FACILITY) {
        None
    } else {
        Some(name.to_string())
    }
}

pub struct TrustScoringAgent {
    store: Arc<dyn FacilityStore>,
    llm: Arc<dyn TextGenerator>,
}

impl TrustScoringAgent {
    pub fn new(store: Arc<dyn FacilityStore>, llm: Arc<dyn TextGenerator>) -> Self {
        Self { store, llm }
    }

    async fn extract_facility_name(&self, state: &ConversationState) -> Option<String> {
        let context: Vec<String> = state
            .prior_messages(5)
            .iter()
            .map(|m| format!("{}: {}", m.speaker(), truncate(&m.content, 300)))
            .collect();

        let prompt = format!(
            "Identify the healthcare facility name the user is asking about.

User Query: \"{}\"

Previous conversation:
{}

INSTRUCTIONS:
- If the user names a facility (e.g., \"Trust score for Korle Bu\"), extract \"Korle Bu\".
- If the user refers to a previous facility (e.g., \"What is its score?\", \"Is the first one good?\"), identify the most likely facility from the conversation context.
- If the user mentions multiple facilities, extract the most relevant one.
- If no specific facility can be identified, return \"{}\".
- Return ONLY the facility name, nothing else.",
            state.current_query(),
            context.join("\n"),
            NO_FACILITY
        );

        match self
            .llm
            .generate(EXTRACTION_SYSTEM_PROMPT, &[ChatMessage::user(prompt)])
            .await
        {
            Ok(reply) => clean_extraction(&reply),
            Err(err) => {
                warn!("Facility extraction failed, treating as {}: {}", NO_FACILITY, err);
                metrics::record_fallback("trust_extraction");
                None
            }
        }
    }

    async fn explain(&self, state: &ConversationState, facility: &Facility, assessment: &TrustAssessment) -> String {
        let trust_data = json!({
            "facility_name": assessment.facility_name,
            "trust_score": assessment.score,
            "max_score": 100,
            "breakdown": assessment.breakdown,
            "flags": assessment.flags,
            "recommendation": assessment.recommendation.to_string(),
            "facility_type": facility.facility_type_id,
            "location": facility.location(),
            "has_website": present(&facility.official_website),
            "has_phone": !facility.phone_numbers().is_empty(),
            "has_email": present(&facility.email),
            "capacity": facility.capacity,
            "specialties_count": facility.specialties().len(),
        });
        let trust_data = serde_json::to_string_pretty(&trust_data).unwrap_or_else(|_| trust_data.to_string());

        let prompt = format!(
            "You are the CareConnect Trust Scoring analyst. You've calculated a trust score for a healthcare facility.
Generate a clear, professional trust analysis response.

Trust Score Data:
{}

User Query: {}

Guidelines:
- Present the trust score prominently (e.g., **72/100**)
- Explain what each breakdown category means in plain language
- If there are flags, explain what they mean and their potential impact
- Provide actionable advice (e.g., \"verify contact info independently\", \"check for an updated website\")
- Use markdown formatting for readability
- Be honest about data limitations
- If score is low, don't be alarmist; explain what might be missing vs what's genuinely concerning",
            trust_data,
            state.current_query()
        );

        match self
            .llm
            .generate(ANALYST_SYSTEM_PROMPT, &[ChatMessage::user(prompt)])
            .await
        {
            Ok(text) => text,
            Err(err) => {
                warn!("Trust explanation generation failed, using template: {}", err);
                metrics::record_fallback("trust_explanation");
                fallback_report(assessment)
            }
        }
    }
}

#[async_trait]
impl Agent for TrustScoringAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::TrustScoring
    }

    async fn run(&self, state: &ConversationState) -> anyhow::Result<StateUpdate> {
        let extracted = self.extract_facility_name(state).await;
        let search_term = extracted.or_else(|| {
            state
                .facility_filter
                .as_deref()
                .and_then(clean_extraction)
        });

        let Some(search_term) = search_term else {
            info!("Trust scoring: no facility identified, asking for clarification");
            let text = if state.agent_outputs.contains(AgentKind::Recommendation) {
                CLARIFY_AFTER_RECOMMENDATION
            } else {
                CLARIFY_WITHOUT_CONTEXT
            };
            return Ok(StateUpdate::agent_reply(AgentKind::TrustScoring, text));
        };

        let Some(facility) = self.store.find_facility_by_name(&search_term).await? else {
            info!("Trust scoring: no facility matches '{}'", search_term);
            return Ok(StateUpdate::agent_reply(
                AgentKind::TrustScoring,
                format!(
                    "I couldn't find a facility matching '{}'. Please check the name and try again.",
                    search_term
                ),
            ));
        };

        let assessment = calculate_trust_score(&facility);
        info!(
            "Trust scoring: {} scored {}/100 ({} flags)",
            facility.display_name(),
            assessment.score,
            assessment.flags.len()
        );

        let text = self.explain(state, &facility, &assessment).await;

        Ok(StateUpdate {
            trust_scores: Some(assessment),
            facility_filter: Some(facility.name.clone().unwrap_or(search_term)),
            ..StateUpdate::agent_reply(AgentKind::TrustScoring, text)
        })
    }
}
