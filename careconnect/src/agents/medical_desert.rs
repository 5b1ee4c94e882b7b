// Medical Desert Agent: regional distribution analysis and underserved areas

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::agents::router::truncate;
use crate::agents::state::{AgentKind, ConversationState, StateUpdate};
use crate::agents::Agent;
use crate::error::StoreError;
use crate::llm::{ChatMessage, TextGenerator};
use crate::metrics;
use crate::models::RegionStats;
use crate::store::FacilityStore;

/// A region is a desert when its facility count is below this share of the
/// cross-region average.
const DESERT_RATIO: f64 = 0.5;
const BEST_SERVED_COUNT: usize = 3;
const FALLBACK_DESERT_LIMIT: usize = 5;

pub const NO_DATA_MESSAGE: &str =
    "I'm sorry, I couldn't retrieve regional healthcare data at this time.";

const ANALYST_PROMPT: &str = "You are the CareConnect Medical Desert Analyzer, an expert on healthcare distribution in Ghana.
You have access to real data about healthcare facilities across all regions.

Your role:
- Analyze healthcare distribution data and identify underserved areas (medical deserts)
- Provide clear, actionable insights about regional healthcare gaps
- Compare regions and highlight disparities
- Suggest which regions need the most attention
- Use only the numbers in the HEALTHCARE DATA block; never invent or estimate statistics that are not there

Formatting:
- Use markdown for readability
- Include relevant numbers and percentages
- Highlight critical findings with bold text
- Be professional but accessible";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionalAnalysis {
    pub total_regions: usize,
    pub total_facilities: i64,
    pub average_per_region: f64,
    pub desert_threshold: f64,
    /// Ascending by facility count.
    pub medical_deserts: Vec<RegionStats>,
    /// Top regions, descending by facility count.
    pub best_served: Vec<RegionStats>,
    /// Ascending by facility count.
    pub all_regions: Vec<RegionStats>,
}

impl RegionalAnalysis {
    pub fn region(&self, name: &str) -> Option<&RegionStats> {
        self.all_regions
            .iter()
            .find(|r| r.region.eq_ignore_ascii_case(name.trim()))
    }

    pub fn is_desert(&self, name: &str) -> bool {
        self.medical_deserts
            .iter()
            .any(|r| r.region.eq_ignore_ascii_case(name.trim()))
    }
}

/// Partitions regions into deserts and best-served. `None` when there are no
/// regions to compare.
pub fn analyze_regions(mut regions: Vec<RegionStats>) -> Option<RegionalAnalysis> {
    if regions.is_empty() {
        return None;
    }

    regions.sort_by(|a, b| {
        a.total_facilities
            .cmp(&b.total_facilities)
            .then_with(|| a.region.cmp(&b.region))
    });

    let total_facilities: i64 = regions.iter().map(|r| r.total_facilities).sum();
    let average_per_region = total_facilities as f64 / regions.len() as f64;
    let desert_threshold = average_per_region * DESERT_RATIO;

    let medical_deserts: Vec<RegionStats> = regions
        .iter()
        .filter(|r| (r.total_facilities as f64) < desert_threshold)
        .cloned()
        .collect();
    let best_served: Vec<RegionStats> = regions
        .iter()
        .rev()
        .take(BEST_SERVED_COUNT)
        .cloned()
        .collect();

    Some(RegionalAnalysis {
        total_regions: regions.len(),
        total_facilities,
        average_per_region,
        desert_threshold,
        medical_deserts,
        best_served,
        all_regions: regions,
    })
}

fn region_line(region: &RegionStats) -> String {
    format!(
        "  - {}: {} facilities ({} hospitals, {} clinics, {} specialties)",
        region.region, region.total_facilities, region.hospitals, region.clinics, region.specialty_count
    )
}

/// The data block handed to the model. Every number in the answer must come
/// from here.
pub fn data_context(analysis: &RegionalAnalysis) -> String {
    let mut parts = vec![
        format!("Total Regions: {}", analysis.total_regions),
        format!("Total Facilities: {}", analysis.total_facilities),
        format!("Average per Region: {:.1}", analysis.average_per_region),
        format!(
            "Desert Threshold (< 50% of avg): {:.1} facilities",
            analysis.desert_threshold
        ),
    ];

    if !analysis.medical_deserts.is_empty() {
        parts.push(format!(
            "\nIdentified Medical Deserts ({} regions):",
            analysis.medical_deserts.len()
        ));
        parts.extend(analysis.medical_deserts.iter().map(region_line));
    }

    parts.push("\nBest Served Regions:".to_string());
    parts.extend(analysis.best_served.iter().map(region_line));

    parts.push("\nAll Regions (by facility count, ascending):".to_string());
    parts.extend(
        analysis
            .all_regions
            .iter()
            .map(|r| format!("  - {}: {} facilities", r.region, r.total_facilities)),
    );

    parts.join("\n")
}

/// Summary used when generation is unavailable. Same numbers as the data
/// block, fixed phrasing.
pub fn fallback_summary(analysis: &RegionalAnalysis, region_filter: Option<&str>) -> String {
    let mut parts = vec![
        "**Medical Desert Analysis for Ghana**\n".to_string(),
        format!("Total Regions Analyzed: {}", analysis.total_regions),
        format!("Total Healthcare Facilities: {}", analysis.total_facilities),
        format!("Average Facilities per Region: {:.1}\n", analysis.average_per_region),
    ];

    if let Some(region) = region_filter.and_then(|name| analysis.region(name)) {
        let status = if analysis.is_desert(&region.region) {
            "is a medical desert"
        } else {
            "is not a medical desert"
        };
        parts.push(format!(
            "**{}** {}: {} facilities ({} hospitals, {} clinics, {} specialties)\n",
            region.region,
            status,
            region.total_facilities,
            region.hospitals,
            region.clinics,
            region.specialty_count
        ));
    }

    if analysis.medical_deserts.is_empty() {
        parts.push("No critical medical deserts identified.".to_string());
    } else {
        parts.push(format!(
            "**Medical Deserts Identified: {} regions**",
            analysis.medical_deserts.len()
        ));
        parts.push(format!(
            "(Regions with < {:.1} facilities)\n",
            analysis.desert_threshold
        ));
        for desert in analysis.medical_deserts.iter().take(FALLBACK_DESERT_LIMIT) {
            parts.push(format!(
                "- **{}**: {} facilities ({} hospitals, {} clinics)",
                desert.region, desert.total_facilities, desert.hospitals, desert.clinics
            ));
        }
    }

    parts.push("\n**Best Served Regions:**".to_string());
    for region in &analysis.best_served {
        parts.push(format!("- {}: {} facilities", region.region, region.total_facilities));
    }

    parts.join("\n")
}

pub struct MedicalDesertAgent {
    store: Arc<dyn FacilityStore>,
    llm: Arc<dyn TextGenerator>,
}

impl MedicalDesertAgent {
    pub fn new(store: Arc<dyn FacilityStore>, llm: Arc<dyn TextGenerator>) -> Self {
        Self { store, llm }
    }

    pub async fn analyze(&self) -> Result<Option<RegionalAnalysis>, StoreError> {
        let regions = self.store.aggregate_by_region().await?;
        Ok(analyze_regions(regions))
    }
}

#[async_trait]
impl Agent for MedicalDesertAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::MedicalDesert
    }

    async fn run(&self, state: &ConversationState) -> anyhow::Result<StateUpdate> {
        let query = state.current_query();
        info!("Medical desert: analysing regional distribution for '{}'", query);

        let Some(analysis) = self.analyze().await? else {
            warn!("Medical desert: no regional data available");
            return Ok(StateUpdate::agent_reply(AgentKind::MedicalDesert, NO_DATA_MESSAGE));
        };

        let mut conversation_context = String::new();
        let prior = state.prior_messages(3);
        if !prior.is_empty() {
            conversation_context.push_str("\n\nPrevious conversation:\n");
            let lines: Vec<String> = prior
                .iter()
                .map(|m| format!("{}: {}", m.speaker(), truncate(&m.content, 300)))
                .collect();
            conversation_context.push_str(&lines.join("\n"));
        }

        let user_prompt = format!(
            "User Query: {}{}\n\n=== HEALTHCARE DATA ===\n{}\n=======================\n\n\
             Based on this real data, provide a helpful and insightful answer to the user's question.",
            query,
            conversation_context,
            data_context(&analysis)
        );

        let text = match self
            .llm
            .generate(ANALYST_PROMPT, &[ChatMessage::user(user_prompt)])
            .await
        {
            Ok(text) => text,
            Err(err) => {
                warn!("Medical desert generation failed, using template: {}", err);
                metrics::record_fallback("medical_desert");
                fallback_summary(&analysis, state.region_filter.as_deref())
            }
        };

        info!(
            "Medical desert: {} deserts among {} regions",
            analysis.medical_deserts.len(),
            analysis.total_regions
        );

        Ok(StateUpdate {
            medical_desert_data: Some(analysis),
            ..StateUpdate::agent_reply(AgentKind::MedicalDesert, text)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{region, FailingGenerator, InMemoryFacilityStore, ScriptedGenerator};

    fn abc() -> Vec<RegionStats> {
        vec![region("C", 20), region("A", 2), region("B", 2)]
    }

    #[test]
    fn deserts_fall_below_half_the_average() {
        let analysis = analyze_regions(abc()).unwrap();

        assert_eq!(analysis.total_facilities, 24);
        assert_eq!(analysis.average_per_region, 8.0);
        assert_eq!(analysis.desert_threshold, 4.0);

        let deserts: Vec<_> = analysis.medical_deserts.iter().map(|r| r.region.as_str()).collect();
        assert_eq!(deserts, vec!["A", "B"]);
        let best: Vec<_> = analysis.best_served.iter().map(|r| r.region.as_str()).collect();
        assert_eq!(best, vec!["C", "B", "A"]);
    }

    #[test]
    fn region_at_the_threshold_is_not_a_desert() {
        // average 8, threshold 4
        let analysis = analyze_regions(vec![region("A", 4), region("B", 12)]).unwrap();
        assert!(analysis.medical_deserts.is_empty());
    }

    #[test]
    fn fractional_threshold_is_printed_as_computed() {
        // average 9, threshold 4.5
        let analysis = analyze_regions(vec![region("A", 4), region("B", 14)]).unwrap();
        assert_eq!(analysis.desert_threshold, 4.5);

        let text = fallback_summary(&analysis, None);
        assert!(text.contains("(Regions with < 4.5 facilities)"));
        assert!(text.contains("- **A**: 4 facilities"));
        assert!(data_context(&analysis).contains("Desert Threshold (< 50% of avg): 4.5 facilities"));
    }

    #[test]
    fn best_served_is_capped_by_region_count() {
        let analysis = analyze_regions(vec![region("C", 20)]).unwrap();
        let best: Vec<_> = analysis.best_served.iter().map(|r| r.region.as_str()).collect();
        assert_eq!(best, vec!["C"]);
        assert!(analysis.medical_deserts.is_empty());
    }

    #[test]
    fn no_regions_means_no_analysis() {
        assert!(analyze_regions(vec![]).is_none());
    }

    #[test]
    fn fallback_uses_the_computed_numbers() {
        let analysis = analyze_regions(abc()).unwrap();
        let text = fallback_summary(&analysis, Some("a"));

        assert!(text.contains("Total Regions Analyzed: 3"));
        assert!(text.contains("Average Facilities per Region: 8.0"));
        assert!(text.contains("Medical Deserts Identified: 2 regions"));
        assert!(text.contains("(Regions with < 4.0 facilities)"));
        assert!(text.contains("- **A**: 2 facilities"));
        assert!(text.contains("**A** is a medical desert"));
        assert!(text.contains("- C: 20 facilities"));
    }

    #[tokio::test]
    async fn generation_failure_uses_template_and_keeps_payload() {
        let store = Arc::new(InMemoryFacilityStore::with_regions(abc()));
        let agent = MedicalDesertAgent::new(store, Arc::new(FailingGenerator));
        let mut state = ConversationState::default();
        state.push_user("Which regions are medical deserts?");

        let update = agent.run(&state).await.unwrap();
        let reply = update.reply.clone().unwrap();

        assert!(reply.starts_with("**Medical Desert Analysis for Ghana**"));
        assert_eq!(update.output, Some((AgentKind::MedicalDesert, reply)));
        assert_eq!(update.medical_desert_data.unwrap().medical_deserts.len(), 2);
    }

    #[tokio::test]
    async fn generation_receives_the_data_block() {
        let store = Arc::new(InMemoryFacilityStore::with_regions(abc()));
        let llm = Arc::new(ScriptedGenerator::new(["**A** and **B** are underserved."]));
        let agent = MedicalDesertAgent::new(store, llm.clone());
        let mut state = ConversationState::default();
        state.push_user("Where are the gaps?");

        let update = agent.run(&state).await.unwrap();
        assert_eq!(update.reply.as_deref(), Some("**A** and **B** are underserved."));

        let call = &llm.calls()[0];
        assert!(call.system_prompt.contains("never invent"));
        let prompt = &call.messages[0].content;
        assert!(prompt.contains("Average per Region: 8.0"));
        assert!(prompt.contains("Desert Threshold (< 50% of avg): 4.0 facilities"));
        assert!(prompt.contains("  - A: 2 facilities (0 hospitals, 0 clinics, 0 specialties)"));
    }

    #[tokio::test]
    async fn zero_regions_apologises_without_generating() {
        let store = Arc::new(InMemoryFacilityStore::default());
        let llm = Arc::new(ScriptedGenerator::new(["should not be used"]));
        let agent = MedicalDesertAgent::new(store, llm.clone());
        let mut state = ConversationState::default();
        state.push_user("medical deserts?");

        let update = agent.run(&state).await.unwrap();
        assert_eq!(update.reply.as_deref(), Some(NO_DATA_MESSAGE));
        assert!(update.medical_desert_data.is_none());
        assert!(llm.calls().is_empty());
    }
}
