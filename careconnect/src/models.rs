use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;
use uuid::Uuid;

use crate::agents::state::Message;
use crate::agents::trust_scoring::ScoreBreakdown;

/// A healthcare facility as stored in `facilities`. Decoded from
/// `row_to_json(f.*)`, so field names follow the column names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Facility {
    pub id: Uuid,
    pub name: Option<String>,
    pub facility_type_id: Option<String>,
    pub operator_type_id: Option<String>,
    pub specialties: Option<Vec<String>>,
    pub phone_numbers: Option<Vec<String>>,
    pub email: Option<String>,
    pub official_website: Option<String>,
    pub facebook_link: Option<String>,
    pub twitter_link: Option<String>,
    pub address_line1: Option<String>,
    pub address_city: Option<String>,
    pub address_state_or_region: Option<String>,
    pub address_country: Option<String>,
    pub description: Option<String>,
    pub capacity: Option<i32>,
    pub number_doctors: Option<i32>,
    pub year_established: Option<i32>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl Facility {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unnamed facility")
    }

    pub fn specialties(&self) -> &[String] {
        self.specialties.as_deref().unwrap_or_default()
    }

    pub fn phone_numbers(&self) -> &[String] {
        self.phone_numbers.as_deref().unwrap_or_default()
    }

    /// "City, Region" with whichever parts are known.
    pub fn location(&self) -> String {
        [&self.address_city, &self.address_state_or_region]
            .iter()
            .filter_map(|part| part.as_deref())
            .filter(|part| !part.trim().is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Ngo {
    pub id: Uuid,
    pub name: Option<String>,
    pub mission_statement: Option<String>,
    pub organization_description: Option<String>,
    pub countries: Option<Vec<String>>,
    pub phone_numbers: Option<Vec<String>>,
    pub email: Option<String>,
    pub official_website: Option<String>,
    pub address_city: Option<String>,
    pub address_state_or_region: Option<String>,
    pub address_country: Option<String>,
    pub year_established: Option<i32>,
}

/// Per-region facility aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RegionStats {
    pub region: String,
    pub total_facilities: i64,
    pub facility_types: i64,
    pub hospitals: i64,
    pub clinics: i64,
    #[sqlx(default)]
    pub specialty_count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SummaryStats {
    pub total_facilities: i64,
    pub total_ngos: i64,
    pub total_regions: i64,
    pub facilities_by_type: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Facility,
    Ngo,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Facility => "facility",
            EntityType::Ngo => "ngo",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "facility" => Some(EntityType::Facility),
            "ngo" => Some(EntityType::Ngo),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    pub city: Option<String>,
    pub region: Option<String>,
    pub specialty: Option<String>,
}

/// One hit from the embedding index, joined with the full entity record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: Uuid,
    pub entity_type: EntityType,
    pub similarity_score: f64,
    pub metadata: Value,
    pub record: Value,
}

impl SearchResult {
    pub fn facility(&self) -> Option<Facility> {
        match self.entity_type {
            EntityType::Facility => self.decode(),
            EntityType::Ngo => None,
        }
    }

    pub fn ngo(&self) -> Option<Ngo> {
        match self.entity_type {
            EntityType::Ngo => self.decode(),
            EntityType::Facility => None,
        }
    }

    fn decode<T: DeserializeOwned>(&self) -> Option<T> {
        serde_json::from_value(self.record.clone())
            .map_err(|e| {
                warn!(
                    "Dropping {:?} search hit {} (similarity {:.3}): {}",
                    self.entity_type, self.id, self.similarity_score, e
                )
            })
            .ok()
    }
}

// API Request/Response models
fn default_thread_id() -> String {
    "default".to_string()
}

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Deserialize)]
pub struct AgentQueryRequest {
    pub query: String,
    #[serde(default = "default_thread_id")]
    pub thread_id: String,
    pub region: Option<String>,
    pub facility: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AgentQueryResponse {
    pub response: String,
    pub thread_id: String,
    pub agents_used: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ThreadHistoryResponse {
    pub thread_id: String,
    pub messages: Vec<Message>,
}

#[derive(Debug, Deserialize)]
pub struct FacilitySearchRequest {
    pub query: String,
    pub city: Option<String>,
    pub region: Option<String>,
    pub specialty: Option<String>,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub min_similarity: f64,
}

#[derive(Debug, Serialize)]
pub struct FacilityHit {
    pub id: Uuid,
    pub name: Option<String>,
    pub facility_type: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub phone: Vec<String>,
    pub specialties: Vec<String>,
    pub similarity_score: f64,
}

#[derive(Debug, Serialize)]
pub struct FacilitySearchResponse {
    pub count: usize,
    pub facilities: Vec<FacilityHit>,
}

#[derive(Debug, Deserialize)]
pub struct NgoSearchRequest {
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

#[derive(Debug, Serialize)]
pub struct NgoHit {
    pub id: Uuid,
    pub name: Option<String>,
    pub mission: Option<String>,
    pub countries: Vec<String>,
    pub city: Option<String>,
    pub similarity_score: f64,
}

#[derive(Debug, Serialize)]
pub struct NgoSearchResponse {
    pub count: usize,
    pub ngos: Vec<NgoHit>,
}

#[derive(Debug, Deserialize)]
pub struct TrustScoreRequest {
    pub facility_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct TrustScoreResponse {
    pub facility_id: Uuid,
    pub facility_name: Option<String>,
    pub score: u32,
    pub assessment: String,
    pub breakdown: ScoreBreakdown,
    pub flags: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    #[serde(flatten)]
    pub stats: SummaryStats,
    pub medical_deserts_count: usize,
    pub average_facilities_per_region: f64,
}
