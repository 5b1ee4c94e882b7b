// In-process fakes for the generation service, the facility store and the
// vector index.

use async_trait::async_trait;
use serde_json::json;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use uuid::Uuid;

use crate::error::StoreError;
use crate::llm::{ChatMessage, LlmError, TextGenerator};
use crate::models::{EntityType, Facility, Ngo, RegionStats, SearchFilters, SearchResult, SummaryStats};
use crate::search::SemanticSearch;
use crate::store::FacilityStore;

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub system_prompt: String,
    pub messages: Vec<ChatMessage>,
}

/// Replies with the scripted texts in order, then fails.
#[derive(Default)]
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedGenerator {
    pub fn new<'a>(replies: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(str::to_string).collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, system_prompt: &str, messages: &[ChatMessage]) -> Result<String, LlmError> {
        self.calls.lock().unwrap().push(RecordedCall {
            system_prompt: system_prompt.to_string(),
            messages: messages.to_vec(),
        });
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(LlmError::EmptyResponse)
    }
}

/// Every call fails as if the service were down.
pub struct FailingGenerator;

#[async_trait]
impl TextGenerator for FailingGenerator {
    async fn generate(&self, _system_prompt: &str, _messages: &[ChatMessage]) -> Result<String, LlmError> {
        Err(LlmError::Api {
            status: 503,
            message: "service unavailable".to_string(),
        })
    }
}

#[derive(Default)]
pub struct InMemoryFacilityStore {
    facilities: Vec<Facility>,
    regions: Vec<RegionStats>,
    ngos: i64,
    failing: bool,
}

impl InMemoryFacilityStore {
    pub fn with_facilities(facilities: Vec<Facility>) -> Self {
        Self { facilities, ..Default::default() }
    }

    pub fn with_regions(regions: Vec<RegionStats>) -> Self {
        Self { regions, ..Default::default() }
    }

    pub fn with_ngo_count(mut self, ngos: i64) -> Self {
        self.ngos = ngos;
        self
    }

    /// Every query fails with a pool timeout.
    pub fn failing() -> Self {
        Self { failing: true, ..Default::default() }
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing {
            Err(StoreError::Database(sqlx::Error::PoolTimedOut))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl FacilityStore for InMemoryFacilityStore {
    async fn find_facility_by_name(&self, name_substring: &str) -> Result<Option<Facility>, StoreError> {
        self.check()?;
        let needle = name_substring.to_lowercase();
        Ok(self
            .facilities
            .iter()
            .find(|f| {
                f.name
                    .as_deref()
                    .is_some_and(|name| name.to_lowercase().contains(&needle))
            })
            .cloned())
    }

    async fn get_facility(&self, id: Uuid) -> Result<Option<Facility>, StoreError> {
        self.check()?;
        Ok(self.facilities.iter().find(|f| f.id == id).cloned())
    }

    async fn aggregate_by_region(&self) -> Result<Vec<RegionStats>, StoreError> {
        self.check()?;
        Ok(self.regions.clone())
    }

    async fn summary_stats(&self) -> Result<SummaryStats, StoreError> {
        self.check()?;
        let mut facilities_by_type = BTreeMap::new();
        for facility in &self.facilities {
            let kind = facility.facility_type_id.clone().unwrap_or_else(|| "unknown".to_string());
            *facilities_by_type.entry(kind).or_insert(0) += 1;
        }
        Ok(SummaryStats {
            total_facilities: self.facilities.len() as i64,
            total_ngos: self.ngos,
            total_regions: self.regions.len() as i64,
            facilities_by_type,
        })
    }
}

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub top_k: usize,
    pub entity_type: EntityType,
    pub filters: SearchFilters,
    pub min_similarity: f64,
}

/// Fixed hit list, filtered by entity type and similarity like the real index.
pub struct StaticSearch {
    results: Vec<SearchResult>,
    requests: Mutex<Vec<SearchRequest>>,
}

impl StaticSearch {
    pub fn new(results: Vec<SearchResult>) -> Self {
        Self { results, requests: Mutex::new(Vec::new()) }
    }

    pub fn requests(&self) -> Vec<SearchRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl SemanticSearch for StaticSearch {
    async fn semantic_search(
        &self,
        query: &str,
        top_k: usize,
        entity_type: EntityType,
        filters: &SearchFilters,
        min_similarity: f64,
    ) -> Result<Vec<SearchResult>, StoreError> {
        self.requests.lock().unwrap().push(SearchRequest {
            query: query.to_string(),
            top_k,
            entity_type,
            filters: filters.clone(),
            min_similarity,
        });
        Ok(self
            .results
            .iter()
            .filter(|hit| hit.entity_type == entity_type && hit.similarity_score >= min_similarity)
            .take(top_k)
            .cloned()
            .collect())
    }
}

pub fn region(name: &str, total_facilities: i64) -> RegionStats {
    RegionStats {
        region: name.to_string(),
        total_facilities,
        facility_types: 0,
        hospitals: 0,
        clinics: 0,
        specialty_count: 0,
    }
}

pub fn facility_hit(facility: Facility, similarity_score: f64) -> SearchResult {
    SearchResult {
        id: facility.id,
        entity_type: EntityType::Facility,
        similarity_score,
        metadata: json!({ "name": facility.name }),
        record: serde_json::to_value(&facility).unwrap(),
    }
}

pub fn ngo_hit(ngo: Ngo, similarity_score: f64) -> SearchResult {
    SearchResult {
        id: ngo.id,
        entity_type: EntityType::Ngo,
        similarity_score,
        metadata: json!({ "name": ngo.name }),
        record: serde_json::to_value(&ngo).unwrap(),
    }
}
