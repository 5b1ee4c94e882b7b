// Semantic search over the pgvector embedding index

use async_trait::async_trait;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{FromRow, Postgres, QueryBuilder};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::db::DbPool;
use crate::error::StoreError;
use crate::llm::{Embedder, LlmError};
use crate::models::{EntityType, SearchFilters, SearchResult};

#[async_trait]
pub trait SemanticSearch: Send + Sync {
    /// Nearest neighbours of `query`, filtered, at or above `min_similarity`,
    /// ordered by descending similarity and truncated to `top_k`.
    async fn semantic_search(
        &self,
        query: &str,
        top_k: usize,
        entity_type: EntityType,
        filters: &SearchFilters,
        min_similarity: f64,
    ) -> Result<Vec<SearchResult>, StoreError>;
}

#[derive(FromRow)]
struct SearchRow {
    entity_id: Uuid,
    entity_type: String,
    metadata: Option<Json<Value>>,
    similarity_score: f64,
    record: Option<Json<Value>>,
}

pub struct PgVectorSearch {
    pool: DbPool,
    embedder: Arc<dyn Embedder>,
    dimensions: usize,
}

impl PgVectorSearch {
    /// `dimensions` must match the `vector(n)` column of `embeddings`.
    pub fn new(pool: DbPool, embedder: Arc<dyn Embedder>, dimensions: usize) -> Self {
        Self { pool, embedder, dimensions }
    }
}

/// pgvector's text input format: `[0.1,0.2,...]`.
fn vector_literal(embedding: &[f32]) -> String {
    let parts: Vec<String> = embedding.iter().map(|v| v.to_string()).collect();
    format!("[{}]", parts.join(","))
}

fn build_search_query<'a>(
    vector: String,
    top_k: usize,
    entity_type: EntityType,
    filters: &'a SearchFilters,
    min_similarity: f64,
) -> QueryBuilder<'a, Postgres> {
    let mut qb = QueryBuilder::new("WITH q AS (SELECT ");
    qb.push_bind(vector);
    qb.push(
        "::vector AS v)
         SELECT
            e.entity_id,
            e.entity_type,
            e.metadata,
            (1 - (e.embedding <=> q.v))::float8 AS similarity_score,
            CASE
                WHEN e.entity_type = 'facility' THEN row_to_json(f.*)
                WHEN e.entity_type = 'ngo' THEN row_to_json(n.*)
            END AS record
         FROM embeddings e
         CROSS JOIN q
         LEFT JOIN facilities f ON e.entity_id = f.id AND e.entity_type = 'facility'
         LEFT JOIN ngos n ON e.entity_id = n.id AND e.entity_type = 'ngo'
         WHERE e.entity_type = ",
    );
    qb.push_bind(entity_type.as_str());

    if let Some(city) = filters.city.as_deref().filter(|c| !c.trim().is_empty()) {
        qb.push(" AND e.metadata->>'city' ILIKE ");
        qb.push_bind(format!("%{}%", city.trim()));
    }
    if let Some(region) = filters.region.as_deref().filter(|r| !r.trim().is_empty()) {
        qb.push(" AND e.metadata->>'region' ILIKE ");
        qb.push_bind(format!("%{}%", region.trim()));
    }
    if entity_type == EntityType::Facility {
        if let Some(specialty) = filters.specialty.as_deref().filter(|s| !s.trim().is_empty()) {
            qb.push(" AND e.metadata->'specialties' ? ");
            qb.push_bind(specialty.trim().to_string());
        }
    }

    qb.push(" AND 1 - (e.embedding <=> q.v) >= ");
    qb.push_bind(min_similarity);
    qb.push(" ORDER BY e.embedding <=> q.v LIMIT ");
    qb.push_bind(top_k as i64);
    qb
}

#[async_trait]
impl SemanticSearch for PgVectorSearch {
    async fn semantic_search(
        &self,
        query: &str,
        top_k: usize,
        entity_type: EntityType,
        filters: &SearchFilters,
        min_similarity: f64,
    ) -> Result<Vec<SearchResult>, StoreError> {
        let embedding = self.embedder.embed(query).await?;
        if embedding.len() != self.dimensions {
            return Err(LlmError::DimensionMismatch {
                expected: self.dimensions,
                actual: embedding.len(),
            }
            .into());
        }
        debug!(
            "Semantic search for '{}' ({} dims, top_k={})",
            query,
            embedding.len(),
            top_k
        );

        let mut qb = build_search_query(
            vector_literal(&embedding),
            top_k,
            entity_type,
            filters,
            min_similarity,
        );
        let rows = qb.build_query_as::<SearchRow>().fetch_all(&self.pool).await?;

        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            let Some(entity_type) = EntityType::parse(&row.entity_type) else {
                warn!("Skipping embedding {} with unknown entity type '{}'", row.entity_id, row.entity_type);
                continue;
            };
            results.push(SearchResult {
                id: row.entity_id,
                entity_type,
                similarity_score: row.similarity_score.clamp(0.0, 1.0),
                metadata: row.metadata.map(|Json(v)| v).unwrap_or(Value::Null),
                record: row.record.map(|Json(v)| v).unwrap_or(Value::Null),
            });
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_literal_matches_pgvector_text_format() {
        assert_eq!(vector_literal(&[0.5, -1.0, 0.25]), "[0.5,-1,0.25]");
        assert_eq!(vector_literal(&[]), "[]");
    }

    #[test]
    fn query_includes_only_requested_filters() {
        let filters = SearchFilters {
            city: Some("Accra".to_string()),
            region: None,
            specialty: Some("ophthalmology".to_string()),
        };
        let qb = build_search_query("[1]".to_string(), 5, EntityType::Facility, &filters, 0.0);
        let sql = qb.sql();
        assert!(sql.contains("metadata->>'city' ILIKE"));
        assert!(!sql.contains("metadata->>'region'"));
        assert!(sql.contains("metadata->'specialties' ?"));
        assert!(sql.contains("ORDER BY e.embedding <=> q.v LIMIT"));
    }

    #[test]
    fn specialty_filter_is_ignored_for_ngos() {
        let filters = SearchFilters {
            specialty: Some("surgery".to_string()),
            ..Default::default()
        };
        let qb = build_search_query("[1]".to_string(), 5, EntityType::Ngo, &filters, 0.0);
        assert!(!qb.sql().contains("specialties"));
    }
}
