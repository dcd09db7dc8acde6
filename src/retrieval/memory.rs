//! In-process retrieval store.
//!
//! Scores documents by lexical token overlap with the query, which is enough
//! to exercise thresholding, ordering and write-back paths without a vector
//! backend. Deployments swap in a real store through the
//! [`RetrievalStore`] trait.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::OrchestratorError;
use crate::traits::{RelevanceScore, RetrievalStore, ScoredChunk};

/// One stored snippet with its pre-tokenized content.
#[derive(Debug, Clone)]
pub struct StoredDocument {
    pub id: String,
    pub text: String,
    pub metadata: serde_json::Value,
    tokens: HashSet<String>,
}

/// Tenant-partitioned, overlap-scored document store.
#[derive(Default)]
pub struct InMemoryRetrievalStore {
    tenants: Mutex<HashMap<String, Vec<StoredDocument>>>,
}

impl InMemoryRetrievalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a tenant's documents, in insertion order.
    pub fn documents(&self, tenant_id: &str) -> Vec<StoredDocument> {
        let tenants = self.tenants.lock().unwrap_or_else(PoisonError::into_inner);
        tenants.get(tenant_id).cloned().unwrap_or_default()
    }
}

/// Lowercased alphanumeric tokens longer than two characters. Short tokens
/// carry no signal for overlap scoring.
fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.len() > 2)
        .map(|token| token.to_lowercase())
        .collect()
}

fn overlap_score(query: &HashSet<String>, document: &HashSet<String>) -> f32 {
    if query.is_empty() {
        return 0.0;
    }
    let shared = query.iter().filter(|token| document.contains(*token)).count();
    shared as f32 / query.len() as f32
}

#[async_trait]
impl RetrievalStore for InMemoryRetrievalStore {
    async fn query(
        &self,
        tenant_id: &str,
        text: &str,
        k: usize,
    ) -> Result<Vec<ScoredChunk>, OrchestratorError> {
        let query_tokens = tokenize(text);
        let tenants = self.tenants.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(documents) = tenants.get(tenant_id) else {
            return Ok(Vec::new());
        };

        let mut scored: Vec<(f32, &StoredDocument)> = documents
            .iter()
            .map(|doc| (overlap_score(&query_tokens, &doc.tokens), doc))
            .filter(|(score, _)| *score > 0.0)
            .collect();
        // Stable sort keeps insertion order among equal scores.
        scored.sort_by(|(a, _), (b, _)| b.total_cmp(a));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, doc)| ScoredChunk {
                content: doc.text.clone(),
                score: RelevanceScore::Similarity(score),
                metadata: doc.metadata.clone(),
            })
            .collect())
    }

    async fn upsert(
        &self,
        tenant_id: &str,
        text: &str,
        metadata: serde_json::Value,
    ) -> Result<String, OrchestratorError> {
        let id = Uuid::new_v4().to_string();
        let document = StoredDocument {
            id: id.clone(),
            text: text.to_string(),
            metadata,
            tokens: tokenize(text),
        };
        let mut tenants = self.tenants.lock().unwrap_or_else(PoisonError::into_inner);
        tenants.entry(tenant_id.to_string()).or_default().push(document);
        Ok(id)
    }

    async fn delete(&self, tenant_id: &str, id: &str) -> Result<(), OrchestratorError> {
        let mut tenants = self.tenants.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(documents) = tenants.get_mut(tenant_id) {
            documents.retain(|doc| doc.id != id);
        }
        Ok(())
    }

    async fn count(&self, tenant_id: &str) -> Result<usize, OrchestratorError> {
        let tenants = self.tenants.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(tenants.get(tenant_id).map_or(0, Vec::len))
    }
}
