//! Retrieval store capability.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::OrchestratorError;

/// Relevance reported by a backend, either directly as a similarity or as a
/// distance (`similarity = 1 - distance`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RelevanceScore {
    Similarity(f32),
    Distance(f32),
}

impl RelevanceScore {
    /// Normalized similarity in the backend's score space.
    pub fn similarity(&self) -> f32 {
        match self {
            Self::Similarity(s) => *s,
            Self::Distance(d) => 1.0 - d,
        }
    }
}

/// One scored snippet returned from a query.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub content: String,
    pub score: RelevanceScore,
    pub metadata: serde_json::Value,
}

/// The keyed search store the core augments prompts from.
///
/// Every operation is scoped by `tenant_id`; the core never sees cross-tenant
/// data. Failures surface as
/// [`RetrievalUnavailable`](crate::error::OrchestratorError::RetrievalUnavailable)
/// and are never fatal to the primary request path.
#[async_trait]
pub trait RetrievalStore: Send + Sync {
    /// Top-`k` snippets for `text`, best first.
    async fn query(
        &self,
        tenant_id: &str,
        text: &str,
        k: usize,
    ) -> Result<Vec<ScoredChunk>, OrchestratorError>;

    /// Store a snippet; returns the new document id.
    async fn upsert(
        &self,
        tenant_id: &str,
        text: &str,
        metadata: serde_json::Value,
    ) -> Result<String, OrchestratorError>;

    async fn delete(&self, tenant_id: &str, id: &str) -> Result<(), OrchestratorError>;

    /// Number of documents stored for the tenant.
    async fn count(&self, tenant_id: &str) -> Result<usize, OrchestratorError>;
}

#[async_trait]
impl<T: RetrievalStore + ?Sized> RetrievalStore for Arc<T> {
    async fn query(
        &self,
        tenant_id: &str,
        text: &str,
        k: usize,
    ) -> Result<Vec<ScoredChunk>, OrchestratorError> {
        (**self).query(tenant_id, text, k).await
    }

    async fn upsert(
        &self,
        tenant_id: &str,
        text: &str,
        metadata: serde_json::Value,
    ) -> Result<String, OrchestratorError> {
        (**self).upsert(tenant_id, text, metadata).await
    }

    async fn delete(&self, tenant_id: &str, id: &str) -> Result<(), OrchestratorError> {
        (**self).delete(tenant_id, id).await
    }

    async fn count(&self, tenant_id: &str) -> Result<usize, OrchestratorError> {
        (**self).count(tenant_id).await
    }
}
