//! Context retrieval.
//!
//! Queries a tenant-scoped [`RetrievalStore`] for snippets relevant to a
//! prompt and, after successful completions, writes the interaction back so
//! future requests can retrieve it. Retrieval is strictly best-effort: a
//! failing store degrades to an empty context with a warning, never a failed
//! request.

pub mod memory;

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, warn};

use crate::config::RetrievalConfig;
use crate::traits::RetrievalStore;

pub use memory::InMemoryRetrievalStore;

/// Metadata characters kept when persisting an interaction.
const METADATA_EXCERPT_CHARS: usize = 500;

/// A completed exchange, as written back to the store.
#[derive(Debug, Clone)]
pub struct Interaction {
    pub tenant_id: String,
    pub request_id: String,
    pub model_id: String,
    pub prompt: String,
    pub response: String,
}

/// Best-effort context lookup plus interaction write-back.
pub struct ContextRetriever {
    store: Arc<dyn RetrievalStore>,
    config: RetrievalConfig,
}

impl ContextRetriever {
    pub fn new(store: Arc<dyn RetrievalStore>, config: RetrievalConfig) -> Self {
        Self { store, config }
    }

    /// Snippets relevant to `prompt`, best first, already filtered by the
    /// similarity threshold. An unavailable store yields an empty context.
    pub async fn retrieve(&self, tenant_id: &str, prompt: &str) -> Vec<String> {
        let chunks = match self.store.query(tenant_id, prompt, self.config.limit).await {
            Ok(chunks) => chunks,
            Err(error) => {
                warn!(tenant_id, %error, "retrieval unavailable, continuing without context");
                return Vec::new();
            }
        };

        let total = chunks.len();
        let mut kept: Vec<_> = chunks
            .into_iter()
            .filter(|chunk| chunk.score.similarity() >= self.config.similarity_threshold)
            .collect();
        // Descending relevance, regardless of the backend's own ordering.
        kept.sort_by(|a, b| {
            b.score
                .similarity()
                .partial_cmp(&a.score.similarity())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let snippets: Vec<String> = kept.into_iter().map(|chunk| chunk.content).collect();
        debug!(
            tenant_id,
            retrieved = total,
            kept = snippets.len(),
            "context retrieval complete"
        );
        snippets
    }

    /// Write a completed interaction back to the store so later queries can
    /// surface it. Trivial prompts are skipped; failures are logged and
    /// swallowed.
    pub async fn persist_interaction(&self, interaction: &Interaction) {
        if !self.config.persist_interactions
            || interaction.prompt.chars().count() <= self.config.persist_min_prompt_chars
        {
            return;
        }

        let document = format!(
            "Question: {}\nAnswer: {}",
            interaction.prompt, interaction.response
        );
        let metadata = json!({
            "type": "interaction",
            "request_id": interaction.request_id,
            "model_id": interaction.model_id,
            "prompt": truncate_chars(&interaction.prompt, METADATA_EXCERPT_CHARS),
            "response": truncate_chars(&interaction.response, METADATA_EXCERPT_CHARS),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        match self
            .store
            .upsert(&interaction.tenant_id, &document, metadata)
            .await
        {
            Ok(id) => debug!(
                tenant_id = %interaction.tenant_id,
                document_id = %id,
                "interaction persisted"
            ),
            Err(error) => warn!(
                tenant_id = %interaction.tenant_id,
                %error,
                "failed to persist interaction"
            ),
        }
    }

    /// Fire-and-forget variant of [`persist_interaction`], used on the
    /// response path so the caller never waits on the store.
    ///
    /// [`persist_interaction`]: Self::persist_interaction
    pub fn spawn_persist(self: &Arc<Self>, interaction: Interaction) {
        let retriever = Arc::clone(self);
        tokio::spawn(async move {
            retriever.persist_interaction(&interaction).await;
        });
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
