//! Model Registry
//!
//! Immutable table of the models the orchestrator may route to. Built once
//! (from the default catalog or a builder), then shared freely. Lookups
//! never lock because nothing is ever mutated after construction, which also
//! keeps routing deterministic for a given registry snapshot.

mod catalog;

pub use catalog::default_catalog;

use std::collections::HashMap;

use crate::types::{ModelDescriptor, TenantAccessPolicy};

/// Read-only catalog of routable models, keyed by model id.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: HashMap<String, ModelDescriptor>,
}

impl ModelRegistry {
    pub fn builder() -> ModelRegistryBuilder {
        ModelRegistryBuilder {
            models: HashMap::new(),
        }
    }

    /// Registry preloaded with the shipped deployment's model table.
    pub fn with_default_catalog() -> Self {
        let mut builder = Self::builder();
        for descriptor in default_catalog() {
            builder = builder.register(descriptor);
        }
        builder.build()
    }

    pub fn lookup(&self, model_id: &str) -> Option<&ModelDescriptor> {
        self.models.get(model_id)
    }

    /// Models the given tenant may use, filtered through the policy's model
    /// and provider lists (`"*"` matches all). Ordered by catalog priority,
    /// then model id, so listings are stable.
    pub fn list_for_tenant(&self, policy: &TenantAccessPolicy) -> Vec<&ModelDescriptor> {
        let mut allowed: Vec<&ModelDescriptor> = self
            .models
            .values()
            .filter(|descriptor| policy.allows(descriptor))
            .collect();
        allowed.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| a.model_id.cmp(&b.model_id))
        });
        allowed
    }

    /// All registered descriptors, in stable (priority, id) order.
    pub fn all(&self) -> Vec<&ModelDescriptor> {
        let mut all: Vec<&ModelDescriptor> = self.models.values().collect();
        all.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| a.model_id.cmp(&b.model_id))
        });
        all
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

/// Builder for a [`ModelRegistry`]. Registering the same model id twice
/// replaces the earlier descriptor.
#[derive(Debug, Default)]
pub struct ModelRegistryBuilder {
    models: HashMap<String, ModelDescriptor>,
}

impl ModelRegistryBuilder {
    pub fn register(mut self, descriptor: ModelDescriptor) -> Self {
        self.models.insert(descriptor.model_id.clone(), descriptor);
        self
    }

    pub fn build(self) -> ModelRegistry {
        ModelRegistry {
            models: self.models,
        }
    }
}
