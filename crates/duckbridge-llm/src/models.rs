//! Static model catalog
//!
//! Public model ids map onto upstream model names. Ids missing from the
//! catalog are forwarded unchanged so new upstream models work without a
//! config change.

use std::collections::HashMap;

use duckbridge_config::{ModelEntry, ModelsConfig};

use crate::protocol::openai::{OpenAiModel, OpenAiModelList};

/// Model catalog served on `/v1/models`
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    entries: Vec<ModelEntry>,
    /// Public id -> upstream model name
    upstream: HashMap<String, String>,
}

impl ModelCatalog {
    /// Build the catalog from configuration
    pub fn from_config(config: &ModelsConfig) -> Self {
        Self::new(config.entries())
    }

    /// Build the catalog from explicit entries
    pub fn new(entries: Vec<ModelEntry>) -> Self {
        let upstream = entries
            .iter()
            .map(|entry| (entry.id.clone(), entry.upstream_model().to_owned()))
            .collect();

        Self { entries, upstream }
    }

    /// Upstream model name for a public id
    pub fn upstream_model(&self, id: &str) -> String {
        self.upstream.get(id).cloned().unwrap_or_else(|| {
            tracing::debug!(model = %id, "model not in catalog, forwarding as-is");
            id.to_owned()
        })
    }

    /// Whether `id` is a catalog entry
    pub fn contains(&self, id: &str) -> bool {
        self.upstream.contains_key(id)
    }

    /// Catalog in `OpenAI` list format
    pub fn list(&self) -> OpenAiModelList {
        OpenAiModelList {
            object: "list",
            data: self
                .entries
                .iter()
                .map(|entry| OpenAiModel {
                    id: entry.id.clone(),
                    object: "model",
                    created: entry.created,
                    owned_by: entry.owned_by.clone(),
                })
                .collect(),
        }
    }
}
