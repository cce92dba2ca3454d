use serde::Deserialize;

/// Model catalog configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelsConfig {
    /// Replaces the built-in catalog when set
    #[serde(default)]
    pub catalog: Option<Vec<ModelEntry>>,
}

/// One entry of the `/v1/models` catalog
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelEntry {
    /// Public model id clients send
    pub id: String,
    /// Owner tag reported to clients
    pub owned_by: String,
    /// Creation timestamp reported to clients
    #[serde(default)]
    pub created: u64,
    /// Model name sent upstream, when it differs from `id`
    #[serde(default)]
    pub upstream_id: Option<String>,
}

impl ModelEntry {
    /// Name to send upstream for this model
    pub fn upstream_model(&self) -> &str {
        self.upstream_id.as_deref().unwrap_or(&self.id)
    }
}

impl ModelsConfig {
    /// Effective catalog: configured entries or the built-in list
    pub fn entries(&self) -> Vec<ModelEntry> {
        self.catalog.clone().unwrap_or_else(builtin_catalog)
    }
}

fn entry(id: &str, owned_by: &str, created: u64) -> ModelEntry {
    ModelEntry {
        id: id.to_owned(),
        owned_by: owned_by.to_owned(),
        created,
        upstream_id: None,
    }
}

/// Models the upstream serves without an account
pub fn builtin_catalog() -> Vec<ModelEntry> {
    vec![
        entry("gpt-4o-mini", "openai", 1_721_172_741),
        entry("gpt-5-mini", "openai", 1_754_524_800),
        entry("o3-mini", "openai", 1_737_496_800),
        entry("claude-3-5-haiku-latest", "anthropic", 1_730_419_200),
        entry("meta-llama/Llama-4-Scout-17B-16E-Instruct", "meta", 1_743_897_600),
        entry("mistralai/Mistral-Small-24B-Instruct-2501", "mistral", 1_738_022_400),
    ]
}
