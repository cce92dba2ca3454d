use std::collections::HashSet;
use std::path::Path;

use crate::Config;

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, environment variable
    /// expansion fails, TOML parsing fails, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        Self::from_toml(&raw)
    }

    /// Parse and validate configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns an error if expansion, parsing or validation fails
    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        let expanded =
            crate::env::expand_env(raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error describing the first inconsistency found
    pub fn validate(&self) -> anyhow::Result<()> {
        self.validate_upstream()?;
        self.validate_models()?;
        self.validate_health()?;
        Ok(())
    }

    fn validate_upstream(&self) -> anyhow::Result<()> {
        let upstream = &self.upstream;

        for (field, url) in [("status_url", &upstream.status_url), ("chat_url", &upstream.chat_url)] {
            if !matches!(url.scheme(), "http" | "https") {
                anyhow::bail!("upstream.{field} must be an http or https URL");
            }
        }

        if !upstream.token_headers.iter().any(|h| h.required) {
            anyhow::bail!("upstream.token_headers must contain at least one required header");
        }

        if let Some(header) = upstream
            .token_headers
            .iter()
            .find(|h| http_header_name_invalid(&h.name))
        {
            anyhow::bail!("upstream.token_headers contains an invalid header name: '{}'", header.name);
        }

        if upstream.challenge_attempts == 0 {
            anyhow::bail!("upstream.challenge_attempts must be at least 1");
        }

        if upstream.max_uses == Some(0) {
            anyhow::bail!("upstream.max_uses must be at least 1 when set");
        }

        Ok(())
    }

    fn validate_models(&self) -> anyhow::Result<()> {
        let Some(ref catalog) = self.models.catalog else {
            return Ok(());
        };

        if catalog.is_empty() {
            anyhow::bail!("models.catalog must not be empty when set");
        }

        let mut seen = HashSet::new();
        for entry in catalog {
            if entry.id.trim().is_empty() {
                anyhow::bail!("models.catalog ids must not be empty");
            }
            if !seen.insert(entry.id.as_str()) {
                anyhow::bail!("models.catalog contains duplicate id '{}'", entry.id);
            }
        }

        Ok(())
    }

    fn validate_health(&self) -> anyhow::Result<()> {
        if self.server.health.enabled && !self.server.health.path.starts_with('/') {
            anyhow::bail!("server.health.path must start with '/'");
        }
        Ok(())
    }
}

fn http_header_name_invalid(name: &str) -> bool {
    name.is_empty()
        || !name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b))
}
