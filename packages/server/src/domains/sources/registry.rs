//! Source registry - per-legislature URLs, selector rules, and extraction prompts.
//!
//! Loaded once at startup from JSON (the embedded `config/sources.json` or a
//! file named by `SOURCE_REGISTRY_PATH`) and shared read-only afterwards.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const EMBEDDED_REGISTRY: &str = include_str!("../../../config/sources.json");

/// CSS selectors used by the fallback parser for one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorRules {
    pub container: String,
    pub bill_number: String,
    pub title: String,
    pub status: String,
    pub sponsor: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceUrls {
    /// Primary URL; the one both extraction strategies target.
    #[serde(default)]
    pub bills_list: Option<String>,
    #[serde(default)]
    pub current_session: Option<String>,
    #[serde(default)]
    pub api: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub urls: SourceUrls,
    #[serde(default)]
    pub rules: Option<SelectorRules>,
    #[serde(default)]
    pub prompt: Option<String>,
}

impl SourceConfig {
    pub fn primary_url(&self) -> Option<&str> {
        self.urls
            .bills_list
            .as_deref()
            .or(self.urls.current_session.as_deref())
            .filter(|url| !url.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryDefaults {
    #[serde(default)]
    pub rules: Option<SelectorRules>,
    pub prompt: String,
    pub details_prompt: String,
    pub schema: serde_json::Value,
    pub details_schema: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
struct RegistryFile {
    defaults: RegistryDefaults,
    #[serde(default)]
    sources: Vec<SourceConfig>,
}

/// A source with its rules and prompt resolved against the registry defaults.
#[derive(Debug, Clone)]
pub struct ResolvedSource {
    pub config: SourceConfig,
    pub rules: Option<SelectorRules>,
    pub prompt: String,
}

impl ResolvedSource {
    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn primary_url(&self) -> Option<&str> {
        self.config.primary_url()
    }
}

#[derive(Debug, Clone)]
pub struct SourceRegistry {
    defaults: RegistryDefaults,
    sources: Vec<SourceConfig>,
    index: HashMap<String, usize>,
}

impl SourceRegistry {
    /// Registry compiled into the binary.
    pub fn embedded() -> Result<Self> {
        Self::from_json(EMBEDDED_REGISTRY).context("Embedded source registry is invalid")
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read source registry {}", path.display()))?;
        Self::from_json(&raw)
            .with_context(|| format!("Failed to parse source registry {}", path.display()))
    }

    /// Load from `path` when given, otherwise fall back to the embedded registry.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_path(path),
            None => Self::embedded(),
        }
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let file: RegistryFile = serde_json::from_str(raw)?;
        Self::new(file.defaults, file.sources)
    }

    pub fn new(defaults: RegistryDefaults, sources: Vec<SourceConfig>) -> Result<Self> {
        let mut index = HashMap::with_capacity(sources.len());
        for (position, source) in sources.iter().enumerate() {
            if index.insert(source.id.clone(), position).is_some() {
                anyhow::bail!("Duplicate source id in registry: {}", source.id);
            }
        }

        Ok(Self {
            defaults,
            sources,
            index,
        })
    }

    pub fn get(&self, id: &str) -> Option<&SourceConfig> {
        self.index.get(id).map(|&position| &self.sources[position])
    }

    /// Registered source ids in registry order.
    pub fn ids(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.id.as_str()).collect()
    }

    pub fn sources(&self) -> &[SourceConfig] {
        &self.sources
    }

    pub fn default_rules(&self) -> Option<&SelectorRules> {
        self.defaults.rules.as_ref()
    }

    /// Source-specific rules, or the default rule set.
    pub fn rules_for(&self, id: &str) -> Option<&SelectorRules> {
        self.get(id)
            .and_then(|s| s.rules.as_ref())
            .or(self.defaults.rules.as_ref())
    }

    pub fn prompt_for(&self, id: &str) -> &str {
        self.get(id)
            .and_then(|s| s.prompt.as_deref())
            .unwrap_or(&self.defaults.prompt)
    }

    pub fn schema(&self) -> &serde_json::Value {
        &self.defaults.schema
    }

    pub fn details_prompt(&self) -> &str {
        &self.defaults.details_prompt
    }

    pub fn details_schema(&self) -> &serde_json::Value {
        &self.defaults.details_schema
    }

    /// Whether a job for `id` may be enqueued.
    pub fn accepts(&self, id: &str) -> bool {
        self.get(id).is_some() || self.defaults.rules.is_some()
    }

    /// Resolve `id` against the defaults.
    ///
    /// An unregistered id still resolves (with no URLs) while a default rule
    /// set exists; the missing URL then fails inside the job.
    pub fn resolve(&self, id: &str) -> Option<ResolvedSource> {
        let config = match self.get(id) {
            Some(config) => config.clone(),
            None if self.defaults.rules.is_some() => SourceConfig {
                id: id.to_string(),
                name: id.to_string(),
                urls: SourceUrls::default(),
                rules: None,
                prompt: None,
            },
            None => return None,
        };

        Some(ResolvedSource {
            rules: self.rules_for(id).cloned(),
            prompt: self.prompt_for(id).to_string(),
            config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_without_defaults() -> SourceRegistry {
        SourceRegistry::from_json(
            r#"{
                "defaults": {
                    "prompt": "default prompt",
                    "details_prompt": "details",
                    "schema": {},
                    "details_schema": {}
                },
                "sources": [
                    {"id": "yukon", "name": "Yukon", "urls": {"bills_list": "https://example.org/bills"}}
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_embedded_registry_loads_all_provinces() {
        let registry = SourceRegistry::embedded().unwrap();
        let ids = registry.ids();

        assert_eq!(ids.len(), 10);
        assert_eq!(ids[0], "ontario");
        assert!(ids.contains(&"prince-edward-island"));
        assert!(registry.default_rules().is_some());
    }

    #[test]
    fn test_rules_fall_back_to_defaults() {
        let registry = SourceRegistry::embedded().unwrap();

        let ontario = registry.rules_for("ontario").unwrap();
        assert_eq!(ontario.container, "tr.bill-row, table tbody tr");

        let manitoba = registry.rules_for("manitoba").unwrap();
        assert_eq!(manitoba, registry.default_rules().unwrap());
    }

    #[test]
    fn test_prompt_falls_back_to_default() {
        let registry = SourceRegistry::embedded().unwrap();
        assert!(registry.prompt_for("quebec").contains("projets de loi"));
        assert!(registry.prompt_for("manitoba").starts_with("Extract every bill"));
    }

    #[test]
    fn test_unknown_source_resolves_with_default_rules() {
        let registry = SourceRegistry::embedded().unwrap();
        let resolved = registry.resolve("atlantis").unwrap();

        assert_eq!(resolved.id(), "atlantis");
        assert!(resolved.primary_url().is_none());
        assert!(resolved.rules.is_some());
        assert!(registry.accepts("atlantis"));
    }

    #[test]
    fn test_unknown_source_rejected_without_default_rules() {
        let registry = registry_without_defaults();

        assert!(registry.accepts("yukon"));
        assert!(!registry.accepts("atlantis"));
        assert!(registry.resolve("atlantis").is_none());
        assert_eq!(registry.resolve("yukon").unwrap().prompt, "default prompt");
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let result = SourceRegistry::from_json(
            r#"{
                "defaults": {"prompt": "", "details_prompt": "", "schema": {}, "details_schema": {}},
                "sources": [{"id": "a"}, {"id": "a"}]
            }"#,
        );
        assert!(result.is_err());
    }
}
