use serde::{Deserialize, Serialize};

/// Output format requested from `/scrape`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrapeFormat {
    Json,
}

/// Prompt and schema for LLM-backed structured extraction.
#[derive(Debug, Clone, Serialize)]
pub struct JsonOptions {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<serde_json::Value>,
}

/// Request body for `POST /scrape`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeRequest {
    pub url: String,
    pub formats: Vec<ScrapeFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_options: Option<JsonOptions>,
    /// Milliseconds to wait for client-side rendering before capture.
    pub wait_for: u64,
    pub only_main_content: bool,
    /// Server-side timeout in milliseconds.
    pub timeout: u64,
    /// `Some(0)` forces a fresh fetch instead of a cached page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_age: Option<u64>,
}

impl ScrapeRequest {
    /// Structured extraction request with the defaults used for slow legislature pages.
    pub fn extract(url: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            formats: vec![ScrapeFormat::Json],
            json_options: Some(JsonOptions {
                prompt: prompt.into(),
                schema: None,
            }),
            wait_for: 2_000,
            only_main_content: true,
            timeout: 30_000,
            max_age: None,
        }
    }

    pub fn with_schema(mut self, schema: serde_json::Value) -> Self {
        if let Some(options) = self.json_options.as_mut() {
            options.schema = Some(schema);
        }
        self
    }

    pub fn force_refresh(mut self, force: bool) -> Self {
        self.max_age = if force { Some(0) } else { None };
        self
    }
}

/// Response envelope for `POST /scrape`.
#[derive(Debug, Clone, Deserialize)]
pub struct ScrapeResponse {
    pub success: bool,
    #[serde(default)]
    pub data: Option<ScrapeData>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScrapeData {
    /// Structured extraction output. Older API versions used `extract` or `llm_extraction`.
    #[serde(default, alias = "extract", alias = "llm_extraction")]
    pub json: Option<serde_json::Value>,
    #[serde(default)]
    pub markdown: Option<String>,
    #[serde(default)]
    pub metadata: Option<PageMetadata>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMetadata {
    pub title: Option<String>,
    #[serde(alias = "sourceURL")]
    pub source_url: Option<String>,
    pub status_code: Option<u16>,
}
