use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use crate::error::Result;
use crate::models::{FilterSet, KeyValidation, ProviderId};

pub mod claude;
pub mod gemini;

pub use claude::ClaudeClient;
pub use gemini::GeminiClient;

/// Outcome of a summarization call: the model's markdown plus a note when
/// the answer came from the fast fallback model instead of the primary one.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub markdown: String,
    pub fallback_note: Option<String>,
}

/// One LLM backend. Both implementations take the user's key per call so the
/// session store stays the single place secrets live.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    fn id(&self) -> ProviderId;

    /// Turn a natural-language query into structured search filters.
    async fn extract_filters(&self, api_key: &str, query: &str) -> Result<FilterSet>;

    /// Produce a markdown summary of the search results for `query`.
    async fn summarize(&self, api_key: &str, query: &str, data: &Value) -> Result<Summary>;

    /// Cheap probe distinguishing a usable key from a rejected credential
    /// from an unreachable endpoint.
    async fn validate_key(&self, api_key: &str) -> Result<KeyValidation>;
}

fn fenced_json_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```json\s*(.*?)```").unwrap())
}

fn brace_span_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\{.*\}").unwrap())
}

/// Pull the filter object out of a model reply. Models wrap JSON in prose or
/// code fences despite instructions, so this tries a fenced ```json block
/// first, then the widest `{...}` span. Nothing parseable is not an error:
/// the caller treats it as "no filters found".
pub fn filters_from_text(provider: ProviderId, text: &str) -> FilterSet {
    let candidate = fenced_json_re()
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .or_else(|| {
            brace_span_re()
                .find(text)
                .map(|m| m.as_str().to_string())
        });

    let Some(candidate) = candidate else {
        tracing::warn!(provider = provider.as_str(), "No JSON object in extraction reply");
        return FilterSet::new();
    };

    match serde_json::from_str::<Value>(&candidate) {
        Ok(value) => FilterSet::from_json(&value),
        Err(e) => {
            tracing::warn!(
                provider = provider.as_str(),
                "Extraction reply contained malformed JSON: {}",
                e
            );
            FilterSet::new()
        }
    }
}
