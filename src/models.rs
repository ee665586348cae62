use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The two supported LLM backends. Exactly one is current at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Claude,
    Gemini,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Claude => "claude",
            ProviderId::Gemini => "gemini",
        }
    }

    /// Human-facing name used in status messages and summary banners.
    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderId::Claude => "Claude",
            ProviderId::Gemini => "Gemini",
        }
    }

    /// Unknown strings yield `None`; callers fall back to the default.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "claude" => Some(ProviderId::Claude),
            "gemini" => Some(ProviderId::Gemini),
            _ => None,
        }
    }
}

impl Default for ProviderId {
    fn default() -> Self {
        ProviderId::Claude
    }
}

/// The fixed set of structured search fields the extraction step can target.
/// Mirrors the input fields of the pre-existing search form one to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FilterField {
    Acupoint,
    Meridian,
    SpecialPointCategory,
    SurfaceRegion,
    RelatedRegion,
    BodyRegion,
    StudiedCondition,
    ConditionContext,
    Country,
}

impl FilterField {
    pub const ALL: [FilterField; 9] = [
        FilterField::Acupoint,
        FilterField::Meridian,
        FilterField::SpecialPointCategory,
        FilterField::SurfaceRegion,
        FilterField::RelatedRegion,
        FilterField::BodyRegion,
        FilterField::StudiedCondition,
        FilterField::ConditionContext,
        FilterField::Country,
    ];

    /// The JSON key the extraction prompt asks the model to emit, which is
    /// also the form field id on the search page.
    pub fn key(&self) -> &'static str {
        match self {
            FilterField::Acupoint => "acupoint",
            FilterField::Meridian => "meridian",
            FilterField::SpecialPointCategory => "special_point_category",
            FilterField::SurfaceRegion => "surface_region",
            FilterField::RelatedRegion => "related_region",
            FilterField::BodyRegion => "body_region",
            FilterField::StudiedCondition => "studied_condition",
            FilterField::ConditionContext => "condition_context",
            FilterField::Country => "country",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.key() == key)
    }
}

/// Extraction result: present keys constrain the search, absent keys mean
/// "no constraint". Unknown keys and empty values from the model are dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSet(BTreeMap<FilterField, String>);

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: FilterField, value: impl Into<String>) {
        let value = value.into();
        if !value.trim().is_empty() {
            self.0.insert(field, value.trim().to_string());
        }
    }

    pub fn get(&self, field: FilterField) -> Option<&str> {
        self.0.get(&field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FilterField, &str)> {
        self.0.iter().map(|(f, v)| (*f, v.as_str()))
    }

    /// Build from the JSON object the model returned. Keys outside the fixed
    /// field set are silently skipped, as are empty or non-string values.
    pub fn from_json(value: &Value) -> Self {
        let mut set = FilterSet::new();
        if let Some(obj) = value.as_object() {
            for (key, val) in obj {
                let Some(field) = FilterField::from_key(key) else {
                    tracing::debug!("Ignoring unknown filter key from model: {}", key);
                    continue;
                };
                if let Some(s) = val.as_str() {
                    set.insert(field, s);
                }
            }
        }
        set
    }
}

/// Outcome of a key-validation probe. `details` carries the provider's raw
/// error body when one was available.
#[derive(Debug, Clone, Serialize)]
pub struct KeyValidation {
    pub valid: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl KeyValidation {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            valid: true,
            message: message.into(),
            details: None,
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

// Claude (Anthropic messages API) response envelope.

#[derive(Debug, Deserialize)]
pub struct ClaudeResponse {
    #[serde(default)]
    pub content: Vec<ClaudeContentBlock>,
}

#[derive(Debug, Deserialize)]
pub struct ClaudeContentBlock {
    #[serde(default)]
    pub text: Option<String>,
}

impl ClaudeResponse {
    pub fn text(&self) -> Option<&str> {
        self.content.first().and_then(|b| b.text.as_deref())
    }
}

// Gemini (generateContent API) response envelope.

#[derive(Debug, Deserialize)]
pub struct GeminiResponse {
    #[serde(default)]
    pub candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
pub struct GeminiCandidate {
    pub content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
pub struct GeminiContent {
    #[serde(default)]
    pub parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
pub struct GeminiPart {
    #[serde(default)]
    pub text: Option<String>,
}

impl GeminiResponse {
    pub fn text(&self) -> Option<&str> {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .and_then(|c| c.parts.first())
            .and_then(|p| p.text.as_deref())
    }
}

// Relay wire shapes.

/// Structured error body returned by the relay when it cannot forward.
#[derive(Debug, Serialize, Deserialize)]
pub struct RelayError {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Health-check payload for `GET` on the relay path.
#[derive(Debug, Serialize, Deserialize)]
pub struct RelayHealth {
    pub status: String,
    pub message: String,
    pub timestamp: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn provider_parse_rejects_unknown() {
        assert_eq!(ProviderId::parse("claude"), Some(ProviderId::Claude));
        assert_eq!(ProviderId::parse(" Gemini "), Some(ProviderId::Gemini));
        assert_eq!(ProviderId::parse("openai"), None);
        assert_eq!(ProviderId::parse(""), None);
    }

    #[test]
    fn provider_id_keys_a_hash_map() {
        // The session key store and the client registry both key on it.
        let mut map = std::collections::HashMap::new();
        map.insert(ProviderId::Claude, "sk-test");
        map.insert(ProviderId::Gemini, "gm-test");
        assert_eq!(map.get(&ProviderId::Claude), Some(&"sk-test"));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn filter_set_drops_unknown_keys_and_empty_values() {
        let set = FilterSet::from_json(&json!({
            "acupoint": "LI4",
            "studied_condition": "headache",
            "modality": "electroacupuncture",
            "country": "",
            "meridian": 7
        }));
        assert_eq!(set.len(), 2);
        assert_eq!(set.get(FilterField::Acupoint), Some("LI4"));
        assert_eq!(set.get(FilterField::StudiedCondition), Some("headache"));
        assert_eq!(set.get(FilterField::Country), None);
        assert_eq!(set.get(FilterField::Meridian), None);
    }

    #[test]
    fn claude_payload_path_is_first_content_block() {
        let resp: ClaudeResponse = serde_json::from_value(json!({
            "content": [{"type": "text", "text": "hello"}]
        }))
        .unwrap();
        assert_eq!(resp.text(), Some("hello"));

        let empty: ClaudeResponse = serde_json::from_value(json!({"content": []})).unwrap();
        assert_eq!(empty.text(), None);
    }

    #[test]
    fn gemini_payload_path_is_first_candidate_part() {
        let resp: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{"content": {"parts": [{"text": "hi"}]}}]
        }))
        .unwrap();
        assert_eq!(resp.text(), Some("hi"));

        let missing: GeminiResponse =
            serde_json::from_value(json!({"candidates": [{"content": {"parts": []}}]})).unwrap();
        assert_eq!(missing.text(), None);
    }
}
