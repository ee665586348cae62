use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

use crate::config::GeminiConfig;
use crate::error::{NliError, Result};
use crate::models::{FilterSet, GeminiResponse, KeyValidation, ProviderId};
use crate::prompts::PromptLoader;
use crate::transport::{HttpPost, HttpReply};

use super::{ProviderClient, Summary, filters_from_text};

const EXTRACTION_MAX_TOKENS: u32 = 1000;
const SUMMARY_MAX_TOKENS: u32 = 1200;
const VALIDATION_MAX_TOKENS: u32 = 10;

/// Client for the Gemini generateContent API. Gemini permits cross-origin
/// browser calls, so every request goes direct; the relay and the proxy
/// escalation are Claude-only concerns.
pub struct GeminiClient {
    http: Arc<dyn HttpPost>,
    prompts: Arc<PromptLoader>,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(http: Arc<dyn HttpPost>, prompts: Arc<PromptLoader>, config: GeminiConfig) -> Self {
        Self {
            http,
            prompts,
            config,
        }
    }

    /// The key travels as a URL query parameter, per the API's convention.
    fn url(&self, api_key: &str) -> String {
        format!(
            "{}/{}:generateContent?key={}",
            self.config.endpoint.trim_end_matches('/'),
            self.config.model,
            api_key
        )
    }

    fn request_body(system: Option<&str>, user: &str, max_tokens: u32) -> Value {
        let mut body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": user }] }],
            "generationConfig": { "maxOutputTokens": max_tokens },
        });
        if let Some(system) = system {
            body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
        }
        body
    }

    async fn send(&self, api_key: &str, body: &Value) -> Result<HttpReply> {
        self.http
            .post_json(
                &self.url(api_key),
                &[("content-type", "application/json")],
                body,
            )
            .await
    }

    fn reply_text(reply: HttpReply) -> Result<String> {
        if !reply.is_success() {
            let message = reply
                .body
                .pointer("/error/message")
                .and_then(|m| m.as_str())
                .unwrap_or("request failed")
                .to_string();
            return Err(NliError::Upstream {
                provider: "Gemini".to_string(),
                status: reply.status,
                message,
            });
        }
        let parsed: GeminiResponse =
            serde_json::from_value(reply.body).map_err(|e| NliError::Parse {
                provider: "Gemini".to_string(),
                reason: e.to_string(),
            })?;
        parsed
            .text()
            .map(str::to_string)
            .ok_or_else(|| NliError::Parse {
                provider: "Gemini".to_string(),
                reason: "response carried no candidate text".to_string(),
            })
    }
}

#[async_trait]
impl ProviderClient for GeminiClient {
    fn id(&self) -> ProviderId {
        ProviderId::Gemini
    }

    async fn extract_filters(&self, api_key: &str, query: &str) -> Result<FilterSet> {
        let system = self.prompts.extraction_prompt(ProviderId::Gemini)?;
        let body = Self::request_body(Some(&system), query, EXTRACTION_MAX_TOKENS);
        let reply = self.send(api_key, &body).await?;
        let text = Self::reply_text(reply)?;
        Ok(filters_from_text(ProviderId::Gemini, &text))
    }

    async fn summarize(&self, api_key: &str, query: &str, data: &Value) -> Result<Summary> {
        let prompts = self
            .prompts
            .summarization_prompts(ProviderId::Gemini, query, data)?;
        let body = Self::request_body(Some(&prompts.system), &prompts.user, SUMMARY_MAX_TOKENS);
        let reply = self.send(api_key, &body).await?;
        Ok(Summary {
            markdown: Self::reply_text(reply)?,
            fallback_note: None,
        })
    }

    async fn validate_key(&self, api_key: &str) -> Result<KeyValidation> {
        if api_key.is_empty() {
            return Err(NliError::MissingKey {
                provider: "Gemini".to_string(),
            });
        }
        let body = Self::request_body(None, "Hi", VALIDATION_MAX_TOKENS);
        let reply = match self.send(api_key, &body).await {
            Ok(reply) => reply,
            // Network-class failures say nothing about the key itself, so
            // they get their own message instead of a rejection.
            Err(err) if err.is_transport() => {
                return Ok(KeyValidation::invalid(
                    "Could not reach the Gemini API to validate the key. \
                     Check your network connection.",
                )
                .with_details(json!({ "error": err.to_string() })));
            }
            Err(err) => return Err(err),
        };
        if reply.is_success() {
            return Ok(KeyValidation::ok("Gemini API key is valid."));
        }
        let message = reply
            .body
            .pointer("/error/message")
            .and_then(|m| m.as_str())
            .unwrap_or("request failed")
            .to_string();
        if reply.status == 400 || reply.status == 401 || reply.status == 403 {
            Ok(
                KeyValidation::invalid("Gemini rejected this API key. Check the key and try again.")
                    .with_details(json!({ "status": reply.status, "error": message })),
            )
        } else {
            Ok(KeyValidation::invalid(format!(
                "Gemini API returned an unexpected error ({}): {}",
                reply.status, message
            )))
        }
    }
}
