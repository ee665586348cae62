use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

use crate::config::ClaudeConfig;
use crate::error::{NliError, Result};
use crate::models::{ClaudeResponse, FilterSet, KeyValidation, ProviderId};
use crate::prompts::PromptLoader;
use crate::transport::{CallKind, ClaudeTransport};

use super::{ProviderClient, Summary, filters_from_text};

const EXTRACTION_MAX_TOKENS: u32 = 1000;
const SUMMARY_MAX_TOKENS: u32 = 1200;
const FALLBACK_SUMMARY_MAX_TOKENS: u32 = 800;
const VALIDATION_MAX_TOKENS: u32 = 10;

/// Client for the Anthropic messages API. All traffic goes through the
/// transport selector, which owns the direct-versus-relay decision.
pub struct ClaudeClient {
    transport: ClaudeTransport,
    prompts: Arc<PromptLoader>,
    config: ClaudeConfig,
}

impl ClaudeClient {
    pub fn new(transport: ClaudeTransport, prompts: Arc<PromptLoader>, config: ClaudeConfig) -> Self {
        Self {
            transport,
            prompts,
            config,
        }
    }

    fn request_body(&self, model: &str, max_tokens: u32, system: Option<&str>, user: &str) -> Value {
        let mut body = json!({
            "model": model,
            "max_tokens": max_tokens,
            "messages": [{ "role": "user", "content": user }],
        });
        if let Some(system) = system {
            body["system"] = json!(system);
        }
        body
    }

    fn reply_text(body: Value) -> Result<String> {
        let parsed: ClaudeResponse =
            serde_json::from_value(body).map_err(|e| NliError::Parse {
                provider: "Claude".to_string(),
                reason: e.to_string(),
            })?;
        parsed
            .text()
            .map(str::to_string)
            .ok_or_else(|| NliError::Parse {
                provider: "Claude".to_string(),
                reason: "response carried no text content".to_string(),
            })
    }

    fn is_credential_rejection(err: &NliError) -> bool {
        match err {
            NliError::Upstream { status, message, .. } => {
                *status == 401 || *status == 403 || message.contains("authentication_error")
            }
            _ => false,
        }
    }
}

#[async_trait]
impl ProviderClient for ClaudeClient {
    fn id(&self) -> ProviderId {
        ProviderId::Claude
    }

    async fn extract_filters(&self, api_key: &str, query: &str) -> Result<FilterSet> {
        let system = self.prompts.extraction_prompt(ProviderId::Claude)?;
        let body = self.request_body(
            &self.config.model,
            EXTRACTION_MAX_TOKENS,
            Some(&system),
            query,
        );
        let reply = self.transport.send(body, api_key, CallKind::Extraction).await?;
        let text = Self::reply_text(reply)?;
        Ok(filters_from_text(ProviderId::Claude, &text))
    }

    async fn summarize(&self, api_key: &str, query: &str, data: &Value) -> Result<Summary> {
        let prompts = self
            .prompts
            .summarization_prompts(ProviderId::Claude, query, data)?;
        let body = self.request_body(
            &self.config.model,
            SUMMARY_MAX_TOKENS,
            Some(&prompts.system),
            &prompts.user,
        );

        match self.transport.send(body, api_key, CallKind::Summary).await {
            Ok(reply) => Ok(Summary {
                markdown: Self::reply_text(reply)?,
                fallback_note: None,
            }),
            Err(err)
                if err.is_timeout() && self.config.model != self.config.fallback_model =>
            {
                // One retry on a smaller model with a tighter output budget.
                tracing::warn!(
                    "Summarization timed out on {}; retrying once with {}",
                    self.config.model,
                    self.config.fallback_model
                );
                let body = self.request_body(
                    &self.config.fallback_model,
                    FALLBACK_SUMMARY_MAX_TOKENS,
                    Some(&prompts.system),
                    &prompts.user,
                );
                let reply = self.transport.send(body, api_key, CallKind::Summary).await?;
                Ok(Summary {
                    markdown: Self::reply_text(reply)?,
                    fallback_note: Some(format!(
                        "Summary generated by the faster model ({}) because the primary model timed out.",
                        self.config.fallback_model
                    )),
                })
            }
            Err(err) => Err(err),
        }
    }

    async fn validate_key(&self, api_key: &str) -> Result<KeyValidation> {
        if api_key.is_empty() {
            return Err(NliError::MissingKey {
                provider: "Claude".to_string(),
            });
        }
        let body = self.request_body(&self.config.model, VALIDATION_MAX_TOKENS, None, "Hi");
        match self.transport.send(body, api_key, CallKind::Validation).await {
            Ok(_) => Ok(KeyValidation::ok("Claude API key is valid.")),
            Err(err) if Self::is_credential_rejection(&err) => Ok(KeyValidation::invalid(
                "Claude rejected this API key. Check the key and try again.",
            )
            .with_details(json!({ "error": err.to_string() }))),
            // Network-class failures say nothing about the key itself, so
            // they get their own message instead of a rejection.
            Err(err) if err.is_transport() => Ok(KeyValidation::invalid(
                "Could not reach the Claude API to validate the key. \
                 Check your connection or enable the proxy option.",
            )
            .with_details(json!({ "error": err.to_string() }))),
            Err(NliError::Upstream {
                status, message, ..
            }) => Ok(KeyValidation::invalid(format!(
                "Claude API returned an unexpected error ({status}): {message}"
            ))),
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::FilterField;
    use crate::session::SessionState;
    use crate::transport::{HttpPost, HttpReply};
    use std::fs;
    use std::path::PathBuf;
    use std::sync::Mutex;

    struct MockPoster {
        replies: Mutex<Vec<Result<HttpReply>>>,
        bodies: Mutex<Vec<Value>>,
    }

    impl MockPoster {
        fn new(mut replies: Vec<Result<HttpReply>>) -> Self {
            replies.reverse();
            Self {
                replies: Mutex::new(replies),
                bodies: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl HttpPost for MockPoster {
        async fn post_json(
            &self,
            _url: &str,
            _headers: &[(&str, &str)],
            body: &Value,
        ) -> Result<HttpReply> {
            self.bodies.lock().unwrap().push(body.clone());
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(NliError::Internal("no more mock replies".to_string())))
        }
    }

    fn prompt_dir(tag: &str) -> PathBuf {
        let dir =
            std::env::temp_dir().join(format!("tara-nli-claude-{tag}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        for (rel, text) in [
            ("shared/extraction-system-prompt.txt", "Extract filters."),
            ("shared/summarization-user-prompt.txt", "Q: {query}\nD: {data}"),
            (
                "claude/summarization-system-instruction.txt",
                "Summarize research.",
            ),
        ] {
            let path = dir.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, text).unwrap();
        }
        dir
    }

    fn client_with(
        replies: Vec<Result<HttpReply>>,
        tag: &str,
    ) -> (ClaudeClient, Arc<MockPoster>) {
        let config = Config::default();
        let poster = Arc::new(MockPoster::new(replies));
        let transport = ClaudeTransport::new(
            poster.clone(),
            Arc::new(SessionState::new()),
            config.claude.clone(),
            &config.hosting,
        );
        let prompts = Arc::new(PromptLoader::new(prompt_dir(tag)));
        (ClaudeClient::new(transport, prompts, config.claude), poster)
    }

    fn text_reply(text: &str) -> Result<HttpReply> {
        Ok(HttpReply {
            status: 200,
            body: json!({"content": [{"type": "text", "text": text}]}),
        })
    }

    fn timeout_error() -> Result<HttpReply> {
        Ok(HttpReply {
            status: 408,
            body: json!({"error": {"message": "Request timeout"}}),
        })
    }

    #[tokio::test]
    async fn extraction_parses_filters_from_reply() {
        let (client, poster) = client_with(
            vec![text_reply("```json\n{\"acupoint\": \"LI4\"}\n```")],
            "extract",
        );
        let set = client
            .extract_filters("sk-test", "studies on LI4")
            .await
            .unwrap();
        assert_eq!(set.get(FilterField::Acupoint), Some("LI4"));

        let bodies = poster.bodies.lock().unwrap();
        assert_eq!(bodies[0]["max_tokens"], 1000);
        assert_eq!(bodies[0]["model"], "claude-3-opus-20240229");
        assert_eq!(bodies[0]["system"], "Extract filters.");
    }

    #[tokio::test]
    async fn summary_timeout_retries_once_on_the_fallback_model() {
        let (client, poster) = client_with(
            vec![timeout_error(), text_reply("## Overview\nFindings.")],
            "fallback",
        );
        let summary = client
            .summarize("sk-test", "summarize LI4", &json!([{"title": "A"}]))
            .await
            .unwrap();

        assert_eq!(summary.markdown, "## Overview\nFindings.");
        let note = summary.fallback_note.unwrap();
        assert!(note.contains("claude-3-haiku-20240307"));

        let bodies = poster.bodies.lock().unwrap();
        assert_eq!(bodies.len(), 2);
        assert_eq!(bodies[0]["model"], "claude-3-opus-20240229");
        assert_eq!(bodies[0]["max_tokens"], 1200);
        assert_eq!(bodies[1]["model"], "claude-3-haiku-20240307");
        assert_eq!(bodies[1]["max_tokens"], 800);
    }

    #[tokio::test]
    async fn summary_non_timeout_error_is_not_retried() {
        let (client, poster) = client_with(
            vec![Ok(HttpReply {
                status: 429,
                body: json!({"error": {"message": "rate limited"}}),
            })],
            "rate",
        );
        let err = client
            .summarize("sk-test", "summarize LI4", &json!([]))
            .await
            .unwrap_err();
        assert!(matches!(err, NliError::Upstream { status: 429, .. }));
        assert_eq!(poster.bodies.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn validation_distinguishes_bad_key_from_network_failure() {
        let (client, _poster) = client_with(
            vec![Ok(HttpReply {
                status: 401,
                body: json!({"error": {"type": "authentication_error", "message": "invalid x-api-key"}}),
            })],
            "badkey",
        );
        let validation = client.validate_key("sk-bad").await.unwrap();
        assert!(!validation.valid);
        assert!(validation.message.contains("rejected"));

        let (client, _poster) = client_with(
            vec![
                Err(NliError::Transport {
                    endpoint: "e".to_string(),
                    reason: "connection refused".to_string(),
                }),
                Err(NliError::Transport {
                    endpoint: "e".to_string(),
                    reason: "connection refused".to_string(),
                }),
            ],
            "net",
        );
        let validation = client.validate_key("sk-test").await.unwrap();
        assert!(!validation.valid);
        assert!(validation.message.contains("Could not reach"));
        assert!(!validation.message.contains("rejected"));
    }

    #[tokio::test]
    async fn validation_probe_is_tiny() {
        let (client, poster) = client_with(vec![text_reply("Hello!")], "probe");
        let validation = client.validate_key("sk-test").await.unwrap();
        assert!(validation.valid);
        let bodies = poster.bodies.lock().unwrap();
        assert_eq!(bodies[0]["max_tokens"], 10);
        assert!(bodies[0].get("system").is_none());
    }
}
