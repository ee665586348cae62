use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{ClaudeConfig, HostingConfig};
use crate::error::{NliError, Result};
use crate::session::SessionState;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Hosting context the front end runs under. Each target has its own relay
/// path convention, and Firebase hosting cannot reach the Claude API
/// directly at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Local,
    Netlify,
    Firebase,
}

impl Environment {
    /// Unknown names are treated as local development.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "netlify" => Environment::Netlify,
            "firebase" => Environment::Firebase,
            _ => Environment::Local,
        }
    }

    /// Environments that must always go through the relay, regardless of the
    /// user-configurable proxy toggle.
    pub fn forces_proxy(&self) -> bool {
        matches!(self, Environment::Firebase)
    }

    fn relay_path(&self, kind: CallKind) -> &'static str {
        match (self, kind) {
            (Environment::Netlify, CallKind::Summary) => "/.netlify/functions/claude-summary",
            (Environment::Netlify, _) => "/.netlify/functions/claude-proxy",
            (Environment::Firebase, _) => "/claudeProxy",
            (Environment::Local, CallKind::Summary) => "/proxy/claude-summary",
            (Environment::Local, _) => "/proxy/claude",
        }
    }
}

/// What the call is for. Summarization gets the dedicated fast relay route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Extraction,
    Summary,
    Validation,
}

/// Per-call routing decision. Recomputed on every call, never cached.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportDecision {
    pub use_proxy: bool,
    pub endpoint: String,
    pub environment: Environment,
}

/// Raw HTTP reply: whatever status the other side produced plus its JSON
/// body. Only failures to reach the endpoint at all become `Err`.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: u16,
    pub body: Value,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The mockable HTTP seam every network call goes through.
#[async_trait]
pub trait HttpPost: Send + Sync {
    async fn post_json(&self, url: &str, headers: &[(&str, &str)], body: &Value)
    -> Result<HttpReply>;
}

pub struct ReqwestPoster {
    client: Client,
}

impl ReqwestPoster {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| NliError::Internal(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpPost for ReqwestPoster {
    async fn post_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &Value,
    ) -> Result<HttpReply> {
        let mut request = self.client.post(url).json(body);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let response = request.send().await.map_err(|e| {
            let reason = if e.is_timeout() {
                format!("request timeout: {e}")
            } else {
                e.to_string()
            };
            NliError::Transport {
                endpoint: url.to_string(),
                reason,
            }
        })?;

        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        let body = serde_json::from_str(&text).unwrap_or_else(|_| json!({ "raw": text }));
        Ok(HttpReply { status, body })
    }
}

/// Routes Claude requests either straight to the API or through the
/// same-origin relay, escalating to the relay at most once per call when a
/// direct attempt fails with a transport-class error. Gemini never needs
/// this: its API permits browser-side CORS, so the Gemini client posts
/// directly through `HttpPost`.
pub struct ClaudeTransport {
    http: Arc<dyn HttpPost>,
    session: Arc<SessionState>,
    claude: ClaudeConfig,
    environment: Environment,
    relay_base: String,
}

impl ClaudeTransport {
    pub fn new(
        http: Arc<dyn HttpPost>,
        session: Arc<SessionState>,
        claude: ClaudeConfig,
        hosting: &HostingConfig,
    ) -> Self {
        Self {
            http,
            session,
            claude,
            environment: Environment::parse(&hosting.environment),
            relay_base: hosting.relay_base.trim_end_matches('/').to_string(),
        }
    }

    /// Compute the routing for one call from the current environment and the
    /// session's proxy preference.
    pub fn decide(&self, kind: CallKind) -> TransportDecision {
        let use_proxy = self.environment.forces_proxy() || self.session.proxy_enabled();
        let endpoint = if use_proxy {
            format!("{}{}", self.relay_base, self.environment.relay_path(kind))
        } else {
            self.claude.endpoint.clone()
        };
        TransportDecision {
            use_proxy,
            endpoint,
            environment: self.environment,
        }
    }

    fn relay_endpoint(&self, kind: CallKind) -> String {
        format!("{}{}", self.relay_base, self.environment.relay_path(kind))
    }

    async fn post_direct(&self, body: &Value, api_key: &str) -> Result<HttpReply> {
        self.http
            .post_json(
                &self.claude.endpoint,
                &[
                    ("content-type", "application/json"),
                    ("x-api-key", api_key),
                    ("anthropic-version", &self.claude.api_version),
                ],
                body,
            )
            .await
    }

    /// The relay receives the provider body with the secret and protocol
    /// version embedded; it strips both before forwarding.
    async fn post_relay(&self, body: &Value, api_key: &str, kind: CallKind) -> Result<HttpReply> {
        let mut relay_body = body.clone();
        if let Some(obj) = relay_body.as_object_mut() {
            obj.insert("apiKey".to_string(), json!(api_key));
            obj.insert("apiVersion".to_string(), json!(self.claude.api_version));
        }
        let endpoint = self.relay_endpoint(kind);
        self.http
            .post_json(
                &endpoint,
                &[("content-type", "application/json")],
                &relay_body,
            )
            .await
    }

    fn upstream_error(reply: HttpReply) -> NliError {
        let message = reply
            .body
            .pointer("/error/message")
            .and_then(|m| m.as_str())
            .or_else(|| reply.body.get("message").and_then(|m| m.as_str()))
            .or_else(|| reply.body.get("error").and_then(|m| m.as_str()))
            .unwrap_or("request failed")
            .to_string();
        NliError::Upstream {
            provider: "Claude".to_string(),
            status: reply.status,
            message,
        }
    }

    /// Send one request body. Direct first when direct is permitted; on a
    /// transport-class failure, enable the proxy preference and retry once
    /// through the relay. The escalation never loops.
    pub async fn send(&self, body: Value, api_key: &str, kind: CallKind) -> Result<Value> {
        let decision = self.decide(kind);
        tracing::debug!(
            use_proxy = decision.use_proxy,
            endpoint = %decision.endpoint,
            "Claude transport decision"
        );

        if decision.use_proxy {
            let reply = self.post_relay(&body, api_key, kind).await?;
            return if reply.is_success() {
                Ok(reply.body)
            } else {
                Err(Self::upstream_error(reply))
            };
        }

        let direct = self.post_direct(&body, api_key).await;
        let transport_failure = match &direct {
            Err(e) => e.is_transport(),
            Ok(reply) => reply.status == 520,
        };

        if !transport_failure {
            let reply = direct?;
            return if reply.is_success() {
                Ok(reply.body)
            } else {
                Err(Self::upstream_error(reply))
            };
        }

        tracing::warn!("Direct Claude call failed at the transport level, retrying via relay");
        self.session.set_proxy_enabled(true);

        let reply = self.post_relay(&body, api_key, kind).await?;
        if reply.is_success() {
            Ok(reply.body)
        } else {
            Err(Self::upstream_error(reply))
        }
    }
}
