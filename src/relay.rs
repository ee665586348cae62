use async_trait::async_trait;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Request, State},
    http::{HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use reqwest::Client;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::{NliError, Result};
use crate::models::{RelayError, RelayHealth};
use crate::transport::HttpReply;

/// Summary requests forced through the relay run on the fast model with a
/// tight output budget so they finish inside serverless time limits.
const FAST_SUMMARY_MAX_TOKENS: u64 = 800;

/// The hop from the relay to the Claude API. A trait so tests can exercise
/// the full HTTP surface without the network.
#[async_trait]
pub trait RelayUpstream: Send + Sync {
    async fn forward(
        &self,
        body: Value,
        api_key: &str,
        api_version: &str,
        timeout: Duration,
    ) -> Result<HttpReply>;
}

pub struct AnthropicUpstream {
    client: Client,
    endpoint: String,
}

impl AnthropicUpstream {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| NliError::Internal(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl RelayUpstream for AnthropicUpstream {
    async fn forward(
        &self,
        body: Value,
        api_key: &str,
        api_version: &str,
        timeout: Duration,
    ) -> Result<HttpReply> {
        let response = self
            .client
            .post(&self.endpoint)
            .timeout(timeout)
            .header("content-type", "application/json")
            .header("x-api-key", api_key)
            .header("anthropic-version", api_version)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                let reason = if e.is_timeout() {
                    format!("request timeout: {e}")
                } else {
                    e.to_string()
                };
                NliError::Transport {
                    endpoint: self.endpoint.clone(),
                    reason,
                }
            })?;

        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        let body = serde_json::from_str(&text).unwrap_or_else(|_| json!({ "raw": text }));
        Ok(HttpReply { status, body })
    }
}

#[derive(Clone)]
pub struct RelayState {
    upstream: Arc<dyn RelayUpstream>,
    api_version: String,
    fast_model: String,
    timeout: Duration,
    summary_timeout: Duration,
}

impl RelayState {
    pub fn new(upstream: Arc<dyn RelayUpstream>, config: &Config) -> Self {
        Self {
            upstream,
            api_version: config.claude.api_version.clone(),
            fast_model: config.claude.fallback_model.clone(),
            timeout: Duration::from_secs(config.relay.timeout_seconds),
            summary_timeout: Duration::from_secs(config.relay.summary_timeout_seconds),
        }
    }
}

/// Build the relay router. Paths come from configuration so the same binary
/// serves the local-development convention and the hosted ones.
pub fn router(config: &Config, upstream: Arc<dyn RelayUpstream>) -> Router {
    let state = RelayState::new(upstream, config);
    Router::new()
        .route(
            &config.relay.path,
            post(proxy_main).get(health).options(preflight),
        )
        .route(
            &config.relay.summary_path,
            post(proxy_summary).get(health).options(preflight),
        )
        .route("/health", get(health))
        .layer(middleware::from_fn(cors))
        .with_state(state)
}

/// Every relay response is CORS-open: the whole point of the relay is
/// serving browsers the upstream refuses.
async fn cors(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "access-control-allow-origin",
        HeaderValue::from_static("*"),
    );
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static("Content-Type, x-api-key, anthropic-version"),
    );
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("POST, GET, OPTIONS"),
    );
    response
}

async fn preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn health() -> Json<RelayHealth> {
    Json(RelayHealth {
        status: "ok".to_string(),
        message: "Claude relay is running".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

fn bad_request(error: &str, message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(RelayError {
            error: error.to_string(),
            message: message.to_string(),
            details: None,
        }),
    )
        .into_response()
}

/// Parse the body by hand so a syntax error still gets the structured
/// `RelayError` shape instead of an extractor's plain-text rejection.
fn parse_body(bytes: &Bytes) -> std::result::Result<Value, Response> {
    serde_json::from_slice(bytes)
        .map_err(|e| bad_request("Invalid request", &format!("Request body is not valid JSON: {e}")))
}

async fn proxy_main(State(state): State<RelayState>, bytes: Bytes) -> Response {
    let timeout = state.timeout;
    match parse_body(&bytes) {
        Ok(body) => relay(state, body, timeout, false).await,
        Err(rejection) => rejection,
    }
}

async fn proxy_summary(State(state): State<RelayState>, bytes: Bytes) -> Response {
    let timeout = state.summary_timeout;
    match parse_body(&bytes) {
        Ok(body) => relay(state, body, timeout, true).await,
        Err(rejection) => rejection,
    }
}

async fn relay(state: RelayState, mut body: Value, timeout: Duration, fast: bool) -> Response {
    let Some(obj) = body.as_object_mut() else {
        return bad_request("Invalid request", "Request body must be a JSON object");
    };

    // The client embeds its credential in the body; it must never reach the
    // upstream payload.
    let api_key = obj
        .remove("apiKey")
        .and_then(|v| v.as_str().map(str::to_string))
        .filter(|k| !k.is_empty());
    let api_version = obj
        .remove("apiVersion")
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| state.api_version.clone());

    let Some(api_key) = api_key else {
        return bad_request(
            "API key is required",
            "Include your Claude API key in the request body as apiKey",
        );
    };

    if obj.get("model").and_then(Value::as_str).is_none() {
        return bad_request("Invalid request", "Request body must include a model");
    }
    if !obj.get("messages").map(Value::is_array).unwrap_or(false) {
        return bad_request("Invalid request", "Request body must include messages");
    }

    if fast {
        obj.insert("model".to_string(), json!(state.fast_model));
        let capped = obj
            .get("max_tokens")
            .and_then(Value::as_u64)
            .map(|t| t.min(FAST_SUMMARY_MAX_TOKENS))
            .unwrap_or(FAST_SUMMARY_MAX_TOKENS);
        obj.insert("max_tokens".to_string(), json!(capped));
    }

    match state
        .upstream
        .forward(body, &api_key, &api_version, timeout)
        .await
    {
        // Whatever the upstream said, status and body, verbatim.
        Ok(reply) => match StatusCode::from_u16(reply.status) {
            Ok(status) => (status, Json(reply.body)).into_response(),
            Err(_) => (
                StatusCode::BAD_GATEWAY,
                Json(RelayError {
                    error: "Upstream error".to_string(),
                    message: format!("Upstream returned unusable status {}", reply.status),
                    details: None,
                }),
            )
                .into_response(),
        },
        Err(err) if err.is_timeout() => {
            tracing::warn!("Upstream request timed out after {:?}", timeout);
            (
                StatusCode::REQUEST_TIMEOUT,
                Json(RelayError {
                    error: "Request timeout".to_string(),
                    message: format!(
                        "The Claude API did not answer within {} seconds. Try a shorter request.",
                        timeout.as_secs()
                    ),
                    details: None,
                }),
            )
                .into_response()
        }
        Err(NliError::Transport { endpoint, reason }) => {
            tracing::error!("Upstream unreachable at {}: {}", endpoint, reason);
            (
                StatusCode::GATEWAY_TIMEOUT,
                Json(RelayError {
                    error: "Upstream unreachable".to_string(),
                    message: "Could not reach the Claude API".to_string(),
                    details: Some(reason),
                }),
            )
                .into_response()
        }
        Err(err) => {
            tracing::error!("Relay internal error: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(RelayError {
                    error: "Internal server error".to_string(),
                    message: err.to_string(),
                    details: None,
                }),
            )
                .into_response()
        }
    }
}
