use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{NliError, Result};
use crate::models::{FilterSet, KeyValidation, ProviderId};
use crate::prompts::PromptLoader;
use crate::providers::{ClaudeClient, GeminiClient, ProviderClient, Summary};
use crate::session::SessionState;
use crate::transport::{ClaudeTransport, HttpPost, ReqwestPoster};

/// Facade over the provider clients. Callers talk to "the current provider";
/// this resolves which client that is and fetches its key from the session,
/// so provider switching is one call and key handling stays in one place.
pub struct NliService {
    session: Arc<SessionState>,
    clients: HashMap<ProviderId, Arc<dyn ProviderClient>>,
}

impl NliService {
    /// Wire up the real HTTP stack from configuration.
    pub fn new(config: &Config, session: Arc<SessionState>) -> Result<Self> {
        let http: Arc<dyn HttpPost> = Arc::new(ReqwestPoster::new()?);
        let prompts = Arc::new(PromptLoader::new(&config.prompts.dir));

        let claude_transport = ClaudeTransport::new(
            http.clone(),
            session.clone(),
            config.claude.clone(),
            &config.hosting,
        );
        let claude = ClaudeClient::new(claude_transport, prompts.clone(), config.claude.clone());
        let gemini = GeminiClient::new(http, prompts, config.gemini.clone());

        Ok(Self::with_clients(
            session,
            vec![Arc::new(claude), Arc::new(gemini)],
        ))
    }

    /// Assemble from pre-built clients. Tests inject mocks here.
    pub fn with_clients(
        session: Arc<SessionState>,
        clients: Vec<Arc<dyn ProviderClient>>,
    ) -> Self {
        let clients = clients.into_iter().map(|c| (c.id(), c)).collect();
        Self { session, clients }
    }

    pub fn session(&self) -> &Arc<SessionState> {
        &self.session
    }

    pub fn current_provider(&self) -> ProviderId {
        self.session.current_provider()
    }

    /// Switch the active provider by name. Unknown names are rejected and the
    /// current selection stands.
    pub fn select_provider(&self, name: &str) -> bool {
        let switched = self.session.select_provider(name);
        if switched {
            tracing::info!("Switched provider to {}", name);
        }
        switched
    }

    pub fn set_key(&self, provider: ProviderId, secret: &str) -> bool {
        self.session.set_key(provider, secret)
    }

    /// The current provider has a stored key and can serve requests.
    pub fn is_ready(&self) -> bool {
        self.session.has_key(self.current_provider())
    }

    fn current_client(&self) -> Result<(&Arc<dyn ProviderClient>, String)> {
        let provider = self.current_provider();
        let client = self
            .clients
            .get(&provider)
            .ok_or_else(|| NliError::Internal(format!("No client registered for {provider:?}")))?;
        let key = self
            .session
            .get_key(provider)
            .ok_or_else(|| NliError::MissingKey {
                provider: provider.display_name().to_string(),
            })?;
        Ok((client, key))
    }

    pub async fn extract_filters(&self, query: &str) -> Result<FilterSet> {
        let (client, key) = self.current_client()?;
        client.extract_filters(&key, query).await
    }

    pub async fn summarize(&self, query: &str, data: &Value) -> Result<Summary> {
        let (client, key) = self.current_client()?;
        client.summarize(&key, query, data).await
    }

    pub async fn validate_current_key(&self) -> Result<KeyValidation> {
        let (client, key) = self.current_client()?;
        client.validate_key(&key).await
    }
}
