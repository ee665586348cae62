use std::collections::HashMap;
use std::sync::RwLock;

use crate::models::ProviderId;

/// Per-session mutable state: API keys, the selected provider, and the proxy
/// preference. One instance is shared (`Arc`) by the facade, the clients, and
/// the transport selector, replacing the page-global variables of a browser
/// deployment so that tests can run independent simulated sessions.
///
/// Keys live only as long as the session object. They are read at call time
/// and sent to nothing but the provider endpoint or the relay.
pub struct SessionState {
    keys: RwLock<HashMap<ProviderId, String>>,
    provider: RwLock<ProviderId>,
    proxy_enabled: RwLock<bool>,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
            provider: RwLock::new(ProviderId::default()),
            proxy_enabled: RwLock::new(false),
        }
    }

    /// Restore a saved provider preference. Unknown names are ignored and the
    /// default stands.
    pub fn with_saved_provider(self, saved: Option<&str>) -> Self {
        if let Some(name) = saved {
            if let Some(provider) = ProviderId::parse(name) {
                *self.provider.write().expect("session lock poisoned") = provider;
            } else {
                tracing::warn!("Ignoring unknown saved provider preference: {}", name);
            }
        }
        self
    }

    /// Store a key for `provider`. Empty secrets are rejected. No format
    /// validation happens here; that is the provider client's concern.
    pub fn set_key(&self, provider: ProviderId, secret: &str) -> bool {
        if secret.is_empty() {
            return false;
        }
        self.keys
            .write()
            .expect("session lock poisoned")
            .insert(provider, secret.to_string());
        true
    }

    pub fn has_key(&self, provider: ProviderId) -> bool {
        self.keys
            .read()
            .expect("session lock poisoned")
            .contains_key(&provider)
    }

    pub fn get_key(&self, provider: ProviderId) -> Option<String> {
        self.keys
            .read()
            .expect("session lock poisoned")
            .get(&provider)
            .cloned()
    }

    pub fn current_provider(&self) -> ProviderId {
        *self.provider.read().expect("session lock poisoned")
    }

    /// Switch providers. Unknown names leave the selection unchanged and
    /// return false.
    pub fn select_provider(&self, name: &str) -> bool {
        match ProviderId::parse(name) {
            Some(provider) => {
                *self.provider.write().expect("session lock poisoned") = provider;
                true
            }
            None => false,
        }
    }

    pub fn proxy_enabled(&self) -> bool {
        *self.proxy_enabled.read().expect("session lock poisoned")
    }

    /// Written on explicit user action, or once by the transport selector
    /// when a direct call fails with a transport-class error.
    pub fn set_proxy_enabled(&self, enabled: bool) {
        *self.proxy_enabled.write().expect("session lock poisoned") = enabled;
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_key_rejects_empty_secret() {
        let session = SessionState::new();
        assert!(!session.set_key(ProviderId::Claude, ""));
        assert!(!session.has_key(ProviderId::Claude));

        assert!(session.set_key(ProviderId::Claude, "sk-test"));
        assert!(session.has_key(ProviderId::Claude));
        assert_eq!(session.get_key(ProviderId::Claude).as_deref(), Some("sk-test"));
        assert!(!session.has_key(ProviderId::Gemini));
    }

    #[test]
    fn select_rejects_unknown_and_keeps_current() {
        let session = SessionState::new();
        assert_eq!(session.current_provider(), ProviderId::Claude);

        assert!(session.select_provider("gemini"));
        assert_eq!(session.current_provider(), ProviderId::Gemini);

        assert!(!session.select_provider("gpt-4"));
        assert_eq!(session.current_provider(), ProviderId::Gemini);
    }

    #[test]
    fn saved_preference_falls_back_to_default_on_unknown() {
        let session = SessionState::new().with_saved_provider(Some("mistral"));
        assert_eq!(session.current_provider(), ProviderId::Claude);

        let session = SessionState::new().with_saved_provider(Some("gemini"));
        assert_eq!(session.current_provider(), ProviderId::Gemini);
    }

    #[test]
    fn proxy_flag_defaults_off() {
        let session = SessionState::new();
        assert!(!session.proxy_enabled());
        session.set_proxy_enabled(true);
        assert!(session.proxy_enabled());
    }
}
