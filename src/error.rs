use thiserror::Error;

pub type Result<T> = std::result::Result<T, NliError>;

/// Error taxonomy for the NLI core.
///
/// `Transport` covers network/CORS-class failures that are eligible for the
/// one-shot proxy escalation; `Upstream` is a non-2xx answer from the provider
/// itself and is never retried (except the single timeout fallback for
/// summarization, which is handled inside the Claude client).
#[derive(Debug, Error)]
pub enum NliError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to load prompt resource '{path}': {reason}")]
    Prompt { path: String, reason: String },

    #[error("{provider} API key is required")]
    MissingKey { provider: String },

    #[error("Network error reaching {endpoint}: {reason}")]
    Transport { endpoint: String, reason: String },

    #[error("{provider} API error ({status}): {message}")]
    Upstream {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("Invalid response from {provider} API: {reason}")]
    Parse { provider: String, reason: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl NliError {
    /// Transport-class failures trigger the automatic proxy retry; everything
    /// else surfaces as-is.
    pub fn is_transport(&self) -> bool {
        // Status 520 is how a fronting CDN reports an opaque origin failure,
        // observed in practice alongside genuine CORS/network errors.
        match self {
            NliError::Transport { .. } => true,
            NliError::Upstream { status, .. } => *status == 520,
            _ => false,
        }
    }

    /// Timeout-class failures are eligible for the fast-model summarization
    /// fallback.
    pub fn is_timeout(&self) -> bool {
        match self {
            NliError::Transport { reason, .. } => reason.to_lowercase().contains("timeout"),
            NliError::Upstream { status, .. } => *status == 408 || *status == 504,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_class_includes_status_520() {
        let err = NliError::Upstream {
            provider: "Claude".to_string(),
            status: 520,
            message: "origin error".to_string(),
        };
        assert!(err.is_transport());

        let err = NliError::Upstream {
            provider: "Claude".to_string(),
            status: 401,
            message: "auth".to_string(),
        };
        assert!(!err.is_transport());
    }

    #[test]
    fn timeout_class_covers_408_504_and_client_timeouts() {
        assert!(
            NliError::Upstream {
                provider: "Claude".to_string(),
                status: 408,
                message: "timeout".to_string(),
            }
            .is_timeout()
        );
        assert!(
            NliError::Transport {
                endpoint: "x".to_string(),
                reason: "request timeout".to_string(),
            }
            .is_timeout()
        );
        assert!(
            !NliError::Upstream {
                provider: "Claude".to_string(),
                status: 500,
                message: "boom".to_string(),
            }
            .is_timeout()
        );
    }
}
