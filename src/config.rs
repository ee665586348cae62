use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

/// Main configuration structure for the NLI core and the relay binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub claude: ClaudeConfig,
    pub gemini: GeminiConfig,
    pub hosting: HostingConfig,
    pub relay: RelayConfig,
    pub prompts: PromptConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeConfig {
    pub endpoint: String,
    pub api_version: String,
    pub model: String,
    /// Fast model used for the timeout fallback and the fast-summary relay.
    pub fallback_model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    pub endpoint: String,
    pub model: String,
}

/// Where the front end is being served from. The relay path convention and
/// the forced-proxy rule both depend on this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostingConfig {
    pub environment: String,
    /// Origin prepended to the hosted relay paths (empty for same-origin).
    pub relay_base: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    pub bind: String,
    pub path: String,
    pub summary_path: String,
    pub timeout_seconds: u64,
    pub summary_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    pub dir: String,
}

impl Config {
    /// Load configuration from file with environment variable overrides.
    /// Always returns a valid config; a broken file falls back to defaults.
    pub fn load() -> Self {
        if dotenvy::dotenv().is_err() {
            tracing::debug!("No .env file found - continuing with process env only");
        }

        let config_path = env::var("NLI_CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());

        let mut config = if Path::new(&config_path).exists() {
            match fs::read_to_string(&config_path) {
                Ok(contents) => match serde_yaml::from_str::<Config>(&contents) {
                    Ok(config) => {
                        tracing::info!("Loaded configuration from {}", config_path);
                        config
                    }
                    Err(e) => {
                        tracing::error!(
                            "Failed to parse config file {}: {} - using defaults",
                            config_path,
                            e
                        );
                        Self::default()
                    }
                },
                Err(e) => {
                    tracing::error!(
                        "Failed to read config file {}: {} - using defaults",
                        config_path,
                        e
                    );
                    Self::default()
                }
            }
        } else {
            tracing::warn!("Config file not found at {} - using defaults", config_path);
            Self::default()
        };

        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(bind) = env::var("NLI_RELAY_BIND") {
            self.relay.bind = bind;
        }
        if let Ok(environment) = env::var("NLI_ENVIRONMENT") {
            self.hosting.environment = environment;
        }
        if let Ok(base) = env::var("NLI_RELAY_BASE") {
            self.hosting.relay_base = base;
        }
        if let Ok(dir) = env::var("NLI_PROMPTS_DIR") {
            self.prompts.dir = dir;
        }
        if let Ok(model) = env::var("NLI_CLAUDE_MODEL") {
            self.claude.model = model;
        }
        if let Ok(model) = env::var("NLI_GEMINI_MODEL") {
            self.gemini.model = model;
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            claude: ClaudeConfig {
                endpoint: "https://api.anthropic.com/v1/messages".to_string(),
                api_version: "2023-06-01".to_string(),
                model: "claude-3-opus-20240229".to_string(),
                fallback_model: "claude-3-haiku-20240307".to_string(),
            },
            gemini: GeminiConfig {
                endpoint: "https://generativelanguage.googleapis.com/v1beta/models".to_string(),
                model: "gemini-2.0-flash".to_string(),
            },
            hosting: HostingConfig {
                environment: "local".to_string(),
                // Hosted environments use same-origin relay paths (empty base).
                relay_base: "http://localhost:3000".to_string(),
            },
            relay: RelayConfig {
                bind: "127.0.0.1:3000".to_string(),
                path: "/proxy/claude".to_string(),
                summary_path: "/proxy/claude-summary".to_string(),
                timeout_seconds: 25,
                summary_timeout_seconds: 15,
            },
            prompts: PromptConfig {
                dir: "prompts".to_string(),
            },
        }
    }
}
