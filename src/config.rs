//! Configuration types and call constants.

use secrecy::{ExposeSecret, SecretString};

use crate::error::ConfigError;

/// Assessment call length shown to the client and enforced by its timer.
pub const CALL_DURATION_SECS: u64 = 3 * 60;

/// Seconds of silence after which the provider tears the agent down on its own.
pub const AGENT_IDLE_TIMEOUT_SECS: u32 = 120;

/// Skill categories the analysis scores.
pub const SKILL_CATEGORIES: [&str; 6] = [
    "Grammar",
    "Vocabulary",
    "Fluency",
    "Pronunciation",
    "Listening",
    "Confidence",
];

/// Credentials for the Agora Conversational AI Engine REST API.
#[derive(Clone)]
pub struct AgoraConfig {
    pub app_id: String,
    pub customer_id: String,
    pub customer_secret: SecretString,
    /// App certificate used to sign RTC credential tokens.
    pub app_certificate: SecretString,
    /// Optional secret for webhook signature verification.
    pub webhook_secret: Option<SecretString>,
}

impl AgoraConfig {
    /// Read from `AGORA_*` environment variables. Missing values become empty
    /// strings; `validate()` reports them before the first provider call.
    pub fn from_env() -> Self {
        Self {
            app_id: std::env::var("AGORA_APP_ID").unwrap_or_default(),
            customer_id: std::env::var("AGORA_CUSTOMER_ID").unwrap_or_default(),
            customer_secret: SecretString::from(
                std::env::var("AGORA_CUSTOMER_SECRET").unwrap_or_default(),
            ),
            app_certificate: SecretString::from(
                std::env::var("AGORA_APP_CERTIFICATE").unwrap_or_default(),
            ),
            webhook_secret: std::env::var("AGORA_WEBHOOK_SECRET")
                .ok()
                .filter(|s| !s.is_empty())
                .map(SecretString::from),
        }
    }

    /// Check that every credential needed to start an agent is present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.app_id.is_empty() {
            return Err(ConfigError::MissingEnvVar("AGORA_APP_ID".to_string()));
        }
        if self.customer_id.is_empty() {
            return Err(ConfigError::MissingEnvVar("AGORA_CUSTOMER_ID".to_string()));
        }
        if self.customer_secret.expose_secret().is_empty() {
            return Err(ConfigError::MissingEnvVar(
                "AGORA_CUSTOMER_SECRET".to_string(),
            ));
        }
        if self.app_certificate.expose_secret().is_empty() {
            return Err(ConfigError::MissingEnvVar(
                "AGORA_APP_CERTIFICATE".to_string(),
            ));
        }
        Ok(())
    }
}

/// Realtime multimodal LLM wired into the agent's join request.
#[derive(Clone)]
pub struct RealtimeConfig {
    pub url: String,
    pub api_key: SecretString,
    pub model: String,
    pub voice: String,
}

impl RealtimeConfig {
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("OPENAI_REALTIME_URL")
                .unwrap_or_else(|_| "wss://api.openai.com/v1/realtime".to_string()),
            api_key: SecretString::from(
                std::env::var("OPENAI_REALTIME_API_KEY").unwrap_or_default(),
            ),
            model: std::env::var("OPENAI_REALTIME_MODEL")
                .unwrap_or_else(|_| "gpt-realtime".to_string()),
            voice: std::env::var("OPENAI_REALTIME_VOICE").unwrap_or_else(|_| "coral".to_string()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.expose_secret().is_empty() {
            return Err(ConfigError::MissingEnvVar(
                "OPENAI_REALTIME_API_KEY".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration for the transcript-analysis LLM.
#[derive(Clone)]
pub struct AnalysisConfig {
    /// "openai" or "anthropic".
    pub backend: String,
    pub api_key: SecretString,
    pub model: String,
}

impl AnalysisConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let backend = std::env::var("ANALYSIS_BACKEND").unwrap_or_else(|_| "openai".to_string());
        let key_var = match backend.as_str() {
            "openai" => "OPENAI_API_KEY",
            "anthropic" => "ANTHROPIC_API_KEY",
            other => {
                return Err(ConfigError::InvalidValue {
                    key: "ANALYSIS_BACKEND".to_string(),
                    message: format!("unknown backend {other:?} (expected openai or anthropic)"),
                });
            }
        };
        let api_key = std::env::var(key_var)
            .map_err(|_| ConfigError::MissingEnvVar(key_var.to_string()))?;
        Ok(Self {
            backend,
            api_key: SecretString::from(api_key),
            model: std::env::var("ANALYSIS_MODEL").unwrap_or_else(|_| "gpt-5-mini".to_string()),
        })
    }
}
