//! Voice agent gateway — starts and stops the remote conversational agent
//! and retrieves its conversation history.

pub mod agora;
pub mod token;

pub use agora::AgoraGateway;
pub use token::{HmacTokenIssuer, TokenIssuer};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Who produced a history turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeakerRole {
    User,
    Assistant,
}

/// One turn of the recorded conversation, in history order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: SpeakerRole,
    pub content: String,
}

/// Inputs for starting an agent on a call channel.
#[derive(Debug, Clone)]
pub struct StartAgentRequest<'a> {
    pub channel: &'a str,
    /// RTC credential token for the channel.
    pub token: &'a str,
    pub system_prompt: &'a str,
    pub native_language: &'a str,
    pub target_language: &'a str,
}

/// Gateway to the third-party conversational voice agent provider.
#[async_trait]
pub trait VoiceAgentGateway: Send + Sync {
    /// Start an agent on the channel. Returns the provider's agent id.
    ///
    /// Fails with `ConfigError` when provider credentials are missing and
    /// `GatewayError` on a non-success HTTP response.
    async fn start_agent(&self, request: StartAgentRequest<'_>) -> Result<String, Error>;

    /// Stop a running agent. A "resource already gone" response is success:
    /// the agent may have self-terminated on idle timeout before the explicit
    /// stop arrived.
    async fn stop_agent(&self, agent_id: &str) -> Result<(), Error>;

    /// Fetch the agent's conversation history, oldest first. Returns the
    /// empty list when the agent resource is already gone.
    async fn get_history(&self, agent_id: &str) -> Result<Vec<HistoryMessage>, Error>;
}
