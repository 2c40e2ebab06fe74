//! Agora Conversational AI Engine client.
//!
//! REST calls: `POST …/projects/{app_id}/join` to start an agent,
//! `POST …/projects/{app_id}/agents/{agent_id}/leave` to stop it, and
//! `GET …/projects/{app_id}/agents/{agent_id}/history` for the conversation
//! record. Stop and history tolerate `TaskNotFound`: an idle-timed-out agent
//! is already gone, which counts as stopped.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{AGENT_IDLE_TIMEOUT_SECS, AgoraConfig, RealtimeConfig};
use crate::error::{Error, GatewayError};

use super::{HistoryMessage, StartAgentRequest, VoiceAgentGateway};

const DEFAULT_BASE_URL: &str = "https://api.agora.io/api/conversational-ai-agent/v2";

// ── Wire types ──────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct JoinRequest<'a> {
    name: String,
    properties: JoinProperties<'a>,
}

#[derive(Debug, Serialize)]
struct JoinProperties<'a> {
    channel: &'a str,
    token: &'a str,
    agent_rtc_uid: &'a str,
    remote_rtc_uids: [&'a str; 1],
    enable_string_uid: bool,
    idle_timeout: u32,
    advanced_features: AdvancedFeatures,
    mllm: MllmProperties<'a>,
}

#[derive(Debug, Serialize)]
struct AdvancedFeatures {
    enable_mllm: bool,
}

#[derive(Debug, Serialize)]
struct MllmProperties<'a> {
    url: &'a str,
    api_key: &'a str,
    vendor: &'a str,
    style: &'a str,
    input_modalities: [&'a str; 1],
    output_modalities: [&'a str; 2],
    max_history: u32,
    greeting_message: String,
    params: MllmParams<'a>,
}

#[derive(Debug, Serialize)]
struct MllmParams<'a> {
    model: &'a str,
    voice: &'a str,
    instructions: &'a str,
    input_audio_transcription: TranscriptionParams<'a>,
}

#[derive(Debug, Serialize)]
struct TranscriptionParams<'a> {
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct JoinResponse {
    agent_id: String,
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    contents: Vec<HistoryMessage>,
}

// ── Helpers ─────────────────────────────────────────────────────────────

/// Whether a failure response means the agent task no longer exists.
///
/// The provider signals this as HTTP 404 or as a `TaskNotFound` reason or
/// detail in the error body.
fn is_task_not_found(status: u16, body: &str) -> bool {
    if status == 404 {
        return true;
    }
    if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(body) {
        let reason = parsed["reason"]
            .as_str()
            .or_else(|| parsed["error"]["reason"].as_str());
        let detail = parsed["detail"]
            .as_str()
            .or_else(|| parsed["error"]["detail"].as_str());
        return reason == Some("TaskNotFound")
            || detail.is_some_and(|d| d.contains("TaskNotFound"));
    }
    body.contains("TaskNotFound")
}

fn transport_error(operation: &str, err: reqwest::Error) -> GatewayError {
    GatewayError::Transport {
        operation: operation.to_string(),
        reason: err.to_string(),
    }
}

// ── Gateway ─────────────────────────────────────────────────────────────

/// Agora-backed implementation of [`VoiceAgentGateway`].
pub struct AgoraGateway {
    config: AgoraConfig,
    realtime: RealtimeConfig,
    client: reqwest::Client,
    base_url: String,
}

impl AgoraGateway {
    pub fn new(config: AgoraConfig, realtime: RealtimeConfig) -> Self {
        Self {
            config,
            realtime,
            client: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point the client at a different API root (tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Base64 Basic auth header from the customer id/secret pair.
    fn auth_header(&self) -> String {
        let credentials = format!(
            "{}:{}",
            self.config.customer_id,
            self.config.customer_secret.expose_secret()
        );
        format!("Basic {}", BASE64.encode(credentials))
    }

    fn project_url(&self, suffix: &str) -> String {
        format!("{}/projects/{}{}", self.base_url, self.config.app_id, suffix)
    }
}

#[async_trait]
impl VoiceAgentGateway for AgoraGateway {
    async fn start_agent(&self, request: StartAgentRequest<'_>) -> Result<String, Error> {
        self.config.validate()?;
        self.realtime.validate()?;

        let body = JoinRequest {
            name: format!("lang-tutor-{}", Utc::now().timestamp_millis()),
            properties: JoinProperties {
                channel: request.channel,
                token: request.token,
                agent_rtc_uid: "0",
                remote_rtc_uids: ["*"],
                enable_string_uid: false,
                idle_timeout: AGENT_IDLE_TIMEOUT_SECS,
                advanced_features: AdvancedFeatures { enable_mllm: true },
                mllm: MllmProperties {
                    url: &self.realtime.url,
                    api_key: self.realtime.api_key.expose_secret(),
                    vendor: "openai",
                    style: "openai",
                    input_modalities: ["audio"],
                    output_modalities: ["text", "audio"],
                    max_history: 200,
                    greeting_message: format!(
                        "Let's practice {} together.",
                        request.target_language
                    ),
                    params: MllmParams {
                        model: &self.realtime.model,
                        voice: &self.realtime.voice,
                        instructions: request.system_prompt,
                        input_audio_transcription: TranscriptionParams {
                            model: "gpt-4o-mini-transcribe",
                        },
                    },
                },
            },
        };

        let response = self
            .client
            .post(self.project_url("/join"))
            .header("Authorization", self.auth_header())
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error("start", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::RequestFailed {
                operation: "start".to_string(),
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let joined: JoinResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
        info!(agent_id = %joined.agent_id, channel = request.channel, "Agent started");
        Ok(joined.agent_id)
    }

    async fn stop_agent(&self, agent_id: &str) -> Result<(), Error> {
        let response = self
            .client
            .post(self.project_url(&format!("/agents/{agent_id}/leave")))
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| transport_error("stop", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if is_task_not_found(status.as_u16(), &body) {
                warn!(agent_id, "Agent already inactive, skipping stop");
                return Ok(());
            }
            return Err(GatewayError::RequestFailed {
                operation: "stop".to_string(),
                status: status.as_u16(),
                body,
            }
            .into());
        }

        info!(agent_id, "Agent stopped");
        Ok(())
    }

    async fn get_history(&self, agent_id: &str) -> Result<Vec<HistoryMessage>, Error> {
        let response = self
            .client
            .get(self.project_url(&format!("/agents/{agent_id}/history")))
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| transport_error("history", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if is_task_not_found(status.as_u16(), &body) {
                warn!(agent_id, "Agent history unavailable, agent already cleaned up");
                return Ok(Vec::new());
            }
            return Err(GatewayError::RequestFailed {
                operation: "history".to_string(),
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let history: HistoryResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
        info!(agent_id, messages = history.contents.len(), "Retrieved agent history");
        Ok(history.contents)
    }
}
