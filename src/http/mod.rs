//! REST endpoints — thin adapters from HTTP JSON to coordinator and
//! collaborator calls.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::Sha256;
use tracing::{error, warn};
use uuid::Uuid;

use crate::auth::AuthService;
use crate::error::{Error, SessionError, StorageError};
use crate::gateway::{StartAgentRequest, TokenIssuer, VoiceAgentGateway};
use crate::session::{SessionCoordinator, tutor_system_prompt};
use crate::store::Store;

type HmacSha256 = Hmac<Sha256>;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<SessionCoordinator>,
    pub store: Arc<dyn Store>,
    pub gateway: Arc<dyn VoiceAgentGateway>,
    pub auth: Arc<AuthService>,
    pub token_issuer: Arc<dyn TokenIssuer>,
    /// When set, webhook deliveries must carry a valid HMAC signature.
    pub webhook_secret: Option<SecretString>,
}

/// Build the Axum router with all REST routes.
pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/auth/login", post(login))
        .route("/api/agent/token", post(issue_token))
        .route("/api/agent/start", post(start_agent))
        .route("/api/agent/stop", post(stop_agent))
        .route("/api/agent/webhook", post(webhook))
        .route("/api/analyze", post(analyze))
        .route("/api/plan", get(get_plan))
        .with_state(state)
}

// ── Error mapping ───────────────────────────────────────────────────────

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::Session(SessionError::NotFound { .. }) => StatusCode::NOT_FOUND,
            Error::Session(SessionError::Forbidden { .. }) => StatusCode::FORBIDDEN,
            Error::Session(SessionError::TranscriptNotReady { .. }) => StatusCode::CONFLICT,
            Error::Storage(StorageError::NotFound { .. }) => StatusCode::NOT_FOUND,
            Error::Auth(_) => StatusCode::UNAUTHORIZED,
            Error::Config(_) | Error::Gateway(_) | Error::Generation(_) | Error::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self, "Request failed");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}

// ── Auth helpers ────────────────────────────────────────────────────────

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Resolve the caller's user id from the Authorization header.
async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<String, Response> {
    let Some(token) = bearer_token(headers) else {
        return Err(unauthorized("Missing bearer token"));
    };
    state
        .auth
        .validate(token)
        .await
        .ok_or_else(|| unauthorized("Invalid or expired token"))
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "langwise"
    }))
}

// ── Login ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest {
    user_id: Option<String>,
    auth_code: Option<String>,
}

/// POST /api/auth/login
async fn login(State(state): State<AppState>, Json(body): Json<LoginRequest>) -> Response {
    let (Some(user_id), Some(auth_code)) = (body.user_id, body.auth_code) else {
        return bad_request("Missing userId or authCode");
    };

    let session = match state.auth.login(&user_id, &auth_code).await {
        Ok(session) => session,
        Err(e) => return e.into_response(),
    };

    let has_learning_plan = match state.store.latest_plan_for_user(&user_id).await {
        Ok(plan) => plan.is_some(),
        Err(e) => return Error::from(e).into_response(),
    };

    Json(serde_json::json!({
        "success": true,
        "user": {
            "id": session.user.id,
            "userId": session.user.user_id,
            "name": session.user.name,
            "nativeLanguage": session.user.native_language,
            "targetLanguage": session.user.target_language,
            "hasLearningPlan": has_learning_plan,
        },
        "token": session.token,
        "expiresAt": session.expires_at.to_rfc3339(),
    }))
    .into_response()
}

// ── RTC token ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct TokenRequest {
    channel: Option<String>,
    uid: Option<u32>,
}

/// POST /api/agent/token
async fn issue_token(State(state): State<AppState>, Json(body): Json<TokenRequest>) -> Response {
    let Some(channel) = body.channel else {
        return bad_request("Missing channel");
    };
    match state.token_issuer.issue(&channel, body.uid.unwrap_or(0)) {
        Ok(token) => Json(serde_json::json!({ "token": token })).into_response(),
        Err(e) => Error::from(e).into_response(),
    }
}

// ── Start ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartRequest {
    user_id: Option<String>,
    channel_name: Option<String>,
}

/// POST /api/agent/start
///
/// Issues a channel token, starts the voice agent with the tutor prompt
/// built from the user's profile, and creates the assessment session.
async fn start_agent(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<StartRequest>,
) -> Response {
    let auth_user = match authenticate(&state, &headers).await {
        Ok(user) => user,
        Err(response) => return response,
    };

    let (Some(user_id), Some(channel_name)) = (body.user_id, body.channel_name) else {
        return bad_request("Missing required parameters");
    };
    if user_id != auth_user {
        return (
            StatusCode::FORBIDDEN,
            Json(serde_json::json!({ "error": "Session user does not match token" })),
        )
            .into_response();
    }

    let user = match state.store.get_user(&user_id).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            return Error::from(StorageError::NotFound {
                entity: "user".to_string(),
                id: user_id,
            })
            .into_response();
        }
        Err(e) => return Error::from(e).into_response(),
    };

    let token = match state.token_issuer.issue(&channel_name, 0) {
        Ok(token) => token,
        Err(e) => return Error::from(e).into_response(),
    };

    let system_prompt = tutor_system_prompt(
        &user.native_language,
        &user.target_language,
        &user.goal,
        &user.bio,
    );

    let agent_id = match state
        .gateway
        .start_agent(StartAgentRequest {
            channel: &channel_name,
            token: &token,
            system_prompt: &system_prompt,
            native_language: &user.native_language,
            target_language: &user.target_language,
        })
        .await
    {
        Ok(agent_id) => agent_id,
        Err(e) => return e.into_response(),
    };

    match state.coordinator.create(&user_id, &agent_id).await {
        Ok(session) => Json(serde_json::json!({
            "success": true,
            "agentId": agent_id,
            "sessionId": session.id,
            "callDurationSecs": crate::config::CALL_DURATION_SECS,
        }))
        .into_response(),
        Err(e) => e.into_response(),
    }
}

// ── Stop ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StopRequest {
    session_id: Option<String>,
    agent_id: Option<String>,
}

/// POST /api/agent/stop
///
/// Idempotent: duplicate and concurrent calls all get the same success
/// shape, with `status` distinguishing who actually finalized.
async fn stop_agent(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<StopRequest>,
) -> Response {
    if authenticate(&state, &headers).await.is_err() {
        return unauthorized("Invalid or expired token");
    }

    let (Some(session_id), Some(agent_id)) = (body.session_id, body.agent_id) else {
        return bad_request("Missing sessionId or agentId");
    };
    let Ok(session_id) = Uuid::parse_str(&session_id) else {
        return bad_request("Invalid sessionId");
    };

    match state.coordinator.request_stop(session_id, &agent_id).await {
        Ok(outcome) => Json(serde_json::json!({
            "success": true,
            "transcript": outcome.transcript,
            "transcriptLength": outcome.transcript_len,
            "status": outcome.disposition.as_str(),
        }))
        .into_response(),
        Err(e) => e.into_response(),
    }
}

// ── Webhook ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebhookPayload {
    event_type: Option<String>,
    agent_id: Option<String>,
    session_id: Option<String>,
}

/// Verify `x-agora-signature` against HMAC-SHA256(secret, body || timestamp).
fn verify_webhook_signature(secret: &SecretString, headers: &HeaderMap, body: &str) -> bool {
    let signature = headers
        .get("x-agora-signature")
        .and_then(|v| v.to_str().ok());
    let timestamp = headers
        .get("x-agora-timestamp")
        .and_then(|v| v.to_str().ok());
    let (Some(signature), Some(timestamp)) = (signature, timestamp) else {
        warn!("Missing webhook signature headers");
        return false;
    };

    let mut mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(body.as_bytes());
    mac.update(timestamp.as_bytes());
    hex::encode(mac.finalize().into_bytes()) == signature
}

/// POST /api/agent/webhook
///
/// Provider events are just one more stop trigger; a transcript or
/// disconnect event funnels into the same idempotent stop as every other
/// caller.
async fn webhook(State(state): State<AppState>, headers: HeaderMap, body: String) -> Response {
    if let Some(secret) = &state.webhook_secret {
        if !verify_webhook_signature(secret, &headers, &body) {
            warn!("Invalid webhook signature");
            return unauthorized("Invalid signature");
        }
    }

    let payload: WebhookPayload = match serde_json::from_str(&body) {
        Ok(payload) => payload,
        Err(_) => return bad_request("Invalid webhook payload"),
    };

    let is_stop_event = matches!(
        payload.event_type.as_deref(),
        Some("agent_text_message") | Some("agent_disconnect")
    );
    let session_id = payload
        .session_id
        .as_deref()
        .and_then(|s| Uuid::parse_str(s).ok());

    if let (true, Some(session_id), Some(agent_id)) = (is_stop_event, session_id, payload.agent_id)
    {
        return match state.coordinator.request_stop(session_id, &agent_id).await {
            Ok(outcome) => Json(serde_json::json!({
                "success": true,
                "status": outcome.disposition.as_str(),
            }))
            .into_response(),
            Err(e) => e.into_response(),
        };
    }

    Json(serde_json::json!({
        "success": true,
        "message": "Event acknowledged",
    }))
    .into_response()
}

// ── Analyze ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeRequest {
    session_id: Option<String>,
}

/// POST /api/analyze
async fn analyze(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<AnalyzeRequest>,
) -> Response {
    let auth_user = match authenticate(&state, &headers).await {
        Ok(user) => user,
        Err(response) => return response,
    };

    let Some(session_id) = body.session_id else {
        return bad_request("Missing sessionId");
    };
    let Ok(session_id) = Uuid::parse_str(&session_id) else {
        return bad_request("Invalid sessionId");
    };

    match state.coordinator.analyze(&auth_user, session_id).await {
        Ok(plan) => Json(serde_json::json!({
            "success": true,
            "plan": plan,
        }))
        .into_response(),
        Err(e) => e.into_response(),
    }
}

// ── Plan ────────────────────────────────────────────────────────────────

/// GET /api/plan
async fn get_plan(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let auth_user = match authenticate(&state, &headers).await {
        Ok(user) => user,
        Err(response) => return response,
    };

    match state.store.latest_plan_for_user(&auth_user).await {
        Ok(Some(plan)) => Json(serde_json::json!({
            "success": true,
            "plan": plan,
        }))
        .into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "No plan found for this user" })),
        )
            .into_response(),
        Err(e) => Error::from(e).into_response(),
    }
}
