//! Integration tests for the REST API.
//!
//! Each test spins up an Axum server on a random port with an in-memory
//! store and stub gateway/planner collaborators, then exercises the real
//! HTTP contract with reqwest.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use secrecy::SecretString;
use serde_json::{Value, json};
use sha2::Sha256;
use tokio::net::TcpListener;
use tokio::time::timeout;

use langwise::auth::AuthService;
use langwise::error::{Error, GenerationError};
use langwise::gateway::{
    HistoryMessage, HmacTokenIssuer, SpeakerRole, StartAgentRequest, TokenIssuer,
    VoiceAgentGateway,
};
use langwise::http::{AppState, api_routes};
use langwise::plan::{
    AnalysisContext, CefrLevel, LearningUnit, PersonalizedPlan, PlanGenerator, SkillLevel,
    SkillTrend, UnitType,
};
use langwise::session::SessionCoordinator;
use langwise::store::{LibSqlBackend, NewUser, Store};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

const WEBHOOK_SECRET: &str = "hook-secret";

// ── Stub collaborators ──────────────────────────────────────────────────

/// Stub gateway: fixed history, counts stop calls, no real HTTP.
#[derive(Default)]
struct StubGateway {
    stop_calls: AtomicUsize,
}

#[async_trait]
impl VoiceAgentGateway for StubGateway {
    async fn start_agent(&self, _request: StartAgentRequest<'_>) -> Result<String, Error> {
        Ok("agent-stub-1".to_string())
    }

    async fn stop_agent(&self, _agent_id: &str) -> Result<(), Error> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_history(&self, _agent_id: &str) -> Result<Vec<HistoryMessage>, Error> {
        Ok(vec![
            HistoryMessage {
                role: SpeakerRole::User,
                content: "Hola".to_string(),
            },
            HistoryMessage {
                role: SpeakerRole::Assistant,
                content: "Hi!".to_string(),
            },
        ])
    }
}

/// Stub planner: returns a fixed plan (no real API calls).
#[derive(Default)]
struct StubPlanner {
    generate_calls: AtomicUsize,
}

#[async_trait]
impl PlanGenerator for StubPlanner {
    async fn generate(
        &self,
        _ctx: AnalysisContext<'_>,
    ) -> Result<PersonalizedPlan, GenerationError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        Ok(PersonalizedPlan {
            user_id: String::new(),
            skills: vec![SkillLevel {
                category: "Grammar".to_string(),
                level: 60,
                trend: SkillTrend::Stable,
            }],
            current_level: CefrLevel::B1,
            next_level: CefrLevel::B2,
            learning_units: vec![LearningUnit {
                id: "unit-1".to_string(),
                title: "Ordering food".to_string(),
                description: "Restaurant role-play vocabulary".to_string(),
                unit_type: UnitType::Conversation,
                difficulty: CefrLevel::B1,
                estimated_minutes: 20,
            }],
            coaching_tips: vec!["Practice daily".to_string()],
            weak_areas: vec!["Listening".to_string()],
            strengths: vec!["Confidence".to_string()],
            generated_at: Utc::now(),
        })
    }
}

// ── Harness ─────────────────────────────────────────────────────────────

struct TestServer {
    base: String,
    client: reqwest::Client,
    gateway: Arc<StubGateway>,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }
}

async fn seed_user(store: &dyn Store, user_id: &str, auth_code: &str) {
    store
        .create_user(&NewUser {
            user_id: user_id.to_string(),
            name: "Demo User".to_string(),
            native_language: "English".to_string(),
            target_language: "Spanish".to_string(),
            goal: "Conversational fluency for travel".to_string(),
            bio: "Frequent traveler".to_string(),
            auth_code: auth_code.to_string(),
        })
        .await
        .unwrap();
}

/// Start a server with two seeded users (demo/code-1, alex/code-2).
async fn start_server(with_webhook_secret: bool) -> TestServer {
    let store: Arc<dyn Store> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    seed_user(store.as_ref(), "demo", "code-1").await;
    seed_user(store.as_ref(), "alex", "code-2").await;

    let gateway = Arc::new(StubGateway::default());
    let gateway_dyn: Arc<dyn VoiceAgentGateway> = gateway.clone();
    let planner: Arc<dyn PlanGenerator> = Arc::new(StubPlanner::default());

    let coordinator = Arc::new(SessionCoordinator::new(
        Arc::clone(&store),
        Arc::clone(&gateway_dyn),
        planner,
    ));
    let auth = Arc::new(AuthService::new(Arc::clone(&store)));
    let token_issuer: Arc<dyn TokenIssuer> = Arc::new(HmacTokenIssuer::new(
        "test-app",
        SecretString::from("test-cert"),
    ));

    let state = AppState {
        coordinator,
        store,
        gateway: gateway_dyn,
        auth,
        token_issuer,
        webhook_secret: with_webhook_secret.then(|| SecretString::from(WEBHOOK_SECRET)),
    };
    let app = api_routes(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    TestServer {
        base: format!("http://127.0.0.1:{port}"),
        client: reqwest::Client::new(),
        gateway,
    }
}

async fn login(server: &TestServer, user_id: &str, auth_code: &str) -> String {
    let response = server
        .client
        .post(server.url("/api/auth/login"))
        .json(&json!({ "userId": user_id, "authCode": auth_code }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    body["token"].as_str().unwrap().to_string()
}

/// Login, start an agent, return (token, session_id).
async fn start_assessment(server: &TestServer) -> (String, String) {
    let token = login(server, "demo", "code-1").await;
    let response = server
        .client
        .post(server.url("/api/agent/start"))
        .bearer_auth(&token)
        .json(&json!({ "userId": "demo", "channelName": "lesson-demo" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["agentId"], "agent-stub-1");
    let session_id = body["sessionId"].as_str().unwrap().to_string();
    (token, session_id)
}

// ── Health ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn health_endpoint_responds() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(false).await;
        let response = server.client.get(server.url("/health")).send().await.unwrap();
        assert_eq!(response.status(), 200);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["status"], "ok");
    })
    .await
    .expect("test timed out");
}

// ── Login ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn login_returns_token_and_profile() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(false).await;
        let response = server
            .client
            .post(server.url("/api/auth/login"))
            .json(&json!({ "userId": "demo", "authCode": "code-1" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["user"]["userId"], "demo");
        assert_eq!(body["user"]["hasLearningPlan"], false);
        assert!(body["token"].as_str().unwrap().len() == 64);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn login_rejects_bad_credentials_and_missing_fields() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(false).await;

        let response = server
            .client
            .post(server.url("/api/auth/login"))
            .json(&json!({ "userId": "demo", "authCode": "wrong" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 401);

        let response = server
            .client
            .post(server.url("/api/auth/login"))
            .json(&json!({ "userId": "demo" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400);

        let response = server
            .client
            .post(server.url("/api/auth/login"))
            .json(&json!({ "userId": "ghost", "authCode": "code-1" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 404);
    })
    .await
    .expect("test timed out");
}

// ── Start / stop ────────────────────────────────────────────────────────

#[tokio::test]
async fn start_requires_auth() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(false).await;
        let response = server
            .client
            .post(server.url("/api/agent/start"))
            .json(&json!({ "userId": "demo", "channelName": "lesson-demo" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 401);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn duplicate_stop_returns_same_transcript_with_one_provider_call() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(false).await;
        let (token, session_id) = start_assessment(&server).await;

        let stop = |client: reqwest::Client, url: String, token: String, session_id: String| async move {
            client
                .post(url)
                .bearer_auth(token)
                .json(&json!({ "sessionId": session_id, "agentId": "agent-stub-1" }))
                .send()
                .await
                .unwrap()
                .json::<Value>()
                .await
                .unwrap()
        };

        let first = stop(
            server.client.clone(),
            server.url("/api/agent/stop"),
            token.clone(),
            session_id.clone(),
        )
        .await;
        let second = stop(
            server.client.clone(),
            server.url("/api/agent/stop"),
            token,
            session_id,
        )
        .await;

        assert_eq!(first["status"], "finalized");
        assert_eq!(first["transcript"], "User: Hola\nAgent: Hi!");
        assert_eq!(first["transcriptLength"], "User: Hola\nAgent: Hi!".len() as u64);

        assert_eq!(second["status"], "already_completed");
        assert_eq!(second["transcript"], first["transcript"]);

        assert_eq!(server.gateway.stop_calls.load(Ordering::SeqCst), 1);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn stop_validates_session_id() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(false).await;
        let token = login(&server, "demo", "code-1").await;

        let response = server
            .client
            .post(server.url("/api/agent/stop"))
            .bearer_auth(&token)
            .json(&json!({ "sessionId": "not-a-uuid", "agentId": "agent-stub-1" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400);

        let response = server
            .client
            .post(server.url("/api/agent/stop"))
            .bearer_auth(&token)
            .json(&json!({
                "sessionId": "00000000-0000-4000-8000-000000000000",
                "agentId": "agent-stub-1"
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 404);
        assert_eq!(server.gateway.stop_calls.load(Ordering::SeqCst), 0);
    })
    .await
    .expect("test timed out");
}

// ── Analyze / plan ──────────────────────────────────────────────────────

#[tokio::test]
async fn analyze_before_stop_conflicts() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(false).await;
        let (token, session_id) = start_assessment(&server).await;

        let response = server
            .client
            .post(server.url("/api/analyze"))
            .bearer_auth(&token)
            .json(&json!({ "sessionId": session_id }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 409);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn analyze_foreign_session_is_forbidden() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(false).await;
        let (token, session_id) = start_assessment(&server).await;

        // Complete the session so only ownership can fail the call.
        server
            .client
            .post(server.url("/api/agent/stop"))
            .bearer_auth(&token)
            .json(&json!({ "sessionId": session_id, "agentId": "agent-stub-1" }))
            .send()
            .await
            .unwrap();

        let intruder_token = login(&server, "alex", "code-2").await;
        let response = server
            .client
            .post(server.url("/api/analyze"))
            .bearer_auth(&intruder_token)
            .json(&json!({ "sessionId": session_id }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 403);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn end_to_end_assessment_flow() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(false).await;
        let (token, session_id) = start_assessment(&server).await;

        // Stop: transcript comes back formatted.
        let stop: Value = server
            .client
            .post(server.url("/api/agent/stop"))
            .bearer_auth(&token)
            .json(&json!({ "sessionId": session_id, "agentId": "agent-stub-1" }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(stop["transcript"], "User: Hola\nAgent: Hi!");

        // Analyze: plan is generated and stamped with the user.
        let analyze: Value = server
            .client
            .post(server.url("/api/analyze"))
            .bearer_auth(&token)
            .json(&json!({ "sessionId": session_id }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(analyze["plan"]["userId"], "demo");

        // The plan is retrievable as the user's most recent plan.
        let plan: Value = server
            .client
            .get(server.url("/api/plan"))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(plan["plan"]["userId"], "demo");
        assert_eq!(plan["plan"]["currentLevel"], "B1");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn plan_is_404_before_any_analysis() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(false).await;
        let token = login(&server, "demo", "code-1").await;
        let response = server
            .client
            .get(server.url("/api/plan"))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 404);
    })
    .await
    .expect("test timed out");
}

// ── Webhook ─────────────────────────────────────────────────────────────

fn sign_webhook(body: &str, timestamp: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(WEBHOOK_SECRET.as_bytes()).unwrap();
    mac.update(body.as_bytes());
    mac.update(timestamp.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

#[tokio::test]
async fn webhook_rejects_bad_signature() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(true).await;
        let body = json!({ "eventType": "agent_disconnect" }).to_string();

        let response = server
            .client
            .post(server.url("/api/agent/webhook"))
            .header("x-agora-signature", "deadbeef")
            .header("x-agora-timestamp", "1700000000")
            .body(body)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 401);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn signed_webhook_finalizes_session() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(true).await;
        let (_token, session_id) = start_assessment(&server).await;

        let body = json!({
            "eventType": "agent_disconnect",
            "agentId": "agent-stub-1",
            "sessionId": session_id,
        })
        .to_string();
        let timestamp = "1700000000";

        let response = server
            .client
            .post(server.url("/api/agent/webhook"))
            .header("x-agora-signature", sign_webhook(&body, timestamp))
            .header("x-agora-timestamp", timestamp)
            .body(body)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let payload: Value = response.json().await.unwrap();
        assert_eq!(payload["status"], "finalized");
        assert_eq!(server.gateway.stop_calls.load(Ordering::SeqCst), 1);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn unsecured_webhook_is_one_more_idempotent_stop_trigger() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(false).await;
        let (token, session_id) = start_assessment(&server).await;

        // Client stop wins first.
        server
            .client
            .post(server.url("/api/agent/stop"))
            .bearer_auth(&token)
            .json(&json!({ "sessionId": session_id, "agentId": "agent-stub-1" }))
            .send()
            .await
            .unwrap();

        // Late webhook delivery is a no-op duplicate, not an error.
        let response = server
            .client
            .post(server.url("/api/agent/webhook"))
            .body(
                json!({
                    "eventType": "agent_text_message",
                    "agentId": "agent-stub-1",
                    "sessionId": session_id,
                })
                .to_string(),
            )
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let payload: Value = response.json().await.unwrap();
        assert_eq!(payload["status"], "already_completed");
        assert_eq!(server.gateway.stop_calls.load(Ordering::SeqCst), 1);
    })
    .await
    .expect("test timed out");
}
