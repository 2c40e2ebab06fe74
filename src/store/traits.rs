//! Unified `Store` trait — single async interface for all persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StorageError;
use crate::plan::PersonalizedPlan;
use crate::session::{AssessmentSession, SessionStatus};

/// A registered learner.
#[derive(Debug, Clone)]
pub struct UserProfile {
    pub id: Uuid,
    /// Login key, unique across users.
    pub user_id: String,
    pub name: String,
    pub native_language: String,
    pub target_language: String,
    pub goal: String,
    pub bio: String,
    /// Login credential compared at `/api/auth/login`.
    pub auth_code: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields needed to register a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub user_id: String,
    pub name: String,
    pub native_language: String,
    pub target_language: String,
    pub goal: String,
    pub bio: String,
    pub auth_code: String,
}

/// A standalone transcript row, written alongside session completion.
#[derive(Debug, Clone)]
pub struct TranscriptRecord {
    pub id: Uuid,
    pub user_id: String,
    pub agent_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Backend-agnostic persistence for users, sessions, transcripts, and plans.
#[async_trait]
pub trait Store: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), StorageError>;

    // ── Users ───────────────────────────────────────────────────────

    /// Register a user. Fails on a duplicate `user_id`.
    async fn create_user(&self, user: &NewUser) -> Result<UserProfile, StorageError>;

    /// Look up a user by login key.
    async fn get_user(&self, user_id: &str) -> Result<Option<UserProfile>, StorageError>;

    // ── Sessions ────────────────────────────────────────────────────

    /// Create an assessment session with status [`SessionStatus::Active`].
    async fn create_session(
        &self,
        user_id: &str,
        agent_id: &str,
    ) -> Result<AssessmentSession, StorageError>;

    /// Get a session by id.
    async fn get_session(&self, id: Uuid) -> Result<Option<AssessmentSession>, StorageError>;

    /// Conditionally finalize a session: write transcript, `ended_at`, and
    /// status=completed only where the status is still active.
    ///
    /// Returns whether THIS call performed the transition. A `false` return
    /// means another writer completed the session first and its transcript
    /// stands — the durable at-most-once guarantee, valid across processes.
    async fn complete_session_if_active(
        &self,
        id: Uuid,
        transcript: &str,
        ended_at: DateTime<Utc>,
    ) -> Result<bool, StorageError>;

    // ── Transcripts ─────────────────────────────────────────────────

    /// Record a transcript as a standalone row.
    async fn insert_transcript(
        &self,
        user_id: &str,
        agent_id: &str,
        content: &str,
    ) -> Result<TranscriptRecord, StorageError>;

    // ── Plans ───────────────────────────────────────────────────────

    /// Persist a plan version for `plan.user_id`.
    async fn save_plan(&self, plan: &PersonalizedPlan) -> Result<(), StorageError>;

    /// Fetch the most recently generated plan for a user.
    async fn latest_plan_for_user(
        &self,
        user_id: &str,
    ) -> Result<Option<PersonalizedPlan>, StorageError>;
}

/// Serialize a session status for storage.
pub(crate) fn status_to_str(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Active => "active",
        SessionStatus::Completed => "completed",
    }
}

/// Parse a status string from the DB.
pub(crate) fn str_to_status(s: &str) -> SessionStatus {
    match s {
        "completed" => SessionStatus::Completed,
        _ => SessionStatus::Active,
    }
}
