//! SessionCoordinator — mediates every assessment session transition from
//! creation through completion.
//!
//! Stop requests arrive from several independent triggers around the same
//! moment: the client countdown expiring, the user ending early, component
//! teardown on navigation, and the provider webhook. All of them funnel into
//! the one idempotent `request_stop`, which makes the external stop call and
//! the completion write single-flight per process (stop lock) and
//! at-most-once across processes (conditional completion write).

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result, SessionError, StorageError};
use crate::gateway::{HistoryMessage, SpeakerRole, VoiceAgentGateway};
use crate::plan::{AnalysisContext, PersonalizedPlan, PlanGenerator};
use crate::store::Store;

use super::lock::{StopAttempt, StopLockMap};
use super::model::{AssessmentSession, SessionStatus};

/// How a stop request was resolved. All three are success: a client renders
/// the same feedback regardless of which trigger won the race.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopDisposition {
    /// This call finalized the session.
    Finalized,
    /// The session was already completed; the stored transcript is returned.
    AlreadyCompleted,
    /// Another caller's stop is in flight; no further action was taken.
    AlreadyInProgress,
}

impl StopDisposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Finalized => "finalized",
            Self::AlreadyCompleted => "already_completed",
            Self::AlreadyInProgress => "already_in_progress",
        }
    }
}

/// Result of a stop request.
#[derive(Debug, Clone)]
pub struct StopOutcome {
    pub transcript: String,
    pub transcript_len: usize,
    pub disposition: StopDisposition,
}

impl StopOutcome {
    fn new(transcript: String, disposition: StopDisposition) -> Self {
        Self {
            transcript_len: transcript.len(),
            transcript,
            disposition,
        }
    }
}

/// Render history as speaker-labeled lines: `Agent:` for assistant turns,
/// `User:` for everything else, joined with newlines.
pub fn format_transcript(history: &[HistoryMessage]) -> String {
    history
        .iter()
        .map(|msg| {
            let speaker = match msg.role {
                SpeakerRole::Assistant => "Agent",
                SpeakerRole::User => "User",
            };
            format!("{speaker}: {}", msg.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Coordinates assessment session lifecycles.
pub struct SessionCoordinator {
    store: Arc<dyn Store>,
    gateway: Arc<dyn VoiceAgentGateway>,
    planner: Arc<dyn PlanGenerator>,
    locks: StopLockMap,
}

impl SessionCoordinator {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn VoiceAgentGateway>,
        planner: Arc<dyn PlanGenerator>,
    ) -> Self {
        Self {
            store,
            gateway,
            planner,
            locks: StopLockMap::new(),
        }
    }

    /// Create a session for an agent the gateway just started.
    pub async fn create(&self, user_id: &str, agent_id: &str) -> Result<AssessmentSession> {
        let session = self.store.create_session(user_id, agent_id).await?;
        info!(
            session_id = %session.id,
            user_id,
            agent_id,
            "Assessment session created"
        );
        Ok(session)
    }

    /// Idempotently stop the agent and finalize the session.
    ///
    /// Safe to call from any number of triggers, concurrently or repeatedly.
    /// The external stop call and the completion write each happen at most
    /// once per session.
    pub async fn request_stop(&self, session_id: Uuid, agent_id: &str) -> Result<StopOutcome> {
        let session = self
            .store
            .get_session(session_id)
            .await?
            .ok_or(SessionError::NotFound { id: session_id })?;

        if session.status == SessionStatus::Completed {
            debug!(%session_id, "Stop requested for completed session, returning stored transcript");
            self.locks.clear(session_id).await;
            return Ok(StopOutcome::new(
                session.transcript_text().to_string(),
                StopDisposition::AlreadyCompleted,
            ));
        }

        if session.agent_id != agent_id {
            warn!(
                %session_id,
                stored = %session.agent_id,
                requested = agent_id,
                "Stop requested with mismatched agent id"
            );
        }

        match self.locks.begin(session_id).await {
            StopAttempt::Acquired => {}
            StopAttempt::AlreadyStopping | StopAttempt::AlreadyStopped => {
                debug!(%session_id, "Stop already in flight, taking no action");
                return Ok(StopOutcome::new(
                    session.transcript_text().to_string(),
                    StopDisposition::AlreadyInProgress,
                ));
            }
        }

        // Losing the transcript is preferable to leaving the agent running
        // and the session stuck in active.
        let history = match self.gateway.get_history(agent_id).await {
            Ok(history) => history,
            Err(e) => {
                warn!(%session_id, agent_id, error = %e, "History retrieval failed, continuing with empty transcript");
                Vec::new()
            }
        };
        let transcript = format_transcript(&history);

        if let Err(e) = self.gateway.stop_agent(agent_id).await {
            // The gateway already treats a vanished agent as stopped, so this
            // is a real provider failure. Release the lock so a retry can run
            // the whole stop again.
            self.locks.release(session_id).await;
            return Err(e);
        }

        let completed = match self
            .store
            .complete_session_if_active(session_id, &transcript, Utc::now())
            .await
        {
            Ok(completed) => completed,
            Err(e) => {
                self.locks.release(session_id).await;
                return Err(e.into());
            }
        };

        if !completed {
            // Another process won the conditional write; its transcript stands.
            info!(%session_id, "Completion race lost to another writer");
            self.locks.finish(session_id).await;
            let stored = self
                .store
                .get_session(session_id)
                .await?
                .map(|s| s.transcript_text().to_string())
                .unwrap_or_default();
            return Ok(StopOutcome::new(stored, StopDisposition::AlreadyCompleted));
        }

        if let Err(e) = self
            .store
            .insert_transcript(&session.user_id, &session.agent_id, &transcript)
            .await
        {
            // The session itself is already durable.
            warn!(%session_id, error = %e, "Failed to record standalone transcript");
        }

        self.locks.finish(session_id).await;
        info!(
            %session_id,
            agent_id,
            transcript_len = transcript.len(),
            "Assessment session finalized"
        );
        Ok(StopOutcome::new(transcript, StopDisposition::Finalized))
    }

    /// Generate and persist a plan from a completed session's transcript.
    ///
    /// Re-running on the same transcript simply produces a new plan version;
    /// the transcript is stable once the session is completed, so no locking
    /// is needed here.
    pub async fn analyze(
        &self,
        requesting_user_id: &str,
        session_id: Uuid,
    ) -> Result<PersonalizedPlan> {
        let session = self
            .store
            .get_session(session_id)
            .await?
            .ok_or(SessionError::NotFound { id: session_id })?;

        if session.user_id != requesting_user_id {
            return Err(SessionError::Forbidden {
                id: session_id,
                user_id: requesting_user_id.to_string(),
            }
            .into());
        }

        let transcript = session.transcript_text();
        if transcript.is_empty() {
            return Err(SessionError::TranscriptNotReady { id: session_id }.into());
        }

        let user = self
            .store
            .get_user(&session.user_id)
            .await?
            .ok_or_else(|| {
                Error::from(StorageError::NotFound {
                    entity: "user".to_string(),
                    id: session.user_id.clone(),
                })
            })?;

        let previous = self.store.latest_plan_for_user(&user.user_id).await?;

        let mut plan = self
            .planner
            .generate(AnalysisContext {
                transcript,
                native_language: &user.native_language,
                target_language: &user.target_language,
                goal: &user.goal,
                previous_plan: previous.as_ref(),
            })
            .await?;

        plan.user_id = user.user_id.clone();
        self.store.save_plan(&plan).await?;
        info!(%session_id, user_id = %user.user_id, "Plan generated and saved");
        Ok(plan)
    }
}
