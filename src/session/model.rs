//! Assessment session record and its status state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of an assessment session.
///
/// Monotonic: Active → Completed, never reversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
}

impl SessionStatus {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: SessionStatus) -> bool {
        matches!((self, target), (Self::Active, Self::Completed))
    }

    /// Whether this status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Completed => "completed",
        };
        write!(f, "{s}")
    }
}

/// One assessment attempt, from agent start to transcript finalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentSession {
    pub id: Uuid,
    /// Owning user (foreign reference; not owned by the session).
    pub user_id: String,
    /// Remote voice agent, assigned once at creation, immutable thereafter.
    pub agent_id: String,
    /// Written exactly once, at completion.
    pub transcript: Option<String>,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    /// Set only on the transition to Completed.
    pub ended_at: Option<DateTime<Utc>>,
}

impl AssessmentSession {
    /// The transcript as stored, or empty while the session is still active.
    pub fn transcript_text(&self) -> &str {
        self.transcript.as_deref().unwrap_or_default()
    }
}
