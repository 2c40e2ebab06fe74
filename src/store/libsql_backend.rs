//! libSQL backend — async `Store` trait implementation.
//!
//! Supports local file and in-memory databases. Datetimes are stored as
//! RFC 3339 text; plan collections are stored as JSON columns.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::info;
use uuid::Uuid;

use crate::error::StorageError;
use crate::plan::PersonalizedPlan;
use crate::session::{AssessmentSession, SessionStatus};
use crate::store::migrations;
use crate::store::traits::{NewUser, Store, TranscriptRecord, UserProfile, status_to_str, str_to_status};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StorageError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| StorageError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, StorageError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| StorageError::Pool(format!("Failed to create in-memory database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| StorageError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn parse_optional_datetime(s: &Option<String>) -> Option<DateTime<Utc>> {
    s.as_ref().map(|s| parse_datetime(s))
}

fn json_column<T: serde::Serialize>(value: &T) -> Result<String, StorageError> {
    serde_json::to_string(value).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn parse_json_column<T: serde::de::DeserializeOwned>(
    column: &str,
    raw: &str,
) -> Result<T, StorageError> {
    serde_json::from_str(raw)
        .map_err(|e| StorageError::Serialization(format!("bad {column} column: {e}")))
}

/// Map a libsql Row to an AssessmentSession.
///
/// Column order: 0:id, 1:user_id, 2:agent_id, 3:transcript, 4:status,
/// 5:started_at, 6:ended_at
fn row_to_session(row: &libsql::Row) -> Result<AssessmentSession, StorageError> {
    let id_str: String = row.get(0).map_err(|e| StorageError::Query(e.to_string()))?;
    let status_str: String = row.get(4).map_err(|e| StorageError::Query(e.to_string()))?;
    let started_str: String = row.get(5).map_err(|e| StorageError::Query(e.to_string()))?;
    let ended_str: Option<String> = row.get(6).ok();

    Ok(AssessmentSession {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
        user_id: row.get(1).map_err(|e| StorageError::Query(e.to_string()))?,
        agent_id: row.get(2).map_err(|e| StorageError::Query(e.to_string()))?,
        transcript: row.get(3).ok(),
        status: str_to_status(&status_str),
        started_at: parse_datetime(&started_str),
        ended_at: parse_optional_datetime(&ended_str),
    })
}

/// Map a libsql Row to a UserProfile.
///
/// Column order: 0:id, 1:user_id, 2:name, 3:native_language,
/// 4:target_language, 5:goal, 6:bio, 7:auth_code, 8:created_at, 9:updated_at
fn row_to_user(row: &libsql::Row) -> Result<UserProfile, StorageError> {
    let id_str: String = row.get(0).map_err(|e| StorageError::Query(e.to_string()))?;
    let created_str: String = row.get(8).map_err(|e| StorageError::Query(e.to_string()))?;
    let updated_str: String = row.get(9).map_err(|e| StorageError::Query(e.to_string()))?;

    Ok(UserProfile {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
        user_id: row.get(1).map_err(|e| StorageError::Query(e.to_string()))?,
        name: row.get(2).map_err(|e| StorageError::Query(e.to_string()))?,
        native_language: row.get(3).map_err(|e| StorageError::Query(e.to_string()))?,
        target_language: row.get(4).map_err(|e| StorageError::Query(e.to_string()))?,
        goal: row.get(5).map_err(|e| StorageError::Query(e.to_string()))?,
        bio: row.get(6).map_err(|e| StorageError::Query(e.to_string()))?,
        auth_code: row.get(7).map_err(|e| StorageError::Query(e.to_string()))?,
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

/// Map a libsql Row to a PersonalizedPlan.
///
/// Column order: 0:user_id, 1:skills, 2:current_level, 3:next_level,
/// 4:learning_units, 5:coaching_tips, 6:weak_areas, 7:strengths,
/// 8:generated_at
fn row_to_plan(row: &libsql::Row) -> Result<PersonalizedPlan, StorageError> {
    let skills_str: String = row.get(1).map_err(|e| StorageError::Query(e.to_string()))?;
    let current_str: String = row.get(2).map_err(|e| StorageError::Query(e.to_string()))?;
    let next_str: String = row.get(3).map_err(|e| StorageError::Query(e.to_string()))?;
    let units_str: String = row.get(4).map_err(|e| StorageError::Query(e.to_string()))?;
    let tips_str: String = row.get(5).map_err(|e| StorageError::Query(e.to_string()))?;
    let weak_str: String = row.get(6).map_err(|e| StorageError::Query(e.to_string()))?;
    let strengths_str: String = row.get(7).map_err(|e| StorageError::Query(e.to_string()))?;
    let generated_str: String = row.get(8).map_err(|e| StorageError::Query(e.to_string()))?;

    Ok(PersonalizedPlan {
        user_id: row.get(0).map_err(|e| StorageError::Query(e.to_string()))?,
        skills: parse_json_column("skills", &skills_str)?,
        current_level: current_str
            .parse()
            .map_err(StorageError::Serialization)?,
        next_level: next_str.parse().map_err(StorageError::Serialization)?,
        learning_units: parse_json_column("learning_units", &units_str)?,
        coaching_tips: parse_json_column("coaching_tips", &tips_str)?,
        weak_areas: parse_json_column("weak_areas", &weak_str)?,
        strengths: parse_json_column("strengths", &strengths_str)?,
        generated_at: parse_datetime(&generated_str),
    })
}

// ── Store implementation ────────────────────────────────────────────

#[async_trait]
impl Store for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), StorageError> {
        migrations::run_migrations(self.conn()).await
    }

    async fn create_user(&self, user: &NewUser) -> Result<UserProfile, StorageError> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        self.conn()
            .execute(
                "INSERT INTO users (id, user_id, name, native_language, target_language,
                                    goal, bio, auth_code, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    id.to_string(),
                    user.user_id.clone(),
                    user.name.clone(),
                    user.native_language.clone(),
                    user.target_language.clone(),
                    user.goal.clone(),
                    user.bio.clone(),
                    user.auth_code.clone(),
                    now.to_rfc3339(),
                    now.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| StorageError::Query(format!("Failed to create user: {e}")))?;

        Ok(UserProfile {
            id,
            user_id: user.user_id.clone(),
            name: user.name.clone(),
            native_language: user.native_language.clone(),
            target_language: user.target_language.clone(),
            goal: user.goal.clone(),
            bio: user.bio.clone(),
            auth_code: user.auth_code.clone(),
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<UserProfile>, StorageError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, user_id, name, native_language, target_language,
                        goal, bio, auth_code, created_at, updated_at
                 FROM users WHERE user_id = ?1",
                params![user_id],
            )
            .await
            .map_err(|e| StorageError::Query(format!("Failed to get user: {e}")))?;

        match rows
            .next()
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?
        {
            Some(row) => Ok(Some(row_to_user(&row)?)),
            None => Ok(None),
        }
    }

    async fn create_session(
        &self,
        user_id: &str,
        agent_id: &str,
    ) -> Result<AssessmentSession, StorageError> {
        let id = Uuid::new_v4();
        let started_at = Utc::now();
        self.conn()
            .execute(
                "INSERT INTO assessment_sessions (id, user_id, agent_id, status, started_at)
                 VALUES (?1, ?2, ?3, 'active', ?4)",
                params![
                    id.to_string(),
                    user_id,
                    agent_id,
                    started_at.to_rfc3339()
                ],
            )
            .await
            .map_err(|e| StorageError::Query(format!("Failed to create session: {e}")))?;

        Ok(AssessmentSession {
            id,
            user_id: user_id.to_string(),
            agent_id: agent_id.to_string(),
            transcript: None,
            status: SessionStatus::Active,
            started_at,
            ended_at: None,
        })
    }

    async fn get_session(&self, id: Uuid) -> Result<Option<AssessmentSession>, StorageError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, user_id, agent_id, transcript, status, started_at, ended_at
                 FROM assessment_sessions WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(|e| StorageError::Query(format!("Failed to get session: {e}")))?;

        match rows
            .next()
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?
        {
            Some(row) => Ok(Some(row_to_session(&row)?)),
            None => Ok(None),
        }
    }

    async fn complete_session_if_active(
        &self,
        id: Uuid,
        transcript: &str,
        ended_at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let changed = self
            .conn()
            .execute(
                &format!(
                    "UPDATE assessment_sessions
                     SET transcript = ?1, ended_at = ?2, status = '{}'
                     WHERE id = ?3 AND status = '{}'",
                    status_to_str(SessionStatus::Completed),
                    status_to_str(SessionStatus::Active),
                ),
                params![transcript, ended_at.to_rfc3339(), id.to_string()],
            )
            .await
            .map_err(|e| StorageError::Query(format!("Failed to complete session: {e}")))?;

        Ok(changed > 0)
    }

    async fn insert_transcript(
        &self,
        user_id: &str,
        agent_id: &str,
        content: &str,
    ) -> Result<TranscriptRecord, StorageError> {
        let id = Uuid::new_v4();
        let created_at = Utc::now();
        self.conn()
            .execute(
                "INSERT INTO transcripts (id, user_id, agent_id, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    id.to_string(),
                    user_id,
                    agent_id,
                    content,
                    created_at.to_rfc3339()
                ],
            )
            .await
            .map_err(|e| StorageError::Query(format!("Failed to create transcript: {e}")))?;

        Ok(TranscriptRecord {
            id,
            user_id: user_id.to_string(),
            agent_id: agent_id.to_string(),
            content: content.to_string(),
            created_at,
        })
    }

    async fn save_plan(&self, plan: &PersonalizedPlan) -> Result<(), StorageError> {
        self.conn()
            .execute(
                "INSERT INTO personalized_plans (id, user_id, skills, current_level, next_level,
                                                 learning_units, coaching_tips, weak_areas,
                                                 strengths, generated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    Uuid::new_v4().to_string(),
                    plan.user_id.clone(),
                    json_column(&plan.skills)?,
                    plan.current_level.to_string(),
                    plan.next_level.to_string(),
                    json_column(&plan.learning_units)?,
                    json_column(&plan.coaching_tips)?,
                    json_column(&plan.weak_areas)?,
                    json_column(&plan.strengths)?,
                    plan.generated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| StorageError::Query(format!("Failed to save plan: {e}")))?;
        Ok(())
    }

    async fn latest_plan_for_user(
        &self,
        user_id: &str,
    ) -> Result<Option<PersonalizedPlan>, StorageError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT user_id, skills, current_level, next_level, learning_units,
                        coaching_tips, weak_areas, strengths, generated_at
                 FROM personalized_plans
                 WHERE user_id = ?1
                 ORDER BY generated_at DESC
                 LIMIT 1",
                params![user_id],
            )
            .await
            .map_err(|e| StorageError::Query(format!("Failed to get plan: {e}")))?;

        match rows
            .next()
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?
        {
            Some(row) => Ok(Some(row_to_plan(&row)?)),
            None => Ok(None),
        }
    }
}
