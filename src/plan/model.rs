//! Personalized learning plan — the structured output of transcript analysis.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::GenerationError;

/// CEFR proficiency tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CefrLevel {
    A1,
    A2,
    B1,
    B2,
    C1,
    C2,
}

impl std::fmt::Display for CefrLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::A1 => "A1",
            Self::A2 => "A2",
            Self::B1 => "B1",
            Self::B2 => "B2",
            Self::C1 => "C1",
            Self::C2 => "C2",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for CefrLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "A1" => Ok(Self::A1),
            "A2" => Ok(Self::A2),
            "B1" => Ok(Self::B1),
            "B2" => Ok(Self::B2),
            "C1" => Ok(Self::C1),
            "C2" => Ok(Self::C2),
            other => Err(format!("unknown CEFR level {other:?}")),
        }
    }
}

/// Direction a skill is moving relative to the previous assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillTrend {
    Improving,
    Stable,
    Declining,
}

/// Assessed level for one skill category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillLevel {
    pub category: String,
    /// 0–100.
    pub level: u8,
    pub trend: SkillTrend,
}

/// Kind of practice a learning unit targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitType {
    Grammar,
    Vocabulary,
    Conversation,
    Pronunciation,
}

/// One item of the recommended curriculum.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningUnit {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub unit_type: UnitType,
    pub difficulty: CefrLevel,
    pub estimated_minutes: u32,
}

/// The full plan generated from a transcript.
///
/// `user_id` and `generated_at` are stamped by the caller; the analysis model
/// only produces the assessment fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalizedPlan {
    #[serde(default)]
    pub user_id: String,
    pub skills: Vec<SkillLevel>,
    pub current_level: CefrLevel,
    pub next_level: CefrLevel,
    pub learning_units: Vec<LearningUnit>,
    pub coaching_tips: Vec<String>,
    pub weak_areas: Vec<String>,
    pub strengths: Vec<String>,
    #[serde(default = "Utc::now")]
    pub generated_at: DateTime<Utc>,
}

impl PersonalizedPlan {
    /// Schema conformance checks beyond what deserialization enforces.
    pub fn validate(&self) -> Result<(), GenerationError> {
        if self.skills.is_empty() {
            return Err(GenerationError::SchemaMismatch(
                "plan contains no skills".to_string(),
            ));
        }
        for skill in &self.skills {
            if skill.level > 100 {
                return Err(GenerationError::SchemaMismatch(format!(
                    "skill {} level {} is outside 0-100",
                    skill.category, skill.level
                )));
            }
        }
        if self.learning_units.is_empty() {
            return Err(GenerationError::SchemaMismatch(
                "plan contains no learning units".to_string(),
            ));
        }
        for unit in &self.learning_units {
            if unit.id.is_empty() || unit.title.is_empty() {
                return Err(GenerationError::SchemaMismatch(
                    "learning unit missing id or title".to_string(),
                ));
            }
        }
        Ok(())
    }
}
