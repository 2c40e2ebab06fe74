//! Personalized learning plans — model, prompt, and LLM-backed generation.

pub mod generator;
pub mod model;
pub mod prompts;

pub use generator::{PlanGenerator, RigPlanGenerator, create_generator, parse_plan};
pub use model::{CefrLevel, LearningUnit, PersonalizedPlan, SkillLevel, SkillTrend, UnitType};
pub use prompts::{AnalysisContext, analysis_prompt};
