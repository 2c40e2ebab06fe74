//! Prompt construction for transcript analysis.

use crate::config::SKILL_CATEGORIES;

use super::model::PersonalizedPlan;

/// Inputs the analysis prompt is built from.
pub struct AnalysisContext<'a> {
    pub transcript: &'a str,
    pub native_language: &'a str,
    pub target_language: &'a str,
    pub goal: &'a str,
    pub previous_plan: Option<&'a PersonalizedPlan>,
}

/// Build the analysis prompt. The model must answer with a single JSON
/// object matching the plan schema, no commentary.
pub fn analysis_prompt(ctx: &AnalysisContext<'_>) -> String {
    let previous = match ctx.previous_plan {
        Some(plan) => format!(
            "Previous Personalized Plan (for trend comparison): {}",
            serde_json::to_string(plan).unwrap_or_default()
        ),
        None => r#"No previous plan. All skill trends should default to "stable"."#.to_string(),
    };

    format!(
        r#"You are an expert in language assessment and personalized curriculum design.

Your job:
Given a conversation transcript and user context, produce a JSON object that STRICTLY follows the plan schema below.
You MUST return valid JSON only with no commentary.

-----------------------
### User Data
Native Language: {native}
Target Language: {target}
Learning Goal: {goal}

{previous}

-----------------------
### Transcript
{transcript}

-----------------------
### Your Tasks
1. Analyze the transcript to evaluate the user's overall language performance.
2. Identify strengths and weak areas based on real conversational evidence.
3. Produce skill levels (0-100) for: {categories}.
4. Determine CEFR currentLevel and nextLevel (A1-C2).
5. Create 3-6 tailored learning units:
   - id (string)
   - title
   - description
   - type (grammar | vocabulary | conversation | pronunciation)
   - difficulty (A1-C2)
   - estimatedMinutes
6. Generate 3-5 actionable coachingTips.
7. Compare with the previous plan (if available) to assign each skill a trend:
   - improving
   - stable
   - declining

-----------------------
### Output Format (STRICT)
Return ONLY a JSON object matching this structure:

{{
  "skills": [
    {{
      "category": "Grammar" | "Vocabulary" | "Fluency" | "Pronunciation" | "Listening" | "Confidence",
      "level": number,
      "trend": "improving" | "stable" | "declining"
    }}
  ],
  "currentLevel": "A1" | "A2" | "B1" | "B2" | "C1" | "C2",
  "nextLevel": "A1" | "A2" | "B1" | "B2" | "C1" | "C2",
  "learningUnits": [
    {{
      "id": string,
      "title": string,
      "description": string,
      "type": "grammar" | "vocabulary" | "conversation" | "pronunciation",
      "difficulty": "A1" | "A2" | "B1" | "B2" | "C1" | "C2",
      "estimatedMinutes": number
    }}
  ],
  "coachingTips": [string],
  "weakAreas": [string],
  "strengths": [string]
}}

-----------------------
### Additional Requirements
- Personalize results using the user's goal and native language.
- Use CEFR standards for level selection.
"#,
        native = ctx.native_language,
        target = ctx.target_language,
        goal = ctx.goal,
        previous = previous,
        transcript = ctx.transcript,
        categories = SKILL_CATEGORIES.join(", "),
    )
}
