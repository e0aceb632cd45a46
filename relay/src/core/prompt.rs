//! Persona profiles and the prompt configuration carried through a run.

use serde::{Deserialize, Serialize};

pub const DEFAULT_STEP_POLICY: &str = "For each step: read docs first, propose action, execute smallest safe change, run verification, then record decision and next action.";

pub const FALLBACK_PERSONA: &str = "fallback";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonaProfile {
    pub name: String,
    pub tone: String,
    pub risk_tolerance: String,
    pub creativity_level: String,
    pub coding_style: String,
    pub verbosity: String,
}

impl Default for PersonaProfile {
    fn default() -> Self {
        Self {
            name: FALLBACK_PERSONA.to_string(),
            tone: "neutral".to_string(),
            risk_tolerance: "medium".to_string(),
            creativity_level: "medium".to_string(),
            coding_style: "maintainable".to_string(),
            verbosity: "medium".to_string(),
        }
    }
}

impl PersonaProfile {
    pub fn balanced_builder() -> Self {
        Self {
            name: "balanced_builder".to_string(),
            tone: "direct".to_string(),
            risk_tolerance: "medium".to_string(),
            creativity_level: "medium".to_string(),
            coding_style: "small verified increments".to_string(),
            verbosity: "concise".to_string(),
        }
    }
}

/// Everything that shapes the agent prompt for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptConfiguration {
    pub base_constitution: String,
    pub project_profile: String,
    pub persona: PersonaProfile,
    pub task_brief: String,
    pub step_policy: String,
}

impl PromptConfiguration {
    pub fn new(
        constitution: &str,
        project_profile: &str,
        persona: PersonaProfile,
        objective: &str,
    ) -> Self {
        Self {
            base_constitution: constitution.to_string(),
            project_profile: project_profile.to_string(),
            persona,
            task_brief: objective.to_string(),
            step_policy: DEFAULT_STEP_POLICY.to_string(),
        }
    }
}
