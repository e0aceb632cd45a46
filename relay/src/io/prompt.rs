//! System prompt rendering.

use anyhow::{Context, Result};
use minijinja::{Environment, context};

use crate::core::prompt::PromptConfiguration;

const SYSTEM_PROMPT_TEMPLATE: &str = include_str!("templates/system_prompt.md");

/// Render the system prompt a session's agent starts from.
pub fn render_system_prompt(config: &PromptConfiguration, skills: &[String]) -> Result<String> {
    let mut env = Environment::new();
    env.add_template("system_prompt", SYSTEM_PROMPT_TEMPLATE)
        .context("load system prompt template")?;
    let template = env.get_template("system_prompt")?;
    let rendered = template
        .render(context! {
            constitution => config.base_constitution.trim(),
            project_profile => (!config.project_profile.trim().is_empty()).then(|| config.project_profile.trim()),
            persona => &config.persona,
            task_brief => config.task_brief.trim(),
            skills => skills,
            step_policy => config.step_policy.trim(),
        })
        .context("render system prompt")?;
    Ok(rendered)
}
