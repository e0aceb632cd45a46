//! Readiness checks run before any iteration.

use serde::{Deserialize, Serialize};

/// Everything the preflight check looks at.
#[derive(Debug, Clone, Copy)]
pub struct PreflightInput<'a> {
    pub docs: &'a [String],
    pub readable_docs: usize,
    pub plan_steps: &'a [String],
    pub alternatives: &'a [String],
    pub acceptance_checks: &'a [String],
}

pub trait PreflightCheck {
    /// Returns failure reasons; empty means ready.
    fn validate(&self, input: &PreflightInput<'_>) -> Vec<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreflightPolicy {
    pub require_docs_read: bool,
    pub require_docs_accessible: bool,
    pub require_plan_before_edit: bool,
    pub require_creative_alternative: bool,
    pub require_acceptance_checks: bool,
}

impl Default for PreflightPolicy {
    fn default() -> Self {
        Self {
            require_docs_read: true,
            require_docs_accessible: true,
            require_plan_before_edit: true,
            require_creative_alternative: true,
            require_acceptance_checks: true,
        }
    }
}

impl PreflightCheck for PreflightPolicy {
    fn validate(&self, input: &PreflightInput<'_>) -> Vec<String> {
        let mut failures = Vec::new();
        if self.require_docs_read && input.docs.is_empty() {
            failures.push("No docs provided for docs-first preflight.".to_string());
        }
        if self.require_docs_accessible && !input.docs.is_empty() && input.readable_docs == 0 {
            failures.push("None of the referenced docs could be read.".to_string());
        }
        if self.require_plan_before_edit && input.plan_steps.is_empty() {
            failures.push("No execution plan produced before edits.".to_string());
        }
        if self.require_creative_alternative && input.alternatives.is_empty() {
            failures.push("No creative alternative was proposed.".to_string());
        }
        if self.require_acceptance_checks && input.acceptance_checks.is_empty() {
            failures.push("No acceptance checks defined.".to_string());
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn passes_when_everything_present() {
        let docs = strings(&["README.md"]);
        let steps = strings(&["a"]);
        let input = PreflightInput {
            docs: &docs,
            readable_docs: 1,
            plan_steps: &steps,
            alternatives: &steps,
            acceptance_checks: &steps,
        };
        assert!(PreflightPolicy::default().validate(&input).is_empty());
    }

    #[test]
    fn reports_unreadable_docs_and_missing_plan() {
        let docs = strings(&["missing.md"]);
        let input = PreflightInput {
            docs: &docs,
            readable_docs: 0,
            plan_steps: &[],
            alternatives: &[],
            acceptance_checks: &[],
        };
        let failures = PreflightPolicy::default().validate(&input);
        assert_eq!(failures.len(), 4);
        assert!(failures.iter().any(|f| f.contains("could be read")));
        assert!(failures.iter().any(|f| f.contains("No execution plan")));
    }

    #[test]
    fn disabled_requirements_are_skipped() {
        let policy = PreflightPolicy {
            require_docs_read: false,
            ..PreflightPolicy::default()
        };
        let steps = strings(&["a"]);
        let input = PreflightInput {
            docs: &[],
            readable_docs: 0,
            plan_steps: &steps,
            alternatives: &steps,
            acceptance_checks: &steps,
        };
        assert!(policy.validate(&input).is_empty());
    }
}
