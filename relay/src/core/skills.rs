//! Keyword-overlap skill retrieval over the configured skill catalog.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillEntry {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-z0-9]+").expect("word pattern is valid"));

fn tokenize(text: &str) -> HashSet<String> {
    let lowered = text.to_lowercase();
    WORD_RE
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Top `top_k` skills by overlap with `task_brief`, shorter names first on ties.
///
/// Skills with a positive overlap are preferred; when none overlap the top
/// ranked entries are still returned so the run has something to lean on.
pub fn retrieve_skills<'a>(skills: &'a [SkillEntry], task_brief: &str, top_k: usize) -> Vec<&'a SkillEntry> {
    let query = tokenize(task_brief);
    let mut scored: Vec<(usize, &SkillEntry)> = skills
        .iter()
        .map(|skill| {
            let words = tokenize(&format!("{} {}", skill.name, skill.description));
            (query.intersection(&words).count(), skill)
        })
        .collect();
    scored.sort_by(|(a_score, a), (b_score, b)| {
        b_score
            .cmp(a_score)
            .then_with(|| a.name.len().cmp(&b.name.len()))
    });

    let top: Vec<(usize, &SkillEntry)> = scored.into_iter().take(top_k).collect();
    let positive: Vec<&SkillEntry> = top
        .iter()
        .filter(|(score, _)| *score > 0)
        .map(|(_, skill)| *skill)
        .collect();
    if positive.is_empty() {
        return top.into_iter().map(|(_, skill)| skill).collect();
    }
    positive
}

#[cfg(test)]
mod tests {
    use super::*;

    fn skill(name: &str, description: &str) -> SkillEntry {
        SkillEntry {
            name: name.to_string(),
            description: description.to_string(),
        }
    }

    #[test]
    fn ranks_by_overlap() {
        let skills = vec![
            skill("docs-reader", "read markdown docs"),
            skill("test-runner", "run the test suite and report failures"),
            skill("ui-preview", "render ui preview"),
        ];
        let hits = retrieve_skills(&skills, "Run the test suite", 3);
        assert_eq!(hits[0].name, "test-runner");
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn falls_back_to_top_ranked_without_overlap() {
        let skills = vec![skill("alpha", "x"), skill("be", "y")];
        let hits = retrieve_skills(&skills, "unrelated", 1);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "be");
    }
}
