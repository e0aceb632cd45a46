//! Static risk classification for verification commands.

use crate::core::types::RiskLevel;

const HIGH_RISK_PATTERNS: [&str; 7] = [
    "rm -rf",
    "del /f /s /q",
    "format ",
    "mkfs",
    "shutdown",
    "reboot",
    "git reset --hard",
];

const MEDIUM_RISK_PATTERNS: [&str; 3] = ["git clean -fd", "drop database", "truncate table"];

/// Case-insensitive substring match; high patterns win over medium.
pub fn classify_command(command: &str) -> RiskLevel {
    let lowered = command.to_lowercase();
    if HIGH_RISK_PATTERNS.iter().any(|p| lowered.contains(p)) {
        return RiskLevel::High;
    }
    if MEDIUM_RISK_PATTERNS.iter().any(|p| lowered.contains(p)) {
        return RiskLevel::Medium;
    }
    RiskLevel::Low
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_pattern() {
        assert_eq!(classify_command("rm -rf /tmp/x"), RiskLevel::High);
        assert_eq!(classify_command("GIT RESET --HARD HEAD~1"), RiskLevel::High);
        assert_eq!(classify_command("git clean -fdx"), RiskLevel::Medium);
        assert_eq!(classify_command("cargo test --workspace"), RiskLevel::Low);
    }
}
