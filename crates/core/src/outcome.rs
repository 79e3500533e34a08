//! Success/failure classification of a generated script's console output.

use serde::Serialize;

const STDERR_KEYWORDS: &[&str] = &["error", "exception", "traceback"];

const STDOUT_KEYWORDS: &[&str] = &[
    "error:",
    "exception:",
    "traceback (most",
    "failed to",
    "attributeerror",
    "keyerror",
    "valueerror",
    "not found",
    "❌",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "message", rename_all = "snake_case")]
pub enum ScriptOutcome {
    Succeeded,
    Failed(String),
}

impl ScriptOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Stderr noise wins first, then the failure marker or a known failure
/// phrase on stdout.
pub fn classify(stdout: &str, stderr: &str, marker: &str) -> ScriptOutcome {
    let err = stderr.to_lowercase();
    if STDERR_KEYWORDS.iter().any(|k| err.contains(k)) {
        return ScriptOutcome::Failed(stderr.trim().to_string());
    }

    let out = stdout.to_lowercase();
    let marked = !marker.is_empty() && stdout.contains(marker);
    if marked || STDOUT_KEYWORDS.iter().any(|k| out.contains(k)) {
        return ScriptOutcome::Failed(stdout.trim().to_string());
    }

    ScriptOutcome::Succeeded
}
