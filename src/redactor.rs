//! Secret redaction chokepoint for failure details leaving the client.

use regex::Regex;

/// Canonical replacement marker for redacted content.
pub const REDACTION_MARKER: &str = "[REDACTED]";

/// Longest detail string kept after redaction.
pub const MAX_DETAIL_CHARS: usize = 256;

/// Redacts known secret values and token-like patterns from text.
#[derive(Clone)]
pub struct Redactor {
    exact_secrets: Vec<String>,
    patterns: Vec<Regex>,
}

impl std::fmt::Debug for Redactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Redactor")
            .field("exact_secrets", &self.exact_secrets.len())
            .field("patterns", &self.patterns.len())
            .finish()
    }
}

impl Default for Redactor {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl Redactor {
    /// Create a redactor from known secret values.
    pub fn new(exact_secrets: Vec<String>) -> Self {
        let exact_secrets = exact_secrets
            .into_iter()
            .filter(|secret| !secret.is_empty())
            .collect();
        Self {
            exact_secrets,
            patterns: default_patterns(),
        }
    }

    /// Redact exact known secrets and known secret patterns.
    pub fn redact(&self, text: &str) -> String {
        let mut sanitized = text.to_owned();
        for secret in &self.exact_secrets {
            sanitized = sanitized.replace(secret, REDACTION_MARKER);
        }
        for pattern in &self.patterns {
            sanitized = pattern
                .replace_all(&sanitized, REDACTION_MARKER)
                .into_owned();
        }
        sanitized
    }

    /// Redact, collapse whitespace, and cap the length for display or logs.
    pub fn scrub_detail(&self, text: &str) -> String {
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        truncate_chars(&self.redact(&collapsed), MAX_DETAIL_CHARS)
    }
}

/// Cut `text` to at most `max` characters, marking the cut.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let shortened = text.chars().take(max).collect::<String>();
        return format!("{shortened}...[truncated]");
    }
    text.to_owned()
}

fn default_patterns() -> Vec<Regex> {
    let patterns = [
        r"sk-ant-[A-Za-z0-9_\-]{10,}",
        r"sk-[A-Za-z0-9]{32,}",
        r"(?i)x-api-key:\s*\S+",
        r"(?i)bearer\s+[A-Za-z0-9._\-]{16,}",
    ];

    patterns
        .iter()
        .filter_map(|pattern| Regex::new(pattern).ok())
        .collect()
}
