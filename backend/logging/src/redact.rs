//! Log Redaction Layer
//!
//! Scrubs bearer tokens, OAuth secrets, and JWT-looking strings from text
//! (typically upstream error bodies) before it reaches the logs.

use regex::Regex;
use std::sync::LazyLock;

static BEARER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Bearer\s+[A-Za-z0-9\-\._~+/]+=*").unwrap());
static JWT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"eyJ[A-Za-z0-9_\-]+\.[A-Za-z0-9_\-]+\.[A-Za-z0-9_\-]+").unwrap()
});
static SECRET_FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""(access_token|refresh_token|client_secret)"\s*:\s*"[^"]*""#).unwrap()
});

/// Upper bound for bodies echoed into log lines.
const MAX_LOGGED_CHARS: usize = 500;

/// Redacts sensitive patterns in a string.
pub fn redact_sensitive_data(input: &str) -> String {
    let redacted = BEARER_RE.replace_all(input, "Bearer [REDACTED_TOKEN]");
    let redacted = SECRET_FIELD_RE.replace_all(&redacted, "\"$1\":\"[REDACTED]\"");
    JWT_RE.replace_all(&redacted, "[REDACTED_JWT]").into_owned()
}

/// Redact and cap a body for inclusion in a log line.
pub fn truncate_for_log(input: &str) -> String {
    let redacted = redact_sensitive_data(input);
    if redacted.chars().count() <= MAX_LOGGED_CHARS {
        return redacted;
    }
    let mut cut: String = redacted.chars().take(MAX_LOGGED_CHARS).collect();
    cut.push_str("...");
    cut
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redaction() {
        let raw = "Authorization: Bearer abcDEF123.456_789 failed";
        let clean = redact_sensitive_data(raw);
        assert!(!clean.contains("abcDEF123"));
        assert!(clean.contains("[REDACTED_TOKEN]"));
    }

    #[test]
    fn redacts_oauth_fields_and_jwts() {
        let raw = r#"{"token_type":"Bearer","access_token":"eyJhbGciOiJIUzI1NiJ9.eyJzdWIiOiIxIn0.sig","expires_in":86400}"#;
        let clean = redact_sensitive_data(raw);
        assert!(!clean.contains("eyJhbGciOiJIUzI1NiJ9"));
        assert!(clean.contains("\"expires_in\":86400"));
    }

    #[test]
    fn long_bodies_are_capped() {
        let raw = "x".repeat(2_000);
        let logged = truncate_for_log(&raw);
        assert!(logged.ends_with("..."));
        assert_eq!(logged.chars().count(), MAX_LOGGED_CHARS + 3);
    }
}
