use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Matches `key<ws>[=:]<ws>value` for any of the sensitive key names, case
/// insensitively, capturing the key+separator so only the value gets
/// replaced. Mirrors the redaction contract's documented pattern:
/// `(service.key|api.key|secret|password|token|credential|authorization)\s*[=:]\s*\S+`.
static SENSITIVE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(service[._]key|api[._]key|secret|password|token|credential|authorization)(\s*[=:]\s*)\S+",
    )
    .expect("redaction pattern is a fixed, valid regex")
});

/// Scrubs substrings matching the sensitive-key pattern from `line`,
/// replacing the value with `***`. Intentionally narrow: it operates on an
/// already-rendered log line, not on arbitrary application data — the
/// credential client (see `scraper-worker::credential`) never logs a
/// credential value in the first place, this is a defense-in-depth
/// backstop only.
pub fn redact_line(line: &str) -> String {
    SENSITIVE_PATTERN
        .replace_all(line, |caps: &Captures| {
            format!("{}{}***", &caps[1], &caps[2])
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_secret_assignment() {
        let line = r#"msg="oops" secret=sk-abc123 other=1"#;
        let redacted = redact_line(line);
        assert!(redacted.contains("secret=***"));
        assert!(!redacted.contains("sk-abc123"));
        assert!(redacted.contains("other=1"));
    }

    #[test]
    fn redacts_colon_form() {
        let line = "authorization: Bearer xyz";
        let redacted = redact_line(line);
        assert_eq!(redacted, "authorization: ***");
    }

    #[test]
    fn leaves_unrelated_text_alone() {
        let line = "duration_ms=120 fields_extracted=3";
        assert_eq!(redact_line(line), line);
    }

    #[test]
    fn redacts_service_key_variants() {
        assert!(redact_line("service_key=abcd").contains("***"));
        assert!(redact_line("service.key=abcd").contains("***"));
    }
}
