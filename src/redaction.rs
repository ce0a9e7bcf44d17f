use once_cell::sync::Lazy;
use regex::Regex;

static SECRET_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r#"(?i)(api[_-]?key|key|token|secret|password)\s*[:=]\s*["']?([A-Za-z0-9_\-\.]{6,})["']?"#)
            .expect("valid regex"),
        Regex::new(r"(?i)(x-goog-api-key|authorization)\s*:\s*(bearer\s+)?([A-Za-z0-9_\-\.]{6,})")
            .expect("valid regex"),
        Regex::new(r"\b(AIza[0-9A-Za-z_\-]{30,})\b").expect("valid regex"),
    ]
});

/// Scrubs credentials out of text bound for logs, such as upstream error
/// messages that echo the request URL.
#[derive(Debug, Default, Clone)]
pub struct Redactor {
    known_secrets: Vec<String>,
}

impl Redactor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also masks these exact values wherever they occur.
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        let secret = secret.into();
        if !secret.is_empty() {
            self.known_secrets.push(secret);
        }
        self
    }

    pub fn redact(&self, input: &str) -> String {
        let mut result = input.to_string();
        for secret in &self.known_secrets {
            result = result.replace(secret.as_str(), "[REDACTED]");
        }

        for pattern in SECRET_PATTERNS.iter() {
            result = pattern
                .replace_all(&result, |caps: &regex::Captures<'_>| match caps.get(1) {
                    Some(name) if caps.len() > 2 => format!("{}=[REDACTED]", name.as_str().to_ascii_lowercase()),
                    _ => "[REDACTED]".to_string(),
                })
                .to_string();
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::Redactor;

    #[test]
    fn redacts_key_in_request_url() {
        let redactor = Redactor::new();
        let message = "error sending request for url (https://host/v1beta/models/m:generateContent?key=abcd1234efgh)";
        let result = redactor.redact(message);
        assert!(!result.contains("abcd1234efgh"));
        assert!(result.contains("key=[REDACTED]"));
    }

    #[test]
    fn redacts_configured_secret_verbatim() {
        let redactor = Redactor::new().with_secret("s3cr3t-value");
        assert_eq!(redactor.redact("token s3cr3t-value leaked"), "token [REDACTED] leaked");
    }

    #[test]
    fn leaves_plain_text_alone() {
        let redactor = Redactor::new();
        assert_eq!(redactor.redact("upstream returned 503"), "upstream returned 503");
    }
}
