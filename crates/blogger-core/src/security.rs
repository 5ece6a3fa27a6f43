use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::BloggerError;

static REDACTION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)(api[_-]?key\s*[:=]\s*)([A-Za-z0-9\-_.+/]+)")
            .expect("invalid api_key regex"),
        Regex::new(r"(?i)(bearer\s+)([A-Za-z0-9\-_.+=/]+)").expect("invalid bearer regex"),
        Regex::new(r"()(\b(?:sk|gsk)[-_][A-Za-z0-9]{16,})").expect("invalid key token regex"),
    ]
});

/// Wrapper around sensitive values to reduce accidental logging.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue(String);

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "***redacted***")
    }
}

/// Require that `var` resolves to a non-empty value through `lookup`.
pub fn require_var<F>(lookup: &F, var: &str) -> Result<SecretValue, BloggerError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        Some(value) if !value.trim().is_empty() => Ok(SecretValue(value.trim().to_string())),
        _ => Err(BloggerError::MissingSecret(var.to_string())),
    }
}

/// Mask credentials that may be echoed back in upstream error bodies.
pub fn redact_secrets(input: &str) -> String {
    REDACTION_PATTERNS
        .iter()
        .fold(input.to_string(), |acc, pattern| {
            pattern
                .replace_all(&acc, |caps: &Captures| format!("{}[REDACTED]", &caps[1]))
                .into_owned()
        })
}
