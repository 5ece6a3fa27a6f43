use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::{BloggerError, SecretValue, require_var};

pub const API_KEY_VAR: &str = "IMAGINE_API_KEY";
pub const API_ENDPOINT_VAR: &str = "IMAGINE_API_ENDPOINT";

/// Runtime configuration for the model client and the crew.
#[derive(Debug, Clone)]
pub struct BloggerConfig {
    pub api_key: SecretValue,
    pub api_endpoint: String,
    pub model: String,
    pub max_tokens: u32,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub crew_timeout: Duration,
    pub web_search: bool,
}

impl BloggerConfig {
    const DEFAULT_MODEL: &'static str = "llama3-8b-8192";
    const DEFAULT_MAX_TOKENS: u32 = 1000;
    const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
    const DEFAULT_MAX_RETRIES: u32 = 1;
    const DEFAULT_RETRY_BACKOFF_MS: u64 = 1000;
    const DEFAULT_CREW_TIMEOUT_SECS: u64 = 300;

    /// Load configuration from the process environment.
    ///
    /// A `.env` file in the working directory (or a parent) is applied first;
    /// its absence is not an error.
    pub fn from_env() -> Result<Self, BloggerError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, BloggerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = require_var(&lookup, API_KEY_VAR)?;
        let api_endpoint = require_var(&lookup, API_ENDPOINT_VAR)?
            .expose()
            .trim_end_matches('/')
            .to_string();

        if !(api_endpoint.starts_with("http://") || api_endpoint.starts_with("https://")) {
            return Err(BloggerError::InvalidConfiguration(format!(
                "{API_ENDPOINT_VAR} must be an http(s) URL"
            )));
        }

        let model = lookup("IMAGINE_MODEL")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| Self::DEFAULT_MODEL.to_string());

        let max_tokens = parse_or(&lookup, "IMAGINE_MAX_TOKENS", Self::DEFAULT_MAX_TOKENS)?;
        let request_timeout = parse_or(
            &lookup,
            "BLOGGER_REQUEST_TIMEOUT_SECS",
            Self::DEFAULT_REQUEST_TIMEOUT_SECS,
        )?;
        let max_retries = parse_or(&lookup, "BLOGGER_MAX_RETRIES", Self::DEFAULT_MAX_RETRIES)?;
        let retry_backoff_ms = parse_or(
            &lookup,
            "BLOGGER_RETRY_BACKOFF_MS",
            Self::DEFAULT_RETRY_BACKOFF_MS,
        )?;
        let crew_timeout = parse_or(
            &lookup,
            "BLOGGER_CREW_TIMEOUT_SECS",
            Self::DEFAULT_CREW_TIMEOUT_SECS,
        )?;

        let web_search = match lookup("BLOGGER_WEB_SEARCH") {
            Some(value) => parse_bool(&value).ok_or_else(|| {
                BloggerError::InvalidConfiguration(
                    "BLOGGER_WEB_SEARCH must be true or false".into(),
                )
            })?,
            None => false,
        };

        if request_timeout == 0 || crew_timeout == 0 {
            return Err(BloggerError::InvalidConfiguration(
                "timeouts must be greater than zero".into(),
            ));
        }

        Ok(Self {
            api_key,
            api_endpoint,
            model,
            max_tokens,
            request_timeout: Duration::from_secs(request_timeout),
            max_retries,
            retry_backoff: Duration::from_millis(retry_backoff_ms),
            crew_timeout: Duration::from_secs(crew_timeout),
            web_search,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, BloggerError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key).map(|value| value.trim().to_string()) {
        Some(value) if !value.is_empty() => value.parse::<T>().map_err(|_| {
            BloggerError::InvalidConfiguration(format!("{key} has an invalid value: {value}"))
        }),
        _ => Ok(default),
    }
}

pub fn parse_bool(input: &str) -> Option<bool> {
    match input.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn loads_required_values_with_defaults() {
        let config = BloggerConfig::from_lookup(lookup_from(&[
            (API_KEY_VAR, "key-123"),
            (API_ENDPOINT_VAR, "https://api.example.test/openai/v1/"),
        ]))
        .expect("config should load");

        assert_eq!(config.api_key.expose(), "key-123");
        assert_eq!(config.api_endpoint, "https://api.example.test/openai/v1");
        assert_eq!(config.model, "llama3-8b-8192");
        assert_eq!(config.max_tokens, 1000);
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.crew_timeout, Duration::from_secs(300));
        assert!(!config.web_search);
    }

    #[test]
    fn missing_key_fails_fast() {
        let err = BloggerConfig::from_lookup(lookup_from(&[(
            API_ENDPOINT_VAR,
            "https://api.example.test",
        )]))
        .unwrap_err();
        assert!(matches!(err, BloggerError::MissingSecret(ref var) if var == API_KEY_VAR));
    }

    #[test]
    fn missing_endpoint_fails_fast() {
        let err =
            BloggerConfig::from_lookup(lookup_from(&[(API_KEY_VAR, "key-123")])).unwrap_err();
        assert!(matches!(err, BloggerError::MissingSecret(ref var) if var == API_ENDPOINT_VAR));
    }

    #[test]
    fn rejects_non_http_endpoint_and_bad_numbers() {
        let err = BloggerConfig::from_lookup(lookup_from(&[
            (API_KEY_VAR, "key-123"),
            (API_ENDPOINT_VAR, "ftp://example.test"),
        ]))
        .unwrap_err();
        assert!(matches!(err, BloggerError::InvalidConfiguration(_)));

        let err = BloggerConfig::from_lookup(lookup_from(&[
            (API_KEY_VAR, "key-123"),
            (API_ENDPOINT_VAR, "https://example.test"),
            ("BLOGGER_MAX_RETRIES", "many"),
        ]))
        .unwrap_err();
        assert!(matches!(err, BloggerError::InvalidConfiguration(_)));
    }

    #[test]
    fn optional_overrides_apply() {
        let config = BloggerConfig::from_lookup(lookup_from(&[
            (API_KEY_VAR, "key-123"),
            (API_ENDPOINT_VAR, "http://localhost:9000"),
            ("IMAGINE_MODEL", "mixtral"),
            ("BLOGGER_MAX_RETRIES", "0"),
            ("BLOGGER_WEB_SEARCH", "yes"),
        ]))
        .expect("config should load");
        assert_eq!(config.model, "mixtral");
        assert_eq!(config.max_retries, 0);
        assert!(config.web_search);
    }
}
