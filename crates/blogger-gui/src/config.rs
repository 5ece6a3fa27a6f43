use anyhow::{Context, Result};
use blogger_core::BloggerConfig;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub listen_addr: String,
    pub max_concurrency: usize,
    pub assets_dir: PathBuf,
    pub auth_token: Option<String>,
    pub max_sessions: usize,
    pub session_ttl: Duration,
    pub blogger: BloggerConfig,
}

impl AppConfig {
    const DEFAULT_LISTEN_ADDR: &'static str = "0.0.0.0:8080";
    const DEFAULT_ASSETS_DIR: &'static str = "crates/blogger-gui/web";
    const DEFAULT_MAX_SESSIONS: usize = 1000;
    const DEFAULT_SESSION_TTL_SECS: u64 = 3600;

    /// Read GUI settings and the required model credentials.
    ///
    /// Fails when `IMAGINE_API_KEY` or `IMAGINE_API_ENDPOINT` is missing.
    pub fn from_env() -> Result<Self> {
        let blogger =
            BloggerConfig::from_env().context("failed to load model configuration")?;
        Self::from_lookup(|key| env::var(key).ok(), blogger)
    }

    pub fn from_lookup<F>(lookup: F, blogger: BloggerConfig) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let listen_addr = lookup("GUI_LISTEN_ADDR")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| Self::DEFAULT_LISTEN_ADDR.to_string());

        let max_concurrency = match lookup("GUI_MAX_CONCURRENCY") {
            Some(value) => value
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|value| *value > 0)
                .with_context(|| "GUI_MAX_CONCURRENCY must be a positive integer")?,
            None => std::thread::available_parallelism()
                .map(|nz| nz.get())
                .unwrap_or(4),
        };

        let assets_dir = lookup("GUI_ASSETS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(Self::DEFAULT_ASSETS_DIR));
        let assets_dir = if assets_dir.is_relative() {
            env::current_dir()
                .map(|cwd| cwd.join(&assets_dir))
                .unwrap_or(assets_dir)
        } else {
            assets_dir
        };

        let auth_token = lookup("GUI_AUTH_TOKEN")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        let max_sessions = positive(&lookup, "GUI_MAX_SESSIONS", Self::DEFAULT_MAX_SESSIONS)?;
        let session_ttl = Duration::from_secs(positive(
            &lookup,
            "GUI_SESSION_TTL_SECS",
            Self::DEFAULT_SESSION_TTL_SECS,
        )?);

        Ok(Self {
            listen_addr,
            max_concurrency,
            assets_dir,
            auth_token,
            max_sessions,
            session_ttl,
            blogger,
        })
    }
}

fn positive<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr + PartialOrd + Default,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .ok()
            .filter(|value| *value > T::default())
            .with_context(|| format!("{key} must be a positive integer")),
        None => Ok(default),
    }
}
