// src/config.rs
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_MAX_FILE_SIZE: usize = 10 * 1024 * 1024;
pub const DEFAULT_ACTION_LOG_CAP: usize = 1000;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub max_file_size: usize,
    pub replicate: ReplicateConfig,
    /// Upper bound on a single inpainting call. `None` waits indefinitely.
    pub inpaint_timeout: Option<Duration>,
    pub action_log_path: PathBuf,
    pub action_log_cap: usize,
    pub redis_url: Option<String>,
    pub result_ttl_secs: u64,
    pub result_store_max_entries: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct ReplicateConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub api_base: String,
    pub poll_interval: Duration,
}

impl Default for ReplicateConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "bria/eraser".to_string(),
            api_base: "https://api.replicate.com/v1".to_string(),
            poll_interval: Duration::from_millis(1000),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5001,
            log_level: "info".to_string(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            replicate: ReplicateConfig::default(),
            inpaint_timeout: Some(Duration::from_secs(300)),
            action_log_path: PathBuf::from("logs/image_actions.jsonl"),
            action_log_cap: DEFAULT_ACTION_LOG_CAP,
            redis_url: None,
            result_ttl_secs: 86400,
            result_store_max_entries: None,
        }
    }
}

impl AppConfig {
    /// Builds the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let timeout_secs: u64 = parse_or(&var, "INPAINT_TIMEOUT_SECS", 300)?;
        let poll_ms: u64 = parse_or(&var, "REPLICATE_POLL_INTERVAL_MS", 1000)?;

        Ok(Self {
            host: var("HOST").unwrap_or(defaults.host),
            port: parse_or(&var, "PORT", defaults.port)?,
            log_level: var("LOG_LEVEL")
                .map(|l| l.to_lowercase())
                .unwrap_or(defaults.log_level),
            max_file_size: parse_or(&var, "MAX_FILE_SIZE", defaults.max_file_size)?,
            replicate: ReplicateConfig {
                api_key: var("REPLICATE_API_KEY"),
                model: var("REPLICATE_MODEL").unwrap_or(defaults.replicate.model),
                api_base: var("REPLICATE_API_BASE").unwrap_or(defaults.replicate.api_base),
                poll_interval: Duration::from_millis(poll_ms),
            },
            inpaint_timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
            action_log_path: var("ACTION_LOG_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.action_log_path),
            action_log_cap: parse_or(&var, "ACTION_LOG_CAP", defaults.action_log_cap)?,
            redis_url: var("REDIS_URL"),
            result_ttl_secs: parse_or(&var, "RESULT_TTL_SECS", defaults.result_ttl_secs)?,
            result_store_max_entries: var("RESULT_STORE_MAX_ENTRIES")
                .map(|v| parse_value("RESULT_STORE_MAX_ENTRIES", &v))
                .transpose()?,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse()
        .with_context(|| format!("{key} has an invalid value: {raw:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.port, 5001);
        assert_eq!(config.max_file_size, 10 * 1024 * 1024);
        assert_eq!(config.action_log_cap, 1000);
        assert_eq!(config.replicate.model, "bria/eraser");
        assert!(config.replicate.api_key.is_none());
        assert_eq!(config.inpaint_timeout, Some(Duration::from_secs(300)));
    }

    #[test]
    fn overrides_are_applied() {
        let config = config_from(&[
            ("PORT", "8080"),
            ("REPLICATE_API_KEY", "r8_secret"),
            ("INPAINT_TIMEOUT_SECS", "0"),
            ("RESULT_STORE_MAX_ENTRIES", "25"),
            ("LOG_LEVEL", "DEBUG"),
        ])
        .unwrap();
        assert_eq!(config.bind_address(), "0.0.0.0:8080");
        assert_eq!(config.replicate.api_key.as_deref(), Some("r8_secret"));
        assert_eq!(config.inpaint_timeout, None);
        assert_eq!(config.result_store_max_entries, Some(25));
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn blank_api_key_counts_as_unset() {
        let config = config_from(&[("REPLICATE_API_KEY", "  ")]).unwrap();
        assert!(config.replicate.api_key.is_none());
    }

    #[test]
    fn invalid_number_is_reported() {
        let err = config_from(&[("PORT", "not-a-port")]).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }
}
