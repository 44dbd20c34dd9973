use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

const DEFAULT_ENV_PREFIX: &str = "SPREADTV";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackendConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            request_timeout: default_request_timeout(),
        }
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:5000".into()
}

fn default_user_agent() -> String {
    format!("spreadtv/{}", crate::VERSION)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RefreshConfig {
    /// How often the visible display is soft-refreshed.
    #[serde(default = "default_refresh_interval", with = "humantime_serde")]
    pub interval: Duration,
    /// How often the links mapping is re-fetched.
    #[serde(default = "default_refresh_interval", with = "humantime_serde")]
    pub reconcile_interval: Duration,
    /// Every Nth reconcile tick also forces a frame reload.
    #[serde(default = "default_reload_every")]
    pub reload_every: u64,
    #[serde(default = "default_preload_timeout", with = "humantime_serde")]
    pub preload_timeout: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval: default_refresh_interval(),
            reconcile_interval: default_refresh_interval(),
            reload_every: default_reload_every(),
            preload_timeout: default_preload_timeout(),
        }
    }
}

fn default_refresh_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_reload_every() -> u64 {
    3
}

fn default_preload_timeout() -> Duration {
    Duration::from_secs(15)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    #[serde(default = "default_retry_delay", with = "humantime_serde")]
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            delay: default_retry_delay(),
        }
    }
}

fn default_attempts() -> u32 {
    3
}

fn default_retry_delay() -> Duration {
    Duration::from_secs(1)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogConfig {
    #[serde(default = "default_log_file")]
    pub file: Option<PathBuf>,
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file: default_log_file(),
            filter: default_log_filter(),
        }
    }
}

fn default_log_file() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join("spreadtv").join("spreadtv.log"))
}

fn default_log_filter() -> String {
    "info".into()
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let path = options.config_file.or_else(default_config_path);

    // Keys missing from the file keep their serde defaults; keys present win,
    // including an explicit `log.file: null`.
    let mut cfg = match path {
        Some(path) if path.exists() => read_config_file(&path)?,
        _ => Config::default(),
    };

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    for (key, value) in load_env(prefix) {
        apply_env_value(&mut cfg, &key, value);
    }

    normalize(&mut cfg);
    validate(&cfg)?;
    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    if data.trim().is_empty() {
        return Ok(Config::default());
    }
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn normalize(cfg: &mut Config) {
    cfg.backend.base_url = cfg.backend.base_url.trim().trim_end_matches('/').to_string();
    cfg.refresh.reload_every = cfg.refresh.reload_every.max(1);
    cfg.retry.attempts = cfg.retry.attempts.max(1);
}

fn validate(cfg: &Config) -> Result<()> {
    let url = Url::parse(&cfg.backend.base_url)
        .with_context(|| format!("config: invalid backend.base_url {}", cfg.backend.base_url))?;
    anyhow::ensure!(
        matches!(url.scheme(), "http" | "https"),
        "config: backend.base_url must use http or https, got {}",
        url.scheme()
    );
    anyhow::ensure!(
        !cfg.refresh.interval.is_zero() && !cfg.refresh.reconcile_interval.is_zero(),
        "config: refresh intervals must be greater than zero"
    );
    Ok(())
}

/// Only the keys actually present in the environment, as `section.key`.
fn load_env(prefix: &str) -> HashMap<String, String> {
    let upper_prefix = format!("{}_", prefix.to_uppercase());
    env::vars()
        .filter_map(|(key, value)| {
            key.strip_prefix(&upper_prefix)
                .map(|stripped| (stripped.to_ascii_lowercase().replace("__", "."), value))
        })
        .collect()
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "backend.base_url" => cfg.backend.base_url = value,
        "backend.user_agent" => cfg.backend.user_agent = value,
        "backend.request_timeout" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.backend.request_timeout = duration;
            }
        }
        "refresh.interval" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.refresh.interval = duration;
            }
        }
        "refresh.reconcile_interval" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.refresh.reconcile_interval = duration;
            }
        }
        "refresh.reload_every" => {
            if let Ok(parsed) = value.parse::<u64>() {
                cfg.refresh.reload_every = parsed;
            }
        }
        "refresh.preload_timeout" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.refresh.preload_timeout = duration;
            }
        }
        "retry.attempts" => {
            if let Ok(parsed) = value.parse::<u32>() {
                cfg.retry.attempts = parsed;
            }
        }
        "retry.delay" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.retry.delay = duration;
            }
        }
        "log.file" if value.trim().is_empty() => cfg.log.file = None,
        "log.file" => cfg.log.file = Some(PathBuf::from(value)),
        "log.filter" | "log" => cfg.log.filter = value,
        _ => {}
    }
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("spreadtv").join("config.yaml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use tempfile::tempdir;

    fn isolated(dir: &Path, prefix: &str) -> LoadOptions {
        LoadOptions {
            config_file: Some(dir.join("config.yaml")),
            env_prefix: Some(prefix.to_string()),
        }
    }

    #[test]
    fn load_defaults_without_files() {
        let dir = tempdir().unwrap();
        let cfg = load(isolated(dir.path(), "SPREADTV_TEST_DEFAULTS")).unwrap();
        assert_eq!(cfg.backend.base_url, "http://127.0.0.1:5000");
        assert_eq!(cfg.refresh.interval, Duration::from_secs(30));
        assert_eq!(cfg.refresh.reload_every, 3);
        assert_eq!(cfg.retry.attempts, 3);
        assert_eq!(cfg.retry.delay, Duration::from_secs(1));
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "backend:\n  base_url: http://10.0.0.5:5000/\nrefresh:\n  interval: 10s\n  reload_every: 0\nretry:\n  delay: 250ms\n",
        )
        .unwrap();
        let cfg = load(isolated(dir.path(), "SPREADTV_TEST_FILE")).unwrap();
        assert_eq!(cfg.backend.base_url, "http://10.0.0.5:5000");
        assert_eq!(cfg.refresh.interval, Duration::from_secs(10));
        assert_eq!(cfg.refresh.reload_every, 1);
        assert_eq!(cfg.retry.delay, Duration::from_millis(250));
        assert_eq!(cfg.retry.attempts, 3);
    }

    #[test]
    fn env_overrides() {
        let dir = tempdir().unwrap();
        env::set_var("SPREADTV_TEST_ENV_REFRESH__PRELOAD_TIMEOUT", "5s");
        env::set_var("SPREADTV_TEST_ENV_RETRY__ATTEMPTS", "7");
        let cfg = load(isolated(dir.path(), "SPREADTV_TEST_ENV")).unwrap();
        assert_eq!(cfg.refresh.preload_timeout, Duration::from_secs(5));
        assert_eq!(cfg.retry.attempts, 7);
        env::remove_var("SPREADTV_TEST_ENV_REFRESH__PRELOAD_TIMEOUT");
        env::remove_var("SPREADTV_TEST_ENV_RETRY__ATTEMPTS");
    }

    #[test]
    fn env_does_not_reset_file_values() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("config.yaml"), "refresh:\n  interval: 12s\n").unwrap();
        env::set_var("SPREADTV_TEST_LAYER_LOG__FILTER", "debug");
        let cfg = load(isolated(dir.path(), "SPREADTV_TEST_LAYER")).unwrap();
        assert_eq!(cfg.refresh.interval, Duration::from_secs(12));
        assert_eq!(cfg.log.filter, "debug");
        env::remove_var("SPREADTV_TEST_LAYER_LOG__FILTER");
    }

    #[test]
    fn env_equal_to_default_still_overrides_file() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("config.yaml"),
            "refresh:\n  interval: 10s\nretry:\n  attempts: 5\n",
        )
        .unwrap();
        env::set_var("SPREADTV_TEST_DEFAULT_ENV_RETRY__ATTEMPTS", "3");
        env::set_var("SPREADTV_TEST_DEFAULT_ENV_REFRESH__INTERVAL", "30s");
        let cfg = load(isolated(dir.path(), "SPREADTV_TEST_DEFAULT_ENV")).unwrap();
        env::remove_var("SPREADTV_TEST_DEFAULT_ENV_RETRY__ATTEMPTS");
        env::remove_var("SPREADTV_TEST_DEFAULT_ENV_REFRESH__INTERVAL");
        assert_eq!(cfg.retry.attempts, 3);
        assert_eq!(cfg.refresh.interval, Duration::from_secs(30));
    }

    #[test]
    fn null_log_file_disables_file_logging() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("config.yaml"), "log:\n  file: null\n").unwrap();
        let cfg = load(isolated(dir.path(), "SPREADTV_TEST_NULL_LOG")).unwrap();
        assert_eq!(cfg.log.file, None);
        assert_eq!(cfg.log.filter, "info");
    }

    #[test]
    fn rejects_non_http_base_url() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("config.yaml"),
            "backend:\n  base_url: ftp://example.com\n",
        )
        .unwrap();
        let err = load(isolated(dir.path(), "SPREADTV_TEST_SCHEME")).unwrap_err();
        assert!(err.to_string().contains("http or https"));
    }
}
