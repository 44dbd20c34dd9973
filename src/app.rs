use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::backend::{self, LinkMap, RetryPolicy};
use crate::config::{self, Config};
use crate::data::{BackendFrameService, BackendLinkService, LinkService};
use crate::logging;
use crate::state::Settings;
use crate::ui;

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub config_file: Option<PathBuf>,
}

pub fn run() -> Result<()> {
    run_with(RunOptions::default())
}

pub fn run_with(options: RunOptions) -> Result<()> {
    let cfg = load_config(&options)?;
    if let Err(err) = logging::init(&cfg.log) {
        eprintln!("logging disabled: {err:#}");
    }

    let config_path = options.config_file.clone().or_else(config::default_path);
    let display_path = friendly_path(config_path.as_ref());

    let client =
        Arc::new(backend::Client::new(client_config(&cfg)).context("create backend client")?);
    let link_service = Arc::new(BackendLinkService::new(client.clone(), retry_policy(&cfg)));
    let frame_service = Arc::new(BackendFrameService::new(client));

    let options = ui::Options {
        status_message: format!("Connecting to {}…", cfg.backend.base_url),
        settings: settings(&cfg),
        link_service,
        frame_service,
        refresh_interval: cfg.refresh.interval,
        reconcile_interval: cfg.refresh.reconcile_interval,
        config_path: display_path,
    };

    let mut model = ui::Model::new(options);
    model.run()
}

/// One retried fetch of the links mapping, without the UI.
pub fn check_links(options: RunOptions) -> Result<LinkMap> {
    let cfg = load_config(&options)?;
    let client =
        Arc::new(backend::Client::new(client_config(&cfg)).context("create backend client")?);
    BackendLinkService::new(client, retry_policy(&cfg)).load_links()
}

fn load_config(options: &RunOptions) -> Result<Config> {
    config::load(config::LoadOptions {
        config_file: options.config_file.clone(),
        ..Default::default()
    })
    .context("load config")
}

fn client_config(cfg: &Config) -> backend::ClientConfig {
    backend::ClientConfig {
        base_url: cfg.backend.base_url.clone(),
        user_agent: cfg.backend.user_agent.clone(),
        timeout: Some(cfg.backend.request_timeout),
        http_client: None,
    }
}

pub fn settings(cfg: &Config) -> Settings {
    Settings {
        base_url: cfg.backend.base_url.clone(),
        reload_every: cfg.refresh.reload_every,
        preload_timeout: cfg.refresh.preload_timeout,
    }
}

pub fn retry_policy(cfg: &Config) -> RetryPolicy {
    RetryPolicy {
        attempts: cfg.retry.attempts,
        delay: cfg.retry.delay,
    }
}

fn friendly_path(path: Option<&PathBuf>) -> String {
    if let Some(path) = path {
        if let Some(home) = dirs::home_dir() {
            if let Ok(stripped) = path.strip_prefix(&home) {
                let mut display = String::from("~");
                if !stripped.as_os_str().is_empty() {
                    display.push_str(&format!("/{}", stripped.display()));
                }
                return display;
            }
        }
        path.display().to_string()
    } else {
        "~/.config/spreadtv/config.yaml".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn settings_follow_config() {
        let mut cfg = Config::default();
        cfg.backend.base_url = "http://10.1.1.1:5000".into();
        cfg.refresh.reload_every = 5;
        cfg.refresh.preload_timeout = Duration::from_secs(4);
        let settings = settings(&cfg);
        assert_eq!(settings.base_url, "http://10.1.1.1:5000");
        assert_eq!(settings.reload_every, 5);
        assert_eq!(settings.preload_timeout, Duration::from_secs(4));
    }

    #[test]
    fn retry_policy_follows_config() {
        let mut cfg = Config::default();
        cfg.retry.attempts = 4;
        cfg.retry.delay = Duration::from_millis(500);
        assert_eq!(
            retry_policy(&cfg),
            RetryPolicy {
                attempts: 4,
                delay: Duration::from_millis(500),
            }
        );
    }

    #[test]
    fn friendly_path_falls_back_to_default_label() {
        assert_eq!(friendly_path(None), "~/.config/spreadtv/config.yaml");
        let outside = PathBuf::from("/etc/spreadtv/config.yaml");
        if dirs::home_dir().is_some_and(|home| !outside.starts_with(home)) {
            assert_eq!(friendly_path(Some(&outside)), "/etc/spreadtv/config.yaml");
        }
    }
}
