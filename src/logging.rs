use std::fs::{self, OpenOptions};

use anyhow::{Context, Result};
use env_logger::{Builder, Env, Target};

use crate::config::LogConfig;

/// Sends `log` records to the configured file since the terminal belongs to
/// the UI. `RUST_LOG` wins over `log.filter`. Without a file nothing is
/// installed and log macros stay silent.
pub fn init(cfg: &LogConfig) -> Result<()> {
    let Some(path) = cfg.file.as_ref() else {
        return Ok(());
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("logging: create directory {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("logging: open {}", path.display()))?;

    Builder::from_env(Env::default().default_filter_or(cfg.filter.as_str()))
        .target(Target::Pipe(Box::new(file)))
        .format_timestamp_millis()
        .try_init()
        .context("logging: install logger")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn init_creates_log_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("spreadtv.log");
        let cfg = LogConfig {
            file: Some(path.clone()),
            filter: "debug".into(),
        };
        init(&cfg).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn no_file_means_no_logger() {
        let cfg = LogConfig {
            file: None,
            filter: "info".into(),
        };
        assert!(init(&cfg).is_ok());
    }
}
