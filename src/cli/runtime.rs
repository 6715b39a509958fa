use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::ValueEnum;
use tokio::fs;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::WayfinderConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

pub fn init_logging(level: &str, debug: bool, format: LogFormat) -> Result<()> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        level.parse().context("Invalid log level")?
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string()));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
    }
    .context("Failed to install log subscriber")?;

    Ok(())
}

pub struct LoadedConfig {
    pub config: WayfinderConfig,
    pub path: PathBuf,
}

pub async fn load_config(config_path: Option<&PathBuf>) -> Result<LoadedConfig> {
    let config_path = match config_path {
        Some(path) => path.clone(),
        None => {
            // Priority: ./config/wayfinder.yaml > ~/.config/wayfinder/wayfinder.yaml
            let local_config = PathBuf::from("config/wayfinder.yaml");
            if local_config.exists() {
                local_config
            } else {
                let mut path = dirs::config_dir().context("Failed to get config directory")?;
                path.push("wayfinder");
                path.push("wayfinder.yaml");
                path
            }
        }
    };

    let mut config = if config_path.exists() {
        let content = fs::read_to_string(&config_path)
            .await
            .context("Failed to read config file")?;
        let config =
            WayfinderConfig::from_yaml(&content).context("Failed to parse config file")?;
        info!("Loaded configuration from: {}", config_path.display());
        config
    } else {
        warn!(
            "Config file not found, using defaults: {}",
            config_path.display()
        );
        WayfinderConfig::default()
    };
    config.apply_env_overrides();

    Ok(LoadedConfig {
        config,
        path: config_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[tokio::test]
    #[serial]
    async fn explicit_file_is_parsed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "runner:\n  step_retries: 5").unwrap();
        let loaded = tokio_test::assert_ok!(load_config(Some(&file.path().to_path_buf())).await);
        assert_eq!(loaded.config.runner.step_retries, 5);
        assert_eq!(loaded.path, file.path());
    }

    #[tokio::test]
    #[serial]
    async fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.yaml");
        let loaded = load_config(Some(&path)).await.unwrap();
        assert_eq!(loaded.config.navigator.max_replans, 2);
    }

    #[tokio::test]
    #[serial]
    async fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "runner: [unterminated").unwrap();
        assert!(load_config(Some(&file.path().to_path_buf())).await.is_err());
    }
}
