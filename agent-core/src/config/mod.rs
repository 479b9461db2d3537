use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

pub mod panel;
pub mod tools;

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Retry {
    pub max_attempts: u32,
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
}

impl Default for Retry {
    fn default() -> Self {
        Retry {
            max_attempts: 5,
            base_delay: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    pub storage_path: PathBuf,
    pub sites_paths: Vec<PathBuf>,
    pub server_name: Option<String>,
    pub panel: panel::Definition,
    pub retry: Retry,
    pub upload: tools::Upload,
    pub tools: tools::Tools,
    pub timeouts: tools::Timeouts,

    /// path of the configuration file, if the configuration was loaded from a file
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            storage_path: PathBuf::from("/tmp/backups"),
            sites_paths: vec![PathBuf::from("/home/forge")],
            server_name: None,
            panel: Default::default(),
            retry: Default::default(),
            upload: Default::default(),
            tools: Default::default(),
            timeouts: Default::default(),
            source: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("invalid configuration string")]
    InvalidConfigString(#[source] eyre::Report),
    #[error("invalid configuration file {}", .0.display())]
    InvalidConfigFile(PathBuf, #[source] eyre::Report),
    #[error("i/o error reading configuration file {}", .0.display())]
    IoError(PathBuf, #[source] std::io::Error),
}

impl Config {
    pub fn parse(s: &str) -> Result<Config, ConfigLoadError> {
        toml::from_str(s).map_err(|e| ConfigLoadError::InvalidConfigString(e.into()))
    }

    pub async fn parse_file(p: &Path) -> Result<Config, ConfigLoadError> {
        let config_string = tokio::fs::read_to_string(p)
            .await
            .map_err(|e| ConfigLoadError::IoError(p.to_owned(), e))?;
        let mut config: Config = toml::from_str(&config_string)
            .map_err(|e| ConfigLoadError::InvalidConfigFile(p.to_owned(), e.into()))?;
        config.source = Some(p.to_owned());
        Ok(config)
    }

    pub fn queue_file(&self) -> PathBuf {
        self.storage_path.join("retry-queue.json")
    }

    pub fn state_file(&self) -> PathBuf {
        self.storage_path.join("server.json")
    }

    pub fn dumps_dir(&self) -> PathBuf {
        self.storage_path.join("dumps")
    }

    pub fn encrypted_dir(&self) -> PathBuf {
        self.storage_path.join("encrypted")
    }
}
