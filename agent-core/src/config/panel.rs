use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, PartialEq, Eq, Hash, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Secret {
    FromEnvVar {
        #[serde(rename = "env-var", alias = "env_var")]
        env_var: String,
    },
    FromToml {
        toml: String,
        key: String,
    },
}

impl Secret {
    pub fn label(&self) -> &str {
        match self {
            Secret::FromEnvVar { .. } => "environment variable",
            Secret::FromToml { .. } => "TOML value",
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Definition {
    pub url: String,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub health_timeout: Duration,
    // tables after plain values, so the config can be written back as TOML
    pub api_token: Option<Secret>,
}

/// Environment variable read for the API token when none is configured.
pub const DEFAULT_TOKEN_ENV_VAR: &str = "BACKUP_API_TOKEN";

impl Definition {
    pub fn token_secret(&self) -> Secret {
        self.api_token.clone().unwrap_or_else(|| Secret::FromEnvVar {
            env_var: DEFAULT_TOKEN_ENV_VAR.to_owned(),
        })
    }
}

impl Default for Definition {
    fn default() -> Self {
        Definition {
            url: "https://backups.example.com".to_owned(),
            timeout: Duration::from_secs(30),
            health_timeout: Duration::from_secs(5),
            api_token: None,
        }
    }
}
