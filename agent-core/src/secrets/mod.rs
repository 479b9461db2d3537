use crate::config::panel::Secret;
use eyre::{eyre, WrapErr};
use std::collections::HashMap;

#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue(pub String);

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        SecretValue(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretValue(***)")
    }
}

#[derive(Debug)]
pub struct Secrets;

impl Secrets {
    pub fn get_secret(&self, secret: &Secret) -> eyre::Result<SecretValue> {
        match secret {
            Secret::FromEnvVar { env_var } => {
                let value = std::env::var(env_var)
                    .wrap_err_with(|| format!("environment variable '{}' not set", env_var))?;
                Ok(SecretValue(value))
            }
            Secret::FromToml { toml, key } => {
                let secrets_file = std::fs::read_to_string(toml)
                    .wrap_err_with(|| format!("failed to read secrets file '{}'", toml))?;
                let secrets: HashMap<&str, &str> = toml::from_str(&secrets_file)
                    .wrap_err_with(|| format!("failed to parse secrets file '{}'", toml))?;
                secrets
                    .get(key.as_str())
                    .map(|s| s.to_owned())
                    .ok_or_else(|| eyre!("key '{}' not found in secrets file '{}'", key, toml))
                    .map(SecretValue::new)
            }
        }
    }
}
