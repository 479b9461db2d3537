use crate::model::{Connection, DatabaseName, SiteName, SiteTarget};
use eyre::WrapErr;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

const DEFAULT_DRIVER: &str = "mysql";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3306;
const DEFAULT_USERNAME: &str = "forge";

/// Finds sites with a MySQL database below the configured site directories.
///
/// Every direct subdirectory with a `.env` file is a candidate; sites using a
/// different database driver or without `DB_DATABASE` are skipped.
#[derive(Debug, Clone)]
pub struct Scanner {
    paths: Vec<PathBuf>,
}

impl Scanner {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Scanner { paths }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub async fn scan(&self) -> eyre::Result<Vec<SiteTarget>> {
        let mut sites = Vec::new();
        for path in &self.paths {
            if !tokio::fs::metadata(path)
                .await
                .map(|m| m.is_dir())
                .unwrap_or(false)
            {
                tracing::debug!(path = %path.display(), "skipping missing sites path");
                continue;
            }
            sites.extend(scan_dir(path).await?);
        }
        Ok(sites)
    }
}

async fn scan_dir(path: &Path) -> eyre::Result<Vec<SiteTarget>> {
    let mut entries = tokio::fs::read_dir(path)
        .await
        .wrap_err_with(|| format!("failed to list sites in '{}'", path.display()))?;
    let mut directories = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            directories.push(entry.path());
        }
    }
    directories.sort();

    let mut sites = Vec::new();
    for directory in directories {
        let env_path = directory.join(".env");
        let content = match tokio::fs::read_to_string(&env_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => {
                tracing::warn!(path = %env_path.display(), error = %e, "failed to read .env file");
                continue;
            }
        };
        let Some(connection) = parse_connection(&parse_env(&content)) else {
            continue;
        };
        let site = directory
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        sites.push(SiteTarget {
            site: SiteName(site),
            path: directory,
            database: connection.database.clone(),
            connection,
        });
    }
    Ok(sites)
}

fn parse_connection(env: &HashMap<String, String>) -> Option<Connection> {
    let driver = env
        .get("DB_CONNECTION")
        .map(String::as_str)
        .unwrap_or(DEFAULT_DRIVER);
    if driver != DEFAULT_DRIVER {
        return None;
    }
    let database = env.get("DB_DATABASE").filter(|s| !s.is_empty())?;

    Some(Connection {
        driver: driver.to_owned(),
        host: env
            .get("DB_HOST")
            .cloned()
            .unwrap_or_else(|| DEFAULT_HOST.to_owned()),
        port: env
            .get("DB_PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT),
        database: DatabaseName(database.clone()),
        username: env
            .get("DB_USERNAME")
            .cloned()
            .unwrap_or_else(|| DEFAULT_USERNAME.to_owned()),
        password: env.get("DB_PASSWORD").cloned().unwrap_or_default(),
    })
}

fn parse_env(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_owned(), unquote(value.trim()).to_owned()))
        .collect()
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|v| v.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}
