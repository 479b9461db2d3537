use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "kebab-case")]
pub struct Upload {
    /// rsync destination, e.g. `backup@storage:/srv/backups`
    pub destination: Option<String>,
}

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Tools {
    pub mysqldump: PathBuf,
    pub mysql: PathBuf,
    pub openssl: PathBuf,
    pub rsync: PathBuf,
}

impl Default for Tools {
    fn default() -> Self {
        Tools {
            mysqldump: PathBuf::from("mysqldump"),
            mysql: PathBuf::from("mysql"),
            openssl: PathBuf::from("openssl"),
            rsync: PathBuf::from("rsync"),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Timeouts {
    #[serde(with = "humantime_serde")]
    pub dump: Duration,
    #[serde(with = "humantime_serde")]
    pub table_count: Duration,
    #[serde(with = "humantime_serde")]
    pub encrypt: Duration,
    #[serde(with = "humantime_serde")]
    pub upload: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            dump: Duration::from_secs(60 * 60),
            table_count: Duration::from_secs(30),
            encrypt: Duration::from_secs(60 * 60),
            upload: Duration::from_secs(2 * 60 * 60),
        }
    }
}
