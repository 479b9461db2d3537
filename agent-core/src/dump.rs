use crate::{
    config,
    model::Connection,
    process::Tool,
};
use eyre::WrapErr;
use std::{
    fmt::Debug,
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpResult {
    pub path: PathBuf,
    pub table_count: u64,
}

/// Produces a point-in-time export of one database.
///
/// Either the artifact at `output` is complete or it does not exist.
#[async_trait::async_trait]
pub trait Dumper: Debug + Send + Sync {
    async fn dump(&self, connection: &Connection, output: &Path) -> eyre::Result<DumpResult>;
}

#[derive(Debug)]
pub struct MysqlDumper {
    mysqldump: Tool,
    mysql: Tool,
    timeout: Duration,
    table_count_timeout: Duration,
}

impl MysqlDumper {
    pub fn new(tools: &config::tools::Tools, timeouts: &config::tools::Timeouts) -> Self {
        MysqlDumper {
            mysqldump: Tool::new("mysqldump", &tools.mysqldump),
            mysql: Tool::new("mysql", &tools.mysql),
            timeout: timeouts.dump,
            table_count_timeout: timeouts.table_count,
        }
    }

    fn dump_args(connection: &Connection) -> Vec<String> {
        vec![
            format!("--host={}", connection.host),
            format!("--port={}", connection.port),
            format!("--user={}", connection.username),
            "--single-transaction".to_owned(),
            "--routines".to_owned(),
            "--triggers".to_owned(),
            "--quick".to_owned(),
            "--lock-tables=false".to_owned(),
            connection.database.0.clone(),
        ]
    }

    fn table_count_args(connection: &Connection) -> Vec<String> {
        vec![
            format!("--host={}", connection.host),
            format!("--port={}", connection.port),
            format!("--user={}", connection.username),
            "-N".to_owned(),
            "-e".to_owned(),
            format!(
                "SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = '{}'",
                connection.database.0.replace('\'', "''")
            ),
        ]
    }

    async fn table_count(&self, connection: &Connection) -> u64 {
        let mut cmd = self.mysql.command();
        cmd.args(Self::table_count_args(connection))
            .stdout(Stdio::piped());
        with_password(&mut cmd, connection);

        match self.mysql.run(cmd, self.table_count_timeout).await {
            Ok(output) => parse_table_count(&output.stdout).unwrap_or_else(|| {
                tracing::warn!("unexpected output when counting tables");
                0
            }),
            Err(error) => {
                tracing::warn!(%error, "failed to count tables");
                0
            }
        }
    }
}

fn with_password(cmd: &mut tokio::process::Command, connection: &Connection) {
    if !connection.password.is_empty() {
        cmd.env("MYSQL_PWD", &connection.password);
    }
}

fn parse_table_count(stdout: &[u8]) -> Option<u64> {
    String::from_utf8_lossy(stdout).trim().parse().ok()
}

fn partial_path(output: &Path) -> PathBuf {
    let mut file_name = output
        .file_name()
        .map(|s| s.to_owned())
        .unwrap_or_default();
    file_name.push(".partial");
    output.with_file_name(file_name)
}

#[async_trait::async_trait]
impl Dumper for MysqlDumper {
    #[tracing::instrument(level = "debug", skip_all, fields(database = %connection.database))]
    async fn dump(&self, connection: &Connection, output: &Path) -> eyre::Result<DumpResult> {
        if let Some(dir) = output.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .wrap_err_with(|| format!("failed to create directory '{}'", dir.display()))?;
        }

        let table_count = self.table_count(connection).await;

        let partial = partial_path(output);
        let file = tokio::fs::File::create(&partial)
            .await
            .wrap_err_with(|| format!("failed to create dump file '{}'", partial.display()))?
            .into_std()
            .await;
        let mut cmd = self.mysqldump.command();
        cmd.args(Self::dump_args(connection)).stdout(file);
        with_password(&mut cmd, connection);

        match self.mysqldump.run(cmd, self.timeout).await {
            Ok(_) => {
                tokio::fs::rename(&partial, output)
                    .await
                    .wrap_err("failed to move finished dump into place")?;
                Ok(DumpResult {
                    path: output.to_owned(),
                    table_count,
                })
            }
            Err(error) => {
                if let Err(e) = tokio::fs::remove_file(&partial).await {
                    tracing::warn!(error = %e, "failed to remove partial dump");
                }
                Err(error).wrap_err_with(|| format!("failed to dump database '{}'", connection.database))
            }
        }
    }
}
