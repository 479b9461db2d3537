use crate::{config, keys::EncryptionKey, process::Tool};
use eyre::WrapErr;
use sha2::{Digest, Sha256};
use std::{
    fmt::Debug,
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::io::AsyncReadExt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptResult {
    pub path: PathBuf,
    /// SHA-256 over the ciphertext, lowercase hex
    pub checksum: String,
}

#[async_trait::async_trait]
pub trait Encryptor: Debug + Send + Sync {
    async fn encrypt(
        &self,
        input: &Path,
        output: &Path,
        key: &EncryptionKey,
    ) -> eyre::Result<EncryptResult>;
}

/// AES-256-CBC with a PBKDF2-derived key, via `openssl enc`.
#[derive(Debug)]
pub struct OpensslEncryptor {
    openssl: Tool,
    timeout: Duration,
}

impl OpensslEncryptor {
    const PASSPHRASE_ENV_VAR: &'static str = "BACKUP_AGENT_PASSPHRASE";

    pub fn new(tools: &config::tools::Tools, timeouts: &config::tools::Timeouts) -> Self {
        OpensslEncryptor {
            openssl: Tool::new("openssl", &tools.openssl),
            timeout: timeouts.encrypt,
        }
    }

    fn args(input: &Path, output: &Path) -> Vec<std::ffi::OsString> {
        vec![
            "enc".into(),
            "-aes-256-cbc".into(),
            "-salt".into(),
            "-pbkdf2".into(),
            "-in".into(),
            input.into(),
            "-out".into(),
            output.into(),
            "-pass".into(),
            format!("env:{}", Self::PASSPHRASE_ENV_VAR).into(),
        ]
    }
}

#[async_trait::async_trait]
impl Encryptor for OpensslEncryptor {
    #[tracing::instrument(level = "debug", skip_all, fields(input = %input.display()))]
    async fn encrypt(
        &self,
        input: &Path,
        output: &Path,
        key: &EncryptionKey,
    ) -> eyre::Result<EncryptResult> {
        if let Some(dir) = output.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .wrap_err_with(|| format!("failed to create directory '{}'", dir.display()))?;
        }

        let mut cmd = self.openssl.command();
        cmd.args(Self::args(input, output))
            .env(Self::PASSPHRASE_ENV_VAR, key.expose());

        if let Err(error) = self.openssl.run(cmd, self.timeout).await {
            let _ = tokio::fs::remove_file(output).await;
            return Err(error).wrap_err("failed to encrypt backup");
        }

        let checksum = sha256_file(output).await?;
        Ok(EncryptResult {
            path: output.to_owned(),
            checksum,
        })
    }
}

pub async fn sha256_file(path: &Path) -> eyre::Result<String> {
    let mut file = tokio::fs::File::open(path)
        .await
        .wrap_err_with(|| format!("failed to open '{}' for hashing", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
