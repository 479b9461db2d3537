use crate::new_workdir;
use agent_core::{
    config::tools::{Timeouts, Tools, Upload},
    dump::{Dumper, MysqlDumper},
    encrypt::{Encryptor, OpensslEncryptor},
    keys::EncryptionKey,
    model::{Connection, DatabaseName},
    upload::{ProgressSink, RsyncUploader, Uploader},
};
use std::path::Path;

const DUMP: &str = "-- MySQL dump 10.13\nCREATE TABLE `orders` (`id` int);\n";

fn connection(password: &str) -> Connection {
    Connection {
        driver: "mysql".to_owned(),
        host: "db.internal".to_owned(),
        port: 3307,
        database: DatabaseName("shop".to_owned()),
        username: "forge".to_owned(),
        password: password.to_owned(),
    }
}

fn has_cause(error: &eyre::Report, text: &str) -> bool {
    error.chain().any(|e| e.to_string().contains(text))
}

#[derive(Debug, Default)]
struct Recorded(Vec<u8>);

#[async_trait::async_trait]
impl ProgressSink for Recorded {
    async fn progress(&mut self, percent: u8) {
        self.0.push(percent);
    }
}

mod dump {
    use super::*;

    #[tokio::test]
    async fn should_dump_database_into_output_file() {
        let mysql = new_workdir().with_stdout("12\n");
        let mysqldump = new_workdir().with_stdout(DUMP);
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("dumps").join("shop.sql");
        let dumper = MysqlDumper::new(
            &Tools {
                mysqldump: mysqldump.test_binary(),
                mysql: mysql.test_binary(),
                ..Default::default()
            },
            &Timeouts::default(),
        );

        let result = dumper.dump(&connection("secret"), &output).await.unwrap();

        assert_eq!(result.path, output);
        assert_eq!(result.table_count, 12);
        assert_eq!(std::fs::read_to_string(&output).unwrap(), DUMP);
        assert!(!dir.path().join("dumps").join("shop.sql.partial").exists());
        mysqldump.args().assert_args(&[
            "--host=db.internal",
            "--port=3307",
            "--user=forge",
            "--single-transaction",
            "--routines",
            "--triggers",
            "--quick",
            "--lock-tables=false",
            "shop",
        ]);
        mysqldump.env().assert_var("MYSQL_PWD", "secret");
        mysql.env().assert_var("MYSQL_PWD", "secret");
    }

    #[tokio::test]
    async fn should_not_pass_empty_password() {
        let mysql = new_workdir().with_stdout("1\n");
        let mysqldump = new_workdir().with_stdout(DUMP);
        let dir = tempfile::tempdir().unwrap();
        let dumper = MysqlDumper::new(
            &Tools {
                mysqldump: mysqldump.test_binary(),
                mysql: mysql.test_binary(),
                ..Default::default()
            },
            &Timeouts::default(),
        );

        dumper
            .dump(&connection(""), &dir.path().join("shop.sql"))
            .await
            .unwrap();

        mysqldump.env().assert_no_var("MYSQL_PWD");
    }

    #[tokio::test]
    async fn should_count_zero_tables_when_query_fails() {
        let mysql = new_workdir().with_exit_status(1);
        let mysqldump = new_workdir().with_stdout(DUMP);
        let dir = tempfile::tempdir().unwrap();
        let dumper = MysqlDumper::new(
            &Tools {
                mysqldump: mysqldump.test_binary(),
                mysql: mysql.test_binary(),
                ..Default::default()
            },
            &Timeouts::default(),
        );

        let result = dumper
            .dump(&connection("secret"), &dir.path().join("shop.sql"))
            .await
            .unwrap();

        assert_eq!(result.table_count, 0);
    }

    #[tokio::test]
    async fn should_remove_partial_dump_on_failure() {
        let mysql = new_workdir().with_stdout("12\n");
        let mysqldump = new_workdir()
            .with_stdout("-- MySQL dump 10.13\n")
            .with_stderr("mysqldump: Got error: 1045: Access denied\n")
            .with_exit_status(2);
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("shop.sql");
        let dumper = MysqlDumper::new(
            &Tools {
                mysqldump: mysqldump.test_binary(),
                mysql: mysql.test_binary(),
                ..Default::default()
            },
            &Timeouts::default(),
        );

        let error = dumper.dump(&connection("secret"), &output).await.unwrap_err();

        assert!(has_cause(&error, "Access denied"));
        assert!(!output.exists());
        assert!(!dir.path().join("shop.sql.partial").exists());
    }
}

mod encrypt {
    use super::*;

    #[tokio::test]
    async fn should_encrypt_with_key_from_environment() {
        let openssl = new_workdir().with_output_file("-out", "abc");
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("shop.sql");
        std::fs::write(&input, DUMP).unwrap();
        let output = dir.path().join("encrypted").join("shop.sql.enc");
        let encryptor = OpensslEncryptor::new(
            &Tools {
                openssl: openssl.test_binary(),
                ..Default::default()
            },
            &Timeouts::default(),
        );

        let result = encryptor
            .encrypt(&input, &output, &EncryptionKey::from("k3y"))
            .await
            .unwrap();

        assert_eq!(result.path, output);
        assert_eq!(
            result.checksum,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        openssl.args().assert_args(&[
            "enc",
            "-aes-256-cbc",
            "-salt",
            "-pbkdf2",
            "-in",
            &input.to_string_lossy(),
            "-out",
            &output.to_string_lossy(),
            "-pass",
            "env:BACKUP_AGENT_PASSPHRASE",
        ]);
        openssl.env().assert_var("BACKUP_AGENT_PASSPHRASE", "k3y");
    }

    #[tokio::test]
    async fn should_remove_output_when_encryption_fails() {
        let openssl = new_workdir()
            .with_output_file("-out", "garbage")
            .with_exit_status(1);
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("shop.sql");
        std::fs::write(&input, DUMP).unwrap();
        let output = dir.path().join("shop.sql.enc");
        let encryptor = OpensslEncryptor::new(
            &Tools {
                openssl: openssl.test_binary(),
                ..Default::default()
            },
            &Timeouts::default(),
        );

        let result = encryptor
            .encrypt(&input, &output, &EncryptionKey::from("k3y"))
            .await;

        assert!(result.is_err());
        assert!(!output.exists());
    }
}

mod upload {
    use super::*;

    const RSYNC_OUTPUT: &str = "sending incremental file list\nshop.sql.enc\n\
        \r          1,024  10%    0.00kB/s    0:00:00\
        \r         52,224  51%   49.80MB/s    0:00:00\
        \r         52,224  51%   49.80MB/s    0:00:00\
        \r        102,400 100%   97.66MB/s    0:00:00 (xfr#1, to-chk=0/1)\n\n\
        sent 102,525 bytes  received 35 bytes  205,120.00 bytes/sec\n";

    fn uploader(rsync: &Path, destination: Option<&str>) -> RsyncUploader {
        RsyncUploader::new(
            &Tools {
                rsync: rsync.to_owned(),
                ..Default::default()
            },
            &Upload {
                destination: destination.map(str::to_owned),
            },
            &Timeouts::default(),
        )
    }

    #[tokio::test]
    async fn should_report_progress_and_finish_at_100() {
        let rsync = new_workdir().with_stdout(RSYNC_OUTPUT);
        let mut progress = Recorded::default();

        uploader(&rsync.test_binary(), Some("backup@storage:/srv/backups/"))
            .upload(
                Path::new("/tmp/backups/encrypted/shop_1.sql.enc"),
                "shop/shop_1.sql.enc",
                &mut progress,
            )
            .await
            .unwrap();

        assert_eq!(progress.0, vec![10, 51, 100]);
        rsync.args().assert_args(&[
            "-az",
            "--progress",
            "/tmp/backups/encrypted/shop_1.sql.enc",
            "backup@storage:/srv/backups/shop/shop_1.sql.enc",
        ]);
    }

    #[tokio::test]
    async fn should_report_completion_without_progress_output() {
        let rsync = new_workdir();
        let mut progress = Recorded::default();

        uploader(&rsync.test_binary(), Some("/srv/backups"))
            .upload(Path::new("/tmp/x.sql.enc"), "shop/x.sql.enc", &mut progress)
            .await
            .unwrap();

        assert_eq!(progress.0, vec![100]);
    }

    #[tokio::test]
    async fn should_fail_on_rsync_error() {
        let rsync = new_workdir()
            .with_stdout("\r  1,024  10%  0.00kB/s  0:00:00")
            .with_stderr("rsync: connection unexpectedly closed\n")
            .with_exit_status(12);
        let mut progress = Recorded::default();

        let error = uploader(&rsync.test_binary(), Some("/srv/backups"))
            .upload(Path::new("/tmp/x.sql.enc"), "shop/x.sql.enc", &mut progress)
            .await
            .unwrap_err();

        assert!(has_cause(&error, "connection unexpectedly closed"));
        assert_eq!(progress.0, vec![10]);
    }

    #[tokio::test]
    async fn should_keep_rsync_error_output_that_is_not_utf8() {
        let rsync = new_workdir()
            .with_stderr(&b"rsync: \xff\xfe connection unexpectedly closed\n"[..])
            .with_exit_status(12);
        let mut progress = Recorded::default();

        let error = uploader(&rsync.test_binary(), Some("/srv/backups"))
            .upload(Path::new("/tmp/x.sql.enc"), "shop/x.sql.enc", &mut progress)
            .await
            .unwrap_err();

        assert!(has_cause(&error, "connection unexpectedly closed"));
        assert!(progress.0.is_empty());
    }
}
