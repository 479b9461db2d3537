use std::process::ExitCode;

#[tokio::main]
async fn main() -> eyre::Result<ExitCode> {
    backup_agent::main().await
}
