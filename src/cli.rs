use std::path::PathBuf;

/// Backs up the databases of locally hosted sites and reports to the backup panel.
#[derive(clap::Parser)]
#[command(name = "backup-agent", disable_version_flag = true)]
pub struct Cli {
    /// Sets a custom configuration file path
    #[arg(short, long, env = "BACKUP_AGENT_CONFIG_FILE")]
    pub config_file: Option<PathBuf>,

    /// Sets the configuration from a string
    #[arg(long, env = "BACKUP_AGENT_CONFIG")]
    pub config_string: Option<String>,

    /// Also appends log output to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Logs debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub subcommand: Cmd,
}

#[derive(clap::Subcommand)]
pub enum Cmd {
    /// Backs up all discovered site databases
    Backup(backup::Cli),

    /// Inspects and processes the retry queue
    Retry(retry::Cli),

    /// Lists the sites and databases that would be backed up
    Scan(scan::Cli),

    /// Checks the registration status of this server with the panel
    Status,

    /// Prints the active configuration
    Config,

    /// Prints version information
    Version,
}

pub mod backup {
    #[derive(clap::Args)]
    pub struct Cli {
        /// Only backs up this site
        #[arg(long)]
        pub site: Option<String>,

        /// Only backs up this database
        #[arg(long)]
        pub database: Option<String>,

        /// Shows what would be backed up without running anything
        #[arg(long)]
        pub dry_run: bool,
    }
}

pub mod retry {
    #[derive(clap::Args)]
    pub struct Cli {
        #[command(subcommand)]
        pub subcommand: Cmd,
    }

    #[derive(clap::Subcommand)]
    pub enum Cmd {
        /// Replays queued panel calls that are due
        Process,

        /// Lists every queued panel call
        List,
    }
}

pub mod scan {
    #[derive(clap::Args)]
    pub struct Cli {
        /// Shows the configured scan paths instead of scanning
        #[arg(long)]
        pub paths: bool,
    }
}
