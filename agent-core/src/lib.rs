pub mod clock;
pub mod config;
pub mod dump;
pub mod encrypt;
pub mod keys;
pub mod model;
pub mod panel;
pub mod process;
pub mod retry_queue;
pub mod scanner;
pub mod secrets;
pub mod state;
pub mod upload;

pub const VERSION: Option<&str> = option_env!("BACKUP_AGENT_VERSION");
