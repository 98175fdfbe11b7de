mod summary;

pub use summary::{display_header, display_summary, display_sweep};

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;

#[derive(Parser, Debug)]
#[command(version, about = "PostgreSQL backups compressed with xz, with retention and webhook notifications", long_about = None)]
pub struct Cli {
    /// Configuration file. Defaults to ~/.pg_xz_backup/config.toml.
    #[arg(long, short, env = "PG_XZ_BACKUP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Verbosity of the log output (error, warn, info, debug, trace).
    #[arg(long)]
    pub verbose: Option<Level>,

    #[command(subcommand)]
    pub action: Option<Action>,
}

#[derive(Subcommand, Debug, Default, Clone, PartialEq, Eq)]
pub enum Action {
    /// Run one backup now. (Default)
    #[default]
    Run,
    /// Back up now and then at the configured `schedule` interval.
    Schedule,
    /// Only delete backups older than the retention window.
    Sweep,
    /// Write a starter configuration file.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Print the resolved configuration.
    Show,
}
