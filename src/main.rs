mod backup;
mod cli;
mod config;
mod error;
mod log;
mod notify;

use crate::cli::{Action, Cli};
use crate::config::{AppConfig, DatabaseConfig};
use crate::error::{BackupError, Result};
use clap::Parser;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

const EXIT_FAILURE: i32 = 1;
const EXIT_CONFIG: i32 = 2;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    log::init(cli.verbose);

    let ctrl_c_count = Arc::new(AtomicUsize::new(0));
    let ctrl_c_count_clone = ctrl_c_count.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        let count = ctrl_c_count_clone.fetch_add(1, Ordering::SeqCst);

        if count == 0 {
            println!("\n\nShutdown signal received. Press Ctrl+C again to force exit...");
        } else {
            println!("\nForce exiting...");
            std::process::exit(130);
        }
    }) {
        warn!("Could not install Ctrl-C handler: {}", e);
    }

    let config_path = cli.config.clone().unwrap_or_else(config::config_path);
    let action = cli.action.unwrap_or_default();

    let code = match run(action, &config_path, &ctrl_c_count).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            match e {
                BackupError::Config(_) | BackupError::Serialization(_) => EXIT_CONFIG,
                _ => EXIT_FAILURE,
            }
        }
    };

    std::process::exit(code);
}

async fn run(action: Action, config_path: &Path, shutdown: &AtomicUsize) -> Result<i32> {
    if let Action::Init { force } = action {
        init_config(config_path, force)?;
        return Ok(0);
    }

    let config = config::load_from(config_path)?;
    cli::display_header();
    cli::display_summary(&config);

    match action {
        Action::Run => {
            let notifier = notify::create_notifier(config.notification.as_ref());
            let result = backup::execute_backup(&config, &notifier).await;
            Ok(result.exit_code())
        }
        Action::Schedule => {
            let interval = config.schedule.ok_or_else(|| {
                BackupError::Config("`schedule` must be set to use schedule mode".to_string())
            })?;
            let notifier = notify::create_notifier(config.notification.as_ref());
            let summary = backup::run_scheduler(&config, &notifier, interval, shutdown).await;
            info!(
                "Scheduler finished: {} run(s), {} failed",
                summary.runs, summary.failures
            );
            Ok(0)
        }
        Action::Sweep => {
            let report = backup::sweep_destination(&config).await;
            cli::display_sweep(&report);
            Ok(if report.is_clean() { 0 } else { EXIT_FAILURE })
        }
        Action::Show => Ok(0),
        Action::Init { .. } => Ok(0),
    }
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(BackupError::Config(format!(
            "{} already exists, pass --force to overwrite it",
            path.display()
        )));
    }

    let starter = AppConfig {
        database: DatabaseConfig {
            name: "postgres".to_string(),
            ..DatabaseConfig::default()
        },
        ..AppConfig::default()
    };
    config::save_to(&starter, path)?;
    println!("Configuration written to {}", path.display());
    Ok(())
}
