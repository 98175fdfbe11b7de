mod types;

pub use types::*;

use crate::error::{BackupError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".pg_xz_backup"))
        .unwrap_or_else(|| PathBuf::from(".pg_xz_backup"))
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Reads and validates the configuration at `path`.
pub fn load_from(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Err(BackupError::Config(format!(
            "Config file not found at {}. Run `init` to create one.",
            path.display()
        )));
    }

    info!("Loading configuration from {:?}", path);
    let contents = fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&contents)?;
    validate(&config)?;
    debug!("Configuration for database '{}' is valid", config.database.name);
    Ok(config)
}

pub fn save_to(config: &AppConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            info!("Creating config directory: {:?}", parent);
            fs::create_dir_all(parent)?;
        }
    }

    let contents = toml::to_string_pretty(config)?;
    fs::write(path, contents)?;
    info!("Configuration saved to {:?}", path);
    Ok(())
}

/// Rejects configurations that would make the dump tool misbehave before any
/// process is started.
pub fn validate(config: &AppConfig) -> Result<()> {
    let db = &config.database;
    require_operand("database.name", &db.name)?;
    require_operand("database.host", &db.host)?;
    require_operand("database.username", &db.username)?;
    if db.port == 0 {
        return Err(BackupError::Config("database.port must not be 0".to_string()));
    }
    if db.parallel_jobs == 0 {
        return Err(BackupError::Config(
            "database.parallel_jobs must be at least 1".to_string(),
        ));
    }

    let backup = &config.backup;
    if backup.directory.as_os_str().is_empty() {
        return Err(BackupError::Config("backup.directory is required".to_string()));
    }
    if backup.retention.is_zero() {
        return Err(BackupError::Config("backup.retention must be positive".to_string()));
    }
    if backup.compression_level > 9 {
        return Err(BackupError::Config(format!(
            "backup.compression_level must be between 0 and 9, got {}",
            backup.compression_level
        )));
    }
    if backup.step_timeout_secs == 0 {
        return Err(BackupError::Config(
            "backup.step_timeout_secs must be positive".to_string(),
        ));
    }

    let tools = &backup.tools;
    for (field, program) in [
        ("backup.tools.dump", &tools.dump),
        ("backup.tools.compressor", &tools.compressor),
        ("backup.tools.archiver", &tools.archiver),
    ] {
        if program.trim().is_empty() {
            return Err(BackupError::Config(format!("{} is required", field)));
        }
    }
    if tools.password_env.is_empty()
        || tools.password_env.contains('=')
        || tools.password_env.contains('\0')
    {
        return Err(BackupError::Config(format!(
            "backup.tools.password_env is not a valid variable name: {:?}",
            tools.password_env
        )));
    }

    if let Some(notification) = &config.notification {
        let url = reqwest::Url::parse(&notification.webhook_url).map_err(|e| {
            BackupError::Config(format!("notification.webhook_url is invalid: {}", e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(BackupError::Config(format!(
                "notification.webhook_url must be http(s), got {}",
                url.scheme()
            )));
        }
    }

    if config.schedule.is_some_and(|p| p.is_zero()) {
        return Err(BackupError::Config("schedule must be positive".to_string()));
    }

    Ok(())
}

/// Values passed to the dump tool as positional or option arguments.
fn require_operand(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(BackupError::Config(format!("{} is required", field)));
    }
    if value.starts_with('-') {
        return Err(BackupError::Config(format!(
            "{} must not start with '-': {:?}",
            field, value
        )));
    }
    if value.chars().any(char::is_control) {
        return Err(BackupError::Config(format!(
            "{} contains control characters",
            field
        )));
    }
    Ok(())
}
