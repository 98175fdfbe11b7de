use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// A string that must never end up in logs or notifications.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret(***)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "***")
    }
}

/// The database being backed up.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Secret,
    /// Worker count handed to the dump tool in directory mode.
    pub parallel_jobs: u16,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            host: "localhost".to_string(),
            port: 5432,
            username: "postgres".to_string(),
            password: Secret::default(),
            parallel_jobs: 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Period {
    Minutes(u32),
    Hours(u32),
    Days(u32),
}

impl Period {
    pub fn as_seconds(&self) -> u64 {
        match self {
            Period::Minutes(n) => *n as u64 * 60,
            Period::Hours(n) => *n as u64 * 3600,
            Period::Days(n) => *n as u64 * 86400,
        }
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(self.as_seconds())
    }

    pub fn is_zero(&self) -> bool {
        self.as_seconds() == 0
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Period::Minutes(n) => write!(f, "{} minute(s)", n),
            Period::Hours(n) => write!(f, "{} hour(s)", n),
            Period::Days(n) => write!(f, "{} day(s)", n),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DumpStrategy {
    /// Plain-text dump piped straight into the compressor.
    Streamed,
    /// Directory-format dump with parallel workers, archived afterwards.
    #[default]
    Directory,
}

impl fmt::Display for DumpStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DumpStrategy::Streamed => write!(f, "streamed"),
            DumpStrategy::Directory => write!(f, "directory"),
        }
    }
}

/// Programs invoked by the dump pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub dump: String,
    pub compressor: String,
    pub archiver: String,
    /// Environment variable the dump tool reads its password from.
    pub password_env: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            dump: "pg_dump".to_string(),
            compressor: "xz".to_string(),
            archiver: "tar".to_string(),
            password_env: "PGPASSWORD".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupSettings {
    pub directory: PathBuf,
    pub retention: Period,
    pub strategy: DumpStrategy,
    pub compression_level: u8,
    pub step_timeout_secs: u64,
    /// Let the retention sweep remove working directories left behind by
    /// interrupted directory-format dumps.
    pub reclaim_stale_workdirs: bool,
    pub tools: ToolsConfig,
}

impl BackupSettings {
    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("backups"),
            retention: Period::Days(3),
            strategy: DumpStrategy::default(),
            compression_level: 5,
            step_timeout_secs: 6 * 3600,
            reclaim_stale_workdirs: true,
            tools: ToolsConfig::default(),
        }
    }
}

/// Discord-style webhook that receives status messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub webhook_url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub backup: BackupSettings,
    #[serde(default)]
    pub notification: Option<NotificationConfig>,
    /// Interval between runs in `schedule` mode.
    #[serde(default)]
    pub schedule: Option<Period>,
}
