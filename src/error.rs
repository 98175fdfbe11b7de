use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug)]
pub enum BackupError {
    Config(String),
    Pipeline(PipelineError),
    Notification(String),
    Io(io::Error),
    Serialization(String),
}

impl fmt::Display for BackupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackupError::Config(msg) => write!(f, "Configuration error: {}", msg),
            BackupError::Pipeline(err) => write!(f, "Pipeline error: {}", err),
            BackupError::Notification(msg) => write!(f, "Notification error: {}", msg),
            BackupError::Io(err) => write!(f, "IO error: {}", err),
            BackupError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for BackupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BackupError::Io(err) => Some(err),
            BackupError::Pipeline(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for BackupError {
    fn from(err: io::Error) -> Self {
        BackupError::Io(err)
    }
}

impl From<PipelineError> for BackupError {
    fn from(err: PipelineError) -> Self {
        BackupError::Pipeline(err)
    }
}

impl From<toml::de::Error> for BackupError {
    fn from(err: toml::de::Error) -> Self {
        BackupError::Serialization(err.to_string())
    }
}

impl From<toml::ser::Error> for BackupError {
    fn from(err: toml::ser::Error) -> Self {
        BackupError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for BackupError {
    fn from(err: reqwest::Error) -> Self {
        BackupError::Notification(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;

/// The external process step of the dump pipeline that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStep {
    Dump,
    Compress,
    Archive,
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineStep::Dump => write!(f, "dump"),
            PipelineStep::Compress => write!(f, "compress"),
            PipelineStep::Archive => write!(f, "archive"),
        }
    }
}

#[derive(Debug)]
pub enum PipelineErrorKind {
    /// The tool exited unsuccessfully. `None` means it was killed by a signal.
    Exit { code: Option<i32> },
    Timeout(Duration),
    Spawn(io::Error),
    Io(io::Error),
    InvalidCommand(String),
}

#[derive(Debug)]
pub struct PipelineError {
    pub step: PipelineStep,
    pub kind: PipelineErrorKind,
}

impl PipelineError {
    pub fn new(step: PipelineStep, kind: PipelineErrorKind) -> Self {
        Self { step, kind }
    }

    pub fn exit(step: PipelineStep, code: Option<i32>) -> Self {
        Self::new(step, PipelineErrorKind::Exit { code })
    }

    pub fn timeout(step: PipelineStep, limit: Duration) -> Self {
        Self::new(step, PipelineErrorKind::Timeout(limit))
    }

    pub fn io(step: PipelineStep, err: io::Error) -> Self {
        Self::new(step, PipelineErrorKind::Io(err))
    }

    /// Exit code of the failing step, if it exited normally.
    pub fn exit_code(&self) -> Option<i32> {
        match self.kind {
            PipelineErrorKind::Exit { code } => code,
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.kind, PipelineErrorKind::Timeout(_))
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            PipelineErrorKind::Exit { code: Some(code) } => {
                write!(f, "{} step exited with status {}", self.step, code)
            }
            PipelineErrorKind::Exit { code: None } => {
                write!(f, "{} step was terminated by a signal", self.step)
            }
            PipelineErrorKind::Timeout(limit) => {
                write!(f, "{} step timed out after {}s", self.step, limit.as_secs())
            }
            PipelineErrorKind::Spawn(err) => {
                write!(f, "{} step could not be started: {}", self.step, err)
            }
            PipelineErrorKind::Io(err) => write!(f, "{} step I/O failure: {}", self.step, err),
            PipelineErrorKind::InvalidCommand(msg) => {
                write!(f, "{} step has an invalid command: {}", self.step, msg)
            }
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            PipelineErrorKind::Spawn(err) | PipelineErrorKind::Io(err) => Some(err),
            _ => None,
        }
    }
}

/// A single backup directory entry that could not be removed.
#[derive(Debug)]
pub struct RetentionError {
    pub path: PathBuf,
    pub cause: io::Error,
}

impl fmt::Display for RetentionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Failed to remove {}: {}", self.path.display(), self.cause)
    }
}

impl std::error::Error for RetentionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.cause)
    }
}
