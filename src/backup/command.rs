//! Typed descriptions of the external tools the pipeline runs.
//!
//! A [`ToolCommand`] is validated before anything is spawned. Environment
//! overrides apply to the child only; the process environment is never
//! touched.

use crate::config::Secret;
use crate::error::{PipelineError, PipelineErrorKind, PipelineStep};
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::fs::File;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Null,
    Piped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    Inherit,
    Piped,
    /// Created (or truncated) right before the process starts.
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: OsString,
    args: Vec<OsString>,
    /// Indexes into `args` that are positional operands.
    operands: Vec<usize>,
    env: Vec<(String, Secret)>,
    stdin: Input,
    stdout: Output,
}

impl ToolCommand {
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: program.as_ref().to_os_string(),
            args: Vec::new(),
            operands: Vec::new(),
            env: Vec::new(),
            stdin: Input::Null,
            stdout: Output::Inherit,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    /// A positional argument; must not be mistakable for an option.
    pub fn operand(mut self, operand: impl AsRef<OsStr>) -> Self {
        self.operands.push(self.args.len());
        self.args.push(operand.as_ref().to_os_string());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: Secret) -> Self {
        self.env.push((key.into(), value));
        self
    }

    pub fn stdin(mut self, stdin: Input) -> Self {
        self.stdin = stdin;
        self
    }

    pub fn stdout(mut self, stdout: Output) -> Self {
        self.stdout = stdout;
        self
    }

    #[cfg(test)]
    pub fn env_keys(&self) -> impl Iterator<Item = &str> {
        self.env.iter().map(|(k, _)| k.as_str())
    }

    pub fn validate(&self) -> Result<(), String> {
        let program = self.program.to_string_lossy();
        if program.trim().is_empty() {
            return Err("program is empty".to_string());
        }
        if program.contains('\0') {
            return Err("program contains a NUL byte".to_string());
        }
        for arg in &self.args {
            if arg.to_string_lossy().contains('\0') {
                return Err(format!("argument {:?} contains a NUL byte", arg));
            }
        }
        for &index in &self.operands {
            let operand = self.args[index].to_string_lossy();
            if operand.is_empty() {
                return Err("operand is empty".to_string());
            }
            if operand.starts_with('-') {
                return Err(format!("operand {:?} would be read as an option", operand));
            }
        }
        for (key, value) in &self.env {
            if key.is_empty() || key.contains('=') || key.contains('\0') {
                return Err(format!("invalid environment variable name {:?}", key));
            }
            if value.expose().contains('\0') {
                return Err(format!("value of {} contains a NUL byte", key));
            }
        }
        Ok(())
    }

    fn to_command(&self) -> std::io::Result<Command> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).kill_on_drop(true);

        for (key, value) in &self.env {
            cmd.env(key, value.expose());
        }

        cmd.stdin(match self.stdin {
            Input::Null => Stdio::null(),
            Input::Piped => Stdio::piped(),
        });
        match &self.stdout {
            Output::Inherit => {
                cmd.stdout(Stdio::inherit());
            }
            Output::Piped => {
                cmd.stdout(Stdio::piped());
            }
            Output::File(path) => {
                cmd.stdout(File::create(path)?);
            }
        }

        Ok(cmd)
    }

    pub fn spawn(&self, step: PipelineStep) -> Result<Child, PipelineError> {
        self.validate()
            .map_err(|msg| PipelineError::new(step, PipelineErrorKind::InvalidCommand(msg)))?;

        debug!("Starting {} step: {}", step, self);
        let mut cmd = self.to_command().map_err(|e| PipelineError::io(step, e))?;
        cmd.spawn()
            .map_err(|e| PipelineError::new(step, PipelineErrorKind::Spawn(e)))
    }

    /// Spawns the tool and waits for it, killing it once `limit` elapses.
    pub async fn run(&self, step: PipelineStep, limit: Duration) -> Result<(), PipelineError> {
        let mut child = self.spawn(step)?;
        let status = wait_with_timeout(&mut child, step, limit).await?;
        check_status(step, status)
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.env {
            write!(f, "{}={} ", key, value)?;
        }
        write!(f, "{}", self.program.to_string_lossy())?;
        for arg in &self.args {
            let arg = arg.to_string_lossy();
            if arg.contains(char::is_whitespace) {
                write!(f, " {:?}", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        if let Output::File(path) = &self.stdout {
            write!(f, " > {}", path.display())?;
        }
        Ok(())
    }
}

pub async fn wait_with_timeout(
    child: &mut Child,
    step: PipelineStep,
    limit: Duration,
) -> Result<ExitStatus, PipelineError> {
    match tokio::time::timeout(limit, child.wait()).await {
        Ok(Ok(status)) => Ok(status),
        Ok(Err(e)) => Err(PipelineError::io(step, e)),
        Err(_) => {
            warn!("{} step exceeded {}s, killing it", step, limit.as_secs());
            let _ = child.kill().await;
            Err(PipelineError::timeout(step, limit))
        }
    }
}

pub fn check_status(step: PipelineStep, status: ExitStatus) -> Result<(), PipelineError> {
    if status.success() {
        Ok(())
    } else {
        Err(PipelineError::exit(step, status.code()))
    }
}
