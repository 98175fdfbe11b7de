//! Dump, compress and (for directory-format dumps) archive one database.

use super::artifact::{base_name, ArtifactKind, BackupArtifact};
use super::command::{check_status, wait_with_timeout, Input, Output, ToolCommand};
use crate::config::{BackupSettings, DatabaseConfig, DumpStrategy, Secret};
use crate::error::{PipelineError, PipelineStep};
use std::io;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

pub struct DumpPipeline<'a> {
    settings: &'a BackupSettings,
}

impl<'a> DumpPipeline<'a> {
    pub fn new(settings: &'a BackupSettings) -> Self {
        Self { settings }
    }

    pub async fn run(
        &self,
        target: &DatabaseConfig,
        destination: &Path,
        timestamp: &str,
    ) -> Result<BackupArtifact, PipelineError> {
        info!(
            "Dumping database '{}' from {}:{} ({} strategy)",
            target.name, target.host, target.port, self.settings.strategy
        );

        match self.settings.strategy {
            DumpStrategy::Streamed => self.run_streamed(target, destination, timestamp).await,
            DumpStrategy::Directory => self.run_directory(target, destination, timestamp).await,
        }
    }

    fn step_timeout(&self) -> Duration {
        self.settings.step_timeout()
    }

    /// `pg_dump -h <host> -p <port> -U <user>` with the password as an
    /// environment override of this one process.
    fn base_dump_command(&self, target: &DatabaseConfig) -> ToolCommand {
        let tools = &self.settings.tools;
        let cmd = ToolCommand::new(&tools.dump)
            .arg("-h")
            .arg(&target.host)
            .arg("-p")
            .arg(target.port.to_string())
            .arg("-U")
            .arg(&target.username);

        // An empty password leaves authentication to ~/.pgpass.
        if target.password.is_empty() {
            cmd
        } else {
            cmd.env(&tools.password_env, target.password.clone())
        }
    }

    pub fn streamed_commands(
        &self,
        target: &DatabaseConfig,
        artifact: &BackupArtifact,
    ) -> (ToolCommand, ToolCommand) {
        let dump = self
            .base_dump_command(target)
            .operand(&target.name)
            .stdout(Output::Piped);

        let compress = ToolCommand::new(&self.settings.tools.compressor)
            .arg(format!("-{}", self.settings.compression_level))
            .stdin(Input::Piped)
            .stdout(Output::File(artifact.path.clone()));

        (dump, compress)
    }

    pub fn directory_commands(
        &self,
        target: &DatabaseConfig,
        destination: &Path,
        workdir_name: &str,
        artifact: &BackupArtifact,
    ) -> (ToolCommand, ToolCommand) {
        let dump = self
            .base_dump_command(target)
            .arg("--format=directory")
            .arg("-j")
            .arg(target.parallel_jobs.to_string())
            .arg("-f")
            .arg(destination.join(workdir_name))
            .operand(&target.name);

        let archive = ToolCommand::new(&self.settings.tools.archiver)
            .arg("-cJf")
            .arg(&artifact.path)
            .arg("-C")
            .arg(destination)
            .operand(workdir_name)
            .env(
                "XZ_OPT",
                Secret::new(format!("-{}", self.settings.compression_level)),
            );

        (dump, archive)
    }

    async fn run_streamed(
        &self,
        target: &DatabaseConfig,
        destination: &Path,
        timestamp: &str,
    ) -> Result<BackupArtifact, PipelineError> {
        let artifact = BackupArtifact::new(destination, &target.name, timestamp, ArtifactKind::SqlXz);
        let (dump_cmd, compress_cmd) = self.streamed_commands(target, &artifact);
        let limit = self.step_timeout();

        let mut dump = dump_cmd.spawn(PipelineStep::Dump)?;
        let mut compressor = match compress_cmd.spawn(PipelineStep::Compress) {
            Ok(child) => child,
            Err(e) => {
                let _ = dump.kill().await;
                return Err(e);
            }
        };

        let (Some(mut dump_out), Some(mut compress_in)) =
            (dump.stdout.take(), compressor.stdin.take())
        else {
            let _ = dump.kill().await;
            let _ = compressor.kill().await;
            return Err(PipelineError::io(
                PipelineStep::Compress,
                io::Error::new(io::ErrorKind::BrokenPipe, "pipe between dump and compressor is missing"),
            ));
        };

        // Closing the compressor's stdin once the dump is drained lets it finish.
        let pump = async move {
            let copied = tokio::io::copy(&mut dump_out, &mut compress_in).await;
            let _ = compress_in.shutdown().await;
            copied
        };

        let joined = tokio::time::timeout(limit, async {
            tokio::join!(pump, dump.wait(), compressor.wait())
        })
        .await;

        let (pumped, dump_status, compress_status) = match joined {
            Ok(results) => results,
            Err(_) => {
                let step = match dump.try_wait() {
                    Ok(Some(_)) => PipelineStep::Compress,
                    _ => PipelineStep::Dump,
                };
                warn!("{} step exceeded {}s, killing the pipeline", step, limit.as_secs());
                let _ = dump.kill().await;
                let _ = compressor.kill().await;
                return Err(PipelineError::timeout(step, limit));
            }
        };

        let dump_status = dump_status.map_err(|e| PipelineError::io(PipelineStep::Dump, e))?;
        let compress_status =
            compress_status.map_err(|e| PipelineError::io(PipelineStep::Compress, e))?;

        // A dying compressor usually takes the dump down with SIGPIPE, so a
        // signalled dump is attributed to the compressor when both failed.
        if dump_status.code().is_some() {
            check_status(PipelineStep::Dump, dump_status)?;
        }
        check_status(PipelineStep::Compress, compress_status)?;
        check_status(PipelineStep::Dump, dump_status)?;

        let bytes = pumped.map_err(|e| PipelineError::io(PipelineStep::Compress, e))?;
        debug!("Streamed {} bytes of dump output into the compressor", bytes);

        info!("Backup written to {}", artifact.path.display());
        Ok(artifact)
    }

    async fn run_directory(
        &self,
        target: &DatabaseConfig,
        destination: &Path,
        timestamp: &str,
    ) -> Result<BackupArtifact, PipelineError> {
        let artifact = BackupArtifact::new(destination, &target.name, timestamp, ArtifactKind::TarXz);
        let workdir_name = base_name(&target.name, timestamp);
        let workdir = destination.join(&workdir_name);
        let (dump_cmd, archive_cmd) =
            self.directory_commands(target, destination, &workdir_name, &artifact);
        let limit = self.step_timeout();

        if let Err(e) = dump_cmd.run(PipelineStep::Dump, limit).await {
            remove_workdir(&workdir).await;
            return Err(e);
        }
        debug!("Directory dump finished in {}", workdir.display());

        let archived = match archive_cmd.spawn(PipelineStep::Archive) {
            Ok(mut child) => wait_with_timeout(&mut child, PipelineStep::Archive, limit)
                .await
                .and_then(|status| check_status(PipelineStep::Archive, status)),
            Err(e) => Err(e),
        };
        remove_workdir(&workdir).await;
        archived?;

        info!("Backup written to {}", artifact.path.display());
        Ok(artifact)
    }
}

/// Best effort; a leftover directory is reclaimed by a later sweep.
async fn remove_workdir(workdir: &Path) {
    match tokio::fs::remove_dir_all(workdir).await {
        Ok(()) => debug!("Removed working directory {}", workdir.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(
            "Failed to remove working directory {}: {}",
            workdir.display(),
            e
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::testing::{tool_settings, write_script};
    use crate::error::PipelineErrorKind;
    use tempfile::tempdir;

    const PASSWORD_ENV: &str = "PG_XZ_BACKUP_TEST_PIPELINE_PASSWORD";

    fn target() -> DatabaseConfig {
        DatabaseConfig {
            name: "app".to_string(),
            password: Secret::new("hunter2"),
            parallel_jobs: 2,
            ..DatabaseConfig::default()
        }
    }

    fn settings(strategy: DumpStrategy, dump: &Path, compressor: &Path, archiver: &Path) -> BackupSettings {
        let mut settings = tool_settings(dump, compressor, archiver);
        settings.strategy = strategy;
        settings.tools.password_env = PASSWORD_ENV.to_string();
        settings
    }

    #[test]
    fn test_streamed_commands_follow_tool_contract() {
        let settings = BackupSettings::default();
        let pipeline = DumpPipeline::new(&settings);
        let artifact =
            BackupArtifact::new(Path::new("/backups"), "app", "20240101_120000", ArtifactKind::SqlXz);

        let (dump, compress) = pipeline.streamed_commands(&target(), &artifact);

        assert_eq!(
            dump.to_string(),
            "PGPASSWORD=*** pg_dump -h localhost -p 5432 -U postgres app"
        );
        assert_eq!(
            compress.to_string(),
            "xz -5 > /backups/app_backup_20240101_120000.sql.xz"
        );
    }

    #[test]
    fn test_directory_commands_follow_tool_contract() {
        let settings = BackupSettings::default();
        let pipeline = DumpPipeline::new(&settings);
        let artifact =
            BackupArtifact::new(Path::new("/backups"), "app", "20240101_120000", ArtifactKind::TarXz);

        let (dump, archive) = pipeline.directory_commands(
            &target(),
            Path::new("/backups"),
            "app_backup_20240101_120000",
            &artifact,
        );

        assert_eq!(
            dump.to_string(),
            "PGPASSWORD=*** pg_dump -h localhost -p 5432 -U postgres --format=directory -j 2 \
             -f /backups/app_backup_20240101_120000 app"
        );
        assert_eq!(
            archive.to_string(),
            "XZ_OPT=*** tar -cJf /backups/app_backup_20240101_120000.tar.xz -C /backups \
             app_backup_20240101_120000"
        );
        assert_eq!(archive.env_keys().collect::<Vec<_>>(), vec!["XZ_OPT"]);
    }

    #[test]
    fn test_empty_password_is_not_passed() {
        let settings = BackupSettings::default();
        let pipeline = DumpPipeline::new(&settings);
        let mut target = target();
        target.password = Secret::default();

        let dump = pipeline.base_dump_command(&target);
        assert_eq!(dump.env_keys().count(), 0);
    }

    #[tokio::test]
    async fn test_streamed_run_produces_artifact() {
        let tools = tempdir().unwrap();
        let dest = tempdir().unwrap();
        let dump = write_script(
            tools.path(),
            "dump",
            &format!("echo \"dump of $7 as $6\"\necho \"password=${}\"", PASSWORD_ENV),
        );
        let compressor = write_script(tools.path(), "compress", "cat");
        let settings = settings(DumpStrategy::Streamed, &dump, &compressor, Path::new("tar"));

        let artifact = DumpPipeline::new(&settings)
            .run(&target(), dest.path(), "20240101_120000")
            .await
            .unwrap();

        assert_eq!(
            artifact.path,
            dest.path().join("app_backup_20240101_120000.sql.xz")
        );
        let content = std::fs::read_to_string(&artifact.path).unwrap();
        assert!(content.contains("dump of app as postgres"));
        assert!(content.contains("password=hunter2"));
        assert!(std::env::var(PASSWORD_ENV).is_err());
    }

    #[tokio::test]
    async fn test_streamed_dump_failure_reports_dump_step() {
        let tools = tempdir().unwrap();
        let dest = tempdir().unwrap();
        let dump = write_script(tools.path(), "dump", "echo partial\nexit 1");
        let compressor = write_script(tools.path(), "compress", "cat");
        let settings = settings(DumpStrategy::Streamed, &dump, &compressor, Path::new("tar"));

        let err = DumpPipeline::new(&settings)
            .run(&target(), dest.path(), "20240101_120000")
            .await
            .unwrap_err();

        assert_eq!(err.step, PipelineStep::Dump);
        assert_eq!(err.exit_code(), Some(1));
        // The incomplete artifact is left for inspection.
        assert!(dest.path().join("app_backup_20240101_120000.sql.xz").exists());
    }

    #[tokio::test]
    async fn test_streamed_compressor_failure_reports_compress_step() {
        let tools = tempdir().unwrap();
        let dest = tempdir().unwrap();
        let dump = write_script(tools.path(), "dump", "echo data");
        let compressor = write_script(tools.path(), "compress", "cat > /dev/null\nexit 2");
        let settings = settings(DumpStrategy::Streamed, &dump, &compressor, Path::new("tar"));

        let err = DumpPipeline::new(&settings)
            .run(&target(), dest.path(), "20240101_120000")
            .await
            .unwrap_err();

        assert_eq!(err.step, PipelineStep::Compress);
        assert_eq!(err.exit_code(), Some(2));
    }

    #[tokio::test]
    async fn test_streamed_hang_times_out() {
        let tools = tempdir().unwrap();
        let dest = tempdir().unwrap();
        let dump = write_script(tools.path(), "dump", "exec sleep 30");
        let compressor = write_script(tools.path(), "compress", "cat");
        let mut settings = settings(DumpStrategy::Streamed, &dump, &compressor, Path::new("tar"));
        settings.step_timeout_secs = 1;

        let err = DumpPipeline::new(&settings)
            .run(&target(), dest.path(), "20240101_120000")
            .await
            .unwrap_err();

        assert_eq!(err.step, PipelineStep::Dump);
        assert!(matches!(err.kind, PipelineErrorKind::Timeout(_)));
    }

    /// Writes a marker file into the directory given with `-f`.
    const DIRECTORY_DUMP: &str = r#"while [ $# -gt 0 ]; do
  if [ "$1" = "-f" ]; then out="$2"; fi
  shift
done
mkdir "$out" && echo toc > "$out/toc.dat""#;

    /// `tar -cJf <archive> -C <dir> <name>`: records the archived entry.
    const FAKE_TAR: &str = r#"test -d "$4/$5" && echo "$5 level=$XZ_OPT" > "$2""#;

    #[tokio::test]
    async fn test_directory_run_archives_and_removes_workdir() {
        let tools = tempdir().unwrap();
        let dest = tempdir().unwrap();
        let dump = write_script(tools.path(), "dump", DIRECTORY_DUMP);
        let archiver = write_script(tools.path(), "tar", FAKE_TAR);
        let settings = settings(DumpStrategy::Directory, &dump, Path::new("xz"), &archiver);

        let artifact = DumpPipeline::new(&settings)
            .run(&target(), dest.path(), "20240101_120000")
            .await
            .unwrap();

        assert_eq!(artifact.kind, ArtifactKind::TarXz);
        assert_eq!(
            std::fs::read_to_string(&artifact.path).unwrap().trim(),
            "app_backup_20240101_120000 level=-5"
        );
        assert!(!dest.path().join("app_backup_20240101_120000").exists());
        let entries: Vec<_> = std::fs::read_dir(dest.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_directory_archive_failure_still_removes_workdir() {
        let tools = tempdir().unwrap();
        let dest = tempdir().unwrap();
        let dump = write_script(tools.path(), "dump", DIRECTORY_DUMP);
        let archiver = write_script(tools.path(), "tar", "exit 2");
        let settings = settings(DumpStrategy::Directory, &dump, Path::new("xz"), &archiver);

        let err = DumpPipeline::new(&settings)
            .run(&target(), dest.path(), "20240101_120000")
            .await
            .unwrap_err();

        assert_eq!(err.step, PipelineStep::Archive);
        assert_eq!(err.exit_code(), Some(2));
        assert!(!dest.path().join("app_backup_20240101_120000").exists());
    }

    #[tokio::test]
    async fn test_directory_dump_failure_removes_partial_workdir() {
        let tools = tempdir().unwrap();
        let dest = tempdir().unwrap();
        let dump = write_script(
            tools.path(),
            "dump",
            &format!("{}\nexit 1", DIRECTORY_DUMP),
        );
        let archiver = write_script(tools.path(), "tar", FAKE_TAR);
        let settings = settings(DumpStrategy::Directory, &dump, Path::new("xz"), &archiver);

        let err = DumpPipeline::new(&settings)
            .run(&target(), dest.path(), "20240101_120000")
            .await
            .unwrap_err();

        assert_eq!(err.step, PipelineStep::Dump);
        assert_eq!(err.exit_code(), Some(1));
        assert_eq!(std::fs::read_dir(dest.path()).unwrap().count(), 0);
    }
}
