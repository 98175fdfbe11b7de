use super::artifact::{self, ArtifactMetadata, BackupArtifact};
use super::outcome::RunOutcome;
use super::pipeline::DumpPipeline;
use super::retention::{self, RetentionPolicy, SweepReport};
use crate::config::AppConfig;
use crate::error::Result;
use crate::notify::Notifier;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{error, info, warn};

#[derive(Debug)]
pub struct BackupResult {
    pub database: String,

    pub success: bool,

    pub artifact: Option<BackupArtifact>,

    pub metadata: Option<ArtifactMetadata>,

    /// Old backups removed by the retention sweep of this run.
    pub deleted: Vec<PathBuf>,

    pub duration_secs: u64,

    pub error: Option<String>,
}

impl BackupResult {
    pub fn exit_code(&self) -> i32 {
        if self.success {
            0
        } else {
            1
        }
    }
}

/// Runs one backup: notify start, ensure the destination, expire old
/// backups, dump, then notify success or failure. Never panics on tool
/// failure; the outcome is carried in the returned [`BackupResult`].
pub async fn execute_backup(config: &AppConfig, notifier: &Notifier) -> BackupResult {
    let start = Instant::now();
    let database = config.database.name.clone();

    info!("Starting backup of database '{}'", database);
    notifier
        .notify(
            &RunOutcome::Started {
                database: database.clone(),
            }
            .message(),
        )
        .await;

    let mut deleted = Vec::new();
    let outcome = run_stages(config, notifier, &mut deleted).await;
    let duration_secs = start.elapsed().as_secs();

    match outcome {
        Ok((artifact, metadata)) => {
            info!(
                "Backup of '{}' completed in {} sec: {}",
                database,
                duration_secs,
                artifact.path.display()
            );
            notifier
                .notify(
                    &RunOutcome::Success {
                        artifact: artifact.clone(),
                        metadata: metadata.clone(),
                    }
                    .message(),
                )
                .await;

            BackupResult {
                database,
                success: true,
                artifact: Some(artifact),
                metadata,
                deleted,
                duration_secs,
                error: None,
            }
        }
        Err(e) => {
            error!("Backup of '{}' failed: {}", database, e);
            notifier
                .notify(
                    &RunOutcome::Failure {
                        database: database.clone(),
                        error: e.to_string(),
                    }
                    .message(),
                )
                .await;

            BackupResult {
                database,
                success: false,
                artifact: None,
                metadata: None,
                deleted,
                duration_secs,
                error: Some(e.to_string()),
            }
        }
    }
}

async fn run_stages(
    config: &AppConfig,
    notifier: &Notifier,
    deleted: &mut Vec<PathBuf>,
) -> Result<(BackupArtifact, Option<ArtifactMetadata>)> {
    let destination = &config.backup.directory;
    tokio::fs::create_dir_all(destination).await?;

    let report = sweep_destination(config).await;
    for failure in &report.failures {
        warn!("Retention sweep: {}", failure);
    }
    if report.deleted.is_empty() {
        info!(
            "No backups older than {} to delete",
            config.backup.retention
        );
    } else {
        notifier
            .notify(
                &RunOutcome::CleanupReport {
                    deleted: report.deleted.clone(),
                }
                .message(),
            )
            .await;
    }
    *deleted = report.deleted;

    let timestamp = artifact::timestamp_now();
    let artifact = DumpPipeline::new(&config.backup)
        .run(&config.database, destination, &timestamp)
        .await?;

    let metadata = describe_artifact(&artifact).await;
    Ok((artifact, metadata))
}

fn retention_policy(config: &AppConfig) -> RetentionPolicy {
    RetentionPolicy {
        max_age: config.backup.retention.as_duration(),
        reclaim_stale_workdirs: config.backup.reclaim_stale_workdirs,
    }
}

/// Runs the retention sweep off the async runtime.
pub async fn sweep_destination(config: &AppConfig) -> SweepReport {
    let directory = config.backup.directory.clone();
    let policy = retention_policy(config);
    match tokio::task::spawn_blocking(move || retention::sweep(&directory, policy)).await {
        Ok(report) => report,
        Err(e) => {
            warn!("Retention sweep task failed: {}", e);
            SweepReport::default()
        }
    }
}

/// Size and checksum are informational; failing to compute them does not
/// fail the run.
async fn describe_artifact(artifact: &BackupArtifact) -> Option<ArtifactMetadata> {
    let path = artifact.path.clone();
    match tokio::task::spawn_blocking(move || artifact::describe(&path)).await {
        Ok(Ok(metadata)) => Some(metadata),
        Ok(Err(e)) => {
            warn!("Could not checksum {}: {}", artifact.path.display(), e);
            None
        }
        Err(e) => {
            warn!("Checksum task failed: {}", e);
            None
        }
    }
}
