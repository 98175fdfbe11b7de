use super::artifact::{ArtifactMetadata, BackupArtifact};
use std::path::PathBuf;

/// A lifecycle event of one backup run, rendered as a notification.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Started {
        database: String,
    },
    CleanupReport {
        deleted: Vec<PathBuf>,
    },
    Success {
        artifact: BackupArtifact,
        metadata: Option<ArtifactMetadata>,
    },
    Failure {
        database: String,
        error: String,
    },
}

impl RunOutcome {
    pub fn message(&self) -> String {
        match self {
            RunOutcome::Started { database } => {
                format!("📦 PostgreSQL backup of `{}` started.", database)
            }
            RunOutcome::CleanupReport { deleted } => {
                let lines: Vec<String> = deleted
                    .iter()
                    .map(|path| format!(" - `{}`", path.display()))
                    .collect();
                format!("🗑️ Deleted old backup files:\n{}", lines.join("\n"))
            }
            RunOutcome::Success { artifact, metadata } => {
                let mut message = format!(
                    "🎉 PostgreSQL backup succeeded!\n\
                     **Database:** `{}`\n\
                     **Location:** `{}`",
                    artifact.database,
                    artifact.path.display()
                );
                if let Some(metadata) = metadata {
                    message.push_str(&format!(
                        "\n**File Size:** {:.2} MB\n**SHA256:** `{}`",
                        metadata.size as f64 / 1024.0 / 1024.0,
                        metadata.sha256
                    ));
                }
                message
            }
            RunOutcome::Failure { database, error } => {
                format!("⚠️ PostgreSQL backup of `{}` failed: {}", database, error)
            }
        }
    }
}
