//! Age-based expiry of backup artifacts.

use super::artifact::is_workdir_name;
use crate::error::RetentionError;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    pub max_age: Duration,
    /// Also remove `{db}_backup_{timestamp}` directories left behind by
    /// interrupted directory-format dumps.
    pub reclaim_stale_workdirs: bool,
}

#[derive(Debug, Default)]
pub struct SweepReport {
    /// Sorted paths of everything that was removed.
    pub deleted: Vec<PathBuf>,
    pub failures: Vec<RetentionError>,
}

impl SweepReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

pub fn sweep(directory: &Path, policy: RetentionPolicy) -> SweepReport {
    sweep_at(directory, policy, SystemTime::now())
}

/// Removes regular files in `directory` (not recursively) whose last
/// modification is more than `policy.max_age` before `now`.
pub fn sweep_at(directory: &Path, policy: RetentionPolicy, now: SystemTime) -> SweepReport {
    sweep_with(directory, policy, now, remove_entry)
}

fn remove_entry(path: &Path, is_dir: bool) -> io::Result<()> {
    if is_dir {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

fn sweep_with<F>(
    directory: &Path,
    policy: RetentionPolicy,
    now: SystemTime,
    mut remove: F,
) -> SweepReport
where
    F: FnMut(&Path, bool) -> io::Result<()>,
{
    let mut report = SweepReport::default();

    let entries = match fs::read_dir(directory) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("Backup directory {} does not exist yet", directory.display());
            return report;
        }
        Err(cause) => {
            warn!("Cannot list backup directory {}: {}", directory.display(), cause);
            report.failures.push(RetentionError {
                path: directory.to_path_buf(),
                cause,
            });
            return report;
        }
    };

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(cause) => {
                report.failures.push(RetentionError {
                    path: directory.to_path_buf(),
                    cause,
                });
                continue;
            }
        };
        let path = entry.path();

        // Symlinks are reported as neither file nor directory here and are left alone.
        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(cause) => {
                report.failures.push(RetentionError { path, cause });
                continue;
            }
        };

        let reclaimable_dir = metadata.is_dir()
            && policy.reclaim_stale_workdirs
            && entry.file_name().to_str().is_some_and(is_workdir_name);
        if !metadata.is_file() && !reclaimable_dir {
            continue;
        }

        let modified = match metadata.modified() {
            Ok(modified) => modified,
            Err(cause) => {
                report.failures.push(RetentionError { path, cause });
                continue;
            }
        };
        // Timestamps in the future count as brand new.
        let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
        if age <= policy.max_age {
            continue;
        }

        match remove(&path, metadata.is_dir()) {
            Ok(()) => {
                info!("Deleted: {}", path.display());
                report.deleted.push(path);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("{} vanished before it could be deleted", path.display());
            }
            Err(cause) => {
                warn!("Failed to delete {}: {}", path.display(), cause);
                report.failures.push(RetentionError { path, cause });
            }
        }
    }

    report.deleted.sort();
    report
}
