use crate::config::{AppConfig, BackupSettings, DatabaseConfig, DumpStrategy, Secret};
use std::fs::File;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

const READY_ARG: &str = "--ready-check";
const ETXTBSY: i32 = 26;

/// Writes an executable `sh` script standing in for an external tool.
///
/// Returns only once the script can be executed: a test thread forking
/// while the write handle was open keeps it alive until its `exec`, and
/// running the script meanwhile fails with `ETXTBSY`.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    {
        let mut file = File::create(&path).unwrap();
        write!(
            file,
            "#!/bin/sh\n[ \"$1\" = {} ] && exit 0\n{}\n",
            READY_ARG, body
        )
        .unwrap();
        file.set_permissions(std::fs::Permissions::from_mode(0o755))
            .unwrap();
        file.sync_all().unwrap();
    }
    wait_until_executable(&path);
    path
}

fn wait_until_executable(path: &Path) {
    for _ in 0..100 {
        match Command::new(path).arg(READY_ARG).status() {
            Ok(status) => {
                assert!(status.success(), "{} failed its ready check", path.display());
                return;
            }
            Err(e) if e.raw_os_error() == Some(ETXTBSY) => {
                std::thread::sleep(Duration::from_millis(10))
            }
            Err(e) => panic!("cannot execute {}: {}", path.display(), e),
        }
    }
    panic!("{} stayed busy", path.display());
}

pub fn tool_settings(dump: &Path, compressor: &Path, archiver: &Path) -> BackupSettings {
    let mut settings = BackupSettings::default();
    settings.tools.dump = dump.display().to_string();
    settings.tools.compressor = compressor.display().to_string();
    settings.tools.archiver = archiver.display().to_string();
    settings.step_timeout_secs = 30;
    settings
}

/// Streamed-strategy config for database `app` writing into `destination`.
pub fn test_config(destination: &Path, dump: &Path, compressor: &Path) -> AppConfig {
    let mut backup = tool_settings(dump, compressor, Path::new("tar"));
    backup.directory = destination.to_path_buf();
    backup.strategy = DumpStrategy::Streamed;
    backup.tools.password_env = "PG_XZ_BACKUP_TEST_JOB_PASSWORD".to_string();

    AppConfig {
        database: DatabaseConfig {
            name: "app".to_string(),
            password: Secret::new("hunter2"),
            ..DatabaseConfig::default()
        },
        backup,
        notification: None,
        schedule: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_scripts_written_concurrently_are_runnable() {
        let dir = tempdir().unwrap();

        std::thread::scope(|scope| {
            for i in 0..8 {
                let dir = dir.path();
                scope.spawn(move || {
                    let script = write_script(dir, &format!("tool{}", i), "echo ran");
                    let output = Command::new(&script).arg("-h").output().unwrap();
                    assert!(output.status.success());
                    assert_eq!(output.stdout, b"ran\n");
                });
            }
        });
    }
}
