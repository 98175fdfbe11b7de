use crate::error::Result;
use chrono::{Local, NaiveDateTime};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const NAME_MARKER: &str = "_backup_";

pub fn timestamp_now() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Compressed plain-text dump.
    SqlXz,
    /// Compressed tarball of a directory-format dump.
    TarXz,
}

impl ArtifactKind {
    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactKind::SqlXz => "sql.xz",
            ArtifactKind::TarXz => "tar.xz",
        }
    }

    fn all() -> [ArtifactKind; 2] {
        [ArtifactKind::SqlXz, ArtifactKind::TarXz]
    }
}

/// `{db}_backup_{timestamp}`, shared by artifacts and working directories.
/// Always a single path component, whatever the database is called.
pub fn base_name(database: &str, timestamp: &str) -> String {
    format!("{}{}{}", file_component(database), NAME_MARKER, timestamp)
}

/// Postgres allows `/` in database names; it must not leak into paths.
fn file_component(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect()
}

pub fn file_name(database: &str, timestamp: &str, kind: ArtifactKind) -> String {
    format!("{}.{}", base_name(database, timestamp), kind.extension())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedName<'a> {
    pub database: &'a str,
    pub timestamp: NaiveDateTime,
    /// `None` for a working directory.
    pub kind: Option<ArtifactKind>,
}

/// Recognizes names produced by [`file_name`] and [`base_name`].
pub fn parse_name(name: &str) -> Option<ParsedName<'_>> {
    let (stem, kind) = ArtifactKind::all()
        .into_iter()
        .find_map(|kind| {
            name.strip_suffix(kind.extension())
                .and_then(|s| s.strip_suffix('.'))
                .map(|stem| (stem, Some(kind)))
        })
        .unwrap_or((name, None));

    let split = stem.rfind(NAME_MARKER)?;
    let database = &stem[..split];
    let timestamp = &stem[split + NAME_MARKER.len()..];
    if database.is_empty() {
        return None;
    }
    let timestamp = NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT).ok()?;

    Some(ParsedName {
        database,
        timestamp,
        kind,
    })
}

/// Whether `name` looks like a directory-format dump's working directory.
pub fn is_workdir_name(name: &str) -> bool {
    parse_name(name).is_some_and(|parsed| parsed.kind.is_none())
}

/// The single file a successful pipeline run leaves behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupArtifact {
    pub database: String,
    pub kind: ArtifactKind,
    pub path: PathBuf,
}

impl BackupArtifact {
    pub fn new(destination: &Path, database: &str, timestamp: &str, kind: ArtifactKind) -> Self {
        Self {
            database: database.to_string(),
            kind,
            path: destination.join(file_name(database, timestamp, kind)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactMetadata {
    pub size: u64,
    pub sha256: String,
}

pub fn describe(path: &Path) -> Result<ArtifactMetadata> {
    let size = std::fs::metadata(path)?.len();
    let sha256 = calculate_sha256(path)?;
    Ok(ArtifactMetadata { size, sha256 })
}

pub fn calculate_sha256(file_path: &Path) -> Result<String> {
    use sha2::{Digest, Sha256};

    let file = File::open(file_path)?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 64 * 1024];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    let hash = hasher.finalize();
    Ok(format!("{:x}", hash))
}
