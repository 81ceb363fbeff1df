// Turns an upload into a database file the rest of the pipeline can open.
// Every upload gets its own directory, so SQLite's -wal, -shm and -journal
// siblings go away together with the database when the request ends.
pub mod db_file;
pub mod script;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{PipelineConfig, UploadConfig};

/// Name prefix of every temporary upload directory this process creates.
pub const UPLOAD_PREFIX: &str = "nl-sqlite-";

#[derive(Error, Debug)]
pub enum AcquireError {
    #[error("Unsupported file type.")]
    UnsupportedFileType(String),

    #[error("SQL scripts are disabled, upload a .db file instead")]
    ScriptsDisabled,

    #[error("Uploaded file is empty")]
    EmptyUpload,

    #[error("No database uploaded")]
    MissingUpload,

    #[error("Error while creating temporary database: {0}")]
    TempFile(io::Error),

    #[error("Error while saving DB file: {0}")]
    SaveDbFile(io::Error),

    #[error("Error while processing SQL file: {0}")]
    ProcessScript(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Database,
    Script,
}

impl UploadKind {
    pub fn from_file_name(name: &str) -> Result<Self, AcquireError> {
        let extension = Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .ok_or_else(|| AcquireError::UnsupportedFileType(name.to_string()))?;

        match extension.to_lowercase().as_str() {
            "db" => Ok(UploadKind::Database),
            "sql" => Ok(UploadKind::Script),
            _ => Err(AcquireError::UnsupportedFileType(name.to_string())),
        }
    }
}

pub trait Materializer: Send + Sync {
    /// Fills `target`, an existing empty file, from the uploaded bytes.
    fn materialize(&self, bytes: &[u8], target: &Path) -> Result<(), AcquireError>;
}

/// Database a request runs against.
#[derive(Debug)]
pub enum AcquiredDatabase {
    /// Removed from disk, directory and all, when dropped.
    Temporary { _dir: TempDir, path: PathBuf },
    /// Configured database used when nothing was uploaded; never removed.
    Fixed(PathBuf),
}

impl AcquiredDatabase {
    pub fn path(&self) -> &Path {
        match self {
            AcquiredDatabase::Temporary { path, .. } => path.as_path(),
            AcquiredDatabase::Fixed(path) => path.as_path(),
        }
    }

    pub fn is_temporary(&self) -> bool {
        matches!(self, AcquiredDatabase::Temporary { .. })
    }
}

#[derive(Debug, Clone)]
pub struct Acquirer {
    db_file: db_file::DbFileMaterializer,
    script: script::ScriptMaterializer,
    temp_dir: PathBuf,
    accept_scripts: bool,
    default_database: Option<PathBuf>,
}

impl Acquirer {
    pub fn new(upload: &UploadConfig, pipeline: &PipelineConfig) -> Self {
        Self {
            db_file: db_file::DbFileMaterializer,
            script: script::ScriptMaterializer,
            temp_dir: upload.temp_dir.clone(),
            accept_scripts: pipeline.accept_scripts,
            default_database: pipeline.default_database.clone(),
        }
    }

    pub fn accepts_scripts(&self) -> bool {
        self.accept_scripts
    }

    /// Writes the upload to a fresh temporary database and returns it.
    pub fn acquire(&self, file_name: &str, bytes: &[u8]) -> Result<AcquiredDatabase, AcquireError> {
        let kind = UploadKind::from_file_name(file_name).inspect_err(|_| {
            warn!("Rejected upload '{}': unsupported extension", file_name);
        })?;
        if kind == UploadKind::Script && !self.accept_scripts {
            return Err(AcquireError::ScriptsDisabled);
        }
        if bytes.is_empty() {
            return Err(AcquireError::EmptyUpload);
        }

        fs::create_dir_all(&self.temp_dir).map_err(AcquireError::TempFile)?;
        let dir = tempfile::Builder::new()
            .prefix(UPLOAD_PREFIX)
            .tempdir_in(&self.temp_dir)
            .map_err(AcquireError::TempFile)?;
        let path = dir.path().join("upload.db");

        let materializer: &dyn Materializer = match kind {
            UploadKind::Database => &self.db_file,
            UploadKind::Script => &self.script,
        };
        // On error dir drops here and the partial file goes with it
        materializer.materialize(bytes, &path)?;

        info!(
            "Acquired {:?} upload '{}' ({} bytes) at {}",
            kind,
            file_name,
            bytes.len(),
            path.display()
        );
        Ok(AcquiredDatabase::Temporary { _dir: dir, path })
    }

    /// The configured database for requests without an upload.
    pub fn fallback(&self) -> Result<AcquiredDatabase, AcquireError> {
        match &self.default_database {
            Some(path) if path.exists() => {
                debug!("No upload, using default database {}", path.display());
                Ok(AcquiredDatabase::Fixed(path.clone()))
            }
            Some(path) => {
                warn!("Default database {} does not exist", path.display());
                Err(AcquireError::MissingUpload)
            }
            None => Err(AcquireError::MissingUpload),
        }
    }
}

/// Deletes upload directories and files left behind by an earlier run.
pub fn sweep_stale_uploads(dir: &Path) -> io::Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }

    let mut removed = 0;
    for entry in fs::read_dir(dir)?.filter_map(Result::ok) {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !name.starts_with(UPLOAD_PREFIX) {
            continue;
        }
        let path = entry.path();
        let removal = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        match removal {
            Ok(()) => removed += 1,
            Err(e) => warn!("Failed to remove stale upload {}: {}", name, e),
        }
    }

    if removed > 0 {
        info!("Removed {} stale uploads from {}", removed, dir.display());
    }
    Ok(removed)
}
