//! Session-level errors.  Any of these ends the session; the driver logs
//! it and goes straight to cleanup.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("camera fault: {0:#}")]
    Camera(anyhow::Error),

    #[error("filesystem error on {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("storage authentication failed: {0:#}")]
    Auth(anyhow::Error),

    #[error("cannot resolve remote folder {name}: {source:#}")]
    Folder { name: String, source: anyhow::Error },

    #[error("compression failed for {path}: {source:#}")]
    Compression { path: PathBuf, source: anyhow::Error },
}

impl SessionError {
    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }
}

/// A single image that could not be uploaded.  Logged and skipped.
#[derive(Debug, thiserror::Error)]
#[error("upload of {name} failed: {source:#}")]
pub struct UploadError {
    pub name: String,
    pub source: anyhow::Error,
}
