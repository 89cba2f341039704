//! Upload pipeline – compress each captured image and send it to the
//! dated remote folder.
//!
//! Uploads are best-effort and independent: a failed upload is logged and
//! the batch moves on.  Anything else (folder resolution, compression,
//! reading the session directory) ends the session.

use std::path::{Path, PathBuf};

use tracing::{error, info};

use rowling_common::protocol::Phase;

use crate::compress::compress_in_place;
use crate::dashboard::StateReporter;
use crate::display::StatusBoard;
use crate::drive::RemoteStorage;
use crate::error::{SessionError, UploadError};

/// Outcome of one pass over the session directory.
#[derive(Debug, Default)]
pub struct UploadSummary {
    /// Files processed, successful or not.
    pub attempted: usize,
    pub uploaded: usize,
    pub failed: Vec<UploadError>,
}

/// Files in `dir`, in whatever order the filesystem lists them.
fn batch_files(dir: &Path) -> Result<Vec<PathBuf>, SessionError> {
    let entries = std::fs::read_dir(dir).map_err(|e| SessionError::filesystem(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| SessionError::filesystem(dir, e))?;
        let path = entry.path();
        if path.is_file() {
            files.push(path);
        }
    }
    Ok(files)
}

/// Run the pipeline over every file currently in `dir`.
pub fn upload_batch<S, R>(
    storage: &mut S,
    folder_name: &str,
    dir: &Path,
    quality: u8,
    reporter: &R,
    board: &StatusBoard,
) -> Result<UploadSummary, SessionError>
where
    S: RemoteStorage + ?Sized,
    R: StateReporter + ?Sized,
{
    let folder = storage
        .ensure_folder(folder_name)
        .map_err(|source| SessionError::Folder {
            name: folder_name.to_string(),
            source,
        })?;

    reporter.report(Phase::UploadingImages);
    board.show("Upload in", "progress");

    let files = batch_files(dir)?;
    info!("Uploading {} file(s) from {}", files.len(), dir.display());

    let mut summary = UploadSummary::default();
    for (index, path) in files.iter().enumerate() {
        let k = index + 1;
        let name = path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();

        let compression =
            compress_in_place(path, quality).map_err(|source| SessionError::Compression {
                path: path.clone(),
                source,
            })?;
        board.show(
            &format!("Image {k} size is"),
            &format!("reduced by {:.1}%", compression.reduction_pct()),
        );

        summary.attempted = k;
        match storage.upload(&folder, path, &name) {
            Ok(()) => {
                summary.uploaded += 1;
                board.show(&format!("Image {k} upload"), "successful!");
            }
            Err(source) => {
                let failure = UploadError { name, source };
                error!("Error uploading image: {failure}");
                summary.failed.push(failure);
            }
        }
    }

    board.show(&format!("{} images have", summary.attempted), " been uploaded!");
    info!(
        "Upload finished: {} attempted, {} uploaded, {} failed",
        summary.attempted,
        summary.uploaded,
        summary.failed.len()
    );
    Ok(summary)
}
