//! Session driver – sequences capture and upload, and guarantees the
//! sign-off that ends every run.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Local};
use tracing::info;

use rowling_common::config::Config;
use rowling_common::protocol::Phase;
use rowling_common::session::{
    current_time, remote_folder_name, session_dir_name, ImageRecord, SessionState,
};

use crate::camera::Camera;
use crate::collect::{capture_images, CapturePlan};
use crate::dashboard::StateReporter;
use crate::display::StatusBoard;
use crate::drive::RemoteStorage;
use crate::error::SessionError;
use crate::upload::{upload_batch, UploadSummary};

#[derive(Debug)]
pub struct SessionSummary {
    pub dir: PathBuf,
    pub captured: Vec<ImageRecord>,
    pub upload: UploadSummary,
}

/// Block until the start press, polling every `poll`.
pub fn wait_for_start(session: &SessionState, board: &StatusBoard, poll: Duration) {
    board.show("Waiting button", "Press to start");
    while !session.is_started() {
        std::thread::sleep(poll);
    }
    info!("Session started");
}

/// Create the session folder under `base` and open it up to other users
/// (mode 0777) so it can be managed from the desktop.  Two sessions
/// started within the same second share a folder.
pub fn create_session_dir(base: &Path, started_at: &DateTime<Local>) -> Result<PathBuf, SessionError> {
    let dir = base.join(session_dir_name(started_at));
    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| SessionError::filesystem(&dir, e))?;
        std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o777))
            .map_err(|e| SessionError::filesystem(&dir, e))?;
    }
    info!("Session directory: {}", dir.display());
    Ok(dir)
}

/// Capture a batch, then authenticate with `connect` and upload it.
///
/// The capture folder is named after the session start; the remote folder
/// after the date at upload time.
pub fn run_session<C, S, R, F>(
    config: &Config,
    session: &SessionState,
    camera: &mut C,
    connect: F,
    reporter: &R,
    board: &StatusBoard,
) -> Result<SessionSummary, SessionError>
where
    C: Camera,
    S: RemoteStorage,
    R: StateReporter + ?Sized,
    F: FnOnce() -> Result<S>,
{
    let dir = create_session_dir(&config.base_dir, &Local::now())?;

    let plan = CapturePlan {
        max_images: config.max_images,
        cadence_sleep: config.cadence_sleep(),
    };
    let captured = capture_images(
        camera,
        &plan,
        &dir,
        session,
        reporter,
        board,
        &mut rand::rng(),
        current_time,
    )?;
    std::thread::sleep(config.message_hold());

    let mut storage = connect().map_err(SessionError::Auth)?;
    let folder_name = remote_folder_name(&Local::now());
    let upload = upload_batch(
        &mut storage,
        &folder_name,
        &dir,
        config.jpeg_quality,
        reporter,
        board,
    )?;

    Ok(SessionSummary {
        dir,
        captured,
        upload,
    })
}

/// Final report and sign-off.  Runs when dropped, so every exit from the
/// session (success, error or panic) ends on the same screen.
pub struct SignOff<'a, R: StateReporter + ?Sized> {
    reporter: &'a R,
    board: &'a StatusBoard,
}

impl<'a, R: StateReporter + ?Sized> SignOff<'a, R> {
    pub fn new(reporter: &'a R, board: &'a StatusBoard) -> Self {
        Self { reporter, board }
    }
}

impl<R: StateReporter + ?Sized> Drop for SignOff<'_, R> {
    fn drop(&mut self) {
        self.reporter.report(Phase::EvaluatingResults);
        self.board.show("Best wishes from", "   Rowling <3   ");
    }
}
