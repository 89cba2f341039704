//! Capture loop – takes up to `max_images` zone-tagged stills at a fixed
//! cadence, stopping early when the session is asked to stop.
//!
//! The stop request is only honoured between images: a capture that has
//! begun always completes.

use std::path::Path;
use std::time::Duration;

use chrono::NaiveTime;
use rand::Rng;
use tracing::info;

use rowling_common::protocol::Phase;
use rowling_common::session::{ImageRecord, SessionState, ZoneAssignment};

use crate::camera::{Camera, Preview};
use crate::dashboard::StateReporter;
use crate::display::StatusBoard;
use crate::error::SessionError;

/// Knobs for one capture run.
#[derive(Debug, Clone)]
pub struct CapturePlan {
    pub max_images: u32,
    /// Pause after each capture (period minus estimated capture latency).
    pub cadence_sleep: Duration,
}

/// Run the capture loop into `dir`.  Preview runs for exactly the span of
/// the loop.  `clock` supplies the `HH:MM` label of each image.
#[allow(clippy::too_many_arguments)]
pub fn capture_images<C, R, G>(
    camera: &mut C,
    plan: &CapturePlan,
    dir: &Path,
    session: &SessionState,
    reporter: &R,
    board: &StatusBoard,
    rng: &mut G,
    mut clock: impl FnMut() -> NaiveTime,
) -> Result<Vec<ImageRecord>, SessionError>
where
    C: Camera,
    R: StateReporter + ?Sized,
    G: Rng + ?Sized,
{
    let mut preview = Preview::start(camera).map_err(SessionError::Camera)?;

    reporter.report(Phase::CollectingImages);

    let mut zones = ZoneAssignment::shuffled(plan.max_images, rng);
    let mut records = Vec::with_capacity(zones.len());

    while !session.is_stopping() {
        let Some(zone) = zones.next() else {
            break;
        };
        let record = ImageRecord::new(zone, clock(), dir);
        info!("Capturing zone {zone} → {}", record.path.display());
        preview
            .camera()
            .capture(&record.path)
            .map_err(SessionError::Camera)?;
        records.push(record);

        board.show(&format!("Image {} taken", records.len()), "successfully!");
        std::thread::sleep(plan.cadence_sleep);
    }

    if session.is_stopping() && zones.remaining() > 0 {
        info!("Capture interrupted after {} image(s)", records.len());
    }
    board.show(&format!("{} images taken", records.len()), "successfully!");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rowling_common::session::parse_image_file_name;

    use crate::testing::{FileCamera, RecordingDisplay, RecordingReporter};

    fn ten_thirty() -> NaiveTime {
        NaiveTime::from_hms_opt(10, 30, 0).unwrap()
    }

    fn plan(max_images: u32) -> CapturePlan {
        CapturePlan {
            max_images,
            cadence_sleep: Duration::ZERO,
        }
    }

    #[test]
    fn test_full_run_uses_every_zone_once() {
        let dir = tempfile::tempdir().unwrap();
        let session = SessionState::new();
        session.press();
        let (display, log) = RecordingDisplay::new(16);
        let board = StatusBoard::new(Box::new(display));
        let reporter = RecordingReporter::default();
        let mut camera = FileCamera::default();
        let mut rng = StdRng::seed_from_u64(3);

        let records = capture_images(
            &mut camera,
            &plan(5),
            dir.path(),
            &session,
            &reporter,
            &board,
            &mut rng,
            ten_thirty,
        )
        .unwrap();

        assert_eq!(records.len(), 5);
        let zones: HashSet<u32> = records.iter().map(|r| r.zone).collect();
        assert_eq!(zones, (1..=5).collect::<HashSet<u32>>());
        for record in &records {
            assert!(record.path.exists());
            let name = record.file_name();
            assert_eq!(parse_image_file_name(&name), Some((record.zone, "10:30")));
        }
        assert_eq!(reporter.phases(), vec![Phase::CollectingImages]);
        assert_eq!(camera.preview_starts, 1);
        assert!(!camera.previewing);
        assert_eq!(
            log.frames().last().unwrap(),
            &("5 images taken".to_string(), "successfully!".to_string())
        );
    }

    #[test]
    fn test_stop_after_k_images() {
        for k in 0..=4usize {
            let dir = tempfile::tempdir().unwrap();
            let session = Arc::new(SessionState::new());
            session.press();
            if k == 0 {
                session.press();
            }
            let (display, _log) = RecordingDisplay::new(16);
            let board = StatusBoard::new(Box::new(display));
            let mut camera = FileCamera::default();
            if k > 0 {
                camera.stop_after = Some((k, session.clone()));
            }
            let mut rng = StdRng::seed_from_u64(k as u64);

            let records = capture_images(
                &mut camera,
                &plan(4),
                dir.path(),
                &session,
                &RecordingReporter::default(),
                &board,
                &mut rng,
                ten_thirty,
            )
            .unwrap();

            assert_eq!(records.len(), k, "stop after {k}");
            assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), k);
            assert_eq!(camera.captures, k);
        }
    }

    #[test]
    fn test_camera_fault_stops_preview() {
        let dir = tempfile::tempdir().unwrap();
        let session = SessionState::new();
        session.press();
        let (display, _log) = RecordingDisplay::new(16);
        let board = StatusBoard::new(Box::new(display));
        let mut camera = FileCamera {
            fail_captures: true,
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(0);

        let err = capture_images(
            &mut camera,
            &plan(3),
            dir.path(),
            &session,
            &RecordingReporter::default(),
            &board,
            &mut rng,
            ten_thirty,
        )
        .unwrap_err();

        assert!(matches!(err, SessionError::Camera(_)));
        assert!(!camera.previewing);
    }
}
