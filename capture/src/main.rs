//! Rowling capture unit – photographs a field plot zone by zone and ships
//! the batch to Drive.
//!
//! This binary:
//! 1. Reads configuration from `rowling.conf`
//! 2. Waits for network connectivity, then for the start button
//! 3. Captures a batch of zone-tagged stills until done or stopped
//! 4. Recompresses and uploads the batch to a dated Drive folder,
//!    reporting each phase to the dashboard.

mod button;
mod camera;
mod collect;
mod compress;
mod connectivity;
mod dashboard;
mod display;
mod drive;
mod error;
mod lcd;
mod lifecycle;
mod trigger;
mod upload;

#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info};

use rowling_common::config::{Config, DisplayKind};
use rowling_common::session::SessionState;

use crate::camera::RpiCamera;
use crate::connectivity::TcpProbe;
use crate::dashboard::Dashboard;
use crate::display::{CharDisplay, LogDisplay, StatusBoard};
use crate::drive::DriveClient;
use crate::lifecycle::SignOff;
use crate::trigger::{Shutdown, TriggerController};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // ── load config ──────────────────────────────────────────────────
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| Config::default_path().to_string());
    let config =
        rowling_common::config::load(&PathBuf::from(&config_path)).context("Config load failed")?;

    info!(
        "Rowling capture unit starting (max_images={}, base_dir={})",
        config.max_images,
        config.base_dir.display()
    );

    // ── display ──────────────────────────────────────────────────────
    let display: Box<dyn CharDisplay> = match config.display {
        DisplayKind::Lcd => Box::new(
            lcd::Lcd::open(
                config.lcd_i2c_bus,
                config.lcd_i2c_addr,
                config.lcd_cols,
                config.lcd_rows,
            )
            .context("Cannot initialise LCD")?,
        ),
        DisplayKind::Log => Box::new(LogDisplay::new(config.lcd_cols)),
    };
    let board = StatusBoard::new(display);

    // ── button ───────────────────────────────────────────────────────
    let session = Arc::new(SessionState::new());
    let trigger = TriggerController::new(
        session.clone(),
        board.clone(),
        Duration::from_millis(config.trigger_pause_ms),
    );
    let watcher = button::ButtonWatcher::spawn(
        &config.button_monitor_argv(),
        Duration::from_millis(config.button_debounce_ms),
        move || {
            trigger.on_press();
        },
    )?;

    // ── ctrl-c ───────────────────────────────────────────────────────
    let signal_session = session.clone();
    let monitor = watcher.handle();
    ctrlc::set_handler(move || match trigger::on_interrupt(&signal_session) {
        Shutdown::Exit => {
            info!("Shutdown signal received");
            monitor.release();
            std::process::exit(0);
        }
        Shutdown::Graceful => info!("Shutdown signal received, finishing capture"),
        Shutdown::AlreadyStopping => info!("Shutdown signal received, already stopping"),
    })
    .context("Cannot set Ctrl-C handler")?;

    // ── wait for network, then for the start press ───────────────────
    let mut probe = TcpProbe::new(
        config.connectivity_probe.clone(),
        Duration::from_secs(config.connectivity_timeout_secs),
    );
    connectivity::wait_for_network(
        &mut probe,
        &board,
        Duration::from_secs(config.connectivity_retry_secs),
    );
    std::thread::sleep(config.message_hold());

    lifecycle::wait_for_start(&session, &board, Duration::from_millis(config.start_poll_ms));

    // ── session ──────────────────────────────────────────────────────
    let reporter = Dashboard::new(config.dashboard_url.clone());
    let sign_off = SignOff::new(&reporter, &board);
    run(&config, &session, &reporter, &board);
    drop(sign_off);

    drop(watcher);
    info!("GPIO cleanup done");
    Ok(())
}

fn run(config: &Config, session: &SessionState, reporter: &Dashboard, board: &StatusBoard) {
    let mut camera = RpiCamera::new(
        &config.camera_still_cmd,
        &config.camera_preview_cmd,
        config.resolution,
    );
    let credentials = config.credentials_path();
    let parent_id = config.parent_folder_id();

    match lifecycle::run_session(
        config,
        session,
        &mut camera,
        || DriveClient::connect(&credentials, parent_id),
        reporter,
        board,
    ) {
        Ok(summary) => info!(
            "Session complete: {} captured, {}/{} uploaded into {}",
            summary.captured.len(),
            summary.upload.uploaded,
            summary.upload.attempted,
            summary.dir.display()
        ),
        Err(e) => {
            error!("An error occurred: {e}");
            std::thread::sleep(config.message_hold());
        }
    }
}
