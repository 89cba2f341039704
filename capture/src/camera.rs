//! Camera – drives the Raspberry Pi camera stack through the `rpicam-*`
//! command-line apps.
//!
//! Preview is a long-running child process; each still is a separate
//! blocking invocation that writes a JPEG to the requested path.

use std::path::Path;
use std::process::{Child, Command, Stdio};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

pub trait Camera {
    fn start_preview(&mut self) -> Result<()>;
    fn stop_preview(&mut self) -> Result<()>;
    /// Capture one frame to `path`.  Blocks until the file is written.
    fn capture(&mut self, path: &Path) -> Result<()>;
}

pub struct RpiCamera {
    still_cmd: String,
    preview_cmd: String,
    resolution: (u32, u32),
    preview: Option<Child>,
}

impl RpiCamera {
    pub fn new(still_cmd: &str, preview_cmd: &str, resolution: (u32, u32)) -> Self {
        Self {
            still_cmd: still_cmd.to_string(),
            preview_cmd: preview_cmd.to_string(),
            resolution,
            preview: None,
        }
    }
}

impl Camera for RpiCamera {
    fn start_preview(&mut self) -> Result<()> {
        if self.preview.is_some() {
            return Ok(());
        }
        let child = Command::new(&self.preview_cmd)
            .args(["-t", "0"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to spawn {}", self.preview_cmd))?;
        info!("Camera preview started (pid={})", child.id());
        self.preview = Some(child);
        Ok(())
    }

    fn stop_preview(&mut self) -> Result<()> {
        if let Some(mut child) = self.preview.take() {
            child.kill().ok();
            child.wait().context("Cannot reap preview process")?;
            info!("Camera preview stopped");
        }
        Ok(())
    }

    fn capture(&mut self, path: &Path) -> Result<()> {
        let (width, height) = self.resolution;
        let output = Command::new(&self.still_cmd)
            .args([
                "-n",
                "--immediate",
                "--width",
                &width.to_string(),
                "--height",
                &height.to_string(),
                "-o",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("Failed to spawn {}", self.still_cmd))?;

        if !output.status.success() {
            anyhow::bail!(
                "{} exited with {}: {}",
                self.still_cmd,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        if !path.exists() {
            anyhow::bail!("{} reported success but {} is missing", self.still_cmd, path.display());
        }
        debug!("Captured {}", path.display());
        Ok(())
    }
}

impl Drop for RpiCamera {
    fn drop(&mut self) {
        if let Err(e) = self.stop_preview() {
            warn!("Camera release: {e:#}");
        }
    }
}

/// Live preview scoped to a borrow of the camera: started on creation,
/// stopped when dropped, whichever way the scope is left.
pub struct Preview<'a, C: Camera> {
    camera: &'a mut C,
}

impl<'a, C: Camera> Preview<'a, C> {
    pub fn start(camera: &'a mut C) -> Result<Self> {
        camera.start_preview()?;
        Ok(Self { camera })
    }

    pub fn camera(&mut self) -> &mut C {
        &mut *self.camera
    }
}

impl<C: Camera> Drop for Preview<'_, C> {
    fn drop(&mut self) {
        if let Err(e) = self.camera.stop_preview() {
            warn!("Cannot stop preview: {e:#}");
        }
    }
}
