//! Button edge source – runs a libgpiod line monitor as a child process.
//!
//! `gpiomon` prints one line per detected edge.  A reader thread turns
//! those lines into calls to the trigger handler, dropping edges that
//! fall inside the refractory window.

use std::io::{BufRead, BufReader};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};

/// Accepts at most one edge per `window`.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    last: Option<Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    pub fn accept(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.window => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

/// How long the monitor gets to fail on a bad chip or busy line before it
/// counts as running.
const MONITOR_GRACE: Duration = Duration::from_millis(200);

/// Shared handle on the monitor child.  Releasing it kills the child;
/// only the first release does anything.
#[derive(Clone)]
pub struct MonitorHandle {
    child: Arc<Mutex<Child>>,
    released: Arc<AtomicBool>,
}

impl MonitorHandle {
    pub fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut child = self.child.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = child.kill() {
            warn!("Cannot stop button monitor: {e}");
        }
        child.wait().ok();
        info!("Button monitor released");
    }

    fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Called once the monitor's stdout closes.
    fn report_exit(&self) {
        if self.is_released() {
            debug!("Button monitor stream ended");
            return;
        }
        let mut child = self.child.lock().unwrap_or_else(|e| e.into_inner());
        match child.try_wait() {
            Ok(Some(status)) => {
                error!("Button monitor exited with {status}; button presses are no longer seen")
            }
            Ok(None) => error!("Button monitor closed its output; button presses are no longer seen"),
            Err(e) => error!("Button monitor stream ended, status unknown: {e}"),
        }
    }
}

/// Owns the monitor process and its reader thread.  Dropping it releases
/// the line: the child is killed and the thread joined.
pub struct ButtonWatcher {
    handle: MonitorHandle,
    reader: Option<JoinHandle<()>>,
}

impl ButtonWatcher {
    /// Spawn `argv` and call `on_press` for every debounced edge.  Fails if
    /// the monitor cannot start or exits straight away.
    pub fn spawn<F>(argv: &[String], debounce: Duration, mut on_press: F) -> Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let (program, args) = argv
            .split_first()
            .context("Empty button monitor command")?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("Failed to spawn button monitor: {}", argv.join(" ")))?;

        let stdout = child
            .stdout
            .take()
            .context("Button monitor has no stdout")?;

        std::thread::sleep(MONITOR_GRACE);
        match child.try_wait() {
            Ok(Some(status)) => {
                anyhow::bail!(
                    "Button monitor exited immediately with {status}; check GPIO_CHIP and BUTTON_PIN ({})",
                    argv.join(" ")
                );
            }
            Ok(None) => {}
            Err(e) => warn!("Cannot check button monitor status: {e}"),
        }

        let pid = child.id();
        let handle = MonitorHandle {
            child: Arc::new(Mutex::new(child)),
            released: Arc::new(AtomicBool::new(false)),
        };

        let watch = handle.clone();
        let reader = std::thread::Builder::new()
            .name("button".into())
            .spawn(move || {
                let mut debouncer = Debouncer::new(debounce);
                for line in BufReader::new(stdout).lines() {
                    match line {
                        Ok(l) if l.trim().is_empty() => {}
                        Ok(l) => {
                            if debouncer.accept(Instant::now()) {
                                debug!("Button edge: {l}");
                                on_press();
                            } else {
                                debug!("Button edge inside refractory window, ignored");
                            }
                        }
                        Err(_) => break,
                    }
                }
                watch.report_exit();
            });
        let reader = match reader {
            Ok(reader) => reader,
            Err(e) => {
                handle.release();
                return Err(e).context("Cannot spawn button thread");
            }
        };

        info!("Button monitor started (pid={pid}): {}", argv.join(" "));

        Ok(Self {
            handle,
            reader: Some(reader),
        })
    }

    /// Handle that can release the monitor from outside the main sequence
    /// (the signal handler).
    pub fn handle(&self) -> MonitorHandle {
        self.handle.clone()
    }
}

impl Drop for ButtonWatcher {
    fn drop(&mut self) {
        self.handle.release();
        if let Some(reader) = self.reader.take() {
            reader.join().ok();
        }
    }
}
