//! Two-line status output.
//!
//! Every notable step of a session is announced as a pair of short lines.
//! The sink is purely a side effect: write failures are logged and
//! otherwise ignored so a flaky display can never abort a session.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use tracing::{info, warn};

/// A fixed-width character display with (at least) two rows.
pub trait CharDisplay: Send {
    fn clear(&mut self) -> Result<()>;

    /// Write `text` at the start of `row`.  Callers truncate to [`columns`].
    ///
    /// [`columns`]: CharDisplay::columns
    fn write_line(&mut self, row: usize, text: &str) -> Result<()>;

    fn columns(&self) -> usize;

    /// Clear, then write both lines truncated to the display width.
    fn show(&mut self, line1: &str, line2: &str) -> Result<()> {
        let width = self.columns();
        self.clear()?;
        self.write_line(0, &truncate(line1, width))?;
        self.write_line(1, &truncate(line2, width))
    }
}

pub fn truncate(text: &str, width: usize) -> String {
    text.chars().take(width).collect()
}

// ── log-backed display ───────────────────────────────────────────────────

/// Renders status pairs as log records.  Used when no LCD is attached.
pub struct LogDisplay {
    columns: usize,
    lines: [String; 2],
}

impl LogDisplay {
    pub fn new(columns: usize) -> Self {
        Self {
            columns,
            lines: Default::default(),
        }
    }
}

impl CharDisplay for LogDisplay {
    fn clear(&mut self) -> Result<()> {
        self.lines = Default::default();
        Ok(())
    }

    fn write_line(&mut self, row: usize, text: &str) -> Result<()> {
        if let Some(line) = self.lines.get_mut(row) {
            *line = text.to_string();
        }
        if row == 1 {
            info!("[display] {:<w$} | {}", self.lines[0], self.lines[1], w = self.columns);
        }
        Ok(())
    }

    fn columns(&self) -> usize {
        self.columns
    }
}

// ── shared handle ────────────────────────────────────────────────────────

/// Cloneable handle to the display, shared between the button thread and
/// the main sequence.
#[derive(Clone)]
pub struct StatusBoard {
    display: Arc<Mutex<Box<dyn CharDisplay>>>,
}

impl StatusBoard {
    pub fn new(display: Box<dyn CharDisplay>) -> Self {
        Self {
            display: Arc::new(Mutex::new(display)),
        }
    }

    /// Render a status pair, logging (not propagating) failures.
    pub fn show(&self, line1: &str, line2: &str) {
        let mut display = match self.display.lock() {
            Ok(d) => d,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = display.show(line1, line2) {
            warn!("Display write failed ({line1:?} / {line2:?}): {e:#}");
        }
    }
}
