//! Session model: trigger state, zone assignment and image records.
//!
//! A session is one run of the appliance from the start press to the
//! sign-off message.  The only state touched from outside the main
//! sequence is [`SessionState`], which the button thread advances.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};

use chrono::{DateTime, Local, NaiveTime, TimeZone};
use rand::seq::SliceRandom;
use rand::Rng;

/// Local session folder name, e.g. `Fri, 07 Jun 2024 16:06:43`.
pub const SESSION_DIR_FORMAT: &str = "%a, %d %b %Y %H:%M:%S";
/// Remote folder name, e.g. `2024-06-07`.
pub const REMOTE_FOLDER_FORMAT: &str = "%Y-%m-%d";
/// Capture-time label embedded in image names, e.g. `10:35`.
pub const TIME_LABEL_FORMAT: &str = "%H:%M";

// ── Trigger state ────────────────────────────────────────────────────────────

/// Where the session is in its start/stop life.  Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum TriggerState {
    Idle = 0,
    Started = 1,
    Stopping = 2,
}

impl TriggerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Started,
            _ => Self::Stopping,
        }
    }
}

/// What a button press did to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerAction {
    Start,
    Stop,
    /// The session already accepted both of its transitions.
    Ignored,
}

/// One-shot start/stop state shared between the button thread and the
/// main sequence.
#[derive(Debug, Default)]
pub struct SessionState {
    state: AtomicU8,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> TriggerState {
        TriggerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Advance on a debounced button press: `Idle → Started`, then
    /// `Started → Stopping`, then nothing.
    pub fn press(&self) -> TriggerAction {
        if self.advance(TriggerState::Idle, TriggerState::Started) {
            TriggerAction::Start
        } else if self.advance(TriggerState::Started, TriggerState::Stopping) {
            TriggerAction::Stop
        } else {
            TriggerAction::Ignored
        }
    }

    /// Ask a running session to wind down.  Returns the state observed
    /// before the call; an `Idle` session is left untouched.
    pub fn interrupt(&self) -> TriggerState {
        let before = self.state();
        if before == TriggerState::Started {
            self.advance(TriggerState::Started, TriggerState::Stopping);
        }
        before
    }

    /// True once the start press has been accepted (stays true while stopping).
    pub fn is_started(&self) -> bool {
        self.state() >= TriggerState::Started
    }

    pub fn is_stopping(&self) -> bool {
        self.state() == TriggerState::Stopping
    }

    fn advance(&self, from: TriggerState, to: TriggerState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

// ── Zone assignment ──────────────────────────────────────────────────────────

/// A random permutation of `1..=max` handed out one zone at a time, so no
/// zone repeats within a session.
#[derive(Debug, Clone)]
pub struct ZoneAssignment {
    zones: Vec<u32>,
    next: usize,
}

impl ZoneAssignment {
    pub fn shuffled<R: Rng + ?Sized>(max: u32, rng: &mut R) -> Self {
        let mut zones: Vec<u32> = (1..=max).collect();
        zones.shuffle(rng);
        Self { zones, next: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.zones.len() - self.next
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}

impl Iterator for ZoneAssignment {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        let zone = self.zones.get(self.next).copied()?;
        self.next += 1;
        Some(zone)
    }
}

// ── Image records ────────────────────────────────────────────────────────────

/// One captured photo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    pub zone: u32,
    /// `HH:MM` at capture time.
    pub time_label: String,
    pub path: PathBuf,
}

impl ImageRecord {
    pub fn new(zone: u32, taken_at: NaiveTime, dir: &Path) -> Self {
        let time_label = taken_at.format(TIME_LABEL_FORMAT).to_string();
        let path = dir.join(image_file_name(zone, &time_label));
        Self {
            zone,
            time_label,
            path,
        }
    }

    pub fn file_name(&self) -> String {
        image_file_name(self.zone, &self.time_label)
    }
}

/// `Zone_<zone>_<HH:MM>.jpg`
pub fn image_file_name(zone: u32, time_label: &str) -> String {
    format!("Zone_{zone}_{time_label}.jpg")
}

/// Parse `Zone_<zone>_<HH:MM>.jpg` back into its zone and time label.
pub fn parse_image_file_name(name: &str) -> Option<(u32, &str)> {
    let rest = name.strip_prefix("Zone_")?.strip_suffix(".jpg")?;
    let (zone, label) = rest.split_once('_')?;
    NaiveTime::parse_from_str(label, TIME_LABEL_FORMAT).ok()?;
    Some((zone.parse().ok()?, label))
}

// ── Folder naming ────────────────────────────────────────────────────────────

/// Local folder for a session started at `started_at`.
pub fn session_dir_name<Tz: TimeZone>(started_at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    started_at.format(SESSION_DIR_FORMAT).to_string()
}

/// Remote folder for uploads made at `now`.  Keyed by the upload date,
/// not the session start.
pub fn remote_folder_name<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    now.format(REMOTE_FOLDER_FORMAT).to_string()
}

/// Current local wall-clock time label.
pub fn current_time() -> NaiveTime {
    Local::now().time()
}
