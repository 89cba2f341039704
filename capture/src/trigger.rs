//! Trigger controller – turns debounced button presses into session
//! start/stop transitions.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use rowling_common::session::{SessionState, TriggerAction, TriggerState};

use crate::display::StatusBoard;

pub struct TriggerController {
    session: Arc<SessionState>,
    board: StatusBoard,
    /// Keeps the message on screen long enough to be read.
    pause: Duration,
}

impl TriggerController {
    pub fn new(session: Arc<SessionState>, board: StatusBoard, pause: Duration) -> Self {
        Self {
            session,
            board,
            pause,
        }
    }

    /// Handle one press.  The message goes up before the state moves, so
    /// the main sequence never runs ahead of the screen.  Never fails.
    pub fn on_press(&self) -> TriggerAction {
        let action = match self.session.state() {
            TriggerState::Idle => {
                info!("Button: starting capture");
                self.board.show("Starting capture", "");
                self.session.press()
            }
            TriggerState::Started => {
                info!("Button: stopping capture");
                self.board.show("Stopping capture", "due to interrupt!");
                self.session.press()
            }
            TriggerState::Stopping => {
                info!("Button: session already stopping, press ignored");
                return TriggerAction::Ignored;
            }
        };
        std::thread::sleep(self.pause);
        action
    }
}

/// What the process does on Ctrl-C / SIGTERM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    /// No session yet: release the button monitor and exit.
    Exit,
    /// Capture stops after the current image; upload and sign-off still run.
    Graceful,
    /// A stop is already under way; keep going to the normal cleanup.
    AlreadyStopping,
}

pub fn on_interrupt(session: &SessionState) -> Shutdown {
    match session.interrupt() {
        TriggerState::Idle => Shutdown::Exit,
        TriggerState::Started => Shutdown::Graceful,
        TriggerState::Stopping => Shutdown::AlreadyStopping,
    }
}
