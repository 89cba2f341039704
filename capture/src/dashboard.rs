//! Dashboard reporting – pushes the session phase to the web backend.
//!
//! Fire-and-forget: the outcome is logged, never returned.  The call is
//! synchronous and inherits the HTTP client's default timeout.

use tracing::{error, info, warn};

use rowling_common::protocol::{Phase, StateUpdate};

pub trait StateReporter {
    fn report(&self, phase: Phase);
}

pub struct Dashboard {
    client: reqwest::blocking::Client,
    url: String,
}

impl Dashboard {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            url: url.into(),
        }
    }
}

impl StateReporter for Dashboard {
    fn report(&self, phase: Phase) {
        let body = StateUpdate::from(phase);
        match self.client.put(&self.url).json(&body).send() {
            Ok(resp) if resp.status().is_success() => {
                let status = resp.status();
                let text = resp.text().unwrap_or_default();
                info!("Dashboard state {phase} ({}): {status} {text}", body.current_state);
            }
            Ok(resp) => {
                let status = resp.status();
                let text = resp.text().unwrap_or_default();
                warn!("Dashboard state {phase} rejected: {status} {text}");
            }
            Err(e) => error!("Dashboard state {phase} failed: {e}"),
        }
    }
}
