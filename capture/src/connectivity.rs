//! Connectivity gate – blocks until the network answers.
//!
//! There is deliberately no timeout: the unit sits on the retry screen
//! until the WiFi comes back.

use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::display::StatusBoard;

pub trait Probe {
    fn reachable(&mut self) -> bool;
}

/// Reachability probe: a TCP connect to a well-known address
/// (public DNS on port 53 by default).
pub struct TcpProbe {
    target: String,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(target: impl Into<String>, timeout: Duration) -> Self {
        Self {
            target: target.into(),
            timeout,
        }
    }

    fn resolve(&self) -> Option<SocketAddr> {
        match self.target.to_socket_addrs() {
            Ok(mut addrs) => addrs.next(),
            Err(e) => {
                debug!("Cannot resolve {}: {e}", self.target);
                None
            }
        }
    }
}

impl Probe for TcpProbe {
    fn reachable(&mut self) -> bool {
        let Some(addr) = self.resolve() else {
            return false;
        };
        match TcpStream::connect_timeout(&addr, self.timeout) {
            Ok(_) => true,
            Err(e) => {
                debug!("Probe {addr} failed: {e}");
                false
            }
        }
    }
}

/// Poll `probe` every `retry` until it succeeds.  Returns the number of
/// failed attempts.
pub fn wait_for_network<P: Probe>(probe: &mut P, board: &StatusBoard, retry: Duration) -> u32 {
    let mut failures = 0;
    while !probe.reachable() {
        failures += 1;
        warn!("Network unreachable (attempt {failures}), retrying in {retry:?}");
        board.show("Retry your WiFi", "connection");
        std::thread::sleep(retry);
    }
    info!("Network reachable after {failures} failed attempt(s)");
    board.show("WiFi Connected", "successfully!");
    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingDisplay, ScriptedProbe};

    #[test]
    fn test_two_failures_then_success() {
        let (display, log) = RecordingDisplay::new(16);
        let board = StatusBoard::new(Box::new(display));
        let mut probe = ScriptedProbe::new([false, false, true]);

        let failures = wait_for_network(&mut probe, &board, Duration::ZERO);

        assert_eq!(failures, 2);
        assert_eq!(probe.calls(), 3);
        let frames = log.frames();
        assert_eq!(frames.len(), 3);
        assert!(frames[..2]
            .iter()
            .all(|(l1, l2)| l1 == "Retry your WiFi" && l2 == "connection"));
        assert_eq!(frames[2], ("WiFi Connected".to_string(), "successfully!".to_string()));
    }

    #[test]
    fn test_immediate_success_renders_once() {
        let (display, log) = RecordingDisplay::new(16);
        let board = StatusBoard::new(Box::new(display));
        let mut probe = ScriptedProbe::new([true]);
        assert_eq!(wait_for_network(&mut probe, &board, Duration::ZERO), 0);
        assert_eq!(log.frames().len(), 1);
    }

    #[test]
    fn test_tcp_probe_local_listener() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let mut probe = TcpProbe::new(addr.to_string(), Duration::from_secs(1));
        assert!(probe.reachable());

        drop(listener);
        let mut unresolvable = TcpProbe::new("not a host", Duration::from_millis(100));
        assert!(!unresolvable.reachable());
    }
}
